//! Reconcile callbacks for the forwarder and exporter resources.
//!
//! A callback reads the resource, converges every derived object toward its desired shape and
//! writes the status last. Callbacks only talk to the cluster through [`ClusterClient`], and
//! return an [`Outcome`] that the controller turns into a requeue.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use kube::Resource;
use snafu::{ResultExt, ensure};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    api::{
        ClusterLogForwarder, ClusterLogForwarderStatus, LogFileMetricExporter,
        LogFileMetricExporterStatus,
        conditions::{Condition, preserve_transition_times},
    },
    comparators::{self, Comparison},
    error::{CancelledSnafu, ClientSnafu, Result},
    internal_events::StatusConflict,
    kubernetes::{
        CONFLICT_RETRIES, ClusterClient, Managed, ObjectKey, ServiceMonitor, retry_on_conflict,
    },
    telemetry::Telemetry,
};

mod exporter;
mod forwarder;
mod status;

pub use exporter::reconcile_exporter;
pub use forwarder::reconcile_forwarder;

/// Requeue after a status write lost an optimistic-lock race.
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);
pub const PERIODIC_REQUEUE: Duration = Duration::from_secs(5 * 60);

/// Operator-wide inputs to every reconcile.
#[derive(Clone, Debug)]
pub struct Settings {
    pub collector_image: String,
    pub exporter_image: String,
    /// Cluster TLS profile applied to generated configs and the exporter.
    pub min_tls_version: Option<String>,
    pub ciphers: Vec<String>,
    /// Requeue after a successful reconcile, to refresh status and restore deleted
    /// cluster-scoped objects nobody watches.
    pub periodic_requeue: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collector_image: "quay.io/openshift-logging/vector:latest".into(),
            exporter_image: "quay.io/openshift-logging/log-file-metric-exporter:latest".into(),
            min_tls_version: None,
            ciphers: Vec::new(),
            periodic_requeue: Some(PERIODIC_REQUEUE),
        }
    }
}

/// Shared state handed to every reconcile.
pub struct Context<C> {
    pub client: C,
    pub settings: Settings,
    pub telemetry: Arc<Telemetry>,
    /// Once cancelled, no new writes are issued.
    pub cancel: CancellationToken,
}

impl<C: ClusterClient> Context<C> {
    pub fn new(client: C, settings: Settings, telemetry: Arc<Telemetry>) -> Self {
        Self {
            client,
            settings,
            telemetry,
            cancel: CancellationToken::new(),
        }
    }

    fn check_cancelled(&self, step: &str) -> Result<()> {
        ensure!(
            !self.cancel.is_cancelled(),
            CancelledSnafu {
                step: step.to_string()
            }
        );
        Ok(())
    }

    fn success(&self) -> Outcome {
        self.settings
            .periodic_requeue
            .map_or(Outcome::Done, Outcome::RequeueAfter)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    RequeueAfter(Duration),
}

/// What [`ensure`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    /// Replaced because of the drift described.
    Updated(String),
    Unchanged,
}

/// A kind the reconcile engine converges toward a desired object.
pub trait Reconciled: Managed {
    fn compare(current: &Self, desired: &Self) -> Comparison;

    /// The object written over `current`.
    fn merge(current: Self, desired: &Self) -> Self {
        merge_metadata(&current, desired)
    }
}

fn union(
    current: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (current, desired) {
        (None, None) => None,
        (current, desired) => {
            let mut merged = current.cloned().unwrap_or_default();
            merged.extend(desired.cloned().unwrap_or_default());
            Some(merged)
        }
    }
}

/// `desired`, keeping the resource version and any labels or annotations others added.
fn merge_metadata<K: Resource + Clone>(current: &K, desired: &K) -> K {
    let mut next = desired.clone();
    let (current, meta) = (current.meta(), next.meta_mut());
    meta.resource_version = current.resource_version.clone();
    meta.labels = union(current.labels.as_ref(), desired.meta().labels.as_ref());
    meta.annotations = union(current.annotations.as_ref(), desired.meta().annotations.as_ref());
    next
}

macro_rules! reconciled {
    ($($kind:ty => $compare:path),+ $(,)?) => {
        $(impl Reconciled for $kind {
            fn compare(current: &Self, desired: &Self) -> Comparison {
                $compare(current, desired)
            }
        })+
    };
}

reconciled!(
    DaemonSet => comparators::daemon_set,
    Deployment => comparators::deployment,
    Secret => comparators::secret,
    ServiceMonitor => comparators::service_monitor,
    Role => comparators::role,
    RoleBinding => comparators::role_binding,
    ClusterRole => comparators::cluster_role,
    ClusterRoleBinding => comparators::cluster_role_binding,
);

impl Reconciled for Service {
    fn compare(current: &Self, desired: &Self) -> Comparison {
        comparators::service(current, desired)
    }

    /// Allocated addresses cannot be changed by an update.
    fn merge(current: Self, desired: &Self) -> Self {
        let mut next = merge_metadata(&current, desired);
        if let (Some(next), Some(current)) = (next.spec.as_mut(), current.spec) {
            next.cluster_ip = current.cluster_ip;
            next.cluster_ips = current.cluster_ips;
        }
        next
    }
}

/// The only config map the operator writes is the trusted CA bundle, whose data the cluster
/// injects.
impl Reconciled for ConfigMap {
    fn compare(current: &Self, desired: &Self) -> Comparison {
        comparators::config_map_labels(current, desired)
    }

    fn merge(current: Self, desired: &Self) -> Self {
        let mut next = merge_metadata(&current, desired);
        next.data = current.data;
        next.binary_data = current.binary_data;
        next
    }
}

impl Reconciled for ServiceAccount {
    fn compare(current: &Self, desired: &Self) -> Comparison {
        comparators::service_account(current, desired)
    }

    fn merge(current: Self, desired: &Self) -> Self {
        let mut next = merge_metadata(&current, desired);
        next.secrets = current.secrets;
        next.image_pull_secrets = current.image_pull_secrets;
        next
    }
}

/// Namespaces are only ever labelled, never claimed.
impl Reconciled for Namespace {
    fn compare(current: &Self, desired: &Self) -> Comparison {
        comparators::namespace_labels(current, desired)
    }

    fn merge(mut current: Self, desired: &Self) -> Self {
        current.metadata.labels = union(
            current.metadata.labels.as_ref(),
            desired.metadata.labels.as_ref(),
        );
        current
    }
}

/// Creates `desired` or replaces the existing object when it drifted.
///
/// Runs under the conflict retry: every attempt re-reads the object.
pub async fn ensure<K: Reconciled, C: ClusterClient>(cx: &Context<C>, desired: &K) -> Result<Applied> {
    let key = ObjectKey::of(desired);
    let what = format!("{} {key}", K::kind_name());
    cx.check_cancelled(&what)?;

    let client = &cx.client;
    let key_ref = &key;
    let applied = retry_on_conflict(&what, CONFLICT_RETRIES, move || async move {
        match client.get::<K>(key_ref).await? {
            None => {
                client.create(desired).await?;
                Ok(Applied::Created)
            }
            Some(current) => {
                let (same, reason) = K::compare(&current, desired);
                if same {
                    return Ok(Applied::Unchanged);
                }
                client.replace(&K::merge(current, desired)).await?;
                Ok(Applied::Updated(reason))
            }
        }
    })
    .await
    .context(ClientSnafu {
        action: "reconcile",
        object: what.as_str(),
    })?;

    match &applied {
        Applied::Created => info!(message = "Created.", object = %what),
        Applied::Updated(reason) => info!(message = "Updated after drift.", object = %what, %reason),
        Applied::Unchanged => debug!(message = "Unchanged.", object = %what),
    }
    Ok(applied)
}

/// Deletes the object at `key`; a missing object is not an error.
pub async fn remove<K: Managed, C: ClusterClient>(cx: &Context<C>, key: &ObjectKey) -> Result<()> {
    let what = format!("{} {key}", K::kind_name());
    cx.check_cancelled(&what)?;
    cx.client.delete::<K>(key).await.context(ClientSnafu {
        action: "delete",
        object: what,
    })
}

/// A kind whose status the reconcile engine writes.
pub trait WithStatus: Managed {
    /// Short name used in logs and metric labels.
    const LABEL: &'static str;

    type Status: Clone + Default + PartialEq + Send + Sync;

    fn status_mut(&mut self) -> &mut Option<Self::Status>;

    /// Copies transition times of unchanged conditions from `previous`.
    fn preserve_times(previous: &Self::Status, next: &mut Self::Status);
}

fn preserve_all(previous: &BTreeMap<String, Vec<Condition>>, next: &mut BTreeMap<String, Vec<Condition>>) {
    for (name, conditions) in next.iter_mut() {
        if let Some(old) = previous.get(name) {
            preserve_transition_times(old, conditions);
        }
    }
}

impl WithStatus for ClusterLogForwarder {
    const LABEL: &'static str = "forwarder";
    type Status = ClusterLogForwarderStatus;

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }

    fn preserve_times(previous: &Self::Status, next: &mut Self::Status) {
        preserve_transition_times(&previous.conditions, &mut next.conditions);
        preserve_all(&previous.inputs, &mut next.inputs);
        preserve_all(&previous.outputs, &mut next.outputs);
        preserve_all(&previous.filters, &mut next.filters);
        preserve_all(&previous.pipelines, &mut next.pipelines);
    }
}

impl WithStatus for LogFileMetricExporter {
    const LABEL: &'static str = "exporter";
    type Status = LogFileMetricExporterStatus;

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }

    fn preserve_times(previous: &Self::Status, next: &mut Self::Status) {
        preserve_transition_times(&previous.conditions, &mut next.conditions);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    Written,
    Unchanged,
    /// The object changed since it was read. The caller requeues.
    Conflicted,
    /// The object no longer exists.
    Gone,
}

/// Writes `status` onto the latest version of the object at `key`, unless it already carries
/// an equivalent status.
pub async fn write_status<K: WithStatus, C: ClusterClient>(
    cx: &Context<C>,
    key: &ObjectKey,
    mut status: K::Status,
) -> Result<StatusWrite> {
    let what = format!("{} {key} status", K::kind_name());
    let Some(mut latest) = cx
        .client
        .get::<K>(key)
        .await
        .context(ClientSnafu {
            action: "get",
            object: what.as_str(),
        })?
    else {
        return Ok(StatusWrite::Gone);
    };

    let previous = latest.status_mut().clone().unwrap_or_default();
    K::preserve_times(&previous, &mut status);
    if previous == status {
        return Ok(StatusWrite::Unchanged);
    }
    cx.check_cancelled(&what)?;

    *latest.status_mut() = Some(status);
    match cx.client.replace_status(&latest).await {
        Ok(_) => Ok(StatusWrite::Written),
        Err(error) if error.is_conflict() => {
            emit!(StatusConflict {
                kind: K::LABEL,
                key,
            });
            Ok(StatusWrite::Conflicted)
        }
        Err(source) => Err(source).context(ClientSnafu {
            action: "update",
            object: what,
        }),
    }
}

/// `outcome`, unless the status write lost a race.
fn after_status(write: StatusWrite, outcome: Outcome) -> Outcome {
    match write {
        StatusWrite::Conflicted => Outcome::RequeueAfter(CONFLICT_REQUEUE),
        StatusWrite::Written | StatusWrite::Unchanged | StatusWrite::Gone => outcome,
    }
}
