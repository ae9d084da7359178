use std::{collections::BTreeMap, time::Instant};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{Namespace, Secret},
        rbac::v1::{ClusterRole, ClusterRoleBinding},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info, warn};

use super::{
    Context, Outcome, WithStatus, after_status, ensure, remove,
    status::{Progress, forwarder_status, unmanaged_status},
    write_status,
};
use crate::{
    api::{
        ClusterLogForwarder, ClusterLogForwarderStatus, ManagementState,
        constants::{FORWARDER_FINALIZER, LOKISTACK_FINALIZER},
    },
    error::{ClientSnafu, ErrorKind, GenerateSnafu, MissingObjectKeySnafu, Result},
    generator::{self, Options, lokistack::references_lokistack, outputs::aws_credentials},
    internal_events::{
        ConfigGenerated, ForwarderInvalid, ForwarderUnmanaged, ReconcileCompleted, ReconcileError,
    },
    kubernetes::{
        CONFLICT_RETRIES, ClusterClient, ObjectKey, retry_on_conflict,
        resources::{
            LOGS_READER_BINDING, LOGS_READER_ROLE, LOGS_WRITER_ROLE, Owner, ResourceNames,
            SECURITY_LABELS, Workload, collector_pod_spec, config_secret, daemon_set, deployment,
            logs_reader_binding, logs_reader_role, logs_writer_binding, logs_writer_role,
            metadata_reader_binding, metrics_service, receiver_service, scc_role,
            scc_role_binding, service_account, service_monitor, token_secret,
            trusted_ca_config_map,
        },
    },
    secrets::Secrets,
    validation,
};

/// Converges everything derived from the forwarder at `key`.
pub async fn reconcile_forwarder<C: ClusterClient>(
    cx: &Context<C>,
    key: &ObjectKey,
) -> Result<Outcome> {
    let started = Instant::now();
    let result = run(cx, key).await;
    match &result {
        Ok(_) => emit!(ReconcileCompleted {
            kind: ClusterLogForwarder::LABEL,
            key,
            elapsed: started.elapsed(),
        }),
        Err(error) => {
            emit!(ReconcileError {
                kind: ClusterLogForwarder::LABEL,
                key,
                error,
            });
            if error.kind() == ErrorKind::Transient {
                cx.telemetry.inc_collector_errors();
            }
        }
    }
    result
}

async fn run<C: ClusterClient>(cx: &Context<C>, key: &ObjectKey) -> Result<Outcome> {
    let Some(forwarder) = cx
        .client
        .get::<ClusterLogForwarder>(key)
        .await
        .context(ClientSnafu {
            action: "get",
            object: key.to_string(),
        })?
    else {
        debug!(message = "Forwarder is gone.", forwarder = %key);
        remove_cluster_bindings(cx, key).await?;
        return Ok(Outcome::Done);
    };

    if forwarder.metadata.deletion_timestamp.is_some() {
        finalize(cx, &forwarder).await?;
        return Ok(Outcome::Done);
    }

    if forwarder.spec.management_state == ManagementState::Unmanaged {
        emit!(ForwarderUnmanaged { key });
        let write = write_status::<ClusterLogForwarder, _>(cx, key, unmanaged_status(&forwarder))
            .await?;
        return Ok(after_status(write, Outcome::Done));
    }

    let secrets = load_secrets(cx, &forwarder).await?;
    if let Err(errors) = validation::validate(&forwarder, &secrets) {
        emit!(ForwarderInvalid {
            key,
            reason: &errors.to_string(),
        });
        let status = forwarder_status(&forwarder, Progress::Invalid(&errors));
        let write = write_status::<ClusterLogForwarder, _>(cx, key, status).await?;
        return Ok(after_status(write, Outcome::Done));
    }

    match apply(cx, &forwarder, &secrets).await {
        Ok(()) => {
            let status = forwarder_status(&forwarder, Progress::Complete);
            report(cx, &forwarder, &status);
            let write = write_status::<ClusterLogForwarder, _>(cx, key, status).await?;
            Ok(after_status(write, cx.success()))
        }
        Err(error) => {
            let status = forwarder_status(&forwarder, Progress::Failed(&error));
            report(cx, &forwarder, &status);
            if let Err(status_error) = write_status::<ClusterLogForwarder, _>(cx, key, status).await {
                warn!(message = "Failed to record reconcile failure.", forwarder = %key, error = %status_error);
            }
            match error.kind() {
                // Generated config the collector cannot run is a spec problem: wait for a change.
                ErrorKind::Validation => Ok(Outcome::Done),
                ErrorKind::NotFound => Ok(error
                    .requeue_after()
                    .map_or(Outcome::Done, Outcome::RequeueAfter)),
                _ => Err(error),
            }
        }
    }
}

fn report(
    cx: &Context<impl ClusterClient>,
    forwarder: &ClusterLogForwarder,
    status: &ClusterLogForwarderStatus,
) {
    let mut reported = forwarder.clone();
    reported.status = Some(status.clone());
    cx.telemetry.update_from_forwarder(&reported);
}

/// Reads every secret the spec references. Missing secrets are left out for validation to
/// report.
async fn load_secrets<C: ClusterClient>(
    cx: &Context<C>,
    forwarder: &ClusterLogForwarder,
) -> Result<Secrets> {
    let namespace = forwarder
        .metadata
        .namespace
        .as_deref()
        .context(MissingObjectKeySnafu {
            field: ".metadata.namespace",
        })?;
    let mut secrets = Secrets::new();
    for name in forwarder.spec.secret_names() {
        let key = ObjectKey::namespaced(namespace, &name);
        let secret = cx.client.get::<Secret>(&key).await.context(ClientSnafu {
            action: "get",
            object: format!("Secret {key}"),
        })?;
        match secret {
            Some(secret) => secrets.insert_secret(&secret),
            None => debug!(message = "Referenced secret not found.", secret = %key),
        }
    }
    Ok(secrets)
}

/// Steps that converge the derived objects, in dependency order.
async fn apply<C: ClusterClient>(
    cx: &Context<C>,
    forwarder: &ClusterLogForwarder,
    secrets: &Secrets,
) -> Result<()> {
    let owner = Owner::of(forwarder).context(MissingObjectKeySnafu {
        field: ".metadata.uid",
    })?;
    let names = ResourceNames::new(forwarder);
    let key = ObjectKey::of(forwarder);

    ensure(cx, &security_labels(&names.namespace)).await?;

    ensure(cx, &service_account(&owner, &names)).await?;
    ensure(cx, &token_secret(&owner, &names)).await?;
    ensure(cx, &scc_role(&owner, &names)).await?;
    ensure(cx, &scc_role_binding(&owner, &names)).await?;

    // Finalizers go on before the cluster-scoped objects they guard exist.
    set_finalizer(cx, &key, FORWARDER_FINALIZER, true).await?;
    let (reader_role, reader_binding) = metadata_reader_binding(&names);
    ensure(cx, &reader_role).await?;
    ensure(cx, &reader_binding).await?;

    if references_lokistack(&forwarder.spec) {
        set_finalizer(cx, &key, LOKISTACK_FINALIZER, true).await?;
        ensure(cx, &logs_writer_role()).await?;
        ensure(cx, &logs_writer_binding(&names)).await?;
        ensure(cx, &logs_reader_role()).await?;
        ensure(cx, &logs_reader_binding()).await?;
    } else if has_finalizer(forwarder, LOKISTACK_FINALIZER) {
        remove::<ClusterRoleBinding, _>(cx, &ObjectKey::cluster(&names.logs_writer)).await?;
        set_finalizer(cx, &key, LOKISTACK_FINALIZER, false).await?;
    }

    let options = Options::for_forwarder(
        forwarder,
        cx.settings.min_tls_version.clone(),
        cx.settings.ciphers.clone(),
    )
    .context(GenerateSnafu)?;
    let config = generator::generate(forwarder, secrets, &options).context(GenerateSnafu)?;
    let hash = generator::config_hash(&config);
    emit!(ConfigGenerated {
        key: &key,
        hash: &hash,
        bytes: config.len(),
    });
    let credentials = aws_credentials(&forwarder.spec, secrets).context(GenerateSnafu)?;

    ensure(
        cx,
        &config_secret(&owner, &names, &config, credentials.as_deref(), secrets),
    )
    .await?;
    ensure(cx, &trusted_ca_config_map(&owner, &names)).await?;
    ensure(cx, &metrics_service(&owner, &names)).await?;
    ensure(cx, &service_monitor(&owner, &names)).await?;
    for (input, receiver) in forwarder.spec.receivers() {
        ensure(cx, &receiver_service(&owner, &names, input, receiver)).await?;
    }

    let workload = Workload::for_forwarder(forwarder);
    let pod = collector_pod_spec(forwarder, &names, &cx.settings.collector_image, workload);
    let workload_key = ObjectKey::namespaced(&names.namespace, &names.common);
    match workload {
        Workload::DaemonSet => {
            remove::<Deployment, _>(cx, &workload_key).await?;
            ensure(cx, &daemon_set(&owner, &names, pod, &hash)).await?;
        }
        Workload::Deployment => {
            remove::<DaemonSet, _>(cx, &workload_key).await?;
            ensure(cx, &deployment(&owner, &names, pod, &hash)).await?;
        }
    }
    info!(message = "Forwarder reconciled.", forwarder = %key, config_hash = %hash);
    Ok(())
}

/// The namespace labels the collector's privileged pods need.
fn security_labels(namespace: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.into()),
            labels: Some(
                SECURITY_LABELS
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn has_finalizer(forwarder: &ClusterLogForwarder, finalizer: &str) -> bool {
    forwarder
        .metadata
        .finalizers
        .iter()
        .flatten()
        .any(|f| f == finalizer)
}

/// Adds or removes `finalizer` on the latest version of the forwarder.
async fn set_finalizer<C: ClusterClient>(
    cx: &Context<C>,
    key: &ObjectKey,
    finalizer: &str,
    present: bool,
) -> Result<()> {
    let what = format!("finalizer {finalizer} on {key}");
    cx.check_cancelled(&what)?;
    let client = &cx.client;
    retry_on_conflict(&what, CONFLICT_RETRIES, move || async move {
        let Some(mut forwarder) = client.get::<ClusterLogForwarder>(key).await? else {
            return Ok(());
        };
        if has_finalizer(&forwarder, finalizer) == present {
            return Ok(());
        }
        let finalizers = forwarder.metadata.finalizers.get_or_insert_with(Vec::new);
        if present {
            finalizers.push(finalizer.to_string());
        } else {
            finalizers.retain(|f| f != finalizer);
        }
        client.replace(&forwarder).await.map(drop)
    })
    .await
    .context(ClientSnafu {
        action: "update",
        object: what.as_str(),
    })
}

/// Tears down what garbage collection cannot reach, then releases the forwarder.
///
/// The collector goes first so nothing ships logs while its permissions are revoked.
async fn finalize<C: ClusterClient>(cx: &Context<C>, forwarder: &ClusterLogForwarder) -> Result<()> {
    let ours = [FORWARDER_FINALIZER, LOKISTACK_FINALIZER];
    if !ours.iter().any(|f| has_finalizer(forwarder, f)) {
        return Ok(());
    }
    let key = ObjectKey::of(forwarder);
    let names = ResourceNames::new(forwarder);
    info!(message = "Finalizing forwarder.", forwarder = %key);

    let workload_key = ObjectKey::namespaced(&names.namespace, &names.common);
    remove::<DaemonSet, _>(cx, &workload_key).await?;
    remove::<Deployment, _>(cx, &workload_key).await?;
    remove::<Secret, _>(cx, &ObjectKey::namespaced(&names.namespace, &names.config)).await?;

    if has_finalizer(forwarder, LOKISTACK_FINALIZER) {
        remove::<ClusterRoleBinding, _>(cx, &ObjectKey::cluster(LOGS_READER_BINDING)).await?;
        remove::<ClusterRole, _>(cx, &ObjectKey::cluster(LOGS_READER_ROLE)).await?;
        remove::<ClusterRoleBinding, _>(cx, &ObjectKey::cluster(&names.logs_writer)).await?;
        remove::<ClusterRole, _>(cx, &ObjectKey::cluster(LOGS_WRITER_ROLE)).await?;
    }
    remove::<ClusterRoleBinding, _>(cx, &ObjectKey::cluster(&names.metadata_reader)).await?;

    for finalizer in ours {
        set_finalizer(cx, &key, finalizer, false).await?;
    }
    Ok(())
}

/// Removes the per-forwarder cluster bindings of a forwarder that disappeared without being
/// finalized.
async fn remove_cluster_bindings<C: ClusterClient>(cx: &Context<C>, key: &ObjectKey) -> Result<()> {
    let namespace = key.namespace.as_deref().unwrap_or_default();
    for name in [
        ResourceNames::metadata_reader_binding(namespace, &key.name),
        ResourceNames::logs_writer_binding(namespace, &key.name),
    ] {
        remove::<ClusterRoleBinding, _>(cx, &ObjectKey::cluster(name)).await?;
    }
    Ok(())
}
