//! Wires the reconcile callbacks into `kube` runtime controllers.
//!
//! The runtime owns the work queue: it serializes reconciles per object, runs up to
//! `concurrency` objects in parallel and requeues according to the returned [`Action`].

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::{ConfigMap, Secret, Service, ServiceAccount},
};
use kube::{
    Client, ResourceExt,
    runtime::{
        Controller,
        controller::{self, Action},
        reflector::ObjectRef,
        watcher,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    api::{ClusterLogForwarder, LogFileMetricExporter},
    config::OperatorConfig,
    error::{Error, ErrorKind},
    kubernetes::{KubeClient, Managed, ObjectKey},
    reconcile::{self, Context, Outcome},
    telemetry::Telemetry,
};

type Shared = Arc<Context<KubeClient>>;

fn action(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::RequeueAfter(after) => Action::requeue(after),
    }
}

fn error_policy<K, Cx>(_object: Arc<K>, error: &Error, _cx: Arc<Cx>) -> Action {
    if error.kind() == ErrorKind::Fatal {
        warn!(message = "Not retrying until the object changes.", %error);
    }
    error
        .requeue_after()
        .map_or_else(Action::await_change, Action::requeue)
}

async fn reconcile_forwarder(
    forwarder: Arc<ClusterLogForwarder>,
    cx: Shared,
) -> Result<Action, Error> {
    let key = ObjectKey::of(forwarder.as_ref());
    reconcile::reconcile_forwarder(&cx, &key).await.map(action)
}

async fn reconcile_exporter(
    exporter: Arc<LogFileMetricExporter>,
    cx: Shared,
) -> Result<Action, Error> {
    let key = ObjectKey::of(exporter.as_ref());
    reconcile::reconcile_exporter(&cx, &key).await.map(action)
}

/// Forwarders in the secret's namespace that read it.
fn forwarders_reading(
    forwarders: Vec<Arc<ClusterLogForwarder>>,
    secret: &Secret,
) -> Vec<ObjectRef<ClusterLogForwarder>> {
    let name = secret.name_any();
    forwarders
        .into_iter()
        .filter(|forwarder| forwarder.namespace() == secret.namespace())
        .filter(|forwarder| forwarder.spec.secret_names().contains(&name))
        .map(|forwarder| ObjectRef::from_obj(forwarder.as_ref()))
        .collect()
}

fn log_result<K, E: std::fmt::Display>(kind: &str, result: Result<(ObjectRef<K>, Action), E>)
where
    K: kube::Resource,
    K::DynamicType: Eq + std::hash::Hash + Clone + std::fmt::Debug,
{
    match result {
        Ok((object, action)) => {
            debug!(message = "Reconciled.", kind, object = %object, ?action);
        }
        // Reconcile failures were already reported by the reconcile callback.
        Err(error) => debug!(message = "Controller error.", kind, %error),
    }
}

/// Runs the forwarder and exporter controllers until `shutdown` is cancelled.
///
/// Cancelling stops new reconciles from starting and new writes from being issued; running
/// reconciles are allowed to finish.
pub async fn run(
    client: Client,
    config: &OperatorConfig,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
) {
    let namespace = config.watch_namespace.as_deref();
    let settings = config.settings();
    let context = || {
        let mut cx = Context::new(
            KubeClient::new(client.clone()),
            settings.clone(),
            telemetry.clone(),
        );
        cx.cancel = shutdown.clone();
        Arc::new(cx)
    };
    let runtime_config = controller::Config::default().concurrency(config.concurrency);
    let watch = watcher::Config::default;

    let forwarders = Controller::new(
        ClusterLogForwarder::api(client.clone(), namespace),
        watch(),
    );
    let store = forwarders.store();
    let forwarders = forwarders
        .with_config(runtime_config.clone())
        .owns(DaemonSet::api(client.clone(), namespace), watch())
        .owns(Deployment::api(client.clone(), namespace), watch())
        .owns(ConfigMap::api(client.clone(), namespace), watch())
        .owns(Service::api(client.clone(), namespace), watch())
        .owns(ServiceAccount::api(client.clone(), namespace), watch())
        .watches(Secret::api(client.clone(), namespace), watch(), move |secret| {
            forwarders_reading(store.state(), &secret)
        })
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(reconcile_forwarder, error_policy, context())
        .for_each(|result| async move { log_result("forwarder", result) });

    let exporters = Controller::new(
        LogFileMetricExporter::api(client.clone(), namespace),
        watch(),
    )
    .with_config(runtime_config)
    .owns(DaemonSet::api(client.clone(), namespace), watch())
    .owns(Service::api(client.clone(), namespace), watch())
    .graceful_shutdown_on(shutdown.clone().cancelled_owned())
    .run(reconcile_exporter, error_policy, context())
    .for_each(|result| async move { log_result("exporter", result) });

    futures::join!(forwarders, exporters);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        error::Error,
        kubernetes::ClientError,
        validation::{Component, ValidationError, ValidationErrors},
    };

    #[test]
    fn outcomes_map_to_actions() {
        assert_eq!(action(Outcome::Done), Action::await_change());
        assert_eq!(
            action(Outcome::RequeueAfter(Duration::from_secs(1))),
            Action::requeue(Duration::from_secs(1))
        );
    }

    #[test]
    fn secrets_map_to_their_readers() {
        let forwarder: ClusterLogForwarder = serde_yaml::from_str(
            r#"
apiVersion: observability.openshift.io/v1
kind: ClusterLogForwarder
metadata:
  name: collector
  namespace: openshift-logging
spec:
  serviceAccount:
    name: collector
  outputs:
    - name: splunk
      type: splunk
      splunk:
        url: https://splunk.example:8088
        authentication:
          token:
            secretName: hec
            key: hecToken
  pipelines:
    - name: all
      inputRefs: [application]
      outputRefs: [splunk]
"#,
        )
        .unwrap();
        let forwarders = vec![Arc::new(forwarder.clone())];

        let mut secret = Secret::default();
        secret.metadata.name = Some("hec".into());
        secret.metadata.namespace = Some("openshift-logging".into());
        assert_eq!(
            forwarders_reading(forwarders.clone(), &secret),
            [ObjectRef::from_obj(&forwarder)]
        );

        secret.metadata.namespace = Some("other".into());
        assert!(forwarders_reading(forwarders, &secret).is_empty());
    }

    #[test]
    fn errors_choose_the_requeue() {
        let cx = Arc::new(());
        let invalid = Error::Invalid {
            source: ValidationErrors::from(ValidationError::new(Component::Spec, "", "bad")),
        };
        assert_eq!(
            error_policy(Arc::new(()), &invalid, cx.clone()),
            Action::await_change()
        );
        let conflict = Error::Client {
            action: "update",
            object: "Secret a/b".into(),
            source: ClientError::Conflict {
                message: "stale".into(),
            },
        };
        assert_eq!(
            error_policy(Arc::new(()), &conflict, cx),
            Action::requeue(Duration::from_secs(1))
        );
    }
}
