use std::time::Instant;

use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use super::{Context, Outcome, WithStatus, after_status, ensure, write_status};
use crate::{
    api::{
        Condition, LogFileMetricExporter, LogFileMetricExporterStatus,
        conditions::{
            REASON_RECONCILE_FAILURE, REASON_RECONCILE_SUCCESS, REASON_VALIDATION_FAILURE,
            TYPE_DEGRADED, TYPE_INVALID, TYPE_READY,
        },
    },
    error::{ClientSnafu, MissingObjectKeySnafu, Result},
    internal_events::{ReconcileCompleted, ReconcileError},
    kubernetes::{
        ClusterClient, ObjectKey,
        resources::{
            EXPORTER_NAME, EXPORTER_NAMESPACE, Owner, exporter_daemon_set, exporter_service,
            exporter_service_account, exporter_service_monitor,
        },
    },
};

/// Converges the metric exporter at `key`.
///
/// Only `openshift-logging/instance` is ever deployed; any other exporter is marked invalid.
pub async fn reconcile_exporter<C: ClusterClient>(
    cx: &Context<C>,
    key: &ObjectKey,
) -> Result<Outcome> {
    let started = Instant::now();
    let result = run(cx, key).await;
    match &result {
        Ok(_) => emit!(ReconcileCompleted {
            kind: LogFileMetricExporter::LABEL,
            key,
            elapsed: started.elapsed(),
        }),
        Err(error) => emit!(ReconcileError {
            kind: LogFileMetricExporter::LABEL,
            key,
            error,
        }),
    }
    result
}

fn status(conditions: Vec<Condition>) -> LogFileMetricExporterStatus {
    LogFileMetricExporterStatus { conditions }
}

async fn run<C: ClusterClient>(cx: &Context<C>, key: &ObjectKey) -> Result<Outcome> {
    let Some(exporter) = cx
        .client
        .get::<LogFileMetricExporter>(key)
        .await
        .context(ClientSnafu {
            action: "get",
            object: key.to_string(),
        })?
    else {
        debug!(message = "Exporter is gone.", exporter = %key);
        return Ok(Outcome::Done);
    };
    if exporter.metadata.deletion_timestamp.is_some() {
        return Ok(Outcome::Done);
    }

    if key.name != EXPORTER_NAME || key.namespace.as_deref() != Some(EXPORTER_NAMESPACE) {
        let message =
            format!("only {EXPORTER_NAMESPACE}/{EXPORTER_NAME} is deployed, not {key}");
        warn!(message = "Ignoring exporter.", exporter = %key);
        let invalid = status(vec![
            Condition::new(TYPE_INVALID, true, REASON_VALIDATION_FAILURE, message.as_str()),
            Condition::new(TYPE_READY, false, REASON_VALIDATION_FAILURE, message),
        ]);
        let write = write_status::<LogFileMetricExporter, _>(cx, key, invalid).await?;
        return Ok(after_status(write, Outcome::Done));
    }

    match apply(cx, &exporter).await {
        Ok(()) => {
            let ready = status(vec![
                Condition::new(TYPE_INVALID, false, REASON_RECONCILE_SUCCESS, ""),
                Condition::new(TYPE_READY, true, REASON_RECONCILE_SUCCESS, ""),
                Condition::new(TYPE_DEGRADED, false, REASON_RECONCILE_SUCCESS, ""),
            ]);
            let write = write_status::<LogFileMetricExporter, _>(cx, key, ready).await?;
            Ok(after_status(write, cx.success()))
        }
        Err(error) => {
            let degraded = status(vec![
                Condition::new(TYPE_INVALID, false, REASON_RECONCILE_FAILURE, ""),
                Condition::new(TYPE_READY, false, REASON_RECONCILE_FAILURE, error.to_string()),
                Condition::new(TYPE_DEGRADED, true, REASON_RECONCILE_FAILURE, error.to_string()),
            ]);
            if let Err(status_error) =
                write_status::<LogFileMetricExporter, _>(cx, key, degraded).await
            {
                warn!(message = "Failed to record reconcile failure.", exporter = %key, error = %status_error);
            }
            Err(error)
        }
    }
}

async fn apply<C: ClusterClient>(cx: &Context<C>, exporter: &LogFileMetricExporter) -> Result<()> {
    let owner = Owner::of(exporter).context(MissingObjectKeySnafu {
        field: ".metadata.uid",
    })?;
    let settings = &cx.settings;
    ensure(cx, &exporter_service_account(&owner)).await?;
    ensure(
        cx,
        &exporter_daemon_set(
            &owner,
            exporter,
            &settings.exporter_image,
            settings.min_tls_version.as_deref(),
            &settings.ciphers,
        ),
    )
    .await?;
    ensure(cx, &exporter_service(&owner)).await?;
    ensure(cx, &exporter_service_monitor(&owner)).await?;
    Ok(())
}
