use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{debug, error, info};

use super::InternalEvent;
use crate::{error::Error, kubernetes::ObjectKey};

#[derive(Debug)]
pub struct ReconcileCompleted<'a> {
    pub kind: &'static str,
    pub key: &'a ObjectKey,
    pub elapsed: Duration,
}

impl InternalEvent for ReconcileCompleted<'_> {
    fn emit(self) {
        debug!(
            message = "Reconcile completed.",
            kind = self.kind,
            object = %self.key,
            elapsed_ms = self.elapsed.as_millis() as u64,
        );
        counter!("reconciles_total", "kind" => self.kind).increment(1);
        histogram!("reconcile_duration_seconds", "kind" => self.kind).record(self.elapsed);
    }
}

#[derive(Debug)]
pub struct ReconcileError<'a> {
    pub kind: &'static str,
    pub key: &'a ObjectKey,
    pub error: &'a Error,
}

impl InternalEvent for ReconcileError<'_> {
    fn emit(self) {
        error!(
            message = "Reconcile failed.",
            kind = self.kind,
            object = %self.key,
            error = %self.error,
            error_kind = ?self.error.kind(),
            requeue_after_secs = self.error.requeue_after().map(|d| d.as_secs()),
        );
        counter!(
            "reconcile_errors_total",
            "kind" => self.kind,
            "error_kind" => format!("{:?}", self.error.kind()),
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct ForwarderInvalid<'a> {
    pub key: &'a ObjectKey,
    pub reason: &'a str,
}

impl InternalEvent for ForwarderInvalid<'_> {
    fn emit(self) {
        info!(message = "Forwarder spec is invalid.", object = %self.key, reason = self.reason);
        counter!("invalid_forwarders_total").increment(1);
    }
}

#[derive(Debug)]
pub struct ConfigGenerated<'a> {
    pub key: &'a ObjectKey,
    pub hash: &'a str,
    pub bytes: usize,
}

impl InternalEvent for ConfigGenerated<'_> {
    fn emit(self) {
        debug!(
            message = "Collector config generated.",
            object = %self.key,
            hash = self.hash,
            bytes = self.bytes,
        );
        counter!("config_generated_total").increment(1);
        histogram!("config_size_bytes").record(self.bytes as f64);
    }
}

#[derive(Debug)]
pub struct ForwarderUnmanaged<'a> {
    pub key: &'a ObjectKey,
}

impl InternalEvent for ForwarderUnmanaged<'_> {
    fn emit(self) {
        debug!(message = "Forwarder is unmanaged; skipping.", object = %self.key);
    }
}
