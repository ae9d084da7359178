use metrics::counter;
use tracing::{debug, warn};

use super::InternalEvent;
use crate::kubernetes::ObjectKey;

#[derive(Debug)]
pub struct ResourceWritten<'a> {
    pub kind: String,
    pub key: &'a ObjectKey,
    pub operation: &'static str,
}

impl InternalEvent for ResourceWritten<'_> {
    fn emit(self) {
        debug!(
            message = "Resource written.",
            kind = %self.kind,
            object = %self.key,
            operation = self.operation,
        );
        counter!(
            "resource_writes_total",
            "kind" => self.kind,
            "operation" => self.operation,
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct WriteConflict<'a> {
    pub what: &'a str,
}

impl InternalEvent for WriteConflict<'_> {
    fn emit(self) {
        warn!(message = "Write conflicted with a concurrent change.", what = self.what);
        counter!("write_conflicts_total", "what" => self.what.to_string()).increment(1);
    }
}

#[derive(Debug)]
pub struct StatusConflict<'a> {
    pub kind: &'static str,
    pub key: &'a ObjectKey,
}

impl InternalEvent for StatusConflict<'_> {
    fn emit(self) {
        debug!(
            message = "Status write conflicted; requeueing.",
            kind = self.kind,
            object = %self.key,
        );
        counter!("status_conflicts_total", "kind" => self.kind).increment(1);
    }
}
