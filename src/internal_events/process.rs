use metrics::counter;
use tracing::info;

use super::InternalEvent;

#[derive(Debug)]
pub struct OperatorStarted<'a> {
    pub namespace: Option<&'a str>,
    pub concurrency: u16,
}

impl InternalEvent for OperatorStarted<'_> {
    fn emit(self) {
        info!(
            message = "Operator has started.",
            version = env!("CARGO_PKG_VERSION"),
            namespace = self.namespace.unwrap_or("<all>"),
            concurrency = self.concurrency,
        );
        counter!("started_total").increment(1);
    }
}

#[derive(Debug)]
pub struct OperatorStopped;

impl InternalEvent for OperatorStopped {
    fn emit(self) {
        info!(message = "Operator has stopped.");
        counter!("stopped_total").increment(1);
    }
}
