//! Operator process configuration.

use std::time::Duration;

use clap::Args;

use crate::reconcile::{PERIODIC_REQUEUE, Settings};

#[derive(Args, Clone, Debug)]
#[command(rename_all = "kebab-case")]
pub struct OperatorConfig {
    /// Only watch resources in this namespace. Watches every namespace when unset.
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Image of the log collector the forwarder runs.
    #[arg(
        long,
        env = "RELATED_IMAGE_VECTOR",
        default_value = "quay.io/openshift-logging/vector:latest"
    )]
    pub collector_image: String,

    /// Image of the log file metric exporter.
    #[arg(
        long,
        env = "RELATED_IMAGE_LOG_FILE_METRIC_EXPORTER",
        default_value = "quay.io/openshift-logging/log-file-metric-exporter:latest"
    )]
    pub exporter_image: String,

    /// Number of objects reconciled in parallel per resource kind.
    #[arg(long, env = "OPERATOR_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Seconds between refreshes of a reconciled forwarder. `0` disables periodic requeues.
    #[arg(long, env = "OPERATOR_REQUEUE_SECS", default_value_t = PERIODIC_REQUEUE.as_secs())]
    pub requeue_secs: u64,

    /// Minimum TLS version written into generated configs, e.g. `VersionTLS12`.
    #[arg(long, env = "TLS_MIN_VERSION")]
    pub tls_min_version: Option<String>,

    /// Comma separated cipher suites written into generated configs.
    #[arg(long, env = "TLS_CIPHERS", value_delimiter = ',')]
    pub tls_ciphers: Vec<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            watch_namespace: None,
            collector_image: settings.collector_image,
            exporter_image: settings.exporter_image,
            concurrency: 4,
            requeue_secs: PERIODIC_REQUEUE.as_secs(),
            tls_min_version: None,
            tls_ciphers: Vec::new(),
        }
    }
}

impl OperatorConfig {
    /// The per-reconcile settings this configuration describes.
    pub fn settings(&self) -> Settings {
        Settings {
            collector_image: self.collector_image.clone(),
            exporter_image: self.exporter_image.clone(),
            min_tls_version: self.tls_min_version.clone().filter(|v| !v.is_empty()),
            ciphers: self
                .tls_ciphers
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            periodic_requeue: (self.requeue_secs > 0).then(|| Duration::from_secs(self.requeue_secs)),
        }
    }
}
