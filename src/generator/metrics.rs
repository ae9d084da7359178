//! The collector's own metrics, exposed for scraping.

use super::elements::{Element, Sink, Source, Tls, Transform};
use crate::api::constants::{CONFIG_DIR, METRICS_PORT};

pub const INTERNAL_METRICS_ID: &str = "internal_metrics";
pub const ADD_NODENAME_ID: &str = "add_nodename_to_metric";
pub const PROMETHEUS_ID: &str = "prometheus_output";

pub fn elements() -> Vec<Element> {
    vec![
        Source::new(INTERNAL_METRICS_ID, "internal_metrics").into(),
        Transform::remap(
            ADD_NODENAME_ID,
            vec![INTERNAL_METRICS_ID.into()],
            r#".tags.hostname = get_env_var!("VECTOR_SELF_NODE_NAME")"#,
        )
        .into(),
        Sink {
            tls: Some(Tls {
                enabled: Some(true),
                key_file: Some(format!("{CONFIG_DIR}/metrics/tls.key")),
                crt_file: Some(format!("{CONFIG_DIR}/metrics/tls.crt")),
                ..Default::default()
            }),
            ..Sink::new(PROMETHEUS_ID, "prometheus_exporter", vec![ADD_NODENAME_ID.into()])
                .with("address", format!("[::]:{METRICS_PORT}"))
                .with("default_namespace", "collector")
        }
        .into(),
    ]
}
