use super::{Adapter, Context, json_encoding};
use crate::{
    api::Otlp,
    generator::{
        GeneratorError,
        auth::http_auth,
        elements::{Element, Sink, Transform, table},
        tls::output_tls,
    },
};

/// Reshapes a record into one OTLP `ResourceLogs` entry.
const RESOURCE_LOGS: &str = r#"resource = [
  {"key": "k8s.namespace.name", "value": {"stringValue": to_string(.kubernetes.namespace_name) ?? ""}},
  {"key": "k8s.pod.name", "value": {"stringValue": to_string(.kubernetes.pod_name) ?? ""}},
  {"key": "k8s.container.name", "value": {"stringValue": to_string(.kubernetes.container_name) ?? ""}},
  {"key": "k8s.node.name", "value": {"stringValue": to_string(.hostname) ?? ""}},
  {"key": "openshift.log.type", "value": {"stringValue": to_string(.log_type) ?? ""}},
  {"key": "openshift.log.source", "value": {"stringValue": to_string(.log_source) ?? ""}}
]
record = {
  "timeUnixNano": to_string(to_unix_timestamp(timestamp(.timestamp) ?? now(), unit: "nanoseconds")),
  "severityText": to_string(.level) ?? "default",
  "body": {"stringValue": to_string(.message) ?? encode_json(.)}
}
. = {"resource": {"attributes": resource}, "scopeLogs": [{"logRecords": [record]}]}"#;

impl Adapter for Otlp {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let resource_logs = Transform::remap(
            cx.element_id("resource_logs"),
            cx.inputs.clone(),
            RESOURCE_LOGS,
        );

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![resource_logs.id.clone()])
            .with(
                "protocol",
                table([
                    ("type", "http".into()),
                    ("uri", self.url.as_str().into()),
                    ("method", "post".into()),
                    ("encoding", json_encoding().into()),
                    ("payload_prefix", "{\"resourceLogs\":".into()),
                    ("payload_suffix", "}".into()),
                ]),
            )
            .tunable();
        sink.auth = self
            .authentication
            .as_ref()
            .and_then(|auth| http_auth(auth, cx.options));
        sink.tls = output_tls(cx.output, Some(&self.url), cx.options, false);

        Ok(vec![resource_logs.into(), cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "opentelemetry"
    }
}
