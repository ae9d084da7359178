use toml::{Table, Value};

use super::{Adapter, Context, json_encoding};
use crate::{
    api::Loki,
    generator::{
        GeneratorError,
        auth::http_auth,
        elements::{Element, Sink, table},
        ids::format_component_id,
        template::{field_reference, template_remap},
        tls::output_tls,
    },
};

const DEFAULT_LABEL_KEYS: [&str; 4] = [
    "log_type",
    "kubernetes.namespace_name",
    "kubernetes.pod_name",
    "kubernetes.container_name",
];
const HOST_LABEL: &str = "kubernetes_host";

/// Loki label name for a record path, e.g. `kubernetes.pod_name` becomes `k8s_pod_name`.
fn label_name(key: &str) -> String {
    let key = key.trim_start_matches('.');
    match key.strip_prefix("kubernetes.") {
        Some(rest) => format!("k8s_{}", format_component_id(rest)),
        None => format_component_id(key),
    }
}

impl Loki {
    fn labels(&self) -> Table {
        let mut labels: Table = if self.label_keys.is_empty() {
            DEFAULT_LABEL_KEYS
                .iter()
                .map(|key| (label_name(key), Value::String(format!("{{{{{key}}}}}"))))
                .collect()
        } else {
            self.label_keys
                .iter()
                .map(|key| {
                    let path = key.trim_start_matches('.');
                    (label_name(key), Value::String(format!("{{{{{path}}}}}")))
                })
                .collect()
        };
        labels.insert(
            HOST_LABEL.into(),
            Value::String("${VECTOR_SELF_NODE_NAME}".into()),
        );
        labels
    }
}

impl Adapter for Loki {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let mut elements = Vec::new();
        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), cx.inputs.clone())
            .with("endpoint", self.url.as_str())
            .with("out_of_order_action", "accept")
            .with("healthcheck", table([("enabled", false.into())]))
            .with("labels", self.labels())
            .encoding(json_encoding())
            .tunable();

        if let Some(template) = self.tenant_key.as_deref().filter(|t| !t.is_empty()) {
            let tenant = template_remap(cx.element_id("tenant"), cx.inputs.clone(), template, "tenant_id");
            sink.inputs = vec![tenant.id.clone()];
            sink.set("tenant_id", field_reference("tenant_id"));
            elements.push(tenant.into());
        }
        sink.auth = self
            .authentication
            .as_ref()
            .and_then(|auth| http_auth(auth, cx.options));
        sink.tls = output_tls(cx.output, Some(&self.url), cx.options, false);

        elements.push(cx.finish(sink));
        Ok(elements)
    }

    fn sink_type(&self) -> &'static str {
        "loki"
    }
}
