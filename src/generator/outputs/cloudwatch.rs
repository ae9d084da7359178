use super::{Adapter, Context, json_encoding};
use crate::{
    api::Cloudwatch,
    generator::{
        GeneratorError,
        auth::aws_auth,
        elements::{Element, Sink, Transform, table},
        template::{field_reference, template_remap},
        tls::output_tls,
    },
};

const NORMALIZE_STREAMS: &str = r#".stream_name = "default"
if .log_type == "audit" {
  .stream_name = (string(.hostname) ?? "") + "." + (string(.log_source) ?? "")
} else if .log_source == "container" {
  .stream_name = (string(.kubernetes.namespace_name) ?? "") + "_" + (string(.kubernetes.pod_name) ?? "") + "_" + (string(.kubernetes.container_name) ?? "")
} else if .log_source == "node" {
  .stream_name = (string(.hostname) ?? "") + ".journal.system"
} else {
  .stream_name = (string(.hostname) ?? "") + "." + (string(.log_source) ?? .stream_name)
}"#;

impl Adapter for Cloudwatch {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let normalize = Transform::remap(
            cx.element_id("normalize_streams"),
            cx.inputs.clone(),
            NORMALIZE_STREAMS,
        );
        let group_name = template_remap(
            cx.element_id("group_name"),
            vec![normalize.id.clone()],
            &self.group_name,
            "group_name",
        );

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![group_name.id.clone()])
            .with("region", self.region.as_str())
            .with("group_name", field_reference("group_name"))
            .with("stream_name", "{{ stream_name }}")
            .with("healthcheck", table([("enabled", false.into())]))
            .encoding(json_encoding())
            .tunable();
        if let Some(url) = &self.url {
            sink.set("endpoint", url.as_str());
        }
        sink.auth = Some(aws_auth(&cx.id, &self.authentication));
        sink.tls = output_tls(cx.output, self.url.as_deref(), cx.options, false);

        Ok(vec![normalize.into(), group_name.into(), cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "aws_cloudwatch_logs"
    }
}
