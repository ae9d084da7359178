use super::{Adapter, Context, json_encoding};
use crate::{
    api::Splunk,
    generator::{
        GeneratorError,
        elements::{Element, Sink, Transform},
        template::{field_reference, template_remap},
        tls::output_tls,
    },
    secrets::secret_reference,
};

const TIMESTAMP: &str = r#"if exists(.@timestamp) {
  ts, err = parse_timestamp(.@timestamp, format: "%+")
  if err == null {
    .timestamp = ts
    del(.@timestamp)
  }
}"#;

impl Adapter for Splunk {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let timestamp = Transform::remap(cx.element_id("timestamp"), cx.inputs.clone(), TIMESTAMP);
        let mut elements = vec![];
        let mut upstream = vec![timestamp.id.clone()];
        elements.push(timestamp.into());

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![])
            .with("endpoint", self.url.as_str())
            .with("default_token", secret_reference(&self.authentication.token))
            .with("timestamp_key", "timestamp")
            .encoding(json_encoding())
            .tunable();
        if let Some(template) = &self.index {
            let index = template_remap(cx.element_id("index"), upstream, template, "splunk_index");
            upstream = vec![index.id.clone()];
            elements.push(index.into());
            sink.set("index", field_reference("splunk_index"));
        }
        sink.inputs = upstream;
        sink.tls = output_tls(cx.output, Some(&self.url), cx.options, false);

        elements.push(cx.finish(sink));
        Ok(elements)
    }

    fn sink_type(&self) -> &'static str {
        "splunk_hec_logs"
    }
}
