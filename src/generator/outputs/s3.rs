use super::{Adapter, Context, json_encoding};
use crate::{
    api::S3,
    generator::{
        GeneratorError,
        auth::aws_auth,
        elements::{Element, Sink, table},
        template::{field_reference, template_remap},
        tls::output_tls,
    },
};

/// Object keys default to one prefix per tenant and day.
const DEFAULT_KEY_PREFIX: &str = "{.log_type||\"unknown\"}/{@timestamp|date}/";

impl Adapter for S3 {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let key_prefix = template_remap(
            cx.element_id("key_prefix"),
            cx.inputs.clone(),
            self.key_prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX),
            "key_prefix",
        );

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![key_prefix.id.clone()])
            .with("region", self.region.as_str())
            .with("bucket", self.bucket.as_str())
            .with("key_prefix", field_reference("key_prefix"))
            .with("filename_time_format", "%s")
            .with("healthcheck", table([("enabled", false.into())]))
            .encoding(json_encoding())
            .tunable();
        if let Some(url) = &self.url {
            sink.set("endpoint", url.as_str());
        }
        sink.auth = Some(aws_auth(&cx.id, &self.authentication));
        sink.tls = output_tls(cx.output, self.url.as_deref(), cx.options, false);

        Ok(vec![key_prefix.into(), cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "aws_s3"
    }
}
