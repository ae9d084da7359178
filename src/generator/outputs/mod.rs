//! Output adapters.
//!
//! Every output settings block implements [`Adapter`], which turns it into the transforms and
//! the sink that deliver to that destination. [`dispatch`] picks the adapter for an output.

use snafu::OptionExt;
use toml::{Table, Value};
use tracing::debug;

use super::{
    GeneratorError, MissingConfigSnafu, Options, UnsupportedSnafu,
    auth::write_aws_credentials,
    elements::{Element, Sink, strings, table},
    ids::output_id,
    tuning::Strategy,
};
use crate::{
    api::{ClusterLogForwarderSpec, OutputConfig, OutputSpec, constants::DEBUG_OUTPUT_DIR},
    secrets::Secrets,
};

mod azure_monitor;
mod cloudwatch;
mod elasticsearch;
mod gcl;
mod http;
mod kafka;
mod loki;
mod otlp;
mod s3;
mod splunk;
mod syslog;

/// Field holding generated values that must not be shipped.
pub const INTERNAL_FIELD: &str = "_internal";

/// Everything an adapter needs to render one output.
pub struct Context<'a> {
    /// Component id of the sink, `output_<name>`.
    pub id: String,
    pub output: &'a OutputSpec,
    /// Ids the first generated element reads from.
    pub inputs: Vec<String>,
    pub secrets: &'a Secrets,
    pub strategy: &'a dyn Strategy,
    pub options: &'a Options,
}

impl Context<'_> {
    /// `<output id>_<suffix>`.
    pub fn element_id(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.id)
    }

    /// Applies tuning and returns the sink as an element.
    pub fn finish(&self, mut sink: Sink) -> Element {
        self.strategy.apply(&mut sink);
        sink.into()
    }
}

pub trait Adapter {
    /// Elements for the output, upstream transforms first and the sink last.
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError>;

    fn sink_type(&self) -> &'static str;
}

/// The adapter for `output`.
pub fn dispatch(output: &OutputSpec) -> Result<&dyn Adapter, GeneratorError> {
    let config = output.config().context(MissingConfigSnafu {
        output: output.name.as_str(),
        what: output.type_.as_str(),
    })?;
    let adapter: &dyn Adapter = match config {
        OutputConfig::AzureMonitor(c) => c,
        OutputConfig::Cloudwatch(c) => c,
        OutputConfig::Elasticsearch(c) => c,
        OutputConfig::GoogleCloudLogging(c) => c,
        OutputConfig::Http(c) => c,
        OutputConfig::Kafka(c) => c,
        OutputConfig::Loki(c) => c,
        OutputConfig::Otlp(c) => c,
        OutputConfig::S3(c) => c,
        OutputConfig::Splunk(c) => c,
        OutputConfig::Syslog(c) => c,
        OutputConfig::FluentdForward(_) | OutputConfig::LokiStack(_) => {
            return UnsupportedSnafu {
                output: output.name.as_str(),
                type_: output.type_.as_str(),
            }
            .fail();
        }
    };
    Ok(adapter)
}

/// Renders an output, swapping its sink for a local file when debugging.
pub fn elements(cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
    let adapter = dispatch(cx.output)?;
    debug!(
        message = "Rendering output.",
        output = %cx.output.name,
        sink = adapter.sink_type(),
        debug = cx.options.debug,
    );
    let mut elements = adapter.adapt(cx)?;
    if cx.options.debug {
        for element in &mut elements {
            if let Element::Sink(sink) = element {
                let debug = debug_sink(sink);
                *element = debug.into();
            }
        }
    }
    Ok(elements)
}

fn debug_sink(sink: &Sink) -> Sink {
    Sink::new(sink.id.as_str(), "file", sink.inputs.clone())
        .with("path", format!("{DEBUG_OUTPUT_DIR}/{}.log", sink.id))
        .encoding(json_encoding())
}

/// Encoding for sinks that ship records as JSON.
pub fn json_encoding() -> Table {
    table([
        ("codec", "json".into()),
        ("except_fields", strings(&[INTERNAL_FIELD])),
    ])
}

/// Encoding for a sink with the given codec that drops generated fields.
pub fn encoding(codec: &str) -> Table {
    table([
        ("codec", Value::String(codec.to_string())),
        ("except_fields", strings(&[INTERNAL_FIELD])),
    ])
}

/// The shared AWS credentials file for every web identity output of `spec`.
///
/// `None` when no output needs one.
pub fn aws_credentials(
    spec: &ClusterLogForwarderSpec,
    secrets: &Secrets,
) -> Result<Option<String>, GeneratorError> {
    let mut credentials = String::new();
    for output in &spec.outputs {
        let auth = match output.config() {
            Some(OutputConfig::Cloudwatch(c)) => &c.authentication,
            Some(OutputConfig::S3(c)) => &c.authentication,
            _ => continue,
        };
        write_aws_credentials(&mut credentials, &output_id(&output.name), auth, secrets)?;
    }
    Ok((!credentials.is_empty()).then_some(credentials))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        api::{FluentdForward, Http, OutputType},
        generator::tuning::OutputTuning,
    };

    /// Runs the adapter of `output` with no tuning and default options.
    pub(crate) fn adapt(output: &OutputSpec, secrets: &Secrets) -> Vec<Element> {
        let tuning = OutputTuning::new(output).unwrap();
        let options = Options::default();
        let cx = Context {
            id: output_id(&output.name),
            output,
            inputs: vec!["pipeline_p".into()],
            secrets,
            strategy: &tuning,
            options: &options,
        };
        elements(&cx).unwrap()
    }

    /// The element rendered as a TOML table.
    pub(crate) fn render(elements: &[Element], id: &str) -> Table {
        let element = elements.iter().find(|e| e.id() == id).unwrap();
        let text = match element {
            Element::Source(s) => toml::to_string(s),
            Element::Transform(t) => toml::to_string(t),
            Element::Sink(s) => toml::to_string(s),
        }
        .unwrap();
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn fluentd_forward_is_unsupported() {
        let mut output = OutputSpec::new("fwd", OutputType::FluentdForward);
        output.fluentd_forward = Some(FluentdForward {
            url: "tcp://fluentd:24224".into(),
        });
        assert!(matches!(
            dispatch(&output),
            Err(GeneratorError::Unsupported { .. })
        ));
    }

    #[test]
    fn debug_replaces_sink_with_file() {
        let mut output = OutputSpec::new("web", OutputType::Http);
        output.http = Some(Http {
            url: "https://logs.example.com".into(),
            method: None,
            headers: Default::default(),
            timeout: None,
            proxy_url: None,
            authentication: None,
            tuning: None,
        });
        let tuning = OutputTuning::default();
        let options = Options {
            debug: true,
            ..Default::default()
        };
        let secrets = Secrets::new();
        let cx = Context {
            id: "output_web".into(),
            output: &output,
            inputs: vec!["pipeline_p".into()],
            secrets: &secrets,
            strategy: &tuning,
            options: &options,
        };
        let elements = elements(&cx).unwrap();
        let sink = render(&elements, "output_web");
        assert_eq!(sink["type"].as_str(), Some("file"));
        assert_eq!(
            sink["path"].as_str(),
            Some("/var/log/collector/debug/output_web.log")
        );
        assert_eq!(sink["inputs"].as_array().unwrap().len(), 1);
    }
}
