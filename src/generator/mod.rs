//! Collector configuration generation.
//!
//! Turns a validated forwarder spec plus the loaded secret map into the TOML document the
//! collector reads. Generation is a pure function: the same spec and secrets always render the
//! same bytes, which keeps the config hash, and therefore the collector rollout, stable.

use md5::{Digest, Md5};
use snafu::Snafu;

use crate::{api::ClusterLogForwarder, secrets::Secrets};

pub mod auth;
pub mod elements;
mod filters;
pub mod ids;
mod inputs;
pub mod lokistack;
mod metrics;
mod options;
pub mod outputs;
mod pipelines;
mod render;
pub mod template;
pub mod tls;
pub mod tuning;

pub use elements::Element;
pub use options::Options;
pub use render::Document;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GeneratorError {
    #[snafu(display("output {}: no brokers configured and the URL has no host", output))]
    EmptyBrokers { output: String },

    #[snafu(display("output {}: missing {} settings", output, what))]
    MissingConfig { output: String, what: &'static str },

    #[snafu(display("unknown option annotation {}", key))]
    UnknownOption { key: String },

    #[snafu(display("output {}: invalid URL {:?}: {}", output, url, source))]
    InvalidUrl {
        output: String,
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("output {}: {:?} does not contain a role ARN", output, secret))]
    InvalidRoleArn { output: String, secret: String },

    #[snafu(display("output {}: invalid maxWrite: {}", output, source))]
    InvalidMaxWrite {
        output: String,
        source: crate::quantity::QuantityError,
    },

    #[snafu(display(
        "pipeline {} references the default output but no managed log store is configured",
        pipeline
    ))]
    MissingManagedStore { pipeline: String },

    #[snafu(display("{} {:?} is not defined", what, name))]
    Undefined { what: &'static str, name: String },

    #[snafu(display("output {}: {} outputs cannot be rendered for this collector", output, type_))]
    Unsupported { output: String, type_: &'static str },

    #[snafu(display("two components share the id {:?}", id))]
    DuplicateId { id: String },

    #[snafu(display("failed to render collector config: {}", source))]
    Render { source: toml::ser::Error },
}

impl GeneratorError {
    /// Errors caused by the forwarder spec rather than by the generator itself.
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, Self::Render { .. })
    }
}

/// Generates the collector config for `forwarder`.
pub fn generate(
    forwarder: &ClusterLogForwarder,
    secrets: &Secrets,
    options: &Options,
) -> Result<String, GeneratorError> {
    let namespace = forwarder.metadata.namespace.as_deref().unwrap_or_default();
    let spec = lokistack::migrate(&forwarder.spec, namespace)?;

    let mut elements = inputs::sources(&spec, namespace, options);
    elements.extend(pipelines::compose(&spec, secrets, options)?);
    elements.extend(metrics::elements());

    Document::new(elements)?.render()
}

/// Hex-encoded MD5 digest of the rendered config.
pub fn config_hash(config: &str) -> String {
    hex::encode(Md5::digest(config.as_bytes()))
}
