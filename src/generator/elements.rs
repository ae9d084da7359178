//! Typed collector config components.
//!
//! Each component serializes the way the collector reads it back: `type`, `inputs`, the
//! component-specific options, then nested blocks. Blocks left at their default are omitted.

use std::collections::BTreeMap;

use serde::Serialize;
use toml::{Table, Value};

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

fn is_empty_block<T: Default + PartialEq>(block: &Option<T>) -> bool {
    block.as_ref().is_none_or(is_default)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Source {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(flatten)]
    pub options: Table,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

impl Source {
    pub fn new(id: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            options: Table::new(),
            tls: None,
        }
    }

    pub fn tls(mut self, tls: Tls) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transform {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub inputs: Vec<String>,
    #[serde(flatten)]
    pub options: Table,
}

impl Transform {
    pub fn new(id: impl Into<String>, type_: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            inputs,
            options: Table::new(),
        }
    }

    /// A `remap` transform running `source`.
    pub fn remap(id: impl Into<String>, inputs: Vec<String>, source: impl Into<String>) -> Self {
        Self::new(id, "remap", inputs).with("source", source.into())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Acknowledgements {
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Batch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_events: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Buffer {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when_full: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_initial_backoff_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_max_duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Tls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciphersuites: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_certificate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_hostname: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crt_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pass: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Proxy {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub no_proxy: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sink {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub inputs: Vec<String>,
    #[serde(flatten)]
    pub options: Table,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledgements: Option<Acknowledgements>,
    #[serde(skip_serializing_if = "is_empty_block")]
    pub batch: Option<Batch>,
    #[serde(skip_serializing_if = "is_empty_block")]
    pub buffer: Option<Buffer>,
    #[serde(skip_serializing_if = "is_empty_block")]
    pub request: Option<Request>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,
}

impl Sink {
    pub fn new(id: impl Into<String>, type_: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            inputs,
            options: Table::new(),
            compression: None,
            encoding: None,
            acknowledgements: None,
            batch: None,
            buffer: None,
            request: None,
            tls: None,
            auth: None,
            proxy: None,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.options.insert(key.to_string(), value.into());
    }

    pub fn encoding(mut self, encoding: Table) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Opens the batch, buffer and request blocks so that tuning can fill them in.
    pub fn tunable(mut self) -> Self {
        self.batch.get_or_insert_with(Batch::default);
        self.buffer.get_or_insert_with(Buffer::default);
        self.request.get_or_insert_with(Request::default);
        self
    }

    pub fn request_mut(&mut self) -> &mut Request {
        self.request.get_or_insert_with(Request::default)
    }

    pub fn batch_mut(&mut self) -> &mut Batch {
        self.batch.get_or_insert_with(Batch::default)
    }
}

/// One named configuration fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Source(Source),
    Transform(Transform),
    Sink(Sink),
}

impl Element {
    pub fn id(&self) -> &str {
        match self {
            Self::Source(s) => &s.id,
            Self::Transform(t) => &t.id,
            Self::Sink(s) => &s.id,
        }
    }
}

impl From<Source> for Element {
    fn from(source: Source) -> Self {
        Self::Source(source)
    }
}

impl From<Transform> for Element {
    fn from(transform: Transform) -> Self {
        Self::Transform(transform)
    }
}

impl From<Sink> for Element {
    fn from(sink: Sink) -> Self {
        Self::Sink(sink)
    }
}

/// Builds a TOML table from key/value pairs.
pub fn table<const N: usize>(entries: [(&str, Value); N]) -> Table {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// `["a", "b"]` as a TOML array.
pub fn strings<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blocks_are_omitted() {
        let sink = Sink::new("out", "http", vec!["in".into()])
            .with("uri", "https://example.com")
            .tunable();
        let text = toml::to_string(&sink).unwrap();
        let parsed: Table = toml::from_str(&text).unwrap();
        assert_eq!(parsed["type"].as_str(), Some("http"));
        assert_eq!(parsed["uri"].as_str(), Some("https://example.com"));
        assert!(!parsed.contains_key("batch"));
        assert!(!parsed.contains_key("buffer"));
        assert!(!parsed.contains_key("request"));
    }

    #[test]
    fn nested_blocks_follow_options() {
        let mut sink = Sink::new("out", "http", vec!["in".into()])
            .encoding(table([("codec", "json".into())]));
        sink.request_mut().timeout_secs = Some(10);
        let text = toml::to_string(&sink).unwrap();
        let parsed: Table = toml::from_str(&text).unwrap();
        assert_eq!(parsed["encoding"]["codec"].as_str(), Some("json"));
        assert_eq!(parsed["request"]["timeout_secs"].as_integer(), Some(10));
    }
}
