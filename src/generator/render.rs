use std::collections::BTreeMap;

use serde::Serialize;
use snafu::{ResultExt, ensure};

use super::{
    DuplicateIdSnafu, GeneratorError, RenderSnafu,
    elements::{Element, Sink, Source, Transform},
};
use crate::api::constants::{DATA_DIR, SECRETS_MOUNT_DIR};

const EXPIRE_METRICS_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct SecretBackend {
    #[serde(rename = "type")]
    type_: &'static str,
    path: &'static str,
}

/// The full collector config.
///
/// Components are keyed by id, so the rendered text is ordered sources, transforms, sinks and
/// by id inside each table regardless of the order elements were produced in.
#[derive(Debug, Serialize)]
pub struct Document {
    expire_metrics_secs: i64,
    data_dir: &'static str,
    secret: BTreeMap<&'static str, SecretBackend>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    sources: BTreeMap<String, Source>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    transforms: BTreeMap<String, Transform>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    sinks: BTreeMap<String, Sink>,
}

impl Document {
    /// Collects `elements`. Ids must be unique across sources, transforms and sinks.
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Result<Self, GeneratorError> {
        let mut document = Self {
            expire_metrics_secs: EXPIRE_METRICS_SECS,
            data_dir: DATA_DIR,
            secret: BTreeMap::from([(
                "kubernetes_secret",
                SecretBackend {
                    type_: "directory",
                    path: SECRETS_MOUNT_DIR,
                },
            )]),
            sources: BTreeMap::new(),
            transforms: BTreeMap::new(),
            sinks: BTreeMap::new(),
        };
        for element in elements {
            ensure!(
                !document.contains(element.id()),
                DuplicateIdSnafu {
                    id: element.id().to_string()
                }
            );
            match element {
                Element::Source(source) => {
                    document.sources.insert(source.id.clone(), source);
                }
                Element::Transform(transform) => {
                    document.transforms.insert(transform.id.clone(), transform);
                }
                Element::Sink(sink) => {
                    document.sinks.insert(sink.id.clone(), sink);
                }
            }
        }
        Ok(document)
    }

    fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
            || self.transforms.contains_key(id)
            || self.sinks.contains_key(id)
    }

    pub fn render(&self) -> Result<String, GeneratorError> {
        toml::to_string(self).context(RenderSnafu)
    }
}

#[cfg(test)]
mod tests {
    use toml::Table;

    use super::*;

    #[test]
    fn components_are_keyed_by_id() {
        let document = Document::new([
            Sink::new("output_b", "blackhole", vec!["t".into()]).into(),
            Transform::remap("t", vec!["input_a".into()], ".x = 1").into(),
            Sink::new("output_a", "blackhole", vec!["t".into()]).into(),
            Source::new("input_a", "demo_logs").with("format", "json").into(),
        ])
        .unwrap();
        let text = document.render().unwrap();
        let parsed: Table = toml::from_str(&text).unwrap();

        assert_eq!(parsed["secret"]["kubernetes_secret"]["type"].as_str(), Some("directory"));
        assert_eq!(parsed["sources"]["input_a"]["type"].as_str(), Some("demo_logs"));
        assert_eq!(parsed["transforms"]["t"]["source"].as_str(), Some(".x = 1"));
        let sinks: Vec<&String> = parsed["sinks"].as_table().unwrap().keys().collect();
        assert_eq!(sinks, ["output_a", "output_b"]);
        assert!(text.find("[sinks.output_a]").unwrap() < text.find("[sinks.output_b]").unwrap());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let error = Document::new([
            Sink::new("output_my_out", "http", vec!["a".into()]).into(),
            Sink::new("output_my_out", "http", vec!["b".into()]).into(),
        ])
        .unwrap_err();
        assert!(matches!(error, GeneratorError::DuplicateId { ref id } if id == "output_my_out"));

        let error = Document::new([
            Transform::remap("pipeline_all", vec!["input_a".into()], ".x = 1").into(),
            Sink::new("pipeline_all", "blackhole", vec!["input_a".into()]).into(),
        ])
        .unwrap_err();
        assert!(matches!(error, GeneratorError::DuplicateId { .. }));
    }
}
