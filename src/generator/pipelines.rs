//! Wires inputs through filters into outputs.
//!
//! Every pipeline starts with a remap named after it (`pipeline_<name>`) that merges the
//! pipeline labels and snapshots the record into `._internal` for output templates. Filters
//! follow in reference order. Each output then reads from the last element of every pipeline
//! that references it, through a throttle when the output is rate limited.

use indexmap::IndexMap;
use snafu::OptionExt;
use tracing::debug;

use super::{
    GeneratorError, Options, UndefinedSnafu,
    elements::{Element, Transform},
    filters::{self, detect_multiline, merge_labels, parse_json},
    ids::{filter_id, input_id, output_id, pipeline_id, with_suffix},
    outputs::{self, Context, INTERNAL_FIELD},
    tuning::OutputTuning,
};
use crate::{
    api::{ClusterLogForwarderSpec, OutputSpec, PipelineSpec},
    secrets::Secrets,
};

const PARSE_JSON: &str = "json";

pub(super) fn compose(
    spec: &ClusterLogForwarderSpec,
    secrets: &Secrets,
    options: &Options,
) -> Result<Vec<Element>, GeneratorError> {
    let mut elements = Vec::new();
    let mut routes: IndexMap<&str, Vec<String>> = IndexMap::new();

    for pipeline in &spec.pipelines {
        let tail = pipeline_elements(spec, pipeline, &mut elements)?;
        for output in &pipeline.output_refs {
            let inputs = routes.entry(output.as_str()).or_default();
            if !inputs.contains(&tail) {
                inputs.push(tail.clone());
            }
        }
    }

    for name in routes.keys() {
        spec.output(name).context(UndefinedSnafu {
            what: "output",
            name: *name,
        })?;
    }

    for output in &spec.outputs {
        let Some(inputs) = routes.get(output.name.as_str()) else {
            debug!(message = "Skipping unreferenced output.", output = %output.name);
            continue;
        };
        elements.extend(output_elements(output, inputs.clone(), secrets, options)?);
    }
    Ok(elements)
}

/// Appends the elements of `pipeline` and returns the id outputs read from.
fn pipeline_elements(
    spec: &ClusterLogForwarderSpec,
    pipeline: &PipelineSpec,
    elements: &mut Vec<Element>,
) -> Result<String, GeneratorError> {
    let mut inputs = Vec::with_capacity(pipeline.input_refs.len());
    for name in &pipeline.input_refs {
        spec.input(name).context(UndefinedSnafu {
            what: "input",
            name: name.as_str(),
        })?;
        inputs.push(input_id(name));
    }

    let head = Transform::remap(pipeline_id(&pipeline.name), inputs, pipeline_source(pipeline));
    let mut tail = head.id.clone();
    elements.push(head.into());

    if pipeline.detect_multiline_errors {
        let transform = detect_multiline(
            filter_id(&pipeline.name, "detect_exceptions"),
            vec![tail.clone()],
        );
        tail = transform.id.clone();
        elements.push(transform.into());
    }

    for name in &pipeline.filter_refs {
        let filter = spec.filter(name).context(UndefinedSnafu {
            what: "filter",
            name: name.as_str(),
        })?;
        let transform = filters::transform(filter_id(&pipeline.name, name), vec![tail], filter);
        tail = transform.id.clone();
        elements.push(transform.into());
    }

    if pipeline.parse.as_deref() == Some(PARSE_JSON) {
        let transform = parse_json(filter_id(&pipeline.name, "parse_json"), vec![tail]);
        tail = transform.id.clone();
        elements.push(transform.into());
    }

    Ok(tail)
}

fn pipeline_source(pipeline: &PipelineSpec) -> String {
    let mut lines = Vec::new();
    if pipeline.labels.is_empty() {
        lines.push(
            ".openshift.sequence = to_unix_timestamp(now(), unit: \"nanoseconds\")".to_string(),
        );
    } else {
        lines.push(merge_labels(&pipeline.labels));
    }
    lines.push(format!("del(.{INTERNAL_FIELD})"));
    lines.push(format!(".{INTERNAL_FIELD} = ."));
    lines.join("\n")
}

fn output_elements(
    output: &OutputSpec,
    mut inputs: Vec<String>,
    secrets: &Secrets,
    options: &Options,
) -> Result<Vec<Element>, GeneratorError> {
    let id = output_id(&output.name);
    let tuning = OutputTuning::new(output)?;
    let mut elements = Vec::new();

    if let Some(limit) = output.max_records_per_second() {
        let throttle = Transform::new(with_suffix(&id, "throttle"), "throttle", inputs)
            .with("window_secs", 1)
            .with("threshold", limit);
        inputs = vec![throttle.id.clone()];
        elements.push(throttle.into());
    }

    let cx = Context {
        id,
        output,
        inputs,
        secrets,
        strategy: &tuning,
        options,
    };
    elements.extend(outputs::elements(&cx)?);
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::api::{FilterSpec, FilterType, Http, OutputType};

    fn http(name: &str) -> OutputSpec {
        let mut output = OutputSpec::new(name, OutputType::Http);
        output.http = Some(Http {
            url: "http://collector.example.com".into(),
            method: None,
            headers: Default::default(),
            timeout: None,
            proxy_url: None,
            authentication: None,
            tuning: None,
        });
        output
    }

    fn pipeline(name: &str, inputs: &[&str], outputs: &[&str], filters: &[&str]) -> PipelineSpec {
        PipelineSpec {
            name: name.into(),
            input_refs: inputs.iter().map(|s| s.to_string()).collect(),
            output_refs: outputs.iter().map(|s| s.to_string()).collect(),
            filter_refs: filters.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn inputs_of<'a>(elements: &'a [Element], id: &str) -> &'a [String] {
        match elements.iter().find(|e| e.id() == id).unwrap() {
            Element::Transform(t) => &t.inputs,
            Element::Sink(s) => &s.inputs,
            Element::Source(_) => &[],
        }
    }

    #[test]
    fn outputs_read_from_pipeline_tails() {
        let spec = ClusterLogForwarderSpec {
            outputs: vec![http("web")],
            filters: vec![FilterSpec::new("no-debug", FilterType::Drop)],
            pipelines: vec![
                pipeline("plain", &["application"], &["web"], &[]),
                pipeline("filtered", &["audit"], &["web"], &["no-debug"]),
            ],
            ..Default::default()
        };
        let elements = compose(&spec, &Secrets::new(), &Options::default()).unwrap();

        assert_eq!(inputs_of(&elements, "pipeline_plain"), ["input_application"]);
        assert_eq!(inputs_of(&elements, "pipeline_filtered_no_debug"), ["pipeline_filtered"]);
        assert_eq!(
            inputs_of(&elements, "output_web"),
            ["pipeline_plain", "pipeline_filtered_no_debug"]
        );
    }

    #[test]
    fn multiline_and_parse_wrap_filters() {
        let mut p = pipeline("p", &["application"], &["web"], &[]);
        p.detect_multiline_errors = true;
        p.parse = Some("json".into());
        p.labels = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let spec = ClusterLogForwarderSpec {
            outputs: vec![http("web")],
            pipelines: vec![p],
            ..Default::default()
        };
        let elements = compose(&spec, &Secrets::new(), &Options::default()).unwrap();

        let Element::Transform(head) = &elements[0] else {
            panic!("pipeline must start with its remap");
        };
        let source = head.options["source"].as_str().unwrap();
        assert!(source.starts_with(r#".openshift.labels = merge(object(.openshift.labels) ?? {}, {"env": "prod"})"#));
        assert!(source.ends_with("._internal = ."));
        assert_eq!(inputs_of(&elements, "pipeline_p_detect_exceptions"), ["pipeline_p"]);
        assert_eq!(
            inputs_of(&elements, "pipeline_p_parse_json"),
            ["pipeline_p_detect_exceptions"]
        );
        assert_eq!(inputs_of(&elements, "output_web"), ["pipeline_p_parse_json"]);
    }

    #[test]
    fn undefined_references() {
        let spec = ClusterLogForwarderSpec {
            pipelines: vec![pipeline("p", &["application"], &["missing"], &[])],
            ..Default::default()
        };
        assert!(matches!(
            compose(&spec, &Secrets::new(), &Options::default()),
            Err(GeneratorError::Undefined { what: "output", .. })
        ));

        let spec = ClusterLogForwarderSpec {
            outputs: vec![http("web")],
            pipelines: vec![pipeline("p", &["application"], &["web"], &["nope"])],
            ..Default::default()
        };
        assert!(matches!(
            compose(&spec, &Secrets::new(), &Options::default()),
            Err(GeneratorError::Undefined { what: "filter", .. })
        ));

        let spec = ClusterLogForwarderSpec {
            outputs: vec![http("web")],
            pipelines: vec![pipeline("p", &["my-app"], &["web"], &[])],
            ..Default::default()
        };
        assert!(matches!(
            compose(&spec, &Secrets::new(), &Options::default()),
            Err(GeneratorError::Undefined { what: "input", .. })
        ));
    }

    #[test]
    fn unreferenced_outputs_are_skipped() {
        let spec = ClusterLogForwarderSpec {
            outputs: vec![http("web"), http("unused")],
            pipelines: vec![pipeline("p", &["application"], &["web"], &[])],
            ..Default::default()
        };
        let elements = compose(&spec, &Secrets::new(), &Options::default()).unwrap();
        assert!(elements.iter().all(|e| e.id() != "output_unused"));
    }
}
