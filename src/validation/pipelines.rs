use super::{Component, ValidationError, ValidationErrors};
use crate::api::{ClusterLogForwarderSpec, constants::OUTPUT_DEFAULT};

pub(super) fn validate(spec: &ClusterLogForwarderSpec, errors: &mut ValidationErrors) {
    if spec.pipelines.is_empty() {
        errors.push(ValidationError::new(
            Component::Spec,
            "",
            "at least one pipeline is required",
        ));
    }

    for (i, pipeline) in spec.pipelines.iter().enumerate() {
        let name = if pipeline.name.is_empty() {
            format!("pipeline_{i}_")
        } else {
            pipeline.name.clone()
        };
        let mut fail = |message: String| {
            errors.push(ValidationError::new(Component::Pipeline, &name, message));
        };

        if pipeline.input_refs.is_empty() {
            fail("inputRefs must not be empty".into());
        }
        if pipeline.output_refs.is_empty() {
            fail("outputRefs must not be empty".into());
        }
        for input in &pipeline.input_refs {
            if spec.input(input).is_none() {
                fail(format!("input {input:?} is not defined"));
            }
        }
        for output in &pipeline.output_refs {
            if output == OUTPUT_DEFAULT {
                if spec.managed_log_store.is_none() {
                    fail("output \"default\" requires a managed log store".into());
                }
            } else if spec.output(output).is_none() {
                fail(format!("output {output:?} is not defined"));
            }
        }
        for filter in &pipeline.filter_refs {
            if spec.filter(filter).is_none() {
                fail(format!("filter {filter:?} is not defined"));
            }
        }
        if pipeline
            .parse
            .as_deref()
            .is_some_and(|parse| parse != "json")
        {
            fail("parse only supports \"json\"".into());
        }
        for key in pipeline.labels.keys() {
            if key.is_empty() {
                fail("label keys must not be empty".into());
            }
        }
    }
}
