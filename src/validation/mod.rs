//! Rejects ill-formed forwarder specs before any cluster write happens.
//!
//! Validation only consults the forwarder and the loaded secret map; it never touches the
//! network.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::{
    api::{
        ClusterLogForwarder,
        constants::{ANNOTATION_OLD_REMOTE_SYSLOG, OUTPUT_DEFAULT, RESERVED_INPUT_NAMES},
    },
    generator::{Options, ids::format_component_id},
    secrets::Secrets,
};

mod filters;
mod inputs;
mod outputs;
mod pipelines;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Component {
    Spec,
    Input,
    Output,
    Filter,
    Pipeline,
}

impl Component {
    const fn list(self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Input => "spec.inputs",
            Self::Output => "spec.outputs",
            Self::Filter => "spec.filters",
            Self::Pipeline => "spec.pipelines",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub component: Component,
    /// Name of the offending list entry; empty for spec-level errors.
    pub name: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(component: Component, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn path(&self) -> String {
        if self.name.is_empty() {
            self.component.list().to_string()
        } else {
            format!("{}[{}]", self.component.list(), self.name)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path(), self.message)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Messages reported against one named list entry.
    pub fn messages_for(&self, component: Component, name: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.component == component && e.name == name)
            .map(|e| e.message.as_str())
            .collect()
    }

    fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Names declared more than once, in first-duplicate order.
fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.contains(&name) {
            dups.push(name);
        }
    }
    dups
}

/// Distinct names that normalize to the component id of an earlier name, paired with that name.
fn id_collisions<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<(&'a str, &'a str)> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    let mut collisions = Vec::new();
    for name in names {
        match seen.get(&format_component_id(name)) {
            Some(first) if *first != name => collisions.push((name, *first)),
            Some(_) => {}
            None => {
                seen.insert(format_component_id(name), name);
            }
        }
    }
    collisions
}

fn push_id_collisions<'a>(
    component: Component,
    names: impl IntoIterator<Item = &'a str>,
    errors: &mut ValidationErrors,
) {
    for (name, first) in id_collisions(names) {
        errors.push(ValidationError::new(
            component,
            name,
            format!("name maps to the same component id as {first:?}"),
        ));
    }
}

/// Checks the whole forwarder spec, collecting every problem rather than stopping at the first.
pub fn validate(forwarder: &ClusterLogForwarder, secrets: &Secrets) -> Result<(), ValidationErrors> {
    let spec = &forwarder.spec;
    let mut errors = ValidationErrors::default();

    if spec.service_account.name.is_empty() {
        errors.push(ValidationError::new(
            Component::Spec,
            "",
            "serviceAccount.name must be set",
        ));
    }
    if forwarder.annotation(ANNOTATION_OLD_REMOTE_SYSLOG).is_some() {
        errors.push(ValidationError::new(
            Component::Spec,
            "",
            format!("annotation {ANNOTATION_OLD_REMOTE_SYSLOG} is no longer supported"),
        ));
    }
    let options = match Options::from_annotations(forwarder.metadata.annotations.as_ref()) {
        Ok(options) => options,
        Err(error) => {
            errors.push(ValidationError::new(Component::Spec, "", error.to_string()));
            Options::default()
        }
    };

    for name in duplicates(spec.inputs.iter().map(|i| i.name.as_str())) {
        errors.push(ValidationError::new(
            Component::Input,
            name,
            "input names must be unique",
        ));
    }
    for name in duplicates(spec.outputs.iter().map(|o| o.name.as_str())) {
        errors.push(ValidationError::new(
            Component::Output,
            name,
            "output names must be unique",
        ));
    }
    for name in duplicates(spec.filters.iter().map(|f| f.name.as_str())) {
        errors.push(ValidationError::new(
            Component::Filter,
            name,
            "filter names must be unique",
        ));
    }
    for name in duplicates(
        spec.pipelines
            .iter()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty()),
    ) {
        errors.push(ValidationError::new(
            Component::Pipeline,
            name,
            "pipeline names must be unique",
        ));
    }
    push_id_collisions(
        Component::Input,
        spec.inputs.iter().map(|i| i.name.as_str()),
        &mut errors,
    );
    push_id_collisions(
        Component::Output,
        spec.outputs.iter().map(|o| o.name.as_str()),
        &mut errors,
    );
    push_id_collisions(
        Component::Filter,
        spec.filters.iter().map(|f| f.name.as_str()),
        &mut errors,
    );
    push_id_collisions(
        Component::Pipeline,
        spec.pipelines
            .iter()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty()),
        &mut errors,
    );

    for input in &spec.inputs {
        if RESERVED_INPUT_NAMES.contains(&input.name.as_str()) {
            errors.push(ValidationError::new(
                Component::Input,
                &input.name,
                "input name is reserved",
            ));
        }
        inputs::validate(input, secrets, &mut errors);
    }
    for output in &spec.outputs {
        if output.name == OUTPUT_DEFAULT {
            errors.push(ValidationError::new(
                Component::Output,
                &output.name,
                "output name is reserved",
            ));
        }
        outputs::validate(output, secrets, &options, &mut errors);
    }
    for filter in &spec.filters {
        filters::validate(filter, &mut errors);
    }
    pipelines::validate(spec, &mut errors);

    errors.into_result()
}
