use std::sync::LazyLock;

use regex::Regex;

use super::{Component, ValidationError, ValidationErrors};
use crate::api::{FilterSpec, FilterType};

static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\.[a-zA-Z0-9_]+|\."[^"]+")(\.[a-zA-Z0-9_]+|\."[^"]+")*$"#)
        .expect("field path regex is valid")
});

/// Fields every record must keep.
const REQUIRED_FIELDS: [&str; 3] = [".log_type", ".log_source", ".message"];

pub(crate) fn field_path_problem(path: &str) -> Option<String> {
    if !path.starts_with('.') {
        Some(format!("{path:?} must start with a '.'"))
    } else if !FIELD_PATH.is_match(path) {
        Some(format!(
            "{path:?} must be a dot delimited path such as .kubernetes.container_name or .kubernetes.\"test-foo\""
        ))
    } else {
        None
    }
}

pub(super) fn validate(filter: &FilterSpec, errors: &mut ValidationErrors) {
    let mut problems = Vec::new();

    let blocks = [
        (!filter.add_labels.is_empty(), FilterType::AddLabels),
        (!filter.drop.is_empty(), FilterType::Drop),
        (filter.kube_api_audit.is_some(), FilterType::KubeApiAudit),
        (filter.prune.is_some(), FilterType::Prune),
    ];
    for (_, other) in blocks.iter().filter(|(set, t)| *set && *t != filter.type_) {
        problems.push(format!(
            "{} filters may not set {}",
            filter.type_.as_str(),
            other.as_str()
        ));
    }

    match filter.type_ {
        FilterType::Drop => {
            if filter.drop.is_empty() {
                problems.push("drop filters must have at least one test".to_string());
            }
            for (i, test) in filter.drop.iter().enumerate() {
                if test.conditions.is_empty() {
                    problems.push(format!("test[{i}] must have at least one condition"));
                }
                for condition in &test.conditions {
                    if let Some(problem) = field_path_problem(&condition.field) {
                        problems.push(format!("test[{i}] {problem}"));
                    }
                    match (&condition.matches, &condition.not_matches) {
                        (Some(_), Some(_)) => problems.push(format!(
                            "test[{i}] only one of matches or notMatches can be set"
                        )),
                        (None, None) => problems.push(format!(
                            "test[{i}] one of matches or notMatches must be set"
                        )),
                        (Some(re), None) | (None, Some(re)) => {
                            if Regex::new(re).is_err() {
                                problems.push(format!(
                                    "test[{i}] {re:?} is not a valid regular expression"
                                ));
                            }
                        }
                    }
                }
            }
        }
        FilterType::Prune => match &filter.prune {
            Some(prune) if !prune.r#in.is_empty() || !prune.not_in.is_empty() => {
                for path in prune.r#in.iter().chain(&prune.not_in) {
                    problems.extend(field_path_problem(path));
                }
                let removed: Vec<&str> = REQUIRED_FIELDS
                    .into_iter()
                    .filter(|f| prune.r#in.iter().any(|p| p == f))
                    .collect();
                if !removed.is_empty() {
                    problems.push(format!(
                        "{removed:?} are required fields and must be removed from the `in` list"
                    ));
                }
                if !prune.not_in.is_empty() {
                    let missing: Vec<&str> = REQUIRED_FIELDS
                        .into_iter()
                        .filter(|f| !prune.not_in.iter().any(|p| p == f))
                        .collect();
                    if !missing.is_empty() {
                        problems.push(format!(
                            "{missing:?} are required fields and must be included in the `notIn` list"
                        ));
                    }
                }
            }
            _ => problems.push("prune filters must set one or both of `in` and `notIn`".to_string()),
        },
        FilterType::AddLabels => {
            if filter.add_labels.is_empty() {
                problems.push("addLabels filters must set at least one label".to_string());
            }
        }
        FilterType::KubeApiAudit | FilterType::DetectMultiline | FilterType::Parse => {}
    }

    for problem in problems {
        errors.push(ValidationError::new(Component::Filter, &filter.name, problem));
    }
}
