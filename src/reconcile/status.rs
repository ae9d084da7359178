use std::collections::BTreeMap;

use crate::{
    api::{
        ClusterLogForwarder, ClusterLogForwarderStatus, Condition, ConditionStatus,
        conditions::{
            REASON_MANAGEMENT_UNMANAGED, REASON_MISSING_RESOURCE, REASON_RECONCILE_FAILURE,
            REASON_RECONCILE_SUCCESS, REASON_VALIDATION_FAILURE, REASON_VALIDATION_SUCCESS,
            TYPE_DEGRADED, TYPE_INVALID, TYPE_READY,
        },
    },
    error::{Error, ErrorKind},
    validation::{Component, ValidationErrors},
};

/// How far the reconcile got.
#[derive(Clone, Copy, Debug)]
pub(super) enum Progress<'a> {
    Invalid(&'a ValidationErrors),
    /// The spec was valid but converging the derived objects failed.
    Failed(&'a Error),
    Complete,
}

fn component_conditions<'a>(
    names: impl Iterator<Item = &'a str>,
    component: Component,
    errors: Option<&ValidationErrors>,
) -> BTreeMap<String, Vec<Condition>> {
    names
        .map(|name| {
            let messages = errors
                .map(|e| e.messages_for(component, name))
                .unwrap_or_default();
            let condition = if messages.is_empty() {
                Condition::new(TYPE_READY, true, REASON_VALIDATION_SUCCESS, "")
            } else {
                Condition::new(
                    TYPE_READY,
                    false,
                    REASON_VALIDATION_FAILURE,
                    messages.join("; "),
                )
            };
            (name.to_string(), vec![condition])
        })
        .collect()
}

/// The status a forwarder should carry after a reconcile that reached `progress`.
///
/// `Ready` holds exactly when every input, output, filter and pipeline is ready and the derived
/// objects converged. `Degraded` holds when only some of them are, or when converging failed.
pub(super) fn forwarder_status(
    forwarder: &ClusterLogForwarder,
    progress: Progress<'_>,
) -> ClusterLogForwarderStatus {
    let spec = &forwarder.spec;
    let errors = match progress {
        Progress::Invalid(errors) => Some(errors),
        _ => None,
    };
    let mut status = ClusterLogForwarderStatus {
        conditions: Vec::new(),
        inputs: component_conditions(
            spec.inputs.iter().map(|i| i.name.as_str()),
            Component::Input,
            errors,
        ),
        outputs: component_conditions(
            spec.outputs.iter().map(|o| o.name.as_str()),
            Component::Output,
            errors,
        ),
        filters: component_conditions(
            spec.filters.iter().map(|f| f.name.as_str()),
            Component::Filter,
            errors,
        ),
        pipelines: component_conditions(
            spec.pipelines.iter().map(|p| p.name.as_str()),
            Component::Pipeline,
            errors,
        ),
    };

    let components: Vec<bool> = [
        &status.inputs,
        &status.outputs,
        &status.filters,
        &status.pipelines,
    ]
    .into_iter()
    .flat_map(|map| map.values())
    .map(|conditions| conditions.iter().all(Condition::is_true))
    .collect();
    let some_ready = components.iter().any(|ready| *ready);
    let some_not_ready = components.iter().any(|ready| !ready);

    status.conditions = match progress {
        Progress::Invalid(errors) => vec![
            Condition::new(TYPE_INVALID, true, REASON_VALIDATION_FAILURE, errors.to_string()),
            Condition::new(
                TYPE_READY,
                false,
                REASON_VALIDATION_FAILURE,
                "one or more of inputs, outputs, filters or pipelines failed validation",
            ),
            Condition::new(
                TYPE_DEGRADED,
                some_ready && some_not_ready,
                REASON_VALIDATION_FAILURE,
                "",
            ),
        ],
        Progress::Failed(error) => {
            let reason = if error.kind() == ErrorKind::NotFound {
                REASON_MISSING_RESOURCE
            } else {
                REASON_RECONCILE_FAILURE
            };
            vec![
                Condition::new(TYPE_INVALID, false, REASON_VALIDATION_SUCCESS, ""),
                Condition::new(TYPE_READY, false, reason, error.to_string()),
                Condition::new(TYPE_DEGRADED, true, reason, error.to_string()),
            ]
        }
        Progress::Complete => vec![
            Condition::new(TYPE_INVALID, false, REASON_VALIDATION_SUCCESS, ""),
            Condition::new(TYPE_READY, true, REASON_RECONCILE_SUCCESS, ""),
            Condition::new(TYPE_DEGRADED, false, REASON_RECONCILE_SUCCESS, ""),
        ],
    };
    status
}

/// The previous status with `Ready` replaced by an unknown, unmanaged condition.
pub(super) fn unmanaged_status(forwarder: &ClusterLogForwarder) -> ClusterLogForwarderStatus {
    let mut status = forwarder.status.clone().unwrap_or_default();
    status.conditions.retain(|c| c.type_ != TYPE_READY);
    status.conditions.push(Condition {
        status: ConditionStatus::Unknown,
        ..Condition::new(
            TYPE_READY,
            false,
            REASON_MANAGEMENT_UNMANAGED,
            "updates are ignored while managementState is Unmanaged",
        )
    });
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::conditions::find_condition,
        kubernetes::ClientError,
        validation::ValidationError,
    };

    fn forwarder() -> ClusterLogForwarder {
        serde_yaml::from_str(
            r#"
apiVersion: observability.openshift.io/v1
kind: ClusterLogForwarder
metadata:
  name: collector
  namespace: openshift-logging
spec:
  serviceAccount:
    name: collector
  outputs:
    - name: good
      type: syslog
      syslog:
        url: tcp://a:514
    - name: bad
      type: syslog
      syslog:
        url: ftp://b
  pipelines:
    - name: all
      inputRefs: [application]
      outputRefs: [good, bad]
"#,
        )
        .unwrap()
    }

    fn state(status: &ClusterLogForwarderStatus, type_: &str) -> ConditionStatus {
        find_condition(&status.conditions, type_).unwrap().status
    }

    #[test]
    fn complete_reconcile_is_ready() {
        let status = forwarder_status(&forwarder(), Progress::Complete);
        assert_eq!(state(&status, TYPE_READY), ConditionStatus::True);
        assert_eq!(state(&status, TYPE_DEGRADED), ConditionStatus::False);
        assert_eq!(state(&status, TYPE_INVALID), ConditionStatus::False);
        assert!(status.outputs["bad"][0].is_true());
    }

    #[test]
    fn partial_validation_failure_is_degraded() {
        let errors = ValidationErrors::from(ValidationError::new(
            Component::Output,
            "bad",
            "unsupported URL scheme ftp",
        ));
        let status = forwarder_status(&forwarder(), Progress::Invalid(&errors));
        assert_eq!(state(&status, TYPE_INVALID), ConditionStatus::True);
        assert_eq!(state(&status, TYPE_READY), ConditionStatus::False);
        assert_eq!(state(&status, TYPE_DEGRADED), ConditionStatus::True);
        assert_eq!(status.outputs["bad"][0].message, "unsupported URL scheme ftp");
        assert!(status.outputs["good"][0].is_true());
    }

    #[test]
    fn missing_resource_failure() {
        let error = Error::Client {
            action: "reconcile",
            object: "Secret openshift-logging/x".into(),
            source: ClientError::NotFound {
                kind: "Secret".into(),
                name: "x".into(),
            },
        };
        let status = forwarder_status(&forwarder(), Progress::Failed(&error));
        let ready = find_condition(&status.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.reason, REASON_MISSING_RESOURCE);
        assert_eq!(state(&status, TYPE_DEGRADED), ConditionStatus::True);
    }

    #[test]
    fn unmanaged_keeps_other_conditions() {
        let mut clf = forwarder();
        clf.status = Some(forwarder_status(&clf, Progress::Complete));
        let status = unmanaged_status(&clf);
        let ready = find_condition(&status.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.reason, REASON_MANAGEMENT_UNMANAGED);
        assert_eq!(state(&status, TYPE_INVALID), ConditionStatus::False);
        assert_eq!(status.conditions.len(), 3);
    }
}
