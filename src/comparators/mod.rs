//! Semantic drift detection between an object read from the cluster and the object the operator
//! wants.
//!
//! The API server defaults many fields the operator never sets, so whole-object equality would
//! report drift on every reconcile. Each comparator looks only at the fields the operator owns
//! and reports the first difference it finds as a human-readable reason.

use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

mod config;
mod rbac;
mod service;
mod visualization;
mod workload;

pub use config::{config_map, config_map_labels, namespace_labels, secret};
pub use rbac::{cluster_role, cluster_role_binding, role, role_binding, service_account};
pub use service::{service, service_monitor};
pub use visualization::kibana;
pub use workload::{daemon_set, deployment, pod_template};

/// The result of a comparison: `(same, reason)`, with an empty reason when nothing drifted.
pub type Comparison = (bool, String);

/// Accumulates the first difference between two objects.
#[derive(Debug, Default)]
pub(crate) struct Differ {
    reason: Option<String>,
}

impl Differ {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a drift in `what` when `current != desired`.
    pub(crate) fn field<T: PartialEq + Debug + ?Sized>(
        mut self,
        what: &str,
        current: &T,
        desired: &T,
    ) -> Self {
        if self.reason.is_none() && current != desired {
            self.reason = Some(format!("{what} changed: {current:?} -> {desired:?}"));
        }
        self
    }

    /// Records `reason` when `check` finds a difference. Skipped once a drift is known.
    pub(crate) fn with(mut self, check: impl FnOnce() -> Option<String>) -> Self {
        if self.reason.is_none() {
            self.reason = check();
        }
        self
    }

    /// Includes the nested comparison's reason, prefixed with `what`.
    pub(crate) fn nested(self, what: &str, (same, reason): Comparison) -> Self {
        self.with(|| (!same).then(|| format!("{what}: {reason}")))
    }

    pub(crate) fn finish(self) -> Comparison {
        match self.reason {
            Some(reason) => (false, reason),
            None => (true, String::new()),
        }
    }
}

/// `Some(reason)` when `current` lacks an entry of `desired` or holds a different value.
///
/// Extra entries in `current` are ignored: other controllers are free to add labels and
/// annotations.
pub(crate) fn missing_entries(
    what: &str,
    current: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> Option<String> {
    let current = current.cloned().unwrap_or_default();
    desired
        .into_iter()
        .flatten()
        .find(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| format!("{what} {key:?} is not {value:?}"))
}

fn owner_identity(reference: &OwnerReference) -> (&str, &str, &str, Option<bool>) {
    (
        &reference.kind,
        &reference.name,
        &reference.uid,
        reference.controller,
    )
}

/// Compares labels, annotations and owner references of two objects.
pub(crate) fn metadata(current: &ObjectMeta, desired: &ObjectMeta) -> Comparison {
    let owners = |meta: &ObjectMeta| {
        let mut owners: Vec<_> = meta
            .owner_references
            .iter()
            .flatten()
            .map(owner_identity)
            .map(|(kind, name, uid, controller)| {
                (kind.to_string(), name.to_string(), uid.to_string(), controller)
            })
            .collect();
        owners.sort();
        owners
    };
    Differ::new()
        .with(|| missing_entries("label", current.labels.as_ref(), desired.labels.as_ref()))
        .with(|| {
            missing_entries(
                "annotation",
                current.annotations.as_ref(),
                desired.annotations.as_ref(),
            )
        })
        .field("owner references", &owners(current), &owners(desired))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn first_difference_wins() {
        let (same, reason) = Differ::new()
            .field("image", "a", "a")
            .field("replicas", &1, &2)
            .field("name", "x", "y")
            .finish();
        assert!(!same);
        assert_eq!(reason, "replicas changed: 1 -> 2");

        assert_eq!(Differ::new().field("image", "a", "a").finish(), (true, String::new()));
    }

    #[test]
    fn extra_labels_are_not_drift() {
        let current = labels(&[("a", "1"), ("added-by-cluster", "yes")]);
        assert_eq!(missing_entries("label", Some(&current), Some(&labels(&[("a", "1")]))), None);
        assert_eq!(
            missing_entries("label", Some(&current), Some(&labels(&[("a", "2")]))).as_deref(),
            Some(r#"label "a" is not "2""#)
        );
        assert!(missing_entries("label", None, Some(&labels(&[("a", "1")]))).is_some());
        assert_eq!(missing_entries("label", None, None), None);
    }
}
