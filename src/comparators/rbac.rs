use k8s_openapi::api::{
    core::v1::ServiceAccount,
    rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject},
};

use super::{Comparison, Differ, metadata};

fn rules(
    differ: Differ,
    current: Option<&Vec<PolicyRule>>,
    desired: Option<&Vec<PolicyRule>>,
) -> Differ {
    differ.field(
        "rules",
        &current.cloned().unwrap_or_default(),
        &desired.cloned().unwrap_or_default(),
    )
}

fn binding(
    differ: Differ,
    (current_ref, current_subjects): (&RoleRef, Option<&Vec<Subject>>),
    (desired_ref, desired_subjects): (&RoleRef, Option<&Vec<Subject>>),
) -> Differ {
    differ.field("role ref", current_ref, desired_ref).field(
        "subjects",
        &current_subjects.cloned().unwrap_or_default(),
        &desired_subjects.cloned().unwrap_or_default(),
    )
}

pub fn role(current: &Role, desired: &Role) -> Comparison {
    rules(
        Differ::new().nested("metadata", metadata(&current.metadata, &desired.metadata)),
        current.rules.as_ref(),
        desired.rules.as_ref(),
    )
    .finish()
}

pub fn cluster_role(current: &ClusterRole, desired: &ClusterRole) -> Comparison {
    rules(
        Differ::new().nested("metadata", metadata(&current.metadata, &desired.metadata)),
        current.rules.as_ref(),
        desired.rules.as_ref(),
    )
    .finish()
}

pub fn role_binding(current: &RoleBinding, desired: &RoleBinding) -> Comparison {
    binding(
        Differ::new().nested("metadata", metadata(&current.metadata, &desired.metadata)),
        (&current.role_ref, current.subjects.as_ref()),
        (&desired.role_ref, desired.subjects.as_ref()),
    )
    .finish()
}

pub fn cluster_role_binding(current: &ClusterRoleBinding, desired: &ClusterRoleBinding) -> Comparison {
    binding(
        Differ::new().nested("metadata", metadata(&current.metadata, &desired.metadata)),
        (&current.role_ref, current.subjects.as_ref()),
        (&desired.role_ref, desired.subjects.as_ref()),
    )
    .finish()
}

/// Token and image pull secrets added by the cluster are not drift.
pub fn service_account(current: &ServiceAccount, desired: &ServiceAccount) -> Comparison {
    metadata(&current.metadata, &desired.metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_with(verbs: &[&str]) -> Role {
        Role {
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec!["security.openshift.io".into()]),
                verbs: verbs.iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn rule_changes_are_drift() {
        assert!(role(&role_with(&["use"]), &role_with(&["use"])).0);
        let (same, reason) = role(&role_with(&["use"]), &role_with(&["use", "get"]));
        assert!(!same);
        assert!(reason.starts_with("rules changed"), "{reason}");
    }

    #[test]
    fn subject_changes_are_drift() {
        let binding = |name: &str| ClusterRoleBinding {
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".into(),
                kind: "ClusterRole".into(),
                name: "reader".into(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".into(),
                name: name.into(),
                namespace: Some("ns".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(cluster_role_binding(&binding("a"), &binding("a")).0);
        let (same, reason) = cluster_role_binding(&binding("a"), &binding("b"));
        assert!(!same);
        assert!(reason.starts_with("subjects changed"), "{reason}");
    }
}
