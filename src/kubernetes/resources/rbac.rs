//! Service account, token and role objects for the collector.
//!
//! Cluster-scoped roles and bindings cannot carry an owner reference to a namespaced forwarder,
//! so they are created without one and removed by the forwarder's finalizer.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        core::v1::{Secret, ServiceAccount},
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use super::{Owner, ResourceNames, collector_labels};
use crate::api::constants::{LABEL_MANAGED_BY, MANAGED_BY};

pub const METADATA_READER_ROLE: &str = "log-forwarder-metadata-reader";
pub const LOGS_WRITER_ROLE: &str = "logging-collector-logs-writer";
pub const LOGS_READER_ROLE: &str = "logging-application-logs-reader";
pub const LOGS_READER_BINDING: &str = "logging-all-authenticated-application-logs-reader";

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const LOKI_GROUP: &str = "loki.grafana.com";
const SCC_NAME: &str = "logging-scc";
const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Namespace labels that admit the collector's privileged pods.
pub const SECURITY_LABELS: [(&str, &str); 4] = [
    ("pod-security.kubernetes.io/enforce", "privileged"),
    ("pod-security.kubernetes.io/audit", "privileged"),
    ("pod-security.kubernetes.io/warn", "privileged"),
    ("security.openshift.io/scc.podSecurityLabelSync", "false"),
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rule(api_group: &str, resources: &[&str], names: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.into()]),
        resources: Some(strings(resources)),
        resource_names: (!names.is_empty()).then(|| strings(names)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

fn cluster_meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        labels: Some(BTreeMap::from([(LABEL_MANAGED_BY.into(), MANAGED_BY.into())])),
        ..Default::default()
    }
}

fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: cluster_meta(name),
        rules: Some(rules),
        ..Default::default()
    }
}

fn cluster_role_binding(name: &str, role: &str, subject: Subject) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: cluster_meta(name),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.into(),
            kind: "ClusterRole".into(),
            name: role.into(),
        },
        subjects: Some(vec![subject]),
    }
}

fn service_account_subject(names: &ResourceNames) -> Subject {
    Subject {
        kind: "ServiceAccount".into(),
        name: names.service_account.clone(),
        namespace: Some(names.namespace.clone()),
        ..Default::default()
    }
}

pub fn service_account(owner: &Owner, names: &ResourceNames) -> ServiceAccount {
    ServiceAccount {
        metadata: owner.child_meta(&names.service_account, collector_labels(names)),
        ..Default::default()
    }
}

/// Long-lived token of the collector's service account, filled in by the token controller.
pub fn token_secret(owner: &Owner, names: &ResourceNames) -> Secret {
    let mut metadata = owner.child_meta(&names.token_secret, collector_labels(names));
    metadata.annotations = Some(BTreeMap::from([(
        SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
        names.service_account.clone(),
    )]));
    Secret {
        metadata,
        type_: Some("kubernetes.io/service-account-token".into()),
        ..Default::default()
    }
}

/// Lets the collector's service account use the privileged security context constraint.
pub fn scc_role(owner: &Owner, names: &ResourceNames) -> Role {
    Role {
        metadata: owner.child_meta(&names.scc_role, collector_labels(names)),
        rules: Some(vec![rule(
            "security.openshift.io",
            &["securitycontextconstraints"],
            &[SCC_NAME],
            &["use"],
        )]),
    }
}

pub fn scc_role_binding(owner: &Owner, names: &ResourceNames) -> RoleBinding {
    RoleBinding {
        metadata: owner.child_meta(&names.scc_role, collector_labels(names)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.into(),
            kind: "Role".into(),
            name: names.scc_role.clone(),
        },
        subjects: Some(vec![service_account_subject(names)]),
    }
}

/// Binds the shared metadata reader role, which the operator ensures exists, to the collector.
pub fn metadata_reader_binding(names: &ResourceNames) -> (ClusterRole, ClusterRoleBinding) {
    let role = cluster_role(
        METADATA_READER_ROLE,
        vec![rule("", &["pods", "namespaces", "nodes"], &[], &["get", "list", "watch"])],
    );
    let binding = cluster_role_binding(
        &names.metadata_reader,
        METADATA_READER_ROLE,
        service_account_subject(names),
    );
    (role, binding)
}

pub fn logs_writer_role() -> ClusterRole {
    cluster_role(
        LOGS_WRITER_ROLE,
        vec![rule(
            LOKI_GROUP,
            &["application", "audit", "infrastructure"],
            &["logs"],
            &["create"],
        )],
    )
}

pub fn logs_writer_binding(names: &ResourceNames) -> ClusterRoleBinding {
    cluster_role_binding(
        &names.logs_writer,
        LOGS_WRITER_ROLE,
        service_account_subject(names),
    )
}

pub fn logs_reader_role() -> ClusterRole {
    cluster_role(
        LOGS_READER_ROLE,
        vec![rule(LOKI_GROUP, &["application"], &["logs"], &["get"])],
    )
}

/// Lets every authenticated user read application logs from the managed log store.
pub fn logs_reader_binding() -> ClusterRoleBinding {
    cluster_role_binding(
        LOGS_READER_BINDING,
        LOGS_READER_ROLE,
        Subject {
            api_group: Some(RBAC_GROUP.into()),
            kind: "Group".into(),
            name: "system:authenticated".into(),
            ..Default::default()
        },
    )
}
