//! Desired state of every object the operator derives from a forwarder or exporter.
//!
//! Builders here are pure: they take the owning resource plus whatever the reconcile engine
//! computed (config text, hash, secret names) and return the object to create or compare.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::api::{
    ClusterLogForwarder,
    constants::{
        COMPONENT_COLLECTOR, LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME,
        LABEL_PART_OF, MANAGED_BY, PART_OF,
    },
};

mod collector;
mod config;
mod exporter;
mod monitoring;
mod rbac;
mod visualization;

pub use collector::{COLLECTOR_REPLICAS, Workload, collector_pod_spec, daemon_set, deployment};
pub use config::{config_secret, trusted_ca_config_map};
pub use exporter::{
    EXPORTER_NAME, EXPORTER_NAMESPACE, exporter_daemon_set, exporter_service,
    exporter_service_account, exporter_service_monitor,
};
pub use monitoring::{
    Endpoint, NamespaceSelector, RelabelConfig, SERVING_CERT_ANNOTATION, ServiceMonitor,
    ServiceMonitorSpec, TlsConfig, metrics_service, receiver_service, service_monitor,
};
pub use rbac::{
    LOGS_READER_BINDING, LOGS_READER_ROLE, LOGS_WRITER_ROLE, METADATA_READER_ROLE,
    SECURITY_LABELS, logs_reader_binding, logs_reader_role, logs_writer_binding, logs_writer_role,
    metadata_reader_binding, scc_role, scc_role_binding, service_account, token_secret,
};
pub use visualization::{Kibana, KibanaSpec, ProxySpec as KibanaProxySpec};

/// The object that owns what a builder produces.
#[derive(Clone, Debug, PartialEq)]
pub struct Owner {
    pub namespace: String,
    pub name: String,
    pub reference: OwnerReference,
}

impl Owner {
    /// `None` when the object has not been persisted yet (no name, namespace or uid).
    pub fn of<K: Resource<DynamicType = ()>>(object: &K) -> Option<Self> {
        Some(Self {
            namespace: object.meta().namespace.clone()?,
            name: object.meta().name.clone()?,
            reference: object.controller_owner_ref(&())?,
        })
    }

    /// Metadata for a namespaced child with the given name and labels.
    pub fn child_meta(&self, name: impl Into<String>, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![self.reference.clone()]),
            ..Default::default()
        }
    }
}

/// Names of the objects derived from one forwarder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    pub namespace: String,
    /// Workload, metrics service and service monitor.
    pub common: String,
    pub config: String,
    pub metrics_secret: String,
    pub trusted_ca: String,
    pub service_account: String,
    pub token_secret: String,
    pub scc_role: String,
    /// Cluster role binding granting pod and namespace metadata.
    pub metadata_reader: String,
    /// Cluster role binding granting writes to the managed log store.
    pub logs_writer: String,
}

impl ResourceNames {
    pub fn new(forwarder: &ClusterLogForwarder) -> Self {
        let namespace = forwarder.metadata.namespace.clone().unwrap_or_default();
        let name = forwarder.metadata.name.clone().unwrap_or_default();
        let service_account = match forwarder.spec.service_account.name.as_str() {
            "" => name.clone(),
            account => account.to_string(),
        };
        Self {
            config: format!("{name}-config"),
            metrics_secret: format!("{name}-metrics"),
            trusted_ca: format!("{name}-trustbundle"),
            token_secret: forwarder.token_secret_name(),
            scc_role: format!("{name}-scc"),
            metadata_reader: Self::metadata_reader_binding(&namespace, &name),
            logs_writer: Self::logs_writer_binding(&namespace, &name),
            service_account,
            common: name,
            namespace,
        }
    }

    /// Cluster-scoped names only depend on the forwarder's key, so they can be derived after the
    /// forwarder is gone.
    pub fn metadata_reader_binding(namespace: &str, name: &str) -> String {
        format!("{namespace}-{name}-metadata-reader")
    }

    pub fn logs_writer_binding(namespace: &str, name: &str) -> String {
        format!("{namespace}-{name}-logs-writer")
    }

    /// Service exposing the receiver input `input`, also the name of its serving certificate.
    pub fn receiver(&self, input: &str) -> String {
        format!("{}-{input}", self.common)
    }
}

/// Labels carried by every object of a component instance.
pub fn common_labels(app: &str, component: &str, instance: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(component, instance);
    labels.insert(LABEL_NAME.into(), app.into());
    labels.insert(LABEL_MANAGED_BY.into(), MANAGED_BY.into());
    labels.insert(LABEL_PART_OF.into(), PART_OF.into());
    labels
}

/// The subset of [`common_labels`] that selects pods.
pub fn selector_labels(component: &str, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
    ])
}

pub fn collector_labels(names: &ResourceNames) -> BTreeMap<String, String> {
    common_labels(COLLECTOR_APP, COMPONENT_COLLECTOR, &names.common)
}

/// Value of `app.kubernetes.io/name` on collector objects.
pub const COLLECTOR_APP: &str = "vector";

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn forwarder(name: &str, service_account: &str) -> ClusterLogForwarder {
        let mut forwarder = ClusterLogForwarder::new(name, Default::default());
        forwarder.metadata.namespace = Some("openshift-logging".into());
        forwarder.metadata.uid = Some("0f1e2d3c".into());
        forwarder.spec.service_account.name = service_account.into();
        forwarder
    }

    #[test]
    fn names_derive_from_the_forwarder() {
        let names = ResourceNames::new(&forwarder("audit-logs", "logcollector"));
        assert_eq!(names.common, "audit-logs");
        assert_eq!(names.config, "audit-logs-config");
        assert_eq!(names.trusted_ca, "audit-logs-trustbundle");
        assert_eq!(names.service_account, "logcollector");
        assert_eq!(names.token_secret, "audit-logs-token");
        assert_eq!(names.metadata_reader, "openshift-logging-audit-logs-metadata-reader");
        assert_eq!(names.receiver("http-audit"), "audit-logs-http-audit");
    }

    #[test]
    fn service_account_defaults_to_forwarder_name() {
        let names = ResourceNames::new(&forwarder("collector", ""));
        assert_eq!(names.service_account, "collector");
    }

    #[test]
    fn owner_reference_points_at_the_forwarder() {
        let owner = Owner::of(&forwarder("collector", "collector")).unwrap();
        assert_eq!(owner.reference.kind, "ClusterLogForwarder");
        assert_eq!(owner.reference.uid, "0f1e2d3c");
        assert_eq!(owner.reference.controller, Some(true));

        let meta = owner.child_meta("collector-config", BTreeMap::new());
        assert_eq!(meta.namespace.as_deref(), Some("openshift-logging"));
        assert_eq!(meta.owner_references.unwrap().len(), 1);

        let unsaved = ClusterLogForwarder::new("collector", Default::default());
        assert!(Owner::of(&unsaved).is_none());
    }
}
