use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Owner, ResourceNames, collector_labels, selector_labels};
use crate::api::{
    ReceiverSpec,
    constants::{COMPONENT_COLLECTOR, LABEL_COMPONENT, METRICS_PORT, METRICS_PORT_NAME},
};

/// Makes the cluster's service CA issue a serving certificate into the named secret.
pub const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";
const PROMETHEUS_CA_FILE: &str = "/etc/prometheus/configmaps/serving-certs-ca-bundle/service-ca.crt";

/// The subset of the Prometheus operator's `ServiceMonitor` the operator writes.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "ServiceMonitor",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_label: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    pub selector: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_target_labels: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metric_relabelings: Vec<RelabelConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelabelConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,
}

/// Rewrites one hyphen in a metric name to an underscore. Prometheus applies metric relabelings
/// in order, so the rule is repeated to cover names with several hyphens.
fn hyphen_relabelings() -> Vec<RelabelConfig> {
    let rule = RelabelConfig {
        source_labels: vec!["__name__".into()],
        regex: Some("(.*)-(.*)".into()),
        target_label: Some("__name__".into()),
        replacement: Some("${1}_${2}".into()),
        action: Some("replace".into()),
    };
    vec![rule; 3]
}

/// A `ClusterIP` service whose only port is `name` → `port`, annotated so the service CA issues
/// a serving certificate into `cert_secret`.
pub(super) fn tls_service(
    owner: &Owner,
    name: &str,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
    port_name: &str,
    port: i32,
    cert_secret: &str,
) -> Service {
    let mut metadata = owner.child_meta(name, labels);
    metadata.annotations = Some(BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        cert_secret.to_string(),
    )]));
    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some(port_name.into()),
                port,
                target_port: Some(IntOrString::String(port_name.into())),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A monitor scraping `port_name` over TLS on services labelled `selector`.
pub(super) fn tls_service_monitor(
    owner: &Owner,
    name: &str,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
    port_name: &str,
) -> ServiceMonitor {
    let mut monitor = ServiceMonitor::new(
        name,
        ServiceMonitorSpec {
            job_label: Some(LABEL_COMPONENT.into()),
            endpoints: vec![Endpoint {
                port: Some(port_name.into()),
                path: Some("/metrics".into()),
                scheme: Some("https".into()),
                tls_config: Some(TlsConfig {
                    ca_file: Some(PROMETHEUS_CA_FILE.into()),
                    server_name: Some(format!("{name}.{}.svc", owner.namespace)),
                }),
                metric_relabelings: hyphen_relabelings(),
            }],
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            namespace_selector: Some(NamespaceSelector {
                match_names: vec![owner.namespace.clone()],
            }),
            pod_target_labels: vec![LABEL_COMPONENT.into()],
        },
    );
    monitor.metadata = owner.child_meta(name, labels);
    monitor
}

/// Service in front of the collector's metrics port.
pub fn metrics_service(owner: &Owner, names: &ResourceNames) -> Service {
    tls_service(
        owner,
        &names.common,
        collector_labels(names),
        selector_labels(COMPONENT_COLLECTOR, &names.common),
        METRICS_PORT_NAME,
        METRICS_PORT,
        &names.metrics_secret,
    )
}

pub fn service_monitor(owner: &Owner, names: &ResourceNames) -> ServiceMonitor {
    tls_service_monitor(
        owner,
        &names.common,
        collector_labels(names),
        selector_labels(COMPONENT_COLLECTOR, &names.common),
        METRICS_PORT_NAME,
    )
}

/// Service exposing a receiver input. Its serving certificate is the receiver's default TLS
/// material.
pub fn receiver_service(
    owner: &Owner,
    names: &ResourceNames,
    input: &str,
    receiver: &ReceiverSpec,
) -> Service {
    let name = names.receiver(input);
    tls_service(
        owner,
        &name,
        collector_labels(names),
        selector_labels(COMPONENT_COLLECTOR, &names.common),
        &receiver_port_name(input),
        receiver.port,
        &name,
    )
}

/// Container port names are limited to 15 characters.
pub(super) fn receiver_port_name(input: &str) -> String {
    let mut name: String = format!("rcv-{input}").chars().take(15).collect();
    while name.ends_with('-') {
        name.pop();
    }
    name
}
