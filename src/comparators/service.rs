use k8s_openapi::{
    api::core::v1::Service,
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};

use super::{Comparison, Differ, metadata};
use crate::kubernetes::ServiceMonitor;

type PortIdentity = (Option<String>, i32, Option<String>);

fn target(port: Option<&IntOrString>) -> Option<String> {
    port.map(|port| match port {
        IntOrString::Int(number) => number.to_string(),
        IntOrString::String(name) => name.clone(),
    })
}

/// Compares labels, the serving certificate annotation, selector and ports. Cluster IPs and
/// other allocated fields are ignored.
pub fn service(current: &Service, desired: &Service) -> Comparison {
    let selector = |s: &Service| s.spec.as_ref().and_then(|s| s.selector.clone());
    let ports = |s: &Service| -> Vec<PortIdentity> {
        s.spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .map(|p| (p.name.clone(), p.port, target(p.target_port.as_ref())))
            .collect()
    };
    Differ::new()
        .nested("metadata", metadata(&current.metadata, &desired.metadata))
        .field("selector", &selector(current), &selector(desired))
        .field("ports", &ports(current), &ports(desired))
        .finish()
}

pub fn service_monitor(current: &ServiceMonitor, desired: &ServiceMonitor) -> Comparison {
    let labels = |s: &LabelSelector| s.match_labels.clone().unwrap_or_default();
    let expressions = |s: &LabelSelector| s.match_expressions.clone().unwrap_or_default();
    let (current_selector, desired_selector) = (&current.spec.selector, &desired.spec.selector);
    Differ::new()
        .nested("metadata", metadata(&current.metadata, &desired.metadata))
        .field("selector", &labels(current_selector), &labels(desired_selector))
        .field(
            "match expressions",
            &expressions(current_selector),
            &expressions(desired_selector),
        )
        .field("endpoints", &current.spec.endpoints, &desired.spec.endpoints)
        .field(
            "pod target labels",
            &current.spec.pod_target_labels,
            &desired.spec.pod_target_labels,
        )
        .field("job label", &current.spec.job_label, &desired.spec.job_label)
        .field(
            "namespace selector",
            &current.spec.namespace_selector,
            &desired.spec.namespace_selector,
        )
        .finish()
}
