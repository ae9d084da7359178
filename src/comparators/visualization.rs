use super::{
    Comparison, Differ,
    workload::{resources, toleration_set},
};
use crate::kubernetes::Kibana;

/// Compares the fields the operator sets on the visualization add-on. Resources are compared as
/// quantities and tolerations without regard to order.
pub fn kibana(current: &Kibana, desired: &Kibana) -> Comparison {
    let (current, desired) = (&current.spec, &desired.spec);
    Differ::new()
        .field(
            "management state",
            &current.management_state,
            &desired.management_state,
        )
        .field("replicas", &current.replicas, &desired.replicas)
        .field(
            "node selector",
            &current.node_selector.clone().unwrap_or_default(),
            &desired.node_selector.clone().unwrap_or_default(),
        )
        .field(
            "tolerations",
            &toleration_set(current.tolerations.as_deref()),
            &toleration_set(desired.tolerations.as_deref()),
        )
        .with(|| resources(current.resources.as_ref(), desired.resources.as_ref()))
        .with(|| {
            resources(
                current.proxy.resources.as_ref(),
                desired.proxy.resources.as_ref(),
            )
            .map(|reason| format!("proxy {reason}"))
        })
        .finish()
}
