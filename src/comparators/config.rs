use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};

use super::{Comparison, Differ, metadata, missing_entries};

/// Compares data, and labels and annotations when `with_metadata` is set.
pub fn config_map(current: &ConfigMap, desired: &ConfigMap, with_metadata: bool) -> Comparison {
    let differ = Differ::new().field(
        "data",
        &current.data.clone().unwrap_or_default(),
        &desired.data.clone().unwrap_or_default(),
    );
    if with_metadata {
        differ
            .nested("metadata", metadata(&current.metadata, &desired.metadata))
            .finish()
    } else {
        differ.finish()
    }
}

/// Compares only labels and owners: the data of an injected config map belongs to whoever
/// injects it.
pub fn config_map_labels(current: &ConfigMap, desired: &ConfigMap) -> Comparison {
    metadata(&current.metadata, &desired.metadata)
}

/// Compares type and metadata, and data when the desired secret carries any.
///
/// Secrets whose data is filled in by the cluster, such as service account tokens, are built
/// without data.
pub fn secret(current: &Secret, desired: &Secret) -> Comparison {
    let differ = Differ::new()
        .field("type", &current.type_, &desired.type_)
        .nested("metadata", metadata(&current.metadata, &desired.metadata));
    match &desired.data {
        Some(data) => differ
            .with(|| {
                let current = current.data.clone().unwrap_or_default();
                let changed: Vec<&str> = data
                    .keys()
                    .chain(current.keys())
                    .filter(|key| current.get(*key) != data.get(*key))
                    .map(String::as_str)
                    .collect();
                changed
                    .first()
                    .map(|key| format!("data key {key:?} changed"))
            })
            .finish(),
        None => differ.finish(),
    }
}

/// Only the desired labels matter: the namespace itself is not owned by the operator.
pub fn namespace_labels(current: &Namespace, desired: &Namespace) -> Comparison {
    Differ::new()
        .with(|| {
            missing_entries(
                "label",
                current.metadata.labels.as_ref(),
                desired.metadata.labels.as_ref(),
            )
        })
        .finish()
}
