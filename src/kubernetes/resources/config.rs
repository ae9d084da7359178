use std::collections::BTreeMap;

use k8s_openapi::{
    ByteString,
    api::core::v1::{ConfigMap, Secret},
};

use super::{Owner, ResourceNames, collector_labels};
use crate::{
    api::constants::{AWS_CREDENTIALS_KEY, CONFIG_KEY, LABEL_INJECT_TRUSTED_CA},
    secrets::Secrets,
};

/// Key under which an entry of a referenced output secret is bundled.
pub fn bundled_key(secret_name: &str, key: &str) -> String {
    format!("{secret_name}.{key}")
}

/// Secret mounted at the collector's config directory.
///
/// Besides the rendered config it mirrors the data of every referenced output secret,
/// one `<secret>.<key>` entry per key, so a change to any of them changes this object.
pub fn config_secret(
    owner: &Owner,
    names: &ResourceNames,
    config: &str,
    aws_credentials: Option<&str>,
    secrets: &Secrets,
) -> Secret {
    let mut data = BTreeMap::from([(
        CONFIG_KEY.to_string(),
        ByteString(config.as_bytes().to_vec()),
    )]);
    for name in secrets.names() {
        for (key, value) in secrets.data(name).into_iter().flatten() {
            data.insert(bundled_key(name, key), ByteString(value.clone()));
        }
    }
    if let Some(credentials) = aws_credentials {
        data.insert(
            AWS_CREDENTIALS_KEY.to_string(),
            ByteString(credentials.as_bytes().to_vec()),
        );
    }
    Secret {
        metadata: owner.child_meta(&names.config, collector_labels(names)),
        data: Some(data),
        type_: Some("Opaque".into()),
        ..Default::default()
    }
}

/// An empty config map the cluster fills with its trusted CA bundle.
pub fn trusted_ca_config_map(owner: &Owner, names: &ResourceNames) -> ConfigMap {
    let mut labels = collector_labels(names);
    labels.insert(LABEL_INJECT_TRUSTED_CA.into(), "true".into());
    ConfigMap {
        metadata: owner.child_meta(&names.trusted_ca, labels),
        ..Default::default()
    }
}
