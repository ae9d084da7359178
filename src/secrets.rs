use std::collections::BTreeMap;

use k8s_openapi::{ByteString, api::core::v1::Secret};

use crate::api::{
    SecretKey,
    constants::{CONFIGMAPS_MOUNT_DIR, SECRETS_MOUNT_DIR},
};

/// Secret material referenced by a forwarder, loaded once per reconcile.
///
/// Keyed by secret name, then by data key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Secrets {
    inner: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: BTreeMap<String, Vec<u8>>) {
        self.inner.insert(name.into(), data);
    }

    /// Adds a cluster secret. Later inserts of the same name win.
    pub fn insert_secret(&mut self, secret: &Secret) {
        let Some(name) = secret.metadata.name.clone() else {
            return;
        };
        let mut data: BTreeMap<String, Vec<u8>> = secret
            .data
            .iter()
            .flatten()
            .map(|(k, ByteString(v))| (k.clone(), v.clone()))
            .collect();
        for (k, v) in secret.string_data.iter().flatten() {
            data.insert(k.clone(), v.clone().into_bytes());
        }
        self.insert(name, data);
    }

    pub fn contains_secret(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn get(&self, key: &SecretKey) -> Option<&[u8]> {
        self.inner
            .get(&key.secret_name)
            .and_then(|data| data.get(&key.key))
            .map(Vec::as_slice)
    }

    pub fn has(&self, key: &SecretKey) -> bool {
        self.get(key).is_some()
    }

    /// The value as UTF-8 text with surrounding whitespace removed.
    pub fn get_string(&self, key: &SecretKey) -> Option<String> {
        self.get(key)
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(|v| v.trim().to_string())
    }

    /// True when the secret exists and its key is set to `true`.
    pub fn flag(&self, secret_name: &str, key: &str) -> bool {
        self.get(&SecretKey::new(secret_name, key))
            .is_some_and(|v| v.eq_ignore_ascii_case(b"true"))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn data(&self, name: &str) -> Option<&BTreeMap<String, Vec<u8>>> {
        self.inner.get(name)
    }
}

/// Where the collector finds a secret key on disk.
pub fn secret_path(secret_name: &str, key: &str) -> String {
    format!("{SECRETS_MOUNT_DIR}/{secret_name}/{key}")
}

pub fn config_map_path(config_map_name: &str, key: &str) -> String {
    format!("{CONFIGMAPS_MOUNT_DIR}/{config_map_name}/{key}")
}

/// Reference the collector resolves through its `directory` secret backend.
pub fn secret_reference(key: &SecretKey) -> String {
    format!("SECRET[kubernetes_secret.{}/{}]", key.secret_name, key.key)
}
