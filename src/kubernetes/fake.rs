//! In-memory [`ClusterClient`] for reconcile tests.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use snafu::ResultExt;

use super::{ClientError, ClusterClient, ConvertSnafu, Managed, ObjectKey};

type Store = BTreeMap<(String, ObjectKey), Value>;

/// Stores objects as JSON and enforces resource versions the way the API server does.
#[derive(Default)]
pub struct FakeClient {
    objects: Mutex<Store>,
    writes: AtomicUsize,
    status_conflicts: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without counting it as a write.
    pub fn insert<K: Managed>(&self, object: &K) {
        let mut value = serde_json::to_value(object).expect("object serializes");
        set_resource_version(&mut value, 1);
        self.store()
            .insert((K::kind_name(), ObjectKey::of(object)), value);
    }

    /// Makes the next `count` status writes fail with a conflict.
    pub fn fail_status_writes(&self, count: usize) {
        self.status_conflicts.store(count, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Every stored object of kind `K`.
    pub fn list<K: Managed>(&self) -> Vec<K> {
        let kind = K::kind_name();
        self.store()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, value)| serde_json::from_value(value.clone()).expect("stored object parses"))
            .collect()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.objects.lock().expect("fake store lock poisoned")
    }

    fn to_value<K: Managed>(object: &K) -> Result<Value, ClientError> {
        serde_json::to_value(object).context(ConvertSnafu {
            kind: K::kind_name(),
        })
    }

    fn from_value<K: Managed>(value: Value) -> Result<K, ClientError> {
        serde_json::from_value(value).context(ConvertSnafu {
            kind: K::kind_name(),
        })
    }

    fn check_version(stored: &Value, incoming: &Value, key: &ObjectKey) -> Result<(), ClientError> {
        let incoming = resource_version(incoming);
        if incoming.is_some() && incoming != resource_version(stored) {
            return Err(ClientError::Conflict {
                message: format!("{key}: the object has been modified"),
            });
        }
        Ok(())
    }
}

fn resource_version(value: &Value) -> Option<u64> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .and_then(|v| v.parse().ok())
}

fn set_resource_version(value: &mut Value, version: u64) {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("resourceVersion".into(), Value::String(version.to_string()));
    }
}

#[async_trait]
impl ClusterClient for FakeClient {
    async fn get<K: Managed>(&self, key: &ObjectKey) -> Result<Option<K>, ClientError> {
        let value = self.store().get(&(K::kind_name(), key.clone())).cloned();
        value.map(Self::from_value).transpose()
    }

    async fn create<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let mut value = Self::to_value(object)?;
        let mut store = self.store();
        let slot = (K::kind_name(), key.clone());
        if store.contains_key(&slot) {
            return Err(ClientError::Conflict {
                message: format!("{key} already exists"),
            });
        }
        set_resource_version(&mut value, 1);
        store.insert(slot, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::from_value(value)
    }

    async fn replace<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let mut value = Self::to_value(object)?;
        let mut store = self.store();
        let slot = (K::kind_name(), key.clone());
        let Some(stored) = store.get(&slot) else {
            return Err(ClientError::NotFound {
                kind: K::kind_name(),
                name: key.to_string(),
            });
        };
        Self::check_version(stored, &value, &key)?;
        let next = resource_version(stored).unwrap_or_default() + 1;
        // Spec writes never touch the status subresource.
        if let Some(status) = stored.get("status").cloned() {
            value["status"] = status;
        } else if let Some(object) = value.as_object_mut() {
            object.remove("status");
        }
        set_resource_version(&mut value, next);
        store.insert(slot, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::from_value(value)
    }

    async fn replace_status<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let pending = self.status_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.status_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(ClientError::Conflict {
                message: format!("{key}: the object has been modified"),
            });
        }

        let value = Self::to_value(object)?;
        let mut store = self.store();
        let slot = (K::kind_name(), key.clone());
        let Some(stored) = store.get_mut(&slot) else {
            return Err(ClientError::NotFound {
                kind: K::kind_name(),
                name: key.to_string(),
            });
        };
        Self::check_version(stored, &value, &key)?;
        let next = resource_version(stored).unwrap_or_default() + 1;
        stored["status"] = value.get("status").cloned().unwrap_or(Value::Null);
        set_resource_version(stored, next);
        let updated = stored.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::from_value(updated)
    }

    async fn delete<K: Managed>(&self, key: &ObjectKey) -> Result<(), ClientError> {
        if self.store().remove(&(K::kind_name(), key.clone())).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
