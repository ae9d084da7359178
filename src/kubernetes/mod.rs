//! Access to the cluster API.
//!
//! The reconcile engine talks to the cluster only through [`ClusterClient`], so that the same
//! reconcile code runs against the real API server ([`KubeClient`]) and against an in-memory
//! store in tests.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount},
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
};
use kube::{Api, Client, Resource};
use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

use crate::{
    api::{ClusterLogForwarder, LogFileMetricExporter},
    error::ErrorKind,
};

mod client;
#[cfg(test)]
pub mod fake;
pub mod resources;
mod retry;

pub use client::KubeClient;
pub use resources::{Kibana, KibanaProxySpec, KibanaSpec, ServiceMonitor};
pub use retry::{CONFLICT_RETRIES, retry_on_conflict};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("conflict: {}", message))]
    Conflict { message: String },

    #[snafu(display("{} {} not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("cluster API request failed: {}", source))]
    Api { source: kube::Error },

    #[snafu(display("failed to convert {}: {}", kind, source))]
    Convert {
        kind: String,
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Maps API server status codes onto the variants the reconcile engine distinguishes.
    pub fn from_kube(error: kube::Error, kind: &str, name: &str) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 409 => Self::Conflict {
                message: response.message,
            },
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            source => Self::Api { source },
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Api { .. } => ErrorKind::Transient,
            Self::Convert { .. } => ErrorKind::Fatal,
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Identifies one object: `namespace` is `None` for cluster-scoped kinds.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object.
    pub fn of<K: Resource>(object: &K) -> Self {
        Self {
            namespace: object.meta().namespace.clone(),
            name: object.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A kind the operator reads or writes.
pub trait Managed:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The API handle for objects of this kind in `namespace`.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }
}

macro_rules! namespaced {
    ($($kind:ty),+ $(,)?) => {
        $(impl Managed for $kind {
            fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
                match namespace {
                    Some(namespace) => Api::namespaced(client, namespace),
                    None => Api::all(client),
                }
            }
        })+
    };
}

macro_rules! cluster_scoped {
    ($($kind:ty),+ $(,)?) => {
        $(impl Managed for $kind {
            fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
                Api::all(client)
            }
        })+
    };
}

namespaced!(
    ClusterLogForwarder,
    LogFileMetricExporter,
    ConfigMap,
    DaemonSet,
    Deployment,
    Role,
    RoleBinding,
    Secret,
    Service,
    ServiceAccount,
    ServiceMonitor,
);
cluster_scoped!(ClusterRole, ClusterRoleBinding, Namespace);

/// The cluster operations the reconcile engine needs.
///
/// Every write carries the object's resource version, so a stale write fails with
/// [`ClientError::Conflict`] instead of overwriting a concurrent change.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get<K: Managed>(&self, key: &ObjectKey) -> Result<Option<K>, ClientError>;

    async fn create<K: Managed>(&self, object: &K) -> Result<K, ClientError>;

    async fn replace<K: Managed>(&self, object: &K) -> Result<K, ClientError>;

    /// Replaces only the status subresource.
    async fn replace_status<K: Managed>(&self, object: &K) -> Result<K, ClientError>;

    /// Deletes the object. Missing objects are not an error.
    async fn delete<K: Managed>(&self, key: &ObjectKey) -> Result<(), ClientError>;
}
