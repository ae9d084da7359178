use async_trait::async_trait;
use kube::{
    Client,
    api::{DeleteParams, PostParams},
};
use snafu::ResultExt;

use super::{ApiSnafu, ClientError, ClusterClient, ConvertSnafu, Managed, ObjectKey};
use crate::internal_events::ResourceWritten;

/// [`ClusterClient`] backed by the API server.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get<K: Managed>(&self, key: &ObjectKey) -> Result<Option<K>, ClientError> {
        K::api(self.client.clone(), key.namespace.as_deref())
            .get_opt(&key.name)
            .await
            .context(ApiSnafu)
    }

    async fn create<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let created = K::api(self.client.clone(), key.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await
            .map_err(|error| ClientError::from_kube(error, &K::kind_name(), &key.to_string()))?;
        emit!(ResourceWritten {
            kind: K::kind_name(),
            key: &key,
            operation: "create",
        });
        Ok(created)
    }

    async fn replace<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let replaced = K::api(self.client.clone(), key.namespace.as_deref())
            .replace(&key.name, &PostParams::default(), object)
            .await
            .map_err(|error| ClientError::from_kube(error, &K::kind_name(), &key.to_string()))?;
        emit!(ResourceWritten {
            kind: K::kind_name(),
            key: &key,
            operation: "update",
        });
        Ok(replaced)
    }

    async fn replace_status<K: Managed>(&self, object: &K) -> Result<K, ClientError> {
        let key = ObjectKey::of(object);
        let body = serde_json::to_vec(object).context(ConvertSnafu {
            kind: K::kind_name(),
        })?;
        let replaced = K::api(self.client.clone(), key.namespace.as_deref())
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|error| ClientError::from_kube(error, &K::kind_name(), &key.to_string()))?;
        emit!(ResourceWritten {
            kind: K::kind_name(),
            key: &key,
            operation: "update_status",
        });
        Ok(replaced)
    }

    async fn delete<K: Managed>(&self, key: &ObjectKey) -> Result<(), ClientError> {
        let result = K::api(self.client.clone(), key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::background())
            .await;
        match result {
            Ok(_) => {
                emit!(ResourceWritten {
                    kind: K::kind_name(),
                    key,
                    operation: "delete",
                });
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(error) => Err(ClientError::from_kube(
                error,
                &K::kind_name(),
                &key.to_string(),
            )),
        }
    }
}
