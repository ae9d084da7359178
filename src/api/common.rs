use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A key inside a secret in the forwarder's namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKey {
    pub secret_name: String,
    pub key: String,
}

impl SecretKey {
    pub fn new(secret_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            key: key.into(),
        }
    }
}

/// A key inside either a config map or a secret. Exactly one of the two names is set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapOrSecretKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    pub key: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<ConfigMapOrSecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<ConfigMapOrSecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<SecretKey>,
}

impl TlsSpec {
    /// Secrets holding any part of the TLS material.
    pub fn secret_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = [&self.ca, &self.certificate]
            .into_iter()
            .flatten()
            .filter_map(|k| k.secret_name.as_deref())
            .collect();
        names.extend(
            self.key
                .iter()
                .chain(&self.key_passphrase)
                .map(|k| k.secret_name.as_str()),
        );
        names
    }

    pub fn config_map_names(&self) -> Vec<&str> {
        [&self.ca, &self.certificate]
            .into_iter()
            .flatten()
            .filter_map(|k| k.config_map_name.as_deref())
            .collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputTlsSpec {
    #[serde(flatten)]
    pub tls: TlsSpec,
    /// Disables both certificate and hostname verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Overrides the cluster-wide minimum TLS version for this output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tls_version: Option<String>,
    /// Overrides the cluster-wide cipher list for this output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ciphers: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LimitSpec {
    pub max_records_per_second: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    AtLeastOnce,
    AtMostOnce,
}

/// Output tuning. An absent block keeps the collector defaults for the output type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputTuningSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryMode>,
    /// One of `none`, `gzip`, `snappy`, `zlib`, `zstd`, `lz4`; availability depends on the output type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    /// Maximum bytes sent in one batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_write: Option<Quantity>,
    /// Initial retry back-off in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_retry_duration: Option<u64>,
    /// Maximum retry back-off in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_duration: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "from")]
pub enum BearerToken {
    /// Token read from a secret key.
    Secret { secret: SecretKey },
    /// The collector's own service account token.
    ServiceAccount,
}

/// Credentials for HTTP-speaking outputs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<BearerToken>,
}

impl HttpAuthentication {
    pub fn secret_keys(&self) -> Vec<&SecretKey> {
        let mut keys: Vec<&SecretKey> = self.username.iter().chain(&self.password).collect();
        if let Some(BearerToken::Secret { secret }) = &self.token {
            keys.push(secret);
        }
        keys
    }
}
