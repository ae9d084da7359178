use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    BearerToken, HttpAuthentication, LimitSpec, OutputTlsSpec, OutputTuningSpec, SecretKey,
};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum OutputType {
    AzureMonitor,
    Cloudwatch,
    Elasticsearch,
    FluentdForward,
    GoogleCloudLogging,
    Http,
    Kafka,
    Loki,
    LokiStack,
    Otlp,
    S3,
    Splunk,
    Syslog,
}

impl OutputType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AzureMonitor => "azureMonitor",
            Self::Cloudwatch => "cloudwatch",
            Self::Elasticsearch => "elasticsearch",
            Self::FluentdForward => "fluentdForward",
            Self::GoogleCloudLogging => "googleCloudLogging",
            Self::Http => "http",
            Self::Kafka => "kafka",
            Self::Loki => "loki",
            Self::LokiStack => "lokiStack",
            Self::Otlp => "otlp",
            Self::S3 => "s3",
            Self::Splunk => "splunk",
            Self::Syslog => "syslog",
        }
    }
}

/// A named remote destination.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: OutputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutputTlsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<LimitSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<AzureMonitor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudwatch: Option<Cloudwatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<Elasticsearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluentd_forward: Option<FluentdForward>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_logging: Option<GoogleCloudLogging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<Http>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<Kafka>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki: Option<Loki>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki_stack: Option<LokiStack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<Otlp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splunk: Option<Splunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog: Option<Syslog>,
}

/// Borrowed, type-checked view of the output's settings block.
#[derive(Clone, Copy, Debug)]
pub enum OutputConfig<'a> {
    AzureMonitor(&'a AzureMonitor),
    Cloudwatch(&'a Cloudwatch),
    Elasticsearch(&'a Elasticsearch),
    FluentdForward(&'a FluentdForward),
    GoogleCloudLogging(&'a GoogleCloudLogging),
    Http(&'a Http),
    Kafka(&'a Kafka),
    Loki(&'a Loki),
    LokiStack(&'a LokiStack),
    Otlp(&'a Otlp),
    S3(&'a S3),
    Splunk(&'a Splunk),
    Syslog(&'a Syslog),
}

impl OutputSpec {
    /// Creates an output of the given type with no settings block.
    pub fn new(name: impl Into<String>, type_: OutputType) -> Self {
        Self {
            name: name.into(),
            type_,
            tls: None,
            rate_limit: None,
            azure_monitor: None,
            cloudwatch: None,
            elasticsearch: None,
            fluentd_forward: None,
            google_cloud_logging: None,
            http: None,
            kafka: None,
            loki: None,
            loki_stack: None,
            otlp: None,
            s3: None,
            splunk: None,
            syslog: None,
        }
    }

    pub fn blocks_set(&self) -> usize {
        [
            self.azure_monitor.is_some(),
            self.cloudwatch.is_some(),
            self.elasticsearch.is_some(),
            self.fluentd_forward.is_some(),
            self.google_cloud_logging.is_some(),
            self.http.is_some(),
            self.kafka.is_some(),
            self.loki.is_some(),
            self.loki_stack.is_some(),
            self.otlp.is_some(),
            self.s3.is_some(),
            self.splunk.is_some(),
            self.syslog.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// The settings block matching `type`, when it is the only block set.
    pub fn config(&self) -> Option<OutputConfig<'_>> {
        if self.blocks_set() != 1 {
            return None;
        }
        match self.type_ {
            OutputType::AzureMonitor => self.azure_monitor.as_ref().map(OutputConfig::AzureMonitor),
            OutputType::Cloudwatch => self.cloudwatch.as_ref().map(OutputConfig::Cloudwatch),
            OutputType::Elasticsearch => self.elasticsearch.as_ref().map(OutputConfig::Elasticsearch),
            OutputType::FluentdForward => {
                self.fluentd_forward.as_ref().map(OutputConfig::FluentdForward)
            }
            OutputType::GoogleCloudLogging => self
                .google_cloud_logging
                .as_ref()
                .map(OutputConfig::GoogleCloudLogging),
            OutputType::Http => self.http.as_ref().map(OutputConfig::Http),
            OutputType::Kafka => self.kafka.as_ref().map(OutputConfig::Kafka),
            OutputType::Loki => self.loki.as_ref().map(OutputConfig::Loki),
            OutputType::LokiStack => self.loki_stack.as_ref().map(OutputConfig::LokiStack),
            OutputType::Otlp => self.otlp.as_ref().map(OutputConfig::Otlp),
            OutputType::S3 => self.s3.as_ref().map(OutputConfig::S3),
            OutputType::Splunk => self.splunk.as_ref().map(OutputConfig::Splunk),
            OutputType::Syslog => self.syslog.as_ref().map(OutputConfig::Syslog),
        }
    }

    pub fn url(&self) -> Option<&str> {
        let url = match self.config()? {
            OutputConfig::AzureMonitor(_)
            | OutputConfig::GoogleCloudLogging(_)
            | OutputConfig::LokiStack(_) => None,
            OutputConfig::Cloudwatch(c) => c.url.as_deref(),
            OutputConfig::S3(s) => s.url.as_deref(),
            OutputConfig::Kafka(k) => k.url.as_deref(),
            OutputConfig::Elasticsearch(e) => Some(e.url.as_str()),
            OutputConfig::FluentdForward(f) => Some(f.url.as_str()),
            OutputConfig::Http(h) => Some(h.url.as_str()),
            OutputConfig::Loki(l) => Some(l.url.as_str()),
            OutputConfig::Otlp(o) => Some(o.url.as_str()),
            OutputConfig::Splunk(s) => Some(s.url.as_str()),
            OutputConfig::Syslog(s) => Some(s.url.as_str()),
        };
        url.filter(|u| !u.is_empty())
    }

    pub fn tuning(&self) -> Option<&OutputTuningSpec> {
        match self.config()? {
            OutputConfig::AzureMonitor(c) => c.tuning.as_ref(),
            OutputConfig::Cloudwatch(c) => c.tuning.as_ref(),
            OutputConfig::Elasticsearch(c) => c.tuning.as_ref(),
            OutputConfig::FluentdForward(_) => None,
            OutputConfig::GoogleCloudLogging(c) => c.tuning.as_ref(),
            OutputConfig::Http(c) => c.tuning.as_ref(),
            OutputConfig::Kafka(c) => c.tuning.as_ref(),
            OutputConfig::Loki(c) => c.tuning.as_ref(),
            OutputConfig::LokiStack(c) => c.tuning.as_ref(),
            OutputConfig::Otlp(c) => c.tuning.as_ref(),
            OutputConfig::S3(c) => c.tuning.as_ref(),
            OutputConfig::Splunk(c) => c.tuning.as_ref(),
            OutputConfig::Syslog(c) => c.tuning.as_ref(),
        }
    }

    pub fn max_records_per_second(&self) -> Option<i64> {
        self.rate_limit
            .as_ref()
            .map(|l| l.max_records_per_second)
            .filter(|limit| *limit > 0)
    }

    /// Every secret key the output references, TLS material included.
    pub fn secret_keys(&self) -> Vec<&SecretKey> {
        let mut keys = Vec::new();
        if let Some(tls) = &self.tls {
            keys.extend(tls.tls.key.iter());
            keys.extend(tls.tls.key_passphrase.iter());
        }
        let Some(config) = self.config() else {
            return keys;
        };
        match config {
            OutputConfig::AzureMonitor(c) => keys.push(&c.authentication.shared_key),
            OutputConfig::Cloudwatch(c) => keys.extend(c.authentication.secret_keys()),
            OutputConfig::S3(c) => keys.extend(c.authentication.secret_keys()),
            OutputConfig::GoogleCloudLogging(c) => keys.push(&c.authentication.credentials),
            OutputConfig::Splunk(c) => keys.push(&c.authentication.token),
            OutputConfig::Kafka(c) => {
                if let Some(sasl) = c.authentication.as_ref().and_then(|a| a.sasl.as_ref()) {
                    keys.extend(sasl.username.iter().chain(&sasl.password));
                }
            }
            OutputConfig::Elasticsearch(Elasticsearch { authentication, .. })
            | OutputConfig::Http(Http { authentication, .. })
            | OutputConfig::Loki(Loki { authentication, .. })
            | OutputConfig::LokiStack(LokiStack { authentication, .. })
            | OutputConfig::Otlp(Otlp { authentication, .. }) => {
                keys.extend(authentication.iter().flat_map(HttpAuthentication::secret_keys));
            }
            OutputConfig::FluentdForward(_) | OutputConfig::Syslog(_) => {}
        }
        keys
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsAssumeRole {
    pub role_arn: SecretKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<SecretKey>,
}

/// AWS credentials for Cloudwatch and S3.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AwsAuthentication {
    /// Static access keys.
    #[serde(rename_all = "camelCase")]
    AccessKey {
        access_key_id: SecretKey,
        access_key_secret: SecretKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assume_role: Option<AwsAssumeRole>,
    },
    /// Web identity role, resolved through a mounted credentials file.
    #[serde(rename_all = "camelCase")]
    IamRole {
        role_arn: SecretKey,
        token: BearerToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assume_role: Option<AwsAssumeRole>,
    },
}

impl AwsAuthentication {
    pub fn assume_role(&self) -> Option<&AwsAssumeRole> {
        match self {
            Self::AccessKey { assume_role, .. } | Self::IamRole { assume_role, .. } => {
                assume_role.as_ref()
            }
        }
    }

    pub fn secret_keys(&self) -> Vec<&SecretKey> {
        let mut keys = match self {
            Self::AccessKey {
                access_key_id,
                access_key_secret,
                ..
            } => vec![access_key_id, access_key_secret],
            Self::IamRole { role_arn, token, .. } => {
                let mut keys = vec![role_arn];
                if let BearerToken::Secret { secret } = token {
                    keys.push(secret);
                }
                keys
            }
        };
        if let Some(assume) = self.assume_role() {
            keys.push(&assume.role_arn);
            keys.extend(assume.external_id.iter());
        }
        keys
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cloudwatch {
    /// Endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub region: String,
    /// Template for the log group, e.g. `{.log_type||"none"}`.
    pub group_name: String,
    pub authentication: AwsAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct S3 {
    /// Endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Template for the object key prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
    pub authentication: AwsAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Elasticsearch {
    pub url: String,
    /// Major version of the target cluster.
    #[serde(default = "default_es_version")]
    pub version: u32,
    /// Template for the index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

const fn default_es_version() -> u32 {
    8
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FluentdForward {
    pub url: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GoogleCloudLoggingIdType {
    BillingAccount,
    Folder,
    Project,
    Organization,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudLoggingId {
    #[serde(rename = "type")]
    pub type_: GoogleCloudLoggingIdType,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudLoggingAuthentication {
    pub credentials: SecretKey,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudLogging {
    pub id: GoogleCloudLoggingId,
    /// Template for the log id.
    pub log_id: String,
    pub authentication: GoogleCloudLoggingAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Http {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaslAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKey>,
    /// Defaults to `PLAIN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KafkaAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslAuthentication>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kafka {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Additional broker URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brokers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<KafkaAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Loki {
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_keys: Vec<String>,
    /// Template for the tenant id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LokiStackTarget {
    pub name: String,
    /// Defaults to the forwarder's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LokiStack {
    pub target: LokiStackTarget,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Otlp {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SplunkAuthentication {
    pub token: SecretKey,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Splunk {
    pub url: String,
    /// Template for the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub authentication: SplunkAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SyslogRfc {
    #[serde(rename = "RFC3164")]
    Rfc3164,
    #[default]
    #[serde(rename = "RFC5424")]
    Rfc5424,
}

impl SyslogRfc {
    pub const fn as_lowercase(self) -> &'static str {
        match self {
            Self::Rfc3164 => "rfc3164",
            Self::Rfc5424 => "rfc5424",
        }
    }
}

/// Extra record metadata a syslog sink adds to the message.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SyslogEnrichment {
    #[default]
    None,
    KubernetesMinimal,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Syslog {
    pub url: String,
    #[serde(default)]
    pub rfc: SyslogRfc,
    #[serde(default)]
    pub enrichment: SyslogEnrichment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitorAuthentication {
    pub shared_key: SecretKey,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitor {
    pub customer_id: String,
    pub log_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub authentication: AzureMonitorAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuningSpec>,
}
