use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    common::{LimitSpec, TlsSpec},
    constants::{INPUT_APPLICATION, INPUT_AUDIT, INPUT_INFRASTRUCTURE},
};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    Application,
    Infrastructure,
    Audit,
    Receiver,
}

impl InputType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Infrastructure => "infrastructure",
            Self::Audit => "audit",
            Self::Receiver => "receiver",
        }
    }
}

/// A named selector of log records.
///
/// `type` names the variant; exactly the matching variant block may be set. The validator
/// enforces that, and [`InputSpec::source`] exposes the checked view.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Application>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<Infrastructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<Audit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverSpec>,
}

/// Borrowed, variant-checked view of an input.
#[derive(Clone, Copy, Debug)]
pub enum InputSource<'a> {
    Application(&'a Application),
    Infrastructure(&'a Infrastructure),
    Audit(&'a Audit),
    Receiver(&'a ReceiverSpec),
}

impl InputSpec {
    /// Number of variant blocks that are set.
    pub fn variants_set(&self) -> usize {
        [
            self.application.is_some(),
            self.infrastructure.is_some(),
            self.audit.is_some(),
            self.receiver.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// The variant block matching `type`, if it is the only one set.
    ///
    /// `application`, `infrastructure` and `audit` inputs may omit their block, in which case the
    /// defaults apply.
    pub fn source(&self) -> Option<InputSource<'_>> {
        if self.variants_set() > 1 {
            return None;
        }
        static DEFAULT_APPLICATION: Application = Application::empty();
        static DEFAULT_INFRASTRUCTURE: Infrastructure = Infrastructure { sources: Vec::new() };
        static DEFAULT_AUDIT: Audit = Audit { sources: Vec::new() };
        match self.type_ {
            InputType::Application if self.variants_set() == 0 || self.application.is_some() => Some(
                InputSource::Application(self.application.as_ref().unwrap_or(&DEFAULT_APPLICATION)),
            ),
            InputType::Infrastructure
                if self.variants_set() == 0 || self.infrastructure.is_some() =>
            {
                Some(InputSource::Infrastructure(
                    self.infrastructure.as_ref().unwrap_or(&DEFAULT_INFRASTRUCTURE),
                ))
            }
            InputType::Audit if self.variants_set() == 0 || self.audit.is_some() => Some(
                InputSource::Audit(self.audit.as_ref().unwrap_or(&DEFAULT_AUDIT)),
            ),
            InputType::Receiver => self.receiver.as_ref().map(InputSource::Receiver),
            _ => None,
        }
    }

    /// The log store tenant records of this input belong to.
    pub fn tenant(&self) -> Option<&'static str> {
        match self.type_ {
            InputType::Application => Some(INPUT_APPLICATION),
            InputType::Infrastructure => Some(INPUT_INFRASTRUCTURE),
            InputType::Audit => Some(INPUT_AUDIT),
            InputType::Receiver => self.receiver.as_ref().map(|r| r.type_.tenant()),
        }
    }

    pub fn reserved(name: &str) -> Option<Self> {
        let type_ = match name {
            INPUT_APPLICATION => InputType::Application,
            INPUT_INFRASTRUCTURE => InputType::Infrastructure,
            INPUT_AUDIT => InputType::Audit,
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            type_,
            application: None,
            infrastructure: None,
            audit: None,
            receiver: None,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<NamespaceContainerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<NamespaceContainerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<ContainerInputTuningSpec>,
}

impl Application {
    const fn empty() -> Self {
        Self {
            selector: None,
            includes: Vec::new(),
            excludes: Vec::new(),
            tuning: None,
        }
    }

    pub fn rate_limit_per_container(&self) -> Option<i64> {
        self.tuning
            .as_ref()
            .and_then(|t| t.rate_limit_per_container.as_ref())
            .map(|l| l.max_records_per_second)
            .filter(|limit| *limit > 0)
    }
}

/// Namespace and container globs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceContainerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInputTuningSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_container: Option<LimitSpec>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InfrastructureSource {
    Node,
    Container,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Infrastructure {
    /// Empty selects every infrastructure source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<InfrastructureSource>,
}

impl Infrastructure {
    pub fn includes(&self, source: InfrastructureSource) -> bool {
        self.sources.is_empty() || self.sources.contains(&source)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuditSource {
    #[serde(rename = "auditd")]
    Auditd,
    #[serde(rename = "kubeAPI")]
    KubeApi,
    #[serde(rename = "openshiftAPI")]
    OpenshiftApi,
    #[serde(rename = "ovn")]
    Ovn,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Audit {
    /// Empty selects every audit source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<AuditSource>,
}

impl Audit {
    pub fn includes(&self, source: AuditSource) -> bool {
        self.sources.is_empty() || self.sources.contains(&source)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReceiverType {
    Http,
    Syslog,
}

impl ReceiverType {
    /// HTTP receivers ingest API audit events; syslog receivers carry node logs.
    pub const fn tenant(self) -> &'static str {
        match self {
            Self::Http => INPUT_AUDIT,
            Self::Syslog => INPUT_INFRASTRUCTURE,
        }
    }
}

/// An ingestion endpoint opened by the collector.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSpec {
    #[serde(rename = "type")]
    pub type_: ReceiverType,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpReceiver>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpReceiver {
    /// Only `kubeAPIAudit` is understood.
    pub format: String,
}
