use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    AddLabels,
    DetectMultiline,
    Drop,
    #[serde(rename = "kubeAPIAudit")]
    KubeApiAudit,
    Parse,
    Prune,
}

impl FilterType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddLabels => "addLabels",
            Self::DetectMultiline => "detectMultiline",
            Self::Drop => "drop",
            Self::KubeApiAudit => "kubeAPIAudit",
            Self::Parse => "parse",
            Self::Prune => "prune",
        }
    }
}

/// A named record transformation referenced from pipelines.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FilterType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<DropTest>,
    #[serde(default, rename = "kubeAPIAudit", skip_serializing_if = "Option::is_none")]
    pub kube_api_audit: Option<KubeApiAudit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<PruneFilterSpec>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>, type_: FilterType) -> Self {
        Self {
            name: name.into(),
            type_,
            add_labels: BTreeMap::new(),
            drop: Vec::new(),
            kube_api_audit: None,
            prune: None,
        }
    }
}

/// Conditions that are ANDed together. A record is dropped when any test passes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct DropTest {
    #[serde(default, rename = "test")]
    pub conditions: Vec<DropCondition>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DropCondition {
    /// Dot-delimited path starting with `.`.
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_matches: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PruneFilterSpec {
    /// Fields removed from the record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub r#in: Vec<String>,
    /// Fields kept; everything else is removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_in: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AuditLevel {
    None,
    Metadata,
    Request,
    RequestResponse,
}

impl AuditLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Metadata => "Metadata",
            Self::Request => "Request",
            Self::RequestResponse => "RequestResponse",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupResources {
    #[serde(default)]
    pub group: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

/// One rule of an API server audit policy. Empty lists match everything.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditPolicyRule {
    pub level: AuditLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<GroupResources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default, rename = "nonResourceURLs", skip_serializing_if = "Vec::is_empty")]
    pub non_resource_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit_stages: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeApiAudit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<AuditPolicyRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit_stages: Vec<String>,
    /// `None` means the default list; an empty list omits nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit_response_codes: Option<Vec<i32>>,
}

impl KubeApiAudit {
    pub const DEFAULT_OMIT_RESPONSE_CODES: [i32; 4] = [404, 409, 422, 429];

    pub fn omit_response_codes(&self) -> Vec<i32> {
        self.omit_response_codes
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_OMIT_RESPONSE_CODES.to_vec())
    }
}
