use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    conditions::Condition,
    filters::FilterSpec,
    inputs::{InputSpec, InputType, ReceiverSpec, ReceiverType},
    outputs::{LokiStackTarget, OutputSpec},
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
}

/// Describes where logs are collected from, how they are filtered and where they are sent.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "observability.openshift.io",
    version = "v1",
    kind = "ClusterLogForwarder",
    namespaced,
    status = "ClusterLogForwarderStatus",
    shortname = "obsclf",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogForwarderSpec {
    #[serde(default)]
    pub management_state: ManagementState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<CollectorSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
    #[serde(default)]
    pub service_account: ServiceAccountSpec,
    /// The managed log store the reserved `default` output resolves to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_log_store: Option<LokiStackTarget>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ServiceAccountSpec {
    #[serde(default)]
    pub name: String,
}

/// Links inputs to outputs through an ordered list of filters.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default)]
    pub name: String,
    pub input_refs: Vec<String>,
    pub output_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_refs: Vec<String>,
    /// Labels merged into every record of the pipeline.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Only `json` is understood.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse: Option<String>,
    #[serde(default)]
    pub detect_multiline_errors: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogForwarderStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Vec<Condition>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Vec<Condition>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Vec<Condition>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pipelines: BTreeMap<String, Vec<Condition>>,
}

impl ClusterLogForwarderSpec {
    pub fn input(&self, name: &str) -> Option<InputSpec> {
        self.inputs
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .or_else(|| InputSpec::reserved(name))
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Every input referenced by a pipeline, declared or reserved, in first-reference order.
    pub fn referenced_inputs(&self) -> Vec<InputSpec> {
        let mut seen = Vec::<String>::new();
        let mut inputs = Vec::new();
        for name in self.pipelines.iter().flat_map(|p| &p.input_refs) {
            if seen.contains(name) {
                continue;
            }
            seen.push(name.clone());
            if let Some(input) = self.input(name) {
                inputs.push(input);
            }
        }
        inputs
    }

    /// True when every referenced input is an HTTP receiver.
    pub fn only_http_receivers(&self) -> bool {
        let inputs = self.referenced_inputs();
        !inputs.is_empty()
            && inputs.iter().all(|i| {
                i.type_ == InputType::Receiver
                    && i.receiver.as_ref().map(|r| r.type_) == Some(ReceiverType::Http)
            })
    }

    /// Every secret an output or receiver reads, by name.
    pub fn secret_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for output in &self.outputs {
            names.extend(output.secret_keys().into_iter().map(|k| k.secret_name.clone()));
            if let Some(tls) = &output.tls {
                names.extend(tls.tls.secret_names().into_iter().map(str::to_string));
            }
        }
        for tls in self.inputs.iter().filter_map(|i| i.receiver.as_ref()?.tls.as_ref()) {
            names.extend(tls.secret_names().into_iter().map(str::to_string));
        }
        names
    }

    /// Every config map holding TLS material for an output or receiver, by name.
    pub fn config_map_names(&self) -> BTreeSet<String> {
        let outputs = self.outputs.iter().filter_map(|o| o.tls.as_ref()).map(|t| &t.tls);
        let receivers = self
            .inputs
            .iter()
            .filter_map(|i| i.receiver.as_ref()?.tls.as_ref());
        outputs
            .chain(receivers)
            .flat_map(|tls| tls.config_map_names())
            .map(str::to_string)
            .collect()
    }

    /// Inputs that open a listening port on the collector.
    pub fn receivers(&self) -> impl Iterator<Item = (&str, &ReceiverSpec)> {
        self.inputs
            .iter()
            .filter_map(|i| Some((i.name.as_str(), i.receiver.as_ref()?)))
    }

    pub fn collector(&self) -> CollectorSpec {
        self.collector.clone().unwrap_or_default()
    }
}

impl ClusterLogForwarder {
    /// Secret holding the token of the collector's service account.
    pub fn token_secret_name(&self) -> String {
        format!("{}-token", self.metadata.name.as_deref().unwrap_or_default())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}
