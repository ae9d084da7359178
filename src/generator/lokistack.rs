//! Rewrites LokiStack references into plain per-tenant Loki outputs.
//!
//! A LokiStack gateway serves one tenant per URL path, so every pipeline that writes to a
//! LokiStack (or to the reserved `default` output backed by the managed log store) is split into
//! one pipeline per input, and each input's tenant gets its own Loki output.

use std::collections::{BTreeMap, BTreeSet};

use snafu::OptionExt;

use super::{GeneratorError, MissingManagedStoreSnafu, ids::format_component_id};
use crate::api::{
    BearerToken, ClusterLogForwarderSpec, ConfigMapOrSecretKey, HttpAuthentication, InputSpec,
    Loki, LokiStack, LokiStackTarget, OutputSpec, OutputTlsSpec, OutputType, TlsSpec,
    constants::{INPUT_APPLICATION, INPUT_INFRASTRUCTURE, OUTPUT_DEFAULT},
};

pub const SERVICE_CA_CONFIG_MAP: &str = "openshift-service-ca.crt";
pub const SERVICE_CA_KEY: &str = "service-ca.crt";

pub fn gateway_url(target: &LokiStackTarget, namespace: &str, tenant: &str) -> String {
    format!(
        "https://{}-gateway-http.{}.svc:8080/api/logs/v1/{tenant}",
        target.name,
        target.namespace.as_deref().unwrap_or(namespace)
    )
}

fn tenant_short_name(tenant: &str) -> &str {
    match tenant {
        INPUT_APPLICATION => "apps",
        INPUT_INFRASTRUCTURE => "infra",
        other => other,
    }
}

/// Name of the synthesized output for the managed log store and `tenant`.
pub fn default_output_name(tenant: &str) -> String {
    format!("{OUTPUT_DEFAULT}-loki-{}", tenant_short_name(tenant))
}

/// Whether any pipeline writes to a LokiStack, directly or through `default`.
pub fn references_lokistack(spec: &ClusterLogForwarderSpec) -> bool {
    spec.pipelines.iter().flat_map(|p| &p.output_refs).any(|name| {
        name == OUTPUT_DEFAULT || spec.output(name).is_some_and(|o| o.type_ == OutputType::LokiStack)
    })
}

fn input_tenant(spec: &ClusterLogForwarderSpec, input: &str) -> &'static str {
    spec.input(input)
        .as_ref()
        .and_then(InputSpec::tenant)
        .unwrap_or(INPUT_APPLICATION)
}

fn service_ca_tls() -> OutputTlsSpec {
    OutputTlsSpec {
        tls: TlsSpec {
            ca: Some(ConfigMapOrSecretKey {
                config_map_name: Some(SERVICE_CA_CONFIG_MAP.to_string()),
                secret_name: None,
                key: SERVICE_CA_KEY.to_string(),
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn service_account_auth() -> HttpAuthentication {
    HttpAuthentication {
        token: Some(BearerToken::ServiceAccount),
        ..Default::default()
    }
}

fn loki_output(
    name: String,
    stack: &LokiStack,
    source: Option<&OutputSpec>,
    namespace: &str,
    tenant: &str,
) -> OutputSpec {
    let mut output = OutputSpec::new(name, OutputType::Loki);
    output.loki = Some(Loki {
        url: gateway_url(&stack.target, namespace, tenant),
        label_keys: stack.label_keys.clone(),
        tenant_key: None,
        authentication: Some(
            stack
                .authentication
                .clone()
                .unwrap_or_else(service_account_auth),
        ),
        tuning: stack.tuning.clone(),
    });
    output.tls = Some(
        source
            .and_then(|s| s.tls.clone())
            .unwrap_or_else(service_ca_tls),
    );
    output.rate_limit = source.and_then(|s| s.rate_limit.clone());
    output
}

/// `base`, or `base-<n>` for the first `n` whose component id is not yet in `taken`.
fn unique_name(base: String, taken: &mut BTreeSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 1;
    while !taken.insert(format_component_id(&name)) {
        name = format!("{base}-{n}");
        n += 1;
    }
    name
}

/// Returns the spec with every LokiStack reference replaced by Loki outputs.
///
/// Unnamed pipelines are named `pipeline_<index>_` first so that split pipelines keep stable
/// names. Generated pipeline and output names never share a component id with another name.
/// Outputs come back sorted by name.
pub fn migrate(
    spec: &ClusterLogForwarderSpec,
    namespace: &str,
) -> Result<ClusterLogForwarderSpec, GeneratorError> {
    let mut migrated = spec.clone();
    migrated.outputs.retain(|o| o.type_ != OutputType::LokiStack);
    migrated.pipelines.clear();

    let mut pipeline_ids: BTreeSet<String> = spec
        .pipelines
        .iter()
        .filter(|p| !p.name.is_empty())
        .map(|p| format_component_id(&p.name))
        .collect();
    let mut output_ids: BTreeSet<String> = migrated
        .outputs
        .iter()
        .map(|o| format_component_id(&o.name))
        .collect();
    // Generated output name for each (tenant output) it stands in for.
    let mut added: BTreeMap<String, String> = BTreeMap::new();

    for (index, pipeline) in spec.pipelines.iter().enumerate() {
        let mut pipeline = pipeline.clone();
        if pipeline.name.is_empty() {
            pipeline.name = unique_name(format!("pipeline_{index}_"), &mut pipeline_ids);
        }
        let is_stack = |name: &String| {
            name == OUTPUT_DEFAULT
                || spec.output(name).is_some_and(|o| o.type_ == OutputType::LokiStack)
        };
        if !pipeline.output_refs.iter().any(is_stack) {
            migrated.pipelines.push(pipeline);
            continue;
        }

        for (i, input) in pipeline.input_refs.iter().enumerate() {
            let tenant = input_tenant(spec, input);
            let mut split = pipeline.clone();
            split.input_refs = vec![input.clone()];
            if i > 0 {
                split.name = unique_name(format!("{}-{i}", pipeline.name), &mut pipeline_ids);
            }

            for output_ref in split.output_refs.iter_mut() {
                if *output_ref == OUTPUT_DEFAULT {
                    let target = spec
                        .managed_log_store
                        .clone()
                        .context(MissingManagedStoreSnafu {
                            pipeline: pipeline.name.as_str(),
                        })?;
                    let base = default_output_name(tenant);
                    let name = match added.get(&base) {
                        Some(name) => name.clone(),
                        None => {
                            let name = unique_name(base.clone(), &mut output_ids);
                            let stack = LokiStack {
                                target,
                                label_keys: Vec::new(),
                                authentication: None,
                                tuning: None,
                            };
                            migrated
                                .outputs
                                .push(loki_output(name.clone(), &stack, None, namespace, tenant));
                            added.insert(base, name.clone());
                            name
                        }
                    };
                    *output_ref = name;
                } else if let Some(source) = spec
                    .output(output_ref)
                    .filter(|o| o.type_ == OutputType::LokiStack)
                {
                    let base = format!("{output_ref}-{input}");
                    let name = match added.get(&base) {
                        Some(name) => name.clone(),
                        None => {
                            let name = unique_name(base.clone(), &mut output_ids);
                            if let Some(stack) = &source.loki_stack {
                                migrated.outputs.push(loki_output(
                                    name.clone(),
                                    stack,
                                    Some(source),
                                    namespace,
                                    tenant,
                                ));
                            }
                            added.insert(base, name.clone());
                            name
                        }
                    };
                    *output_ref = name;
                }
            }
            migrated.pipelines.push(split);
        }
    }

    migrated.outputs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Http, InputType, LimitSpec, PipelineSpec, ReceiverSpec, ReceiverType};

    fn pipeline(name: &str, inputs: &[&str], outputs: &[&str]) -> PipelineSpec {
        PipelineSpec {
            name: name.into(),
            input_refs: inputs.iter().map(|s| s.to_string()).collect(),
            output_refs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn url(output: &OutputSpec) -> &str {
        &output.loki.as_ref().unwrap().url
    }

    #[test]
    fn default_output_splits_per_tenant() {
        let spec = ClusterLogForwarderSpec {
            managed_log_store: Some(LokiStackTarget {
                name: "lokistack-testing".into(),
                namespace: Some("aNamespace".into()),
            }),
            pipelines: vec![pipeline("to-default", &["application", "infrastructure"], &["default"])],
            ..Default::default()
        };
        let migrated = migrate(&spec, "openshift-logging").unwrap();

        let names: Vec<&str> = migrated.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["default-loki-apps", "default-loki-infra"]);
        assert_eq!(
            url(&migrated.outputs[0]),
            "https://lokistack-testing-gateway-http.aNamespace.svc:8080/api/logs/v1/application"
        );
        assert_eq!(
            url(&migrated.outputs[1]),
            "https://lokistack-testing-gateway-http.aNamespace.svc:8080/api/logs/v1/infrastructure"
        );
        assert_eq!(
            migrated.outputs[0].loki.as_ref().unwrap().authentication,
            Some(service_account_auth())
        );

        assert_eq!(migrated.pipelines.len(), 2);
        assert_eq!(migrated.pipelines[0].name, "to-default");
        assert_eq!(migrated.pipelines[0].input_refs, ["application"]);
        assert_eq!(migrated.pipelines[0].output_refs, ["default-loki-apps"]);
        assert_eq!(migrated.pipelines[1].name, "to-default-1");
        assert_eq!(migrated.pipelines[1].output_refs, ["default-loki-infra"]);
    }

    #[test]
    fn lokistack_outputs_are_named_per_input() {
        let mut stack = OutputSpec::new("my-loki", OutputType::LokiStack);
        stack.loki_stack = Some(LokiStack {
            target: LokiStackTarget {
                name: "logging-loki".into(),
                namespace: None,
            },
            label_keys: vec!["kubernetes.labels.app".into()],
            authentication: None,
            tuning: None,
        });
        stack.rate_limit = Some(LimitSpec {
            max_records_per_second: 10,
        });
        let receiver = InputSpec {
            name: "syslog-in".into(),
            type_: InputType::Receiver,
            application: None,
            infrastructure: None,
            audit: None,
            receiver: Some(ReceiverSpec {
                type_: ReceiverType::Syslog,
                port: 10514,
                tls: None,
                http: None,
            }),
        };
        let spec = ClusterLogForwarderSpec {
            inputs: vec![receiver],
            outputs: vec![stack],
            pipelines: vec![pipeline("", &["syslog-in"], &["my-loki"])],
            ..Default::default()
        };
        let migrated = migrate(&spec, "openshift-logging").unwrap();

        assert_eq!(migrated.outputs.len(), 1);
        let output = &migrated.outputs[0];
        assert_eq!(output.name, "my-loki-syslog-in");
        assert_eq!(
            url(output),
            "https://logging-loki-gateway-http.openshift-logging.svc:8080/api/logs/v1/infrastructure"
        );
        assert_eq!(output.max_records_per_second(), Some(10));
        assert_eq!(migrated.pipelines[0].name, "pipeline_0_");
        assert!(references_lokistack(&spec));
    }

    #[test]
    fn split_names_avoid_taken_ids() {
        let mut web = OutputSpec::new("web", OutputType::Http);
        web.http = Some(Http {
            url: "https://web.example.com".into(),
            method: None,
            headers: Default::default(),
            timeout: None,
            proxy_url: None,
            authentication: None,
            tuning: None,
        });
        let mut taken = web.clone();
        taken.name = "default_loki_apps".into();
        let spec = ClusterLogForwarderSpec {
            managed_log_store: Some(LokiStackTarget {
                name: "lokistack".into(),
                namespace: None,
            }),
            outputs: vec![web, taken],
            pipelines: vec![
                pipeline("all", &["application", "infrastructure"], &["default"]),
                pipeline("all-1", &["audit"], &["web"]),
            ],
            ..Default::default()
        };
        let migrated = migrate(&spec, "openshift-logging").unwrap();

        let pipelines: Vec<(&str, &[String], &[String])> = migrated
            .pipelines
            .iter()
            .map(|p| (p.name.as_str(), &p.input_refs[..], &p.output_refs[..]))
            .collect();
        assert_eq!(pipelines.len(), 3);
        assert_eq!(pipelines[0].0, "all");
        assert_eq!(pipelines[1].0, "all-1-1");
        assert_eq!(pipelines[1].1, ["infrastructure"]);
        assert_eq!(pipelines[1].2, ["default-loki-infra"]);
        assert_eq!(pipelines[2].0, "all-1");
        assert_eq!(pipelines[2].1, ["audit"]);
        assert_eq!(pipelines[2].2, ["web"]);
        assert_eq!(pipelines[0].2, ["default-loki-apps-1"]);

        let ids: BTreeSet<String> = migrated
            .pipelines
            .iter()
            .map(|p| format_component_id(&p.name))
            .collect();
        assert_eq!(ids.len(), migrated.pipelines.len());
        let ids: BTreeSet<String> = migrated
            .outputs
            .iter()
            .map(|o| format_component_id(&o.name))
            .collect();
        assert_eq!(ids.len(), migrated.outputs.len());
    }

    #[test]
    fn default_without_store_fails() {
        let spec = ClusterLogForwarderSpec {
            pipelines: vec![pipeline("p", &["audit"], &["default"])],
            ..Default::default()
        };
        assert!(matches!(
            migrate(&spec, "ns"),
            Err(GeneratorError::MissingManagedStore { .. })
        ));
    }
}
