//! Filters to transforms.

use std::collections::BTreeMap;

use super::{
    elements::{Transform, strings},
    template::quote,
};
use crate::api::{
    AuditLevel, AuditPolicyRule, DropCondition, DropTest, FilterSpec, FilterType, KubeApiAudit,
    PruneFilterSpec,
};

/// The transform implementing `filter`.
pub(super) fn transform(id: String, inputs: Vec<String>, filter: &FilterSpec) -> Transform {
    match filter.type_ {
        FilterType::AddLabels => labels(id, inputs, &filter.add_labels),
        FilterType::DetectMultiline => detect_multiline(id, inputs),
        FilterType::Drop => Transform::new(id, "filter", inputs)
            .with("condition", drop_condition(&filter.drop)),
        FilterType::KubeApiAudit => Transform::remap(
            id,
            inputs,
            audit_policy(filter.kube_api_audit.as_ref().unwrap_or(&KubeApiAudit::default())),
        ),
        FilterType::Parse => parse_json(id, inputs),
        FilterType::Prune => Transform::remap(
            id,
            inputs,
            prune(filter.prune.as_ref().unwrap_or(&PruneFilterSpec::default())),
        ),
    }
}

pub(super) fn labels(id: String, inputs: Vec<String>, labels: &BTreeMap<String, String>) -> Transform {
    Transform::remap(id, inputs, merge_labels(labels))
}

/// Merges `labels` into `.openshift.labels`.
pub(super) fn merge_labels(labels: &BTreeMap<String, String>) -> String {
    let object = labels
        .iter()
        .map(|(k, v)| format!("{}: {}", quote(k), quote(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(".openshift.labels = merge(object(.openshift.labels) ?? {{}}, {{{object}}})")
}

pub(super) fn detect_multiline(id: String, inputs: Vec<String>) -> Transform {
    Transform::new(id, "detect_exceptions", inputs)
        .with("languages", strings(&["All"]))
        .with(
            "group_by",
            strings(&[
                "kubernetes.namespace_name",
                "kubernetes.pod_name",
                "kubernetes.container_name",
                "kubernetes.pod_id",
            ]),
        )
        .with("expire_after_secs", 2)
        .with("multiline_flush_interval_secs", 1)
}

pub(super) fn parse_json(id: String, inputs: Vec<String>) -> Transform {
    Transform::remap(
        id,
        inputs,
        "parsed, err = parse_json(.message)\nif err == null { .structured = parsed }",
    )
}

fn regex_literal(pattern: &str) -> String {
    format!("r'{}'", pattern.replace('\'', "\\'"))
}

fn drop_term(condition: &DropCondition) -> String {
    let value = format!("to_string({}) ?? \"\"", condition.field);
    match (&condition.matches, &condition.not_matches) {
        (Some(re), _) => format!("match({value}, {})", regex_literal(re)),
        (None, Some(re)) => format!("!match({value}, {})", regex_literal(re)),
        (None, None) => "false".to_string(),
    }
}

/// Keeps records that match none of the tests. A test matches when all of its conditions do.
fn drop_condition(tests: &[DropTest]) -> String {
    let tests = tests
        .iter()
        .map(|test| {
            let terms = test.conditions.iter().map(drop_term).collect::<Vec<_>>();
            format!("({})", terms.join(" && "))
        })
        .collect::<Vec<_>>();
    format!("!({})", tests.join(" || "))
}

fn prune(prune: &PruneFilterSpec) -> String {
    let mut lines = Vec::new();
    if !prune.not_in.is_empty() {
        lines.push("kept = {}".to_string());
        lines.push("if exists(._internal) { kept._internal = ._internal }".to_string());
        for path in &prune.not_in {
            lines.push(format!("if exists({path}) {{ kept{path} = {path} }}"));
        }
        lines.push(". = kept".to_string());
    }
    for path in &prune.r#in {
        lines.push(format!("del({path})"));
    }
    lines.join("\n")
}

fn vrl_array<S: AsRef<str>>(items: &[S]) -> String {
    let quoted = items.iter().map(|s| quote(s.as_ref())).collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}

fn any_of(terms: Vec<String>) -> String {
    if terms.len() == 1 {
        terms.into_iter().collect()
    } else {
        format!("({})", terms.join(" || "))
    }
}

fn rule_condition(rule: &AuditPolicyRule) -> String {
    let mut terms = Vec::new();
    if !rule.users.is_empty() {
        terms.push(format!("includes({}, .user.username)", vrl_array(&rule.users)));
    }
    if !rule.user_groups.is_empty() {
        terms.push(any_of(
            rule.user_groups
                .iter()
                .map(|g| format!("includes(array(.user.groups) ?? [], {})", quote(g)))
                .collect(),
        ));
    }
    if !rule.verbs.is_empty() {
        terms.push(format!("includes({}, .verb)", vrl_array(&rule.verbs)));
    }
    if !rule.namespaces.is_empty() {
        terms.push(format!(
            "includes({}, .objectRef.namespace)",
            vrl_array(&rule.namespaces)
        ));
    }
    if !rule.resources.is_empty() {
        terms.push(any_of(
            rule.resources
                .iter()
                .map(|gr| {
                    let group = format!("(string(.objectRef.apiGroup) ?? \"\") == {}", quote(&gr.group));
                    if gr.resources.is_empty() {
                        group
                    } else {
                        format!(
                            "({group} && includes({}, .objectRef.resource))",
                            vrl_array(&gr.resources)
                        )
                    }
                })
                .collect(),
        ));
    }
    if !rule.non_resource_urls.is_empty() {
        terms.push(any_of(
            rule.non_resource_urls
                .iter()
                .map(|url| match url.strip_suffix('*') {
                    Some(prefix) => format!(
                        "starts_with(string(.requestURI) ?? \"\", {})",
                        quote(prefix)
                    ),
                    None => format!("(string(.requestURI) ?? \"\") == {}", quote(url)),
                })
                .collect(),
        ));
    }
    if terms.is_empty() {
        "true".to_string()
    } else {
        terms.join(" && ")
    }
}

/// Applies an API server audit policy to audit events.
///
/// Without rules every event keeps its full body. With rules, the first matching rule picks the
/// level and events matching no rule are dropped.
fn audit_policy(policy: &KubeApiAudit) -> String {
    let mut body = Vec::new();
    if !policy.omit_stages.is_empty() {
        body.push(format!(
            "if includes({}, .stage) {{ abort }}",
            vrl_array(&policy.omit_stages)
        ));
    }
    let codes = policy.omit_response_codes();
    if !codes.is_empty() {
        let codes = codes.iter().map(i32::to_string).collect::<Vec<_>>();
        body.push(format!(
            "if includes([{}], .responseStatus.code) {{ abort }}",
            codes.join(", ")
        ));
    }

    if policy.rules.is_empty() {
        body.push(format!("level = {}", quote(AuditLevel::RequestResponse.as_str())));
    } else {
        body.push(format!("level = {}", quote(AuditLevel::None.as_str())));
        let mut chain = String::new();
        for (i, rule) in policy.rules.iter().enumerate() {
            if i > 0 {
                chain.push_str(" else ");
            }
            chain.push_str(&format!("if {} {{\n", rule_condition(rule)));
            if !rule.omit_stages.is_empty() {
                chain.push_str(&format!(
                    "  if includes({}, .stage) {{ abort }}\n",
                    vrl_array(&rule.omit_stages)
                ));
            }
            chain.push_str(&format!("  level = {}\n}}", quote(rule.level.as_str())));
        }
        body.push(chain);
    }
    body.push("if level == \"None\" { abort }".to_string());
    body.push("if level == \"Metadata\" { del(.requestObject); del(.responseObject) }".to_string());
    body.push("if level == \"Request\" { del(.responseObject) }".to_string());
    body.push(".level = level".to_string());

    format!(
        "if is_string(.auditID) && is_string(.stage) {{\n{}\n}}",
        body.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::api::GroupResources;

    fn source(transform: &Transform) -> &str {
        transform.options["source"].as_str().unwrap()
    }

    #[test]
    fn drop_negates_test_disjunction() {
        let mut filter = FilterSpec::new("drop-debug", FilterType::Drop);
        filter.drop = vec![
            DropTest {
                conditions: vec![
                    DropCondition {
                        field: ".level".into(),
                        matches: Some("debug".into()),
                        not_matches: None,
                    },
                    DropCondition {
                        field: ".kubernetes.namespace_name".into(),
                        matches: None,
                        not_matches: Some("prod".into()),
                    },
                ],
            },
            DropTest {
                conditions: vec![DropCondition {
                    field: ".message".into(),
                    matches: Some("it's noise".into()),
                    not_matches: None,
                }],
            },
        ];
        let transform = transform("pipeline_p_drop_debug".into(), vec!["pipeline_p".into()], &filter);
        assert_eq!(transform.type_, "filter");
        assert_eq!(
            transform.options["condition"].as_str().unwrap(),
            r#"!((match(to_string(.level) ?? "", r'debug') && !match(to_string(.kubernetes.namespace_name) ?? "", r'prod')) || (match(to_string(.message) ?? "", r'it\'s noise')))"#
        );
    }

    #[test]
    fn prune_keeps_then_deletes() {
        let vrl = prune(&PruneFilterSpec {
            r#in: vec![".kubernetes.labels".into()],
            not_in: vec![".log_type".into(), ".kubernetes".into()],
        });
        assert_eq!(
            vrl,
            "kept = {}\nif exists(._internal) { kept._internal = ._internal }\nif exists(.log_type) { kept.log_type = .log_type }\nif exists(.kubernetes) { kept.kubernetes = .kubernetes }\n. = kept\ndel(.kubernetes.labels)"
        );
    }

    #[test]
    fn labels_merge_into_openshift_labels() {
        let transform = labels(
            "pipeline_p".into(),
            vec![],
            &BTreeMap::from([("env".to_string(), "prod".to_string())]),
        );
        assert_eq!(
            source(&transform),
            r#".openshift.labels = merge(object(.openshift.labels) ?? {}, {"env": "prod"})"#
        );
    }

    #[test]
    fn audit_policy_rules_chain() {
        let policy = KubeApiAudit {
            rules: vec![
                AuditPolicyRule {
                    level: AuditLevel::None,
                    users: vec!["system:kube-proxy".into()],
                    user_groups: vec![],
                    verbs: vec!["watch".into()],
                    resources: vec![],
                    namespaces: vec![],
                    non_resource_urls: vec![],
                    omit_stages: vec![],
                },
                AuditPolicyRule {
                    level: AuditLevel::Metadata,
                    users: vec![],
                    user_groups: vec![],
                    verbs: vec![],
                    resources: vec![GroupResources {
                        group: String::new(),
                        resources: vec!["secrets".into()],
                    }],
                    namespaces: vec![],
                    non_resource_urls: vec![],
                    omit_stages: vec!["RequestReceived".into()],
                },
            ],
            omit_stages: vec![],
            omit_response_codes: None,
        };
        let vrl = audit_policy(&policy);
        assert!(vrl.contains("if includes([404, 409, 422, 429], .responseStatus.code) { abort }"));
        assert!(vrl.contains(
            "if includes([\"system:kube-proxy\"], .user.username) && includes([\"watch\"], .verb) {\n  level = \"None\"\n} else if "
        ));
        assert!(vrl.contains("((string(.objectRef.apiGroup) ?? \"\") == \"\" && includes([\"secrets\"], .objectRef.resource))"));
        assert!(vrl.contains("  if includes([\"RequestReceived\"], .stage) { abort }\n"));
    }

    #[test]
    fn audit_policy_without_rules_keeps_events() {
        let vrl = audit_policy(&KubeApiAudit {
            omit_response_codes: Some(vec![]),
            ..Default::default()
        });
        assert!(vrl.contains("level = \"RequestResponse\""));
        assert!(!vrl.contains("responseStatus"));
    }
}
