use std::sync::LazyLock;

use regex::Regex;
use snafu::ResultExt;
use toml::Value;
use url::Url;

use super::{Adapter, Context, encoding};
use crate::{
    api::{Syslog, SyslogEnrichment, SyslogRfc},
    generator::{
        GeneratorError, InvalidUrlSnafu,
        elements::{Element, Sink, Transform},
        template::{has_placeholders, quote, transform_user_template},
        tls::output_tls,
    },
};

const DEFAULT_PORT: u16 = 514;

/// A record field written as a `$`-prefixed path, e.g. `$.message.facility`.
static FIELD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$(\.[[:word:]]*)+$").expect("field path regex is valid"));

fn encoding_value(value: &str) -> String {
    if FIELD_PATH.is_match(value) {
        value.to_string()
    } else if value == "tag" {
        "${tag}".to_string()
    } else if has_placeholders(value) {
        transform_user_template(value)
    } else {
        value.to_string()
    }
}

const NODE: &str = r#".log_type == "infrastructure" && .log_source == "node""#;
const CONTAINER: &str = r#".log_source == "container""#;
const AUDIT: &str = r#".log_type == "audit""#;

const CONTAINER_TAG: &str = r#"._internal.syslog.tag = join!([.kubernetes.namespace_name, .kubernetes.pod_name, .kubernetes.container_name], "")
._internal.syslog.tag = replace(._internal.syslog.tag, r'[^a-zA-Z0-9]', "")
._internal.syslog.tag = truncate(._internal.syslog.tag, 32)"#;
const CONTAINER_SEVERITY: &str = "._internal.syslog.severity = .level";
const CONTAINER_FACILITY: &str = r#"._internal.syslog.facility = "user""#;
const AUDIT_SEVERITY: &str = r#"._internal.syslog.severity = "informational""#;
const AUDIT_FACILITY: &str = r#"._internal.syslog.facility = "security""#;

/// RFC3164 appends the process id to a generated tag.
const TAG_PROC_ID: &str = r#"if exists(.proc_id) && .proc_id != "-" && .proc_id != "" {
  .tag = to_string!(.tag) + "[" + to_string!(.proc_id) + "]"
}"#;

/// Header values assigned to one kind of record when the output leaves them unset.
struct Rule {
    condition: &'static str,
    app_name: &'static str,
    proc_id: &'static str,
    severity: &'static str,
    facility: &'static str,
}

fn rules(rfc: SyslogRfc) -> [Rule; 3] {
    match rfc {
        SyslogRfc::Rfc3164 => [
            Rule {
                condition: NODE,
                app_name: r#"._internal.syslog.tag = to_string!(.systemd.u.SYSLOG_IDENTIFIER || "")"#,
                proc_id: r#"._internal.syslog.proc_id = to_string!(.systemd.t.PID || "")"#,
                severity: "",
                facility: "",
            },
            Rule {
                condition: CONTAINER,
                app_name: CONTAINER_TAG,
                proc_id: "",
                severity: CONTAINER_SEVERITY,
                facility: CONTAINER_FACILITY,
            },
            Rule {
                condition: AUDIT,
                app_name: "._internal.syslog.tag = .log_source",
                proc_id: "",
                severity: AUDIT_SEVERITY,
                facility: AUDIT_FACILITY,
            },
        ],
        SyslogRfc::Rfc5424 => [
            Rule {
                condition: NODE,
                app_name: r#"._internal.syslog.app_name = to_string!(.systemd.u.SYSLOG_IDENTIFIER || "-")"#,
                proc_id: r#"._internal.syslog.proc_id = to_string!(.systemd.t.PID || "-")"#,
                severity: "",
                facility: "",
            },
            Rule {
                condition: CONTAINER,
                app_name: r#"._internal.syslog.app_name = join!([.kubernetes.namespace_name, .kubernetes.pod_name, .kubernetes.container_name], "_")"#,
                proc_id: r#"._internal.syslog.proc_id = to_string!(.kubernetes.pod_id || "-")"#,
                severity: CONTAINER_SEVERITY,
                facility: CONTAINER_FACILITY,
            },
            Rule {
                condition: AUDIT,
                app_name: "._internal.syslog.app_name = .log_source",
                proc_id: r#"._internal.syslog.proc_id = to_string!(.auditID || "-")"#,
                severity: AUDIT_SEVERITY,
                facility: AUDIT_FACILITY,
            },
        ],
    }
}

fn unset(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

/// Header fields the output leaves unset, with their fallback values.
///
/// RFC3164 carries the application name as `tag` and has no message id.
fn defaulted_fields(syslog: &Syslog) -> Vec<(&'static str, &'static str)> {
    let mut fields = Vec::new();
    for (field, value, fallback) in [
        ("facility", &syslog.facility, "user"),
        ("severity", &syslog.severity, "informational"),
        ("proc_id", &syslog.proc_id, "-"),
    ] {
        if unset(value) {
            fields.push((field, fallback));
        }
    }
    match syslog.rfc {
        SyslogRfc::Rfc3164 => {
            if unset(&syslog.app_name) {
                fields.push(("tag", ""));
            }
        }
        SyslogRfc::Rfc5424 => {
            if unset(&syslog.app_name) {
                fields.push(("app_name", "-"));
            }
            if unset(&syslog.msg_id) {
                fields.push(("msg_id", "-"));
            }
        }
    }
    fields
}

/// Remap source that fills in per-source header defaults for the syslog encoder.
fn parse_encoding(syslog: &Syslog) -> String {
    let mut lines = Vec::new();
    if syslog.rfc == SyslogRfc::Rfc5424 {
        lines.push("._internal.syslog.msg_id = .log_source".to_string());
    }
    for rule in rules(syslog.rfc) {
        let assignments: Vec<&str> = [
            (rule.app_name, &syslog.app_name),
            (rule.proc_id, &syslog.proc_id),
            (rule.severity, &syslog.severity),
            (rule.facility, &syslog.facility),
        ]
        .into_iter()
        .filter(|(line, value)| !line.is_empty() && unset(value))
        .map(|(line, _)| line)
        .collect();
        if !assignments.is_empty() {
            lines.push(format!("if {} {{\n{}\n}}", rule.condition, assignments.join("\n")));
        }
    }
    for (field, fallback) in defaulted_fields(syslog) {
        lines.push(format!(
            ".{field} = to_string!(._internal.syslog.{field} || {})",
            quote(fallback)
        ));
    }
    if syslog.rfc == SyslogRfc::Rfc3164 && unset(&syslog.app_name) {
        lines.push(TAG_PROC_ID.to_string());
    }
    lines.join("\n")
}

/// Socket mode and whether the transport is encrypted.
fn mode(scheme: &str) -> (&'static str, bool) {
    match scheme {
        "udp" => ("udp", false),
        "udps" => ("udp", true),
        "tls" => ("tcp", true),
        _ => ("tcp", false),
    }
}

impl Adapter for Syslog {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let url = Url::parse(&self.url).context(InvalidUrlSnafu {
            output: cx.output.name.as_str(),
            url: self.url.as_str(),
        })?;
        let (mode, secure) = mode(url.scheme());
        let address = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port().unwrap_or(DEFAULT_PORT)
        );

        let parse = Transform::remap(
            cx.element_id("parse_encoding"),
            cx.inputs.clone(),
            parse_encoding(self),
        );

        let mut codec = encoding("syslog");
        codec.insert("rfc".into(), self.rfc.as_lowercase().into());
        if self.enrichment == SyslogEnrichment::KubernetesMinimal {
            codec.insert("add_log_source".into(), true.into());
        }
        for (field, _) in defaulted_fields(self) {
            codec.insert(field.into(), Value::String(format!("$.message.{field}")));
        }
        for (key, value) in [
            ("facility", &self.facility),
            ("severity", &self.severity),
            ("app_name", &self.app_name),
            ("proc_id", &self.proc_id),
            ("msg_id", &self.msg_id),
            ("payload_key", &self.payload_key),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                codec.insert(key.into(), Value::String(encoding_value(value)));
            }
        }

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![parse.id.clone()])
            .with("address", address)
            .with("mode", mode)
            .encoding(codec);
        // Sockets have no batch or request settings.
        sink.buffer = Some(Default::default());
        if secure {
            let mut tls = output_tls(cx.output, Some(&self.url), cx.options, true).unwrap_or_default();
            tls.enabled = Some(true);
            sink.tls = Some(tls);
        }

        Ok(vec![parse.into(), cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "socket"
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        api::{OutputSpec, OutputType},
        generator::outputs::tests::{adapt, render},
        secrets::Secrets,
    };

    fn output(url: &str) -> OutputSpec {
        let mut output = OutputSpec::new("remote", OutputType::Syslog);
        output.syslog = Some(Syslog {
            url: url.into(),
            rfc: SyslogRfc::Rfc5424,
            facility: Some("$.message.facility".into()),
            severity: Some("$.message.severity".into()),
            app_name: Some(r#"{.app_name||"none"}"#.into()),
            ..Default::default()
        });
        output
    }

    #[test]
    fn tls_with_field_references() {
        let sink = render(&adapt(&output("tls://logserver:6514"), &Secrets::new()), "output_remote");
        assert_eq!(sink["type"].as_str(), Some("socket"));
        assert_eq!(sink["mode"].as_str(), Some("tcp"));
        assert_eq!(sink["address"].as_str(), Some("logserver:6514"));
        assert_eq!(sink["tls"]["enabled"].as_bool(), Some(true));

        let encoding = &sink["encoding"];
        assert_eq!(encoding["codec"].as_str(), Some("syslog"));
        assert_eq!(encoding["rfc"].as_str(), Some("rfc5424"));
        assert_eq!(encoding["facility"].as_str(), Some("$.message.facility"));
        assert_eq!(encoding["severity"].as_str(), Some("$.message.severity"));
        assert_eq!(
            encoding["app_name"].as_str(),
            Some(r#"to_string!(._internal.app_name||"none")"#)
        );
    }

    #[test]
    fn plain_udp_has_no_tls() {
        let sink = render(&adapt(&output("udp://logserver"), &Secrets::new()), "output_remote");
        assert_eq!(sink["mode"].as_str(), Some("udp"));
        assert_eq!(sink["address"].as_str(), Some("logserver:514"));
        assert!(!sink.contains_key("tls"));
    }

    #[test]
    fn sink_reads_the_defaults_remap() {
        let elements = adapt(&output("tcp://logserver:514"), &Secrets::new());
        let remap = render(&elements, "output_remote_parse_encoding");
        assert_eq!(remap["type"].as_str(), Some("remap"));
        assert_eq!(remap["inputs"].as_array().unwrap()[0].as_str(), Some("pipeline_p"));
        let sink = render(&elements, "output_remote");
        assert_eq!(
            sink["inputs"].as_array().unwrap()[0].as_str(),
            Some("output_remote_parse_encoding")
        );
    }

    #[test]
    fn rfc5424_defaults_unset_fields_per_source() {
        let syslog = Syslog {
            url: "tcp://logserver:514".into(),
            rfc: SyslogRfc::Rfc5424,
            severity: Some("$.message.severity".into()),
            ..Default::default()
        };
        let source = parse_encoding(&syslog);
        assert!(source.starts_with("._internal.syslog.msg_id = .log_source\n"));
        assert!(source.contains(r#"._internal.syslog.app_name = join!([.kubernetes.namespace_name, .kubernetes.pod_name, .kubernetes.container_name], "_")"#));
        assert!(source.contains(r#"._internal.syslog.proc_id = to_string!(.auditID || "-")"#));
        assert!(source.contains(r#"._internal.syslog.facility = "security""#));
        assert!(!source.contains("._internal.syslog.severity"));
        assert!(source.contains(r#".app_name = to_string!(._internal.syslog.app_name || "-")"#));
        assert!(source.contains(r#".msg_id = to_string!(._internal.syslog.msg_id || "-")"#));
        assert!(!source.contains(".tag"));

        let fields: Vec<_> = defaulted_fields(&syslog).into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, ["facility", "proc_id", "app_name", "msg_id"]);
    }

    #[test]
    fn rfc3164_builds_a_tag_with_the_process_id() {
        let mut output = output("udp://logserver");
        output.syslog = Some(Syslog {
            url: "udp://logserver".into(),
            rfc: SyslogRfc::Rfc3164,
            enrichment: SyslogEnrichment::KubernetesMinimal,
            ..Default::default()
        });
        let elements = adapt(&output, &Secrets::new());

        let remap = render(&elements, "output_remote_parse_encoding");
        let source = remap["source"].as_str().unwrap();
        assert!(!source.contains("msg_id"));
        assert!(source.contains(r#"._internal.syslog.tag = to_string!(.systemd.u.SYSLOG_IDENTIFIER || "")"#));
        assert!(source.contains("._internal.syslog.tag = truncate(._internal.syslog.tag, 32)"));
        assert!(source.contains(r#".tag = to_string!(._internal.syslog.tag || "")"#));
        assert!(source.ends_with(TAG_PROC_ID));

        let sink = render(&elements, "output_remote");
        let encoding = &sink["encoding"];
        assert_eq!(encoding["rfc"].as_str(), Some("rfc3164"));
        assert_eq!(encoding["add_log_source"].as_bool(), Some(true));
        assert_eq!(encoding["tag"].as_str(), Some("$.message.tag"));
        assert_eq!(encoding["facility"].as_str(), Some("$.message.facility"));
        assert!(!encoding.as_table().unwrap().contains_key("app_name"));
    }

    #[test]
    fn user_values_skip_the_defaults() {
        let syslog = Syslog {
            url: "tcp://logserver:514".into(),
            rfc: SyslogRfc::Rfc3164,
            facility: Some("local0".into()),
            severity: Some("error".into()),
            app_name: Some("myapp".into()),
            proc_id: Some("1".into()),
            ..Default::default()
        };
        assert!(defaulted_fields(&syslog).is_empty());
        assert_eq!(parse_encoding(&syslog), "");
    }

    #[rstest]
    #[case("$.message.facility", "$.message.facility")]
    #[case("$.a_b.c1", "$.a_b.c1")]
    #[case("tag", "${tag}")]
    #[case("local0", "local0")]
    #[case("$.message facility", "$.message facility")]
    #[case("app-{.kubernetes.pod_name}", r#""app-" + to_string!(._internal.kubernetes.pod_name)"#)]
    fn encoding_values(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(encoding_value(value), expected);
    }
}
