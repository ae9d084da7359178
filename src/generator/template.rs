//! User templates such as `app-{.kubernetes.namespace_name||"none"}`.
//!
//! A template is turned into a remap expression that concatenates quoted literal segments with
//! `to_string!(._internal<path>)` lookups. The result is stored under `._internal.<field>` so
//! the sink can reference it as `{{ _internal.<field> }}`.

use std::sync::LazyLock;

use regex::Regex;

use super::elements::Transform;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid"));

static STRFTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^@timestamp\|strftime:"([^"]+)"$"#).expect("strftime regex is valid")
});

/// Quotes `literal` as a remap string.
pub fn quote(literal: &str) -> String {
    let mut quoted = String::with_capacity(literal.len() + 2);
    quoted.push('"');
    for c in literal.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\u{{{:04x}}}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn timestamp_format(placeholder: &str) -> Option<String> {
    let format = match placeholder {
        "@timestamp|year" => "%Y",
        "@timestamp|month" => "%m",
        "@timestamp|day" => "%d",
        "@timestamp|hour" => "%H",
        "@timestamp|minute" => "%M",
        "@timestamp|date" => "%Y-%m-%d",
        "@timestamp|datetime" => "%Y-%m-%d_%H-%M-%S",
        other => {
            return STRFTIME
                .captures(other)
                .map(|caps| caps[1].to_string());
        }
    };
    Some(format.to_string())
}

fn expression(placeholder: &str) -> String {
    match timestamp_format(placeholder) {
        Some(format) => format!(
            "format_timestamp!(.timestamp || now(), format: {})",
            quote(&format)
        ),
        None => format!("to_string!(._internal{placeholder})"),
    }
}

/// Converts a user template into a remap expression.
///
/// A template without placeholders becomes its quoted literal.
pub fn transform_user_template(template: &str) -> String {
    let mut parts = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            parts.push(quote(&template[last..whole.start()]));
        }
        parts.push(expression(inner.as_str()));
        last = whole.end();
    }
    if parts.is_empty() {
        return quote(template);
    }
    if last < template.len() {
        parts.push(quote(&template[last..]));
    }
    parts.join(" + ")
}

pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

/// A remap that stores the expanded template in `._internal.<field>`.
pub fn template_remap(id: String, inputs: Vec<String>, template: &str, field: &str) -> Transform {
    Transform::remap(
        id,
        inputs,
        format!("._internal.{field} = {}", transform_user_template(template)),
    )
}

/// How the sink refers to the field set by [`template_remap`].
pub fn field_reference(field: &str) -> String {
    format!("{{{{ _internal.{field} }}}}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn placeholders_become_lookups() {
        assert_eq!(
            transform_user_template(r#"{.log_type||"missing"}-foo"#),
            r#"to_string!(._internal.log_type||"missing") + "-foo""#
        );
        assert_eq!(
            transform_user_template(r#"app-{.kubernetes.namespace_name||"none"}_{.level}"#),
            r#""app-" + to_string!(._internal.kubernetes.namespace_name||"none") + "_" + to_string!(._internal.level)"#
        );
    }

    #[test]
    fn timestamp_patterns() {
        assert_eq!(
            transform_user_template("logs-{@timestamp|date}"),
            r#""logs-" + format_timestamp!(.timestamp || now(), format: "%Y-%m-%d")"#
        );
        assert_eq!(
            transform_user_template(r#"{@timestamp|strftime:"%Y/%j"}"#),
            r#"format_timestamp!(.timestamp || now(), format: "%Y/%j")"#
        );
    }

    #[test]
    fn remap_and_reference() {
        let remap = template_remap(
            "output_s3_key_prefix".into(),
            vec!["pipeline_a".into()],
            "{.log_type}/",
            "key_prefix",
        );
        assert_eq!(
            remap.options["source"].as_str(),
            Some(r#"._internal.key_prefix = to_string!(._internal.log_type) + "/""#)
        );
        assert_eq!(field_reference("key_prefix"), "{{ _internal.key_prefix }}");
    }

    proptest! {
        #[test]
        fn literals_quote_to_themselves(literal in "[^{}]*") {
            prop_assert_eq!(transform_user_template(&literal), quote(&literal));
        }
    }
}
