//! Component identifiers.
//!
//! Ids must stay stable across reconciles of an unchanged spec: the collector rollout is gated on
//! the hash of the rendered config.

/// Lowercases `name` and replaces every character the collector does not accept in a component
/// id with `_`.
pub fn format_component_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn input_id(name: &str) -> String {
    format!("input_{}", format_component_id(name))
}

pub fn output_id(name: &str) -> String {
    format!("output_{}", format_component_id(name))
}

pub fn pipeline_id(name: &str) -> String {
    format!("pipeline_{}", format_component_id(name))
}

pub fn filter_id(pipeline: &str, filter: &str) -> String {
    format!(
        "pipeline_{}_{}",
        format_component_id(pipeline),
        format_component_id(filter)
    )
}

/// `base` plus a suffix such as `throttle` or `normalize_streams`.
pub fn with_suffix(base: &str, suffix: &str) -> String {
    format!("{base}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_normalized() {
        assert_eq!(format_component_id("My-Output.1"), "my_output_1");
        assert_eq!(output_id("es/prod"), "output_es_prod");
        assert_eq!(input_id("application"), "input_application");
        assert_eq!(filter_id("all-logs", "drop-debug"), "pipeline_all_logs_drop_debug");
        assert_eq!(with_suffix("output_cw", "throttle"), "output_cw_throttle");
    }
}
