use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// `levels` is an `EnvFilter` directive string such as `log_forwarder_operator=debug,kube=info`.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Ignore errors when setting, since tests can initialize this multiple times.
    let _ = if json {
        registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(color).with_target(false))
            .try_init()
    };
}

/// Filter directives for the crates whose logs matter when running at `level`.
pub fn directives(level: &str) -> String {
    if level == "off" {
        return level.to_owned();
    }
    [
        format!("log_forwarder_operator={level}"),
        format!("kube={}", quieter(level)),
        format!("kube_runtime={level}"),
        "hyper=warn".to_owned(),
    ]
    .join(",")
}

/// The client library is chatty at debug and below.
fn quieter(level: &str) -> &str {
    match level {
        "trace" | "debug" => "info",
        level => level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_for_level() {
        assert_eq!(directives("off"), "off");
        assert_eq!(
            directives("debug"),
            "log_forwarder_operator=debug,kube=info,kube_runtime=debug,hyper=warn"
        );
        assert!(directives("warn").contains("kube=warn"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false, false, "info");
        init(false, true, "not a filter ===");
    }
}
