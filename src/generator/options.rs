use std::collections::BTreeMap;

use snafu::ensure;

use super::{GeneratorError, UnknownOptionSnafu};
use crate::api::{
    ClusterLogForwarder,
    constants::{
        ANNOTATION_COLLECTOR_AS_DEPLOYMENT, ANNOTATION_DEBUG_OUTPUT, ANNOTATION_OLD_REMOTE_SYSLOG,
        ANNOTATION_OTLP, ANNOTATION_PREFIX, COLLECTOR_TOKEN_SECRET,
    },
};

const KNOWN_ANNOTATIONS: [&str; 4] = [
    ANNOTATION_DEBUG_OUTPUT,
    ANNOTATION_OLD_REMOTE_SYSLOG,
    ANNOTATION_OTLP,
    ANNOTATION_COLLECTOR_AS_DEPLOYMENT,
];

/// Knobs that change how the config is generated without being part of the forwarder spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Replace every sink with a file sink under the debug directory.
    pub debug: bool,
    /// Cluster-wide minimum TLS version, e.g. `VersionTLS12`.
    pub min_tls_version: Option<String>,
    /// Cluster-wide cipher list.
    pub ciphers: Vec<String>,
    /// Allow `otlp` outputs.
    pub otlp: bool,
    pub forwarder_name: String,
    /// Secret holding the collector's service account token.
    pub token_secret: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            min_tls_version: None,
            ciphers: Vec::new(),
            otlp: false,
            forwarder_name: String::new(),
            token_secret: COLLECTOR_TOKEN_SECRET.to_string(),
        }
    }
}

impl Options {
    /// Reads the option annotations of a forwarder.
    ///
    /// Annotations under the operator's prefix that the generator does not know are rejected.
    pub fn from_annotations(
        annotations: Option<&BTreeMap<String, String>>,
    ) -> Result<Self, GeneratorError> {
        let mut options = Self::default();
        for (key, value) in annotations.into_iter().flatten() {
            if !key.starts_with(ANNOTATION_PREFIX) {
                continue;
            }
            ensure!(
                KNOWN_ANNOTATIONS.contains(&key.as_str()),
                UnknownOptionSnafu { key: key.clone() }
            );
            match key.as_str() {
                ANNOTATION_DEBUG_OUTPUT => options.debug = value.eq_ignore_ascii_case("true"),
                ANNOTATION_OTLP => options.otlp = value.eq_ignore_ascii_case("enabled"),
                _ => {}
            }
        }
        Ok(options)
    }

    /// Options for generating the config of `forwarder` under the cluster TLS profile.
    pub fn for_forwarder(
        forwarder: &ClusterLogForwarder,
        min_tls_version: Option<String>,
        ciphers: Vec<String>,
    ) -> Result<Self, GeneratorError> {
        let mut options = Self::from_annotations(forwarder.metadata.annotations.as_ref())?;
        options.forwarder_name = forwarder.metadata.name.clone().unwrap_or_default();
        options.token_secret = forwarder.token_secret_name();
        options.min_tls_version = min_tls_version;
        options.ciphers = ciphers;
        Ok(options)
    }

    pub fn ciphersuites(&self) -> Option<String> {
        (!self.ciphers.is_empty()).then(|| self.ciphers.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn known_annotations() {
        let options = Options::from_annotations(Some(&annotations(&[
            (ANNOTATION_DEBUG_OUTPUT, "true"),
            (ANNOTATION_OTLP, "enabled"),
            ("kubectl.kubernetes.io/last-applied-configuration", "{}"),
        ])))
        .unwrap();
        assert!(options.debug);
        assert!(options.otlp);
        assert_eq!(options.token_secret, COLLECTOR_TOKEN_SECRET);
    }

    #[test]
    fn unknown_annotation_is_rejected() {
        let error = Options::from_annotations(Some(&annotations(&[(
            "observability.openshift.io/log-level",
            "debug",
        )])))
        .unwrap_err();
        assert!(matches!(error, GeneratorError::UnknownOption { .. }));
        assert!(error.is_user_error());
    }

    #[test]
    fn ciphersuites_are_comma_joined() {
        let options = Options {
            ciphers: vec!["TLS_AES_128_GCM_SHA256".into(), "TLS_AES_256_GCM_SHA384".into()],
            ..Default::default()
        };
        assert_eq!(
            options.ciphersuites().as_deref(),
            Some("TLS_AES_128_GCM_SHA256,TLS_AES_256_GCM_SHA384")
        );
        assert_eq!(Options::default().ciphersuites(), None);
    }
}
