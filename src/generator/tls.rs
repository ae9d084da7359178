//! The `tls` block shared by sinks and receiver sources.

use url::Url;

use super::{Options, elements::Tls};
use crate::{
    api::{ConfigMapOrSecretKey, OutputSpec, TlsSpec, constants::RECEIVER_TLS_DIR},
    secrets::{config_map_path, secret_path, secret_reference},
};

const SECURE_SCHEMES: [&str; 3] = ["https", "tls", "udps"];

pub fn is_secure(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| SECURE_SCHEMES.contains(&u.scheme()))
}

/// Mount path of a key that may live in either a config map or a secret.
pub fn mounted_path(key: &ConfigMapOrSecretKey) -> Option<String> {
    match (&key.secret_name, &key.config_map_name) {
        (Some(secret), _) => Some(secret_path(secret, &key.key)),
        (None, Some(config_map)) => Some(config_map_path(config_map, &key.key)),
        (None, None) => None,
    }
}

fn apply_files(tls: &mut Tls, spec: &TlsSpec) {
    if let (Some(key), Some(cert)) = (&spec.key, &spec.certificate) {
        tls.key_file = Some(secret_path(&key.secret_name, &key.key));
        tls.crt_file = mounted_path(cert);
        tls.key_pass = spec.key_passphrase.as_ref().map(secret_reference);
    }
    tls.ca_file = spec.ca.as_ref().and_then(mounted_path);
}

/// TLS settings for an output.
///
/// Nothing is emitted for a plain-text `url`. Outputs without a URL talk to cloud endpoints
/// and are treated as secure. `include_enabled` is for sinks whose TLS is off unless
/// `enabled = true` is set.
pub fn output_tls(
    output: &OutputSpec,
    url: Option<&str>,
    options: &Options,
    include_enabled: bool,
) -> Option<Tls> {
    if url.is_some_and(|url| !is_secure(url)) {
        return None;
    }
    let spec = output.tls.as_ref();
    let min_tls_version = spec
        .and_then(|s| s.min_tls_version.clone())
        .or_else(|| options.min_tls_version.clone());
    let ciphersuites = match spec {
        Some(s) if !s.ciphers.is_empty() => Some(s.ciphers.join(",")),
        _ => options.ciphersuites(),
    };
    if spec.is_none() && min_tls_version.is_none() && ciphersuites.is_none() {
        return None;
    }

    let mut tls = Tls {
        enabled: (include_enabled && spec.is_some()).then_some(true),
        min_tls_version,
        ciphersuites,
        ..Default::default()
    };
    if let Some(spec) = spec {
        if spec.insecure_skip_verify {
            tls.verify_certificate = Some(false);
            tls.verify_hostname = Some(false);
        }
        apply_files(&mut tls, &spec.tls);
    }
    Some(tls)
}

/// TLS settings for a receiver input. Receivers always serve TLS, falling back to the serving
/// certificate mounted for the input.
pub fn receiver_tls(input: &str, spec: Option<&TlsSpec>, options: &Options) -> Tls {
    let mut tls = Tls {
        enabled: Some(true),
        min_tls_version: options.min_tls_version.clone(),
        ciphersuites: options.ciphersuites(),
        ..Default::default()
    };
    match spec {
        Some(spec) if spec.key.is_some() && spec.certificate.is_some() => apply_files(&mut tls, spec),
        _ => {
            tls.key_file = Some(format!("{RECEIVER_TLS_DIR}/{input}/tls.key"));
            tls.crt_file = Some(format!("{RECEIVER_TLS_DIR}/{input}/tls.crt"));
            tls.ca_file = spec.and_then(|s| s.ca.as_ref()).and_then(mounted_path);
        }
    }
    tls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{OutputTlsSpec, OutputType, SecretKey};

    fn output(tls: Option<OutputTlsSpec>) -> OutputSpec {
        let mut output = OutputSpec::new("es", OutputType::Elasticsearch);
        output.tls = tls;
        output
    }

    fn secret_key(secret: &str, key: &str) -> ConfigMapOrSecretKey {
        ConfigMapOrSecretKey {
            config_map_name: None,
            secret_name: Some(secret.into()),
            key: key.into(),
        }
    }

    #[test]
    fn plain_text_urls_have_no_tls() {
        let options = Options {
            min_tls_version: Some("VersionTLS12".into()),
            ..Default::default()
        };
        assert_eq!(output_tls(&output(None), Some("http://es:9200"), &options, false), None);
        assert_eq!(output_tls(&output(None), Some("https://es:9200"), &Options::default(), false), None);

        let tls = output_tls(&output(None), Some("https://es:9200"), &options, false).unwrap();
        assert_eq!(tls.min_tls_version.as_deref(), Some("VersionTLS12"));
        assert_eq!(tls.enabled, None);
    }

    #[test]
    fn key_and_cert_require_each_other() {
        let spec = OutputTlsSpec {
            tls: TlsSpec {
                ca: Some(secret_key("es-tls", "ca-bundle.crt")),
                certificate: None,
                key: Some(SecretKey::new("es-tls", "tls.key")),
                key_passphrase: Some(SecretKey::new("es-tls", "passphrase")),
            },
            insecure_skip_verify: true,
            ..Default::default()
        };
        let tls = output_tls(&output(Some(spec.clone())), Some("https://es:9200"), &Options::default(), true)
            .unwrap();
        assert_eq!(tls.enabled, Some(true));
        assert_eq!(tls.verify_certificate, Some(false));
        assert_eq!(tls.verify_hostname, Some(false));
        assert_eq!(tls.key_file, None);
        assert_eq!(tls.key_pass, None);
        assert_eq!(
            tls.ca_file.as_deref(),
            Some("/var/run/ocp-collector/secrets/es-tls/ca-bundle.crt")
        );

        let mut complete = spec;
        complete.tls.certificate = Some(secret_key("es-tls", "tls.crt"));
        let tls = output_tls(&output(Some(complete)), None, &Options::default(), false).unwrap();
        assert_eq!(
            tls.key_file.as_deref(),
            Some("/var/run/ocp-collector/secrets/es-tls/tls.key")
        );
        assert_eq!(
            tls.key_pass.as_deref(),
            Some("SECRET[kubernetes_secret.es-tls/passphrase]")
        );
    }

    #[test]
    fn receivers_fall_back_to_serving_certs() {
        let tls = receiver_tls("http_audit", None, &Options::default());
        assert_eq!(tls.enabled, Some(true));
        assert_eq!(
            tls.crt_file.as_deref(),
            Some("/etc/collector/receiver/http_audit/tls.crt")
        );
    }
}
