use super::{Component, ValidationError, ValidationErrors};
use crate::{
    api::{InputSource, InputSpec, ReceiverType, SecretKey, TlsSpec},
    secrets::Secrets,
};

const HTTP_RECEIVER_FORMAT: &str = "kubeAPIAudit";

pub(super) fn validate(input: &InputSpec, secrets: &Secrets, errors: &mut ValidationErrors) {
    let mut fail = |message: String| {
        errors.push(ValidationError::new(Component::Input, &input.name, message));
    };

    if input.variants_set() > 1 {
        fail("exactly one of application, infrastructure, audit or receiver may be set".into());
        return;
    }
    let Some(source) = input.source() else {
        fail(format!(
            "input of type {} must set the {} block",
            input.type_.as_str(),
            input.type_.as_str()
        ));
        return;
    };

    match source {
        InputSource::Application(app) => {
            for spec in app.includes.iter().chain(&app.excludes) {
                if spec.namespace.as_deref().unwrap_or_default().is_empty()
                    && spec.container.as_deref().unwrap_or_default().is_empty()
                {
                    fail("includes and excludes must name a namespace or a container".into());
                }
            }
            if let Some(limit) = app
                .tuning
                .as_ref()
                .and_then(|t| t.rate_limit_per_container.as_ref())
            {
                if limit.max_records_per_second <= 0 {
                    fail("rateLimitPerContainer must be positive".into());
                }
            }
        }
        InputSource::Receiver(receiver) => {
            if !(1024..=65535).contains(&receiver.port) {
                fail(format!(
                    "receiver port {} must be between 1024 and 65535",
                    receiver.port
                ));
            }
            match receiver.type_ {
                ReceiverType::Http => match &receiver.http {
                    Some(http) if http.format == HTTP_RECEIVER_FORMAT => {}
                    Some(http) => fail(format!(
                        "unsupported http receiver format {:?}",
                        http.format
                    )),
                    None => fail(format!(
                        "http receivers must set http.format to {HTTP_RECEIVER_FORMAT}"
                    )),
                },
                ReceiverType::Syslog if receiver.http.is_some() => {
                    fail("syslog receivers may not set http".into())
                }
                ReceiverType::Syslog => {}
            }
            if let Some(tls) = &receiver.tls {
                for message in tls_problems(tls, secrets) {
                    fail(message);
                }
            }
        }
        InputSource::Infrastructure(_) | InputSource::Audit(_) => {}
    }
}

/// Missing secret material and incomplete key pairs in a TLS block.
pub(super) fn tls_problems(tls: &TlsSpec, secrets: &Secrets) -> Vec<String> {
    let mut problems = Vec::new();
    if tls.key.is_some() != tls.certificate.is_some() {
        problems.push("tls.key and tls.certificate must be set together".to_string());
    }
    if tls.key_passphrase.is_some() && tls.key.is_none() {
        problems.push("tls.keyPassphrase requires tls.key".to_string());
    }
    for (field, reference) in [("ca", &tls.ca), ("certificate", &tls.certificate)] {
        let Some(reference) = reference else { continue };
        match (&reference.config_map_name, &reference.secret_name) {
            (Some(_), Some(_)) | (None, None) => problems.push(format!(
                "tls.{field} must name exactly one of configMapName or secretName"
            )),
            (None, Some(secret)) => {
                if let Some(problem) =
                    missing_key(&SecretKey::new(secret.as_str(), &reference.key), secrets)
                {
                    problems.push(problem);
                }
            }
            // Config maps are mounted as-is; a missing key fails the pod, not the spec.
            (Some(_), None) => {}
        }
    }
    for key in tls.key.iter().chain(&tls.key_passphrase) {
        if let Some(problem) = missing_key(key, secrets) {
            problems.push(problem);
        }
    }
    problems
}

pub(super) fn missing_key(key: &SecretKey, secrets: &Secrets) -> Option<String> {
    if key.secret_name.is_empty() || key.key.is_empty() {
        return Some("secret references must name a secret and a key".to_string());
    }
    if !secrets.contains_secret(&key.secret_name) {
        return Some(format!("secret {:?} not found", key.secret_name));
    }
    if !secrets.has(key) {
        return Some(format!(
            "secret {:?} has no key {:?}",
            key.secret_name, key.key
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::api::{
        Application, ConfigMapOrSecretKey, HttpReceiver, InputType, NamespaceContainerSpec,
        ReceiverSpec,
    };

    fn check(input: &InputSpec, secrets: &Secrets) -> Vec<String> {
        let mut errors = ValidationErrors::default();
        validate(input, secrets, &mut errors);
        errors.iter().map(|e| e.message.clone()).collect()
    }

    fn receiver(type_: ReceiverType, port: i32) -> InputSpec {
        InputSpec {
            name: "rcv".into(),
            type_: InputType::Receiver,
            application: None,
            infrastructure: None,
            audit: None,
            receiver: Some(ReceiverSpec {
                type_,
                port,
                tls: None,
                http: None,
            }),
        }
    }

    #[test]
    fn exactly_one_variant() {
        let mut input = receiver(ReceiverType::Syslog, 10514);
        input.application = Some(Application::default());
        assert_eq!(check(&input, &Secrets::new()).len(), 1);

        input.application = None;
        input.receiver = None;
        assert_eq!(
            check(&input, &Secrets::new()),
            vec!["input of type receiver must set the receiver block"]
        );
    }

    #[test]
    fn variant_must_match_type() {
        let mut input = InputSpec::reserved("application").unwrap();
        input.name = "mine".into();
        input.audit = Some(Default::default());
        assert_eq!(check(&input, &Secrets::new()).len(), 1);
    }

    #[test]
    fn application_globs_need_a_target() {
        let mut input = InputSpec::reserved("application").unwrap();
        input.name = "mine".into();
        input.application = Some(Application {
            includes: vec![NamespaceContainerSpec::default()],
            ..Default::default()
        });
        assert_eq!(check(&input, &Secrets::new()).len(), 1);
    }

    #[test]
    fn receivers() {
        assert_eq!(check(&receiver(ReceiverType::Syslog, 80), &Secrets::new()).len(), 1);

        let mut http = receiver(ReceiverType::Http, 8443);
        assert_eq!(check(&http, &Secrets::new()).len(), 1);
        http.receiver.as_mut().unwrap().http = Some(HttpReceiver {
            format: "kubeAPIAudit".into(),
        });
        assert!(check(&http, &Secrets::new()).is_empty());
    }

    #[test]
    fn tls_secrets_must_exist() {
        let tls = TlsSpec {
            ca: Some(ConfigMapOrSecretKey {
                config_map_name: None,
                secret_name: Some("certs".into()),
                key: "ca.crt".into(),
            }),
            key: Some(SecretKey::new("certs", "tls.key")),
            ..Default::default()
        };
        let mut secrets = Secrets::new();
        secrets.insert(
            "certs",
            BTreeMap::from([("ca.crt".to_string(), b"---".to_vec())]),
        );
        let problems = tls_problems(&tls, &secrets);
        assert_eq!(
            problems,
            vec![
                "tls.key and tls.certificate must be set together".to_string(),
                "secret \"certs\" has no key \"tls.key\"".to_string(),
            ]
        );
    }
}
