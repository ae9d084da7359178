use url::Url;

use super::{
    Component, ValidationError, ValidationErrors,
    inputs::{missing_key, tls_problems},
};
use crate::{
    api::{AwsAuthentication, BearerToken, OutputConfig, OutputSpec, OutputType},
    generator::{Options, auth::parse_role_arn},
    quantity,
    secrets::Secrets,
};

const HTTP_SCHEMES: &[&str] = &["http", "https"];
const SYSLOG_SCHEMES: &[&str] = &["tcp", "tls", "udp", "udps"];
const KAFKA_SCHEMES: &[&str] = &["tcp", "tls"];
const SECURE_SCHEMES: &[&str] = &["https", "tls", "udps"];

const HTTP_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "TRACE", "PATCH"];
const SASL_MECHANISMS: &[&str] = &["PLAIN", "SCRAM-SHA-256", "SCRAM-SHA-512"];

/// URL schemes accepted by an output type. `None` means the type takes no URL.
pub(super) fn schemes(type_: OutputType) -> Option<&'static [&'static str]> {
    match type_ {
        OutputType::Elasticsearch
        | OutputType::Http
        | OutputType::Loki
        | OutputType::Otlp
        | OutputType::Splunk
        | OutputType::Cloudwatch
        | OutputType::S3 => Some(HTTP_SCHEMES),
        OutputType::Syslog => Some(SYSLOG_SCHEMES),
        OutputType::Kafka => Some(KAFKA_SCHEMES),
        OutputType::FluentdForward => Some(KAFKA_SCHEMES),
        OutputType::AzureMonitor | OutputType::GoogleCloudLogging | OutputType::LokiStack => None,
    }
}

/// Compression algorithms the collector sink for an output type understands.
pub(super) fn compressions(type_: OutputType) -> &'static [&'static str] {
    match type_ {
        OutputType::Kafka => &["none", "gzip", "snappy", "zstd", "lz4"],
        OutputType::Elasticsearch
        | OutputType::Http
        | OutputType::Loki
        | OutputType::LokiStack
        | OutputType::Splunk => &["none", "gzip", "snappy", "zlib", "zstd"],
        OutputType::Cloudwatch | OutputType::S3 | OutputType::GoogleCloudLogging | OutputType::Otlp => {
            &["none", "gzip", "zlib", "zstd", "snappy"]
        }
        OutputType::AzureMonitor | OutputType::FluentdForward | OutputType::Syslog => &["none"],
    }
}

fn check_url(url: &str, allowed: &[&str]) -> Result<Url, String> {
    let parsed = Url::parse(url).map_err(|error| format!("invalid URL {url:?}: {error}"))?;
    if !allowed.contains(&parsed.scheme()) {
        return Err(format!(
            "URL scheme {:?} must be one of [{}]",
            parsed.scheme(),
            allowed.join(", ")
        ));
    }
    if parsed.host_str().unwrap_or_default().is_empty() {
        return Err(format!("URL {url:?} has no host"));
    }
    Ok(parsed)
}

pub(super) fn validate(
    output: &OutputSpec,
    secrets: &Secrets,
    options: &Options,
    errors: &mut ValidationErrors,
) {
    let mut problems = Vec::<String>::new();

    if output.type_ == OutputType::FluentdForward {
        problems.push("fluentdForward outputs are not supported by the collector".into());
    }
    if output.type_ == OutputType::Otlp && !options.otlp {
        problems.push("otlp outputs require the opentelemetry annotation".into());
    }

    let Some(config) = output.config() else {
        errors.push(ValidationError::new(
            Component::Output,
            &output.name,
            format!(
                "output of type {0} must set only the {0} block",
                output.type_.as_str()
            ),
        ));
        return;
    };

    match (output.url(), schemes(output.type_)) {
        (Some(url), Some(allowed)) => match check_url(url, allowed) {
            Ok(parsed) => {
                let has_tls_material = output.tls.as_ref().is_some_and(|tls| {
                    tls.tls.ca.is_some() || tls.tls.certificate.is_some() || tls.tls.key.is_some()
                });
                if has_tls_material && !SECURE_SCHEMES.contains(&parsed.scheme()) {
                    problems.push(format!(
                        "tls settings require a secure URL, got scheme {:?}",
                        parsed.scheme()
                    ));
                }
            }
            Err(problem) => problems.push(problem),
        },
        (None, Some(_)) if url_required(output.type_) => {
            problems.push("url must be set".into());
        }
        _ => {}
    }

    if let Some(tls) = &output.tls {
        problems.extend(tls_problems(&tls.tls, secrets));
    }
    for key in output.secret_keys() {
        if let Some(problem) = missing_key(key, secrets) {
            if !problems.contains(&problem) {
                problems.push(problem);
            }
        }
    }

    if let Some(limit) = &output.rate_limit {
        if limit.max_records_per_second <= 0 {
            problems.push("rateLimit.maxRecordsPerSecond must be positive".into());
        }
    }

    if let Some(tuning) = output.tuning() {
        if let Some(compression) = &tuning.compression {
            let allowed = compressions(output.type_);
            if !allowed.contains(&compression.as_str()) {
                problems.push(format!(
                    "compression {compression:?} is not supported, use one of [{}]",
                    allowed.join(", ")
                ));
            }
        }
        if let Some(max_write) = &tuning.max_write {
            if let Err(error) = quantity::to_bytes(max_write) {
                problems.push(format!("tuning.maxWrite: {error}"));
            }
        }
        if let (Some(min), Some(max)) = (tuning.min_retry_duration, tuning.max_retry_duration) {
            if min > max {
                problems.push("tuning.minRetryDuration exceeds maxRetryDuration".into());
            }
        }
    }

    match config {
        OutputConfig::Cloudwatch(cw) => {
            if cw.region.is_empty() {
                problems.push("cloudwatch.region must be set".into());
            }
            if cw.group_name.is_empty() {
                problems.push("cloudwatch.groupName must be set".into());
            }
            problems.extend(aws_problems(&cw.authentication, secrets));
        }
        OutputConfig::S3(s3) => {
            if s3.region.is_empty() || s3.bucket.is_empty() {
                problems.push("s3.region and s3.bucket must be set".into());
            }
            problems.extend(aws_problems(&s3.authentication, secrets));
        }
        OutputConfig::Kafka(kafka) => {
            if kafka.url.is_none() && kafka.brokers.is_empty() {
                problems.push("kafka outputs need a url or at least one broker".into());
            }
            for broker in &kafka.brokers {
                if let Err(problem) = check_url(broker, KAFKA_SCHEMES) {
                    problems.push(format!("broker {broker:?}: {problem}"));
                }
            }
            let sasl = kafka.authentication.as_ref().and_then(|a| a.sasl.as_ref());
            if let Some(mechanism) = sasl.and_then(|s| s.mechanism.as_deref()) {
                if !SASL_MECHANISMS.contains(&mechanism) {
                    problems.push(format!("unsupported SASL mechanism {mechanism:?}"));
                }
            }
        }
        OutputConfig::Http(http) => {
            if let Some(method) = &http.method {
                if !HTTP_METHODS.contains(&method.to_uppercase().as_str()) {
                    problems.push(format!("unsupported HTTP method {method:?}"));
                }
            }
            if let Some(proxy) = &http.proxy_url {
                if let Err(problem) = check_url(proxy, HTTP_SCHEMES) {
                    problems.push(format!("proxyURL: {problem}"));
                }
            }
        }
        OutputConfig::GoogleCloudLogging(gcl) => {
            if gcl.id.value.is_empty() {
                problems.push("googleCloudLogging.id.value must be set".into());
            }
            if gcl.log_id.is_empty() {
                problems.push("googleCloudLogging.logId must be set".into());
            }
        }
        OutputConfig::LokiStack(stack) => {
            if stack.target.name.is_empty() {
                problems.push("lokiStack.target.name must be set".into());
            }
        }
        OutputConfig::AzureMonitor(azure) => {
            if azure.customer_id.is_empty() || azure.log_type.is_empty() {
                problems.push("azureMonitor.customerId and logType must be set".into());
            }
            if !azure
                .log_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
                || azure.log_type.len() > 100
            {
                problems.push(
                    "azureMonitor.logType may only contain letters, digits and underscores".into(),
                );
            }
        }
        OutputConfig::Elasticsearch(_)
        | OutputConfig::FluentdForward(_)
        | OutputConfig::Loki(_)
        | OutputConfig::Otlp(_)
        | OutputConfig::Splunk(_)
        | OutputConfig::Syslog(_) => {}
    }

    for problem in problems {
        errors.push(ValidationError::new(Component::Output, &output.name, problem));
    }
}

fn url_required(type_: OutputType) -> bool {
    !matches!(
        type_,
        OutputType::Cloudwatch | OutputType::S3 | OutputType::Kafka
    )
}

fn aws_problems(auth: &AwsAuthentication, secrets: &Secrets) -> Vec<String> {
    let mut problems = Vec::new();
    let role_arns = match auth {
        AwsAuthentication::IamRole {
            role_arn, token, ..
        } => {
            if let BearerToken::Secret { secret } = token {
                if secret.key.is_empty() {
                    problems.push("iamRole.token.secret must name a key".to_string());
                }
            }
            vec![role_arn]
        }
        AwsAuthentication::AccessKey { .. } => Vec::new(),
    };
    let assumed = auth.assume_role().map(|a| &a.role_arn);
    for arn in role_arns.into_iter().chain(assumed) {
        if let Some(value) = secrets.get_string(arn) {
            if parse_role_arn(&value).is_none() {
                problems.push(format!(
                    "secret {:?} key {:?} does not hold a valid role ARN",
                    arn.secret_name, arn.key
                ));
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;
    use crate::api::{
        Cloudwatch, DeliveryMode, Http, Kafka, OutputTlsSpec, OutputTuningSpec, SecretKey, Syslog,
        TlsSpec,
    };

    fn check(output: &OutputSpec, secrets: &Secrets) -> Vec<String> {
        let mut errors = ValidationErrors::default();
        validate(output, secrets, &Options::default(), &mut errors);
        errors.iter().map(|e| e.message.clone()).collect()
    }

    fn http(url: &str) -> OutputSpec {
        let mut output = OutputSpec::new("out", OutputType::Http);
        output.http = Some(Http {
            url: url.into(),
            method: None,
            headers: BTreeMap::new(),
            timeout: None,
            proxy_url: None,
            authentication: None,
            tuning: None,
        });
        output
    }

    fn syslog(url: &str) -> OutputSpec {
        let mut output = OutputSpec::new("out", OutputType::Syslog);
        output.syslog = Some(Syslog {
            url: url.into(),
            ..Default::default()
        });
        output
    }

    #[rstest]
    #[case(http("https://collector.example:8443/logs"), true)]
    #[case(http("http://collector.example"), true)]
    #[case(http("tcp://collector.example"), false)]
    #[case(http("not a url"), false)]
    #[case(syslog("tls://logserver:6514"), true)]
    #[case(syslog("udp://logserver:514"), true)]
    #[case(syslog("https://logserver"), false)]
    fn url_scheme_matches_type(#[case] output: OutputSpec, #[case] valid: bool) {
        assert_eq!(check(&output, &Secrets::new()).is_empty(), valid);
    }

    #[test]
    fn fluentd_forward_is_rejected() {
        let mut output = OutputSpec::new("fwd", OutputType::FluentdForward);
        output.fluentd_forward = Some(crate::api::FluentdForward {
            url: "tcp://fluentd:24224".into(),
        });
        assert_eq!(
            check(&output, &Secrets::new()),
            vec!["fluentdForward outputs are not supported by the collector"]
        );
    }

    #[test]
    fn tls_on_plain_url() {
        let mut output = syslog("tcp://logserver:514");
        output.tls = Some(OutputTlsSpec {
            tls: TlsSpec {
                key: Some(SecretKey::new("certs", "tls.key")),
                certificate: Some(crate::api::ConfigMapOrSecretKey {
                    config_map_name: None,
                    secret_name: Some("certs".into()),
                    key: "tls.crt".into(),
                }),
                ..Default::default()
            },
            ..Default::default()
        });
        let mut secrets = Secrets::new();
        secrets.insert(
            "certs",
            BTreeMap::from([
                ("tls.key".to_string(), b"k".to_vec()),
                ("tls.crt".to_string(), b"c".to_vec()),
            ]),
        );
        let problems = check(&output, &secrets);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("tls settings require a secure URL"));
    }

    #[test]
    fn auth_secrets_must_resolve() {
        let mut output = OutputSpec::new("cw", OutputType::Cloudwatch);
        output.cloudwatch = Some(Cloudwatch {
            url: None,
            region: "us-east-1".into(),
            group_name: "{.log_type||\"none\"}".into(),
            authentication: AwsAuthentication::IamRole {
                role_arn: SecretKey::new("cw", "role_arn"),
                token: BearerToken::ServiceAccount,
                assume_role: None,
            },
            tuning: None,
        });
        assert_eq!(
            check(&output, &Secrets::new()),
            vec!["secret \"cw\" not found"]
        );

        let mut secrets = Secrets::new();
        secrets.insert(
            "cw",
            BTreeMap::from([("role_arn".to_string(), b"arn:aws:iam::role/x".to_vec())]),
        );
        assert_eq!(check(&output, &secrets).len(), 1);

        secrets.insert(
            "cw",
            BTreeMap::from([(
                "role_arn".to_string(),
                b"arn:aws:iam::123456789012:role/collector".to_vec(),
            )]),
        );
        assert!(check(&output, &secrets).is_empty());
    }

    #[test]
    fn kafka_needs_brokers_or_url() {
        let mut output = OutputSpec::new("k", OutputType::Kafka);
        output.kafka = Some(Kafka::default());
        assert_eq!(check(&output, &Secrets::new()).len(), 1);

        output.kafka = Some(Kafka {
            brokers: vec!["tls://b1:9092".into(), "http://b2:9092".into()],
            ..Default::default()
        });
        assert_eq!(check(&output, &Secrets::new()).len(), 1);
    }

    #[test]
    fn tuning_is_checked_per_type() {
        let mut output = syslog("tcp://logserver:514");
        output.syslog.as_mut().unwrap().tuning = Some(OutputTuningSpec {
            compression: Some("gzip".into()),
            delivery: Some(DeliveryMode::AtLeastOnce),
            ..Default::default()
        });
        assert_eq!(check(&output, &Secrets::new()).len(), 1);

        let mut output = http("https://collector.example");
        output.http.as_mut().unwrap().tuning = Some(OutputTuningSpec {
            compression: Some("zstd".into()),
            min_retry_duration: Some(30),
            max_retry_duration: Some(10),
            ..Default::default()
        });
        assert_eq!(
            check(&output, &Secrets::new()),
            vec!["tuning.minRetryDuration exceeds maxRetryDuration"]
        );
    }
}
