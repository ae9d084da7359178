use snafu::{ResultExt, ensure};
use toml::Table;
use url::Url;

use super::{Adapter, Context, json_encoding};
use crate::{
    api::Kafka,
    generator::{
        EmptyBrokersSnafu, GeneratorError, InvalidUrlSnafu,
        elements::{Batch, Element, Sink, table},
        tls::{is_secure, output_tls},
    },
    secrets::secret_reference,
};

const DEFAULT_TOPIC: &str = "topic";
const DEFAULT_MECHANISM: &str = "PLAIN";
/// Secret key that permits SASL over a plain-text connection.
const ALLOW_INSECURE_KEY: &str = "sasl.allow-insecure";

fn host_port(output: &str, url: &str) -> Result<Option<String>, GeneratorError> {
    let parsed = Url::parse(url).context(InvalidUrlSnafu { output, url })?;
    Ok(parsed.host_str().filter(|h| !h.is_empty()).map(|host| match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }))
}

impl Kafka {
    /// Broker addresses as `host:port`, falling back to the output URL.
    fn bootstrap_servers(&self, output: &str) -> Result<String, GeneratorError> {
        let mut servers = Vec::new();
        for broker in &self.brokers {
            servers.extend(host_port(output, broker)?);
        }
        if servers.is_empty() {
            if let Some(url) = &self.url {
                servers.extend(host_port(output, url)?);
            }
        }
        ensure!(!servers.is_empty(), EmptyBrokersSnafu { output });
        Ok(servers.join(","))
    }

    fn topic(&self) -> String {
        self.topic
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                let url = Url::parse(self.url.as_deref()?).ok()?;
                let path = url.path().trim_matches('/');
                (!path.is_empty()).then(|| path.to_string())
            })
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
    }

    fn secure(&self) -> bool {
        self.brokers
            .first()
            .or(self.url.as_ref())
            .is_some_and(|url| is_secure(url))
    }
}

impl Adapter for Kafka {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), cx.inputs.clone())
            .with("bootstrap_servers", self.bootstrap_servers(&cx.output.name)?)
            .with("topic", self.topic())
            .with("healthcheck", table([("enabled", false.into())]))
            .encoding(json_encoding());
        sink.batch = Some(Batch::default());
        sink.buffer = Some(Default::default());

        let secure = self.secure();
        if let Some(sasl) = self.authentication.as_ref().and_then(|a| a.sasl.as_ref()) {
            let allow_insecure = sasl
                .username
                .iter()
                .chain(&sasl.password)
                .any(|key| cx.secrets.flag(&key.secret_name, ALLOW_INSECURE_KEY));
            let mut block = table([
                ("enabled", (secure || allow_insecure).into()),
                (
                    "mechanism",
                    sasl.mechanism.as_deref().unwrap_or(DEFAULT_MECHANISM).into(),
                ),
            ]);
            if let Some(username) = &sasl.username {
                block.insert("username".into(), secret_reference(username).into());
            }
            if let Some(password) = &sasl.password {
                block.insert("password".into(), secret_reference(password).into());
            }
            sink.set("sasl", block);
        }

        let mut librdkafka = Table::new();
        librdkafka.insert("ssl.endpoint.identification.algorithm".into(), "none".into());
        if cx.output.tls.as_ref().is_some_and(|t| t.insecure_skip_verify) {
            librdkafka.insert("enable.ssl.certificate.verification".into(), "false".into());
        }
        sink.set("librdkafka_options", librdkafka);

        if secure {
            let mut tls = output_tls(cx.output, None, cx.options, true).unwrap_or_default();
            tls.enabled = Some(true);
            sink.tls = Some(tls);
        }

        Ok(vec![cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "kafka"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        api::{KafkaAuthentication, OutputSpec, OutputType, SaslAuthentication, SecretKey},
        generator::outputs::tests::{adapt, render},
        secrets::Secrets,
    };

    fn output(kafka: Kafka) -> OutputSpec {
        let mut output = OutputSpec::new("kafka", OutputType::Kafka);
        output.kafka = Some(kafka);
        output
    }

    #[test]
    fn brokers_without_url() {
        let output = output(Kafka {
            topic: Some("topic".into()),
            brokers: vec![
                "tls://b1:9092".into(),
                "tls://b2:9092".into(),
                "tls://b3:9092".into(),
            ],
            ..Default::default()
        });
        let sink = render(&adapt(&output, &Secrets::new()), "output_kafka");
        assert_eq!(sink["bootstrap_servers"].as_str(), Some("b1:9092,b2:9092,b3:9092"));
        assert_eq!(sink["topic"].as_str(), Some("topic"));
        assert_eq!(sink["tls"]["enabled"].as_bool(), Some(true));
        assert_eq!(
            sink["librdkafka_options"]["ssl.endpoint.identification.algorithm"].as_str(),
            Some("none")
        );
    }

    #[test]
    fn url_supplies_broker_and_topic() {
        let kafka = Kafka {
            url: Some("tcp://broker.example.com:9092/app-logs".into()),
            authentication: Some(KafkaAuthentication {
                sasl: Some(SaslAuthentication {
                    username: Some(SecretKey::new("kafka-creds", "username")),
                    password: Some(SecretKey::new("kafka-creds", "password")),
                    mechanism: None,
                }),
            }),
            ..Default::default()
        };
        assert_eq!(kafka.topic(), "app-logs");
        assert_eq!(kafka.bootstrap_servers("kafka").unwrap(), "broker.example.com:9092");

        let mut secrets = Secrets::new();
        secrets.insert(
            "kafka-creds",
            BTreeMap::from([(ALLOW_INSECURE_KEY.to_string(), b"true".to_vec())]),
        );
        let sink = render(&adapt(&output(kafka), &secrets), "output_kafka");
        assert_eq!(sink["sasl"]["mechanism"].as_str(), Some("PLAIN"));
        assert_eq!(sink["sasl"]["enabled"].as_bool(), Some(true));
        assert!(!sink.contains_key("tls"));
    }

    #[test]
    fn no_brokers_is_an_error() {
        let kafka = Kafka {
            url: Some("tcp:///no-host".into()),
            ..Default::default()
        };
        assert!(matches!(
            kafka.bootstrap_servers("kafka"),
            Err(GeneratorError::EmptyBrokers { .. })
        ));
        assert_eq!(Kafka::default().topic(), "topic");
    }
}
