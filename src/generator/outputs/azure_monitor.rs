use super::{Adapter, Context, json_encoding};
use crate::{
    api::AzureMonitor,
    generator::{
        GeneratorError,
        elements::{Element, Sink},
        tls::output_tls,
    },
    secrets::secret_reference,
};

impl Adapter for AzureMonitor {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), cx.inputs.clone())
            .with("customer_id", self.customer_id.as_str())
            .with("shared_key", secret_reference(&self.authentication.shared_key))
            .with("log_type", self.log_type.as_str())
            .encoding(json_encoding())
            .tunable();
        if let Some(resource_id) = &self.azure_resource_id {
            sink.set("azure_resource_id", resource_id.as_str());
        }
        if let Some(host) = &self.host {
            sink.set("host", host.as_str());
        }
        sink.tls = output_tls(cx.output, None, cx.options, false);

        Ok(vec![cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "azure_monitor_logs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{AzureMonitorAuthentication, OutputSpec, OutputType, SecretKey},
        generator::outputs::tests::{adapt, render},
        secrets::Secrets,
    };

    #[test]
    fn shared_key_from_secret() {
        let mut output = OutputSpec::new("azure", OutputType::AzureMonitor);
        output.azure_monitor = Some(AzureMonitor {
            customer_id: "6a3b".into(),
            log_type: "myLogType".into(),
            azure_resource_id: None,
            host: Some("ods.opinsights.azure.cn".into()),
            authentication: AzureMonitorAuthentication {
                shared_key: SecretKey::new("azure-secret", "shared_key"),
            },
            tuning: None,
        });
        let sink = render(&adapt(&output, &Secrets::new()), "output_azure");
        assert_eq!(sink["type"].as_str(), Some("azure_monitor_logs"));
        assert_eq!(
            sink["shared_key"].as_str(),
            Some("SECRET[kubernetes_secret.azure-secret/shared_key]")
        );
        assert_eq!(sink["log_type"].as_str(), Some("myLogType"));
        assert_eq!(sink["host"].as_str(), Some("ods.opinsights.azure.cn"));
        assert!(!sink.contains_key("azure_resource_id"));
    }
}
