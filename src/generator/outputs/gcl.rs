use super::{Adapter, Context, json_encoding};
use crate::{
    api::{GoogleCloudLogging, GoogleCloudLoggingIdType},
    generator::{
        GeneratorError,
        elements::{Element, Sink, Transform, table},
        template::{field_reference, template_remap},
        tls::output_tls,
    },
    secrets::secret_path,
};

/// Maps record levels onto Google's severity names.
const NORMALIZE_SEVERITY: &str = r#"if .log_type == "audit" {
  ._internal.severity = "INFO"
} else {
  level = downcase(string(.level) ?? "")
  ._internal.severity = if level == "" {
    "DEFAULT"
  } else if level == "warn" {
    "WARNING"
  } else if level == "trace" {
    "DEBUG"
  } else {
    upcase(level)
  }
}"#;

fn destination_key(type_: GoogleCloudLoggingIdType) -> &'static str {
    match type_ {
        GoogleCloudLoggingIdType::BillingAccount => "billing_account_id",
        GoogleCloudLoggingIdType::Folder => "folder_id",
        GoogleCloudLoggingIdType::Project => "project_id",
        GoogleCloudLoggingIdType::Organization => "organization_id",
    }
}

impl Adapter for GoogleCloudLogging {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let severity = Transform::remap(
            cx.element_id("normalize_severity"),
            cx.inputs.clone(),
            NORMALIZE_SEVERITY,
        );
        let log_id = template_remap(
            cx.element_id("log_id"),
            vec![severity.id.clone()],
            &self.log_id,
            "log_id",
        );

        let credentials = &self.authentication.credentials;
        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![log_id.id.clone()])
            .with(destination_key(self.id.type_), self.id.value.as_str())
            .with("log_id", field_reference("log_id"))
            .with(
                "credentials_path",
                secret_path(&credentials.secret_name, &credentials.key),
            )
            .with("severity_key", "_internal.severity")
            .with(
                "resource",
                table([("type", "k8s_node".into()), ("node_name", "{{hostname}}".into())]),
            )
            .encoding(json_encoding())
            .tunable();
        sink.tls = output_tls(cx.output, None, cx.options, false);

        Ok(vec![severity.into(), log_id.into(), cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "gcp_stackdriver_logs"
    }
}
