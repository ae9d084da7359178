//! Resource model for the forwarder and exporter custom resources.

pub mod common;
pub mod conditions;
pub mod constants;
pub mod exporter;
pub mod filters;
pub mod forwarder;
pub mod inputs;
pub mod outputs;

pub use common::*;
pub use conditions::{Condition, ConditionStatus};
pub use exporter::{LogFileMetricExporter, LogFileMetricExporterSpec, LogFileMetricExporterStatus};
pub use filters::*;
pub use forwarder::*;
pub use inputs::*;
pub use outputs::*;

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARDER: &str = r#"
apiVersion: observability.openshift.io/v1
kind: ClusterLogForwarder
metadata:
  name: collector
  namespace: openshift-logging
spec:
  serviceAccount:
    name: collector
  inputs:
    - name: my-app
      type: application
      application:
        includes:
          - namespace: "team-*"
  outputs:
    - name: cw
      type: cloudwatch
      cloudwatch:
        region: us-east-1
        groupName: '{.log_type||"none"}'
        authentication:
          type: accessKey
          accessKeyId:
            secretName: cw-secret
            key: aws_access_key_id
          accessKeySecret:
            secretName: cw-secret
            key: aws_secret_access_key
    - name: remote
      type: syslog
      rateLimit:
        maxRecordsPerSecond: 10
      syslog:
        url: tls://logserver:6514
        rfc: RFC3164
  filters:
    - name: no-debug
      type: drop
      drop:
        - test:
            - field: .level
              matches: debug
  pipelines:
    - name: all
      inputRefs: [my-app, audit]
      outputRefs: [cw, remote]
      filterRefs: [no-debug]
"#;

    #[test]
    fn deserializes_forwarder() {
        let clf: ClusterLogForwarder = serde_yaml::from_str(FORWARDER).unwrap();
        let spec = &clf.spec;
        assert_eq!(spec.management_state, ManagementState::Managed);
        assert_eq!(spec.service_account.name, "collector");

        let cw = spec.output("cw").unwrap();
        let Some(OutputConfig::Cloudwatch(config)) = cw.config() else {
            panic!("expected a cloudwatch block");
        };
        assert!(matches!(
            config.authentication,
            AwsAuthentication::AccessKey { .. }
        ));
        assert_eq!(cw.secret_keys().len(), 2);
        assert_eq!(
            spec.secret_names().into_iter().collect::<Vec<_>>(),
            ["cw-secret"]
        );
        assert!(spec.config_map_names().is_empty());

        let syslog = spec.output("remote").unwrap();
        assert_eq!(syslog.max_records_per_second(), Some(10));
        assert_eq!(syslog.url(), Some("tls://logserver:6514"));

        assert_eq!(spec.filter("no-debug").unwrap().drop[0].conditions.len(), 1);
        let inputs = spec.referenced_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].type_, InputType::Audit);
        assert!(matches!(inputs[1].source(), Some(InputSource::Audit(_))));
    }

    #[test]
    fn mismatched_block_has_no_config() {
        let mut output = OutputSpec::new("bad", OutputType::Http);
        output.kafka = Some(Kafka::default());
        assert!(output.config().is_none());
        assert!(output.url().is_none());
    }

    #[test]
    fn deep_copy_is_independent() {
        let clf: ClusterLogForwarder = serde_yaml::from_str(FORWARDER).unwrap();
        let mut copy = clf.clone();
        copy.spec.pipelines[0].output_refs.push("other".into());
        copy.spec.outputs[0].name = "renamed".into();
        assert_eq!(clf.spec.pipelines[0].output_refs, vec!["cw", "remote"]);
        assert_eq!(clf.spec.outputs[0].name, "cw");
    }
}
