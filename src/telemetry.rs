//! Process-wide gauges describing the forwarders this operator manages.
//!
//! Values live in a [`Telemetry`] value: string labels and float counters behind one mutex.
//! Every setter republishes the affected gauges through the `metrics` facade, so whichever
//! recorder the binary installs sees the latest state.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use metrics::{Label, gauge};

use crate::api::{
    ClusterLogForwarder, ManagementState, OutputType,
    conditions::{TYPE_READY, find_condition},
    constants::{INPUT_APPLICATION, INPUT_AUDIT, INPUT_INFRASTRUCTURE, OUTPUT_DEFAULT},
};

const PRESENT: &str = "1";
const ABSENT: &str = "0";

const VERSION: &str = "version";
const MANAGED_STATUS: &str = "managedStatus";
const HEALTH_STATUS: &str = "healthStatus";
const PIPELINE_INFO: &str = "pipelineInfo";
const COLLECTOR_ERRORS: &str = "collectorErrorCount";

const INPUT_TYPES: [&str; 3] = [INPUT_APPLICATION, INPUT_AUDIT, INPUT_INFRASTRUCTURE];
const OUTPUT_TYPES: [OutputType; 12] = [
    OutputType::AzureMonitor,
    OutputType::Cloudwatch,
    OutputType::Elasticsearch,
    OutputType::GoogleCloudLogging,
    OutputType::Http,
    OutputType::Kafka,
    OutputType::Loki,
    OutputType::LokiStack,
    OutputType::Otlp,
    OutputType::S3,
    OutputType::Splunk,
    OutputType::Syslog,
];

#[derive(Debug, Default)]
struct Inner {
    info: BTreeMap<String, String>,
    forwarder: BTreeMap<String, String>,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
    values: BTreeMap<String, f64>,
}

impl Inner {
    fn initial() -> Self {
        let absent = |keys: &[&str]| -> BTreeMap<String, String> {
            keys.iter()
                .map(|k| (k.to_string(), ABSENT.to_string()))
                .collect()
        };
        let mut outputs = absent(&[OUTPUT_DEFAULT]);
        outputs.extend(
            OUTPUT_TYPES
                .iter()
                .map(|t| (t.as_str().to_string(), ABSENT.to_string())),
        );
        let mut info = absent(&[MANAGED_STATUS, HEALTH_STATUS]);
        info.insert(VERSION.into(), env!("CARGO_PKG_VERSION").into());
        Self {
            info,
            forwarder: absent(&[HEALTH_STATUS, PIPELINE_INFO]),
            inputs: absent(&INPUT_TYPES),
            outputs,
            values: BTreeMap::from([(COLLECTOR_ERRORS.to_string(), 0.0)]),
        }
    }

    fn labels(map: &BTreeMap<String, String>) -> Vec<Label> {
        map.iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect()
    }

    fn publish(&self) {
        gauge!("log_logging_info", Self::labels(&self.info)).set(1.0);
        gauge!(
            "log_collector_error_count_total",
            VERSION => env!("CARGO_PKG_VERSION")
        )
        .set(self.values.get(COLLECTOR_ERRORS).copied().unwrap_or_default());
        gauge!("log_forwarder_pipeline_info", Self::labels(&self.forwarder)).set(1.0);
        gauge!("log_forwarder_input_info", Self::labels(&self.inputs)).set(1.0);
        gauge!("log_forwarder_output_info", Self::labels(&self.outputs)).set(1.0);
    }
}

fn flag(value: bool) -> String {
    if value { PRESENT } else { ABSENT }.to_string()
}

#[derive(Debug)]
pub struct Telemetry {
    inner: Mutex<Inner>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::init()
    }
}

impl Telemetry {
    /// A value holding the initial state: nothing managed, nothing healthy, no errors.
    pub fn init() -> Self {
        Self {
            inner: Mutex::new(Inner::initial()),
        }
    }

    /// Resets every value to its initial state and republishes.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        *inner = Inner::initial();
        inner.publish();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The maps are always left consistent, so a panicked writer does not invalidate them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_health(&self, managed: bool, healthy: bool) {
        let mut inner = self.lock();
        inner.info.insert(MANAGED_STATUS.into(), flag(managed));
        inner.info.insert(HEALTH_STATUS.into(), flag(healthy));
        inner.publish();
    }

    pub fn inc_collector_errors(&self) {
        let mut inner = self.lock();
        *inner.values.entry(COLLECTOR_ERRORS.into()).or_default() += 1.0;
        inner.publish();
    }

    /// Records which inputs and output types `forwarder` uses and whether it is ready.
    pub fn update_from_forwarder(&self, forwarder: &ClusterLogForwarder) {
        let spec = &forwarder.spec;
        let ready = forwarder
            .status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, TYPE_READY))
            .is_some_and(|c| c.is_true());

        let mut inner = self.lock();
        inner.info.insert(
            MANAGED_STATUS.into(),
            flag(spec.management_state == ManagementState::Managed),
        );
        inner.info.insert(HEALTH_STATUS.into(), flag(ready));
        inner.forwarder.insert(HEALTH_STATUS.into(), flag(ready));
        inner
            .forwarder
            .insert(PIPELINE_INFO.into(), spec.pipelines.len().to_string());

        let referenced: Vec<String> = spec
            .pipelines
            .iter()
            .flat_map(|p| p.input_refs.iter())
            .filter_map(|name| spec.input(name))
            .map(|input| input.type_.as_str().to_string())
            .collect();
        for input in INPUT_TYPES {
            inner
                .inputs
                .insert(input.into(), flag(referenced.iter().any(|r| r == input)));
        }

        let uses_default = spec
            .pipelines
            .iter()
            .any(|p| p.output_refs.iter().any(|o| o == OUTPUT_DEFAULT));
        inner.outputs.insert(OUTPUT_DEFAULT.into(), flag(uses_default));
        for output in OUTPUT_TYPES {
            let used = spec.outputs.iter().any(|o| o.type_ == output);
            inner.outputs.insert(output.as_str().into(), flag(used));
        }
        inner.publish();
    }

    #[cfg(test)]
    fn snapshot(&self) -> (BTreeMap<String, String>, BTreeMap<String, String>, f64) {
        let inner = self.lock();
        (
            inner.info.clone(),
            inner.outputs.clone(),
            inner.values[COLLECTOR_ERRORS],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClusterLogForwarderStatus, Condition, conditions::REASON_RECONCILE_SUCCESS};

    const FORWARDER: &str = r#"
apiVersion: observability.openshift.io/v1
kind: ClusterLogForwarder
metadata:
  name: collector
  namespace: openshift-logging
spec:
  serviceAccount:
    name: collector
  outputs:
    - name: remote
      type: syslog
      syslog:
        url: tcp://logserver:514
  pipelines:
    - name: all
      inputRefs: [application, audit]
      outputRefs: [remote, default]
"#;

    #[test]
    fn forwarder_updates_labels() {
        let mut clf: ClusterLogForwarder = serde_yaml::from_str(FORWARDER).unwrap();
        clf.status = Some(ClusterLogForwarderStatus {
            conditions: vec![Condition::new(TYPE_READY, true, REASON_RECONCILE_SUCCESS, "")],
            ..Default::default()
        });
        let telemetry = Telemetry::init();
        telemetry.update_from_forwarder(&clf);

        let (info, outputs, _) = telemetry.snapshot();
        assert_eq!(info[MANAGED_STATUS], PRESENT);
        assert_eq!(info[HEALTH_STATUS], PRESENT);
        assert_eq!(outputs["syslog"], PRESENT);
        assert_eq!(outputs[OUTPUT_DEFAULT], PRESENT);
        assert_eq!(outputs["kafka"], ABSENT);
        let inner = telemetry.lock();
        assert_eq!(inner.inputs[INPUT_APPLICATION], PRESENT);
        assert_eq!(inner.inputs[INPUT_INFRASTRUCTURE], ABSENT);
        assert_eq!(inner.forwarder[PIPELINE_INFO], "1");
    }

    #[test]
    fn teardown_resets_values() {
        let telemetry = Telemetry::init();
        telemetry.inc_collector_errors();
        telemetry.inc_collector_errors();
        telemetry.set_health(true, false);
        assert_eq!(telemetry.snapshot().2, 2.0);

        telemetry.teardown();
        let (info, _, errors) = telemetry.snapshot();
        assert_eq!(errors, 0.0);
        assert_eq!(info[MANAGED_STATUS], ABSENT);
        assert_eq!(info[VERSION], env!("CARGO_PKG_VERSION"));
    }
}
