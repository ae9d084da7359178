//! Well-known names, paths and annotations shared by the generator and the reconcile engine.

pub const GROUP: &str = "observability.openshift.io";

/// Prefix of every annotation the operator interprets on a forwarder.
pub const ANNOTATION_PREFIX: &str = "observability.openshift.io/";
pub const ANNOTATION_DEBUG_OUTPUT: &str = "observability.openshift.io/debug-output";
pub const ANNOTATION_OLD_REMOTE_SYSLOG: &str =
    "observability.openshift.io/use-old-remote-syslog-plugin";
pub const ANNOTATION_OTLP: &str = "observability.openshift.io/opentelemetry";
pub const ANNOTATION_COLLECTOR_AS_DEPLOYMENT: &str =
    "observability.openshift.io/enable-collector-as-deployment";
pub const ANNOTATION_CONFIG_HASH: &str = "observability.openshift.io/config-hash";

/// Held while the forwarder's cluster-scoped metadata reader binding exists.
pub const FORWARDER_FINALIZER: &str = "observability.openshift.io/collector-rbac";
/// Held while the forwarder's managed log store roles and bindings exist.
pub const LOKISTACK_FINALIZER: &str = "logging.openshift.io/lokistack-rbac";

pub const INPUT_APPLICATION: &str = "application";
pub const INPUT_INFRASTRUCTURE: &str = "infrastructure";
pub const INPUT_AUDIT: &str = "audit";
pub const RESERVED_INPUT_NAMES: [&str; 3] = [INPUT_APPLICATION, INPUT_INFRASTRUCTURE, INPUT_AUDIT];

/// Output name that resolves to the managed log store.
pub const OUTPUT_DEFAULT: &str = "default";

pub const COLLECTOR_TOKEN_SECRET: &str = "logcollector-token";

pub const CONFIG_DIR: &str = "/etc/collector";
pub const CONFIG_FILE: &str = "/etc/collector/config.toml";
pub const CONFIG_KEY: &str = "config.toml";
pub const AWS_CREDENTIALS_KEY: &str = "aws-credentials";
pub const AWS_CREDENTIALS_FILE: &str = "/etc/collector/aws-credentials";
pub const SECRETS_MOUNT_DIR: &str = "/var/run/ocp-collector/secrets";
pub const CONFIGMAPS_MOUNT_DIR: &str = "/var/run/ocp-collector/config";
pub const RECEIVER_TLS_DIR: &str = "/etc/collector/receiver";
pub const TRUSTED_CA_DIR: &str = "/etc/pki/ca-trust/extracted/pem";
pub const TRUSTED_CA_KEY: &str = "ca-bundle.crt";
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/ocp-collector/serviceaccount/token";
pub const DATA_DIR: &str = "/var/lib/vector";
pub const DEBUG_OUTPUT_DIR: &str = "/var/log/collector/debug";

pub const METRICS_PORT: i32 = 24231;
pub const METRICS_PORT_NAME: &str = "metrics";
pub const EXPORTER_PORT: i32 = 2112;

pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_INJECT_TRUSTED_CA: &str = "config.openshift.io/inject-trusted-cabundle";

pub const COMPONENT_COLLECTOR: &str = "collector";
pub const COMPONENT_EXPORTER: &str = "logfilesmetricexporter";
pub const MANAGED_BY: &str = "log-forwarder-operator";
pub const PART_OF: &str = "cluster-logging";
