use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec},
        core::v1::{
            Capabilities, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
            EnvVar, EnvVarSource, HostPathVolumeSource, KeyToPath, ObjectFieldSelector, PodSpec,
            PodTemplateSpec, ProjectedVolumeSource, SELinuxOptions, SeccompProfile,
            SecretVolumeSource, SecurityContext, ServiceAccountTokenProjection, Toleration, Volume,
            VolumeMount, VolumeProjection,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use super::{
    Owner, ResourceNames, collector_labels, monitoring::receiver_port_name, selector_labels,
};
use crate::{
    api::{
        ClusterLogForwarder,
        constants::{
            ANNOTATION_COLLECTOR_AS_DEPLOYMENT, ANNOTATION_CONFIG_HASH, COMPONENT_COLLECTOR,
            CONFIG_DIR, CONFIG_FILE, CONFIGMAPS_MOUNT_DIR, DATA_DIR, METRICS_PORT,
            METRICS_PORT_NAME, RECEIVER_TLS_DIR, SECRETS_MOUNT_DIR, SERVICE_ACCOUNT_TOKEN_PATH,
            TRUSTED_CA_DIR, TRUSTED_CA_KEY,
        },
    },
    generator::lokistack::{SERVICE_CA_CONFIG_MAP, references_lokistack},
};

/// Replicas of the collector when it runs as a deployment.
pub const COLLECTOR_REPLICAS: i32 = 2;

const PRIORITY_CLASS: &str = "system-node-critical";
const TOKEN_AUDIENCE: &str = "openshift";
const TOKEN_EXPIRATION_SECS: i64 = 3600;
const TRUSTED_CA_FILE: &str = "tls-ca-bundle.pem";
const DROP_CAPABILITIES: [&str; 9] = [
    "CHOWN",
    "DAC_OVERRIDE",
    "FOWNER",
    "FSETID",
    "KILL",
    "NET_BIND_SERVICE",
    "SETGID",
    "SETPCAP",
    "SETUID",
];

/// Node log directories the collector tails, as `(volume, host path)`.
const HOST_LOG_PATHS: [(&str, &str); 8] = [
    ("varlogpods", "/var/log/pods"),
    ("varlogjournal", "/var/log/journal"),
    ("varlogaudit", "/var/log/audit"),
    ("varlogovn", "/var/log/ovn"),
    ("varlogoauthapiserver", "/var/log/oauth-apiserver"),
    ("varlogoauthserver", "/var/log/oauth-server"),
    ("varlogopenshiftapiserver", "/var/log/openshift-apiserver"),
    ("varlogkubeapiserver", "/var/log/kube-apiserver"),
];

/// How the collector pods are run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Workload {
    /// One pod per node.
    DaemonSet,
    /// A fixed number of pods, for forwarders that only receive over HTTP.
    Deployment,
}

impl Workload {
    pub fn for_forwarder(forwarder: &ClusterLogForwarder) -> Self {
        let requested = forwarder
            .annotation(ANNOTATION_COLLECTOR_AS_DEPLOYMENT)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if requested && forwarder.spec.only_http_receivers() {
            Self::Deployment
        } else {
            Self::DaemonSet
        }
    }
}

fn secret_volume(volume: &str, secret: &str, optional: bool) -> Volume {
    Volume {
        name: volume.into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.into()),
            optional: optional.then_some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(volume: &str, path: impl Into<String>) -> VolumeMount {
    VolumeMount {
        name: volume.into(),
        mount_path: path.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".into()),
                field_path: field_path.into(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn default_tolerations() -> Vec<Toleration> {
    ["node-role.kubernetes.io/master", "node.kubernetes.io/disk-pressure"]
        .into_iter()
        .map(|key| Toleration {
            key: Some(key.into()),
            operator: Some("Exists".into()),
            effect: Some("NoSchedule".into()),
            ..Default::default()
        })
        .collect()
}

pub(super) fn tolerations(extra: &[Toleration]) -> Vec<Toleration> {
    let mut tolerations = default_tolerations();
    tolerations.extend(extra.iter().cloned());
    tolerations
}

pub(super) fn linux_node_selector(selector: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut selector = selector.clone();
    selector
        .entry("kubernetes.io/os".into())
        .or_insert_with(|| "linux".into());
    selector
}

pub(super) fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        capabilities: Some(Capabilities {
            drop: Some(DROP_CAPABILITIES.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        }),
        se_linux_options: Some(SELinuxOptions {
            type_: Some("spc_t".into()),
            ..Default::default()
        }),
        read_only_root_filesystem: Some(true),
        allow_privilege_escalation: Some(false),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Config maps the collector reads TLS material from.
fn config_map_names(forwarder: &ClusterLogForwarder) -> BTreeSet<String> {
    let mut names = forwarder.spec.config_map_names();
    if references_lokistack(&forwarder.spec) {
        names.insert(SERVICE_CA_CONFIG_MAP.to_string());
    }
    names
}

/// The collector pod.
///
/// Every secret the forwarder references is mounted under its own directory, which is where the
/// generated config's secret backend and file paths point.
pub fn collector_pod_spec(
    forwarder: &ClusterLogForwarder,
    names: &ResourceNames,
    image: &str,
    workload: Workload,
) -> PodSpec {
    let collector = forwarder.spec.collector();
    let token_dir = SERVICE_ACCOUNT_TOKEN_PATH
        .rsplit_once('/')
        .map_or(SERVICE_ACCOUNT_TOKEN_PATH, |(dir, _)| dir);

    let mut volumes = vec![
        secret_volume("collector-config", &names.config, false),
        secret_volume("collector-metrics", &names.metrics_secret, false),
        Volume {
            name: "tmp".into(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".into()),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "datadir".into(),
            host_path: Some(HostPathVolumeSource {
                path: format!("{DATA_DIR}/{}/{}", names.namespace, names.common),
                type_: Some("DirectoryOrCreate".into()),
            }),
            ..Default::default()
        },
        Volume {
            name: "trusted-ca".into(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(names.trusted_ca.clone()),
                items: Some(vec![KeyToPath {
                    key: TRUSTED_CA_KEY.into(),
                    path: TRUSTED_CA_FILE.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "sa-token".into(),
            projected: Some(ProjectedVolumeSource {
                sources: Some(vec![VolumeProjection {
                    service_account_token: Some(ServiceAccountTokenProjection {
                        audience: Some(TOKEN_AUDIENCE.into()),
                        expiration_seconds: Some(TOKEN_EXPIRATION_SECS),
                        path: "token".into(),
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    let mut mounts = vec![
        mount("collector-config", CONFIG_DIR),
        mount("collector-metrics", format!("{CONFIG_DIR}/metrics")),
        VolumeMount {
            read_only: None,
            ..mount("tmp", "/tmp")
        },
        VolumeMount {
            read_only: None,
            ..mount("datadir", DATA_DIR)
        },
        mount("trusted-ca", TRUSTED_CA_DIR),
        mount("sa-token", token_dir),
    ];

    if workload == Workload::DaemonSet {
        for (volume, path) in HOST_LOG_PATHS {
            volumes.push(Volume {
                name: volume.into(),
                host_path: Some(HostPathVolumeSource {
                    path: path.into(),
                    type_: None,
                }),
                ..Default::default()
            });
            mounts.push(mount(volume, path));
        }
    }

    let mut secrets = forwarder.spec.secret_names();
    secrets.insert(names.token_secret.clone());
    for secret in &secrets {
        let volume = format!("secret-{secret}");
        volumes.push(secret_volume(&volume, secret, false));
        mounts.push(mount(&volume, format!("{SECRETS_MOUNT_DIR}/{secret}")));
    }
    for config_map in config_map_names(forwarder) {
        let volume = format!("configmap-{config_map}");
        volumes.push(Volume {
            name: volume.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(config_map.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(mount(&volume, format!("{CONFIGMAPS_MOUNT_DIR}/{config_map}")));
    }

    let mut ports = vec![ContainerPort {
        name: Some(METRICS_PORT_NAME.into()),
        container_port: METRICS_PORT,
        protocol: Some("TCP".into()),
        ..Default::default()
    }];
    for (input, receiver) in forwarder.spec.receivers() {
        let secret = names.receiver(input);
        let volume = format!("receiver-{input}");
        // Issued asynchronously by the service CA once the receiver service exists.
        volumes.push(secret_volume(&volume, &secret, true));
        mounts.push(mount(&volume, format!("{RECEIVER_TLS_DIR}/{input}")));
        ports.push(ContainerPort {
            name: Some(receiver_port_name(input)),
            container_port: receiver.port,
            protocol: Some("TCP".into()),
            ..Default::default()
        });
    }

    let container = Container {
        name: COMPONENT_COLLECTOR.into(),
        image: Some(image.into()),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(vec!["/usr/bin/vector".into()]),
        args: Some(vec!["--config-toml".into(), CONFIG_FILE.into()]),
        env: Some(vec![
            field_env("K8S_NODE_NAME", "spec.nodeName"),
            field_env("NODE_IPV4", "status.hostIP"),
            field_env("POD_IP", "status.podIP"),
            field_env("VECTOR_SELF_NODE_NAME", "spec.nodeName"),
            EnvVar {
                name: "VECTOR_LOG".into(),
                value: Some("warn".into()),
                ..Default::default()
            },
        ]),
        ports: Some(ports),
        resources: collector.resources.clone(),
        volume_mounts: Some(mounts),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    PodSpec {
        containers: vec![container],
        node_selector: Some(linux_node_selector(&collector.node_selector)),
        tolerations: Some(tolerations(&collector.tolerations)),
        priority_class_name: Some(PRIORITY_CLASS.into()),
        service_account_name: Some(names.service_account.clone()),
        termination_grace_period_seconds: Some(10),
        volumes: Some(volumes),
        ..Default::default()
    }
}

/// Pod template carrying the config hash, so any config change rolls the pods.
fn template(names: &ResourceNames, pod: PodSpec, config_hash: &str) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(collector_labels(names)),
            annotations: Some(BTreeMap::from([(
                ANNOTATION_CONFIG_HASH.to_string(),
                config_hash.to_string(),
            )])),
            ..Default::default()
        }),
        spec: Some(pod),
    }
}

fn selector(names: &ResourceNames) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector_labels(COMPONENT_COLLECTOR, &names.common)),
        ..Default::default()
    }
}

pub fn daemon_set(owner: &Owner, names: &ResourceNames, pod: PodSpec, config_hash: &str) -> DaemonSet {
    DaemonSet {
        metadata: owner.child_meta(&names.common, collector_labels(names)),
        spec: Some(DaemonSetSpec {
            selector: selector(names),
            template: template(names, pod, config_hash),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(owner: &Owner, names: &ResourceNames, pod: PodSpec, config_hash: &str) -> Deployment {
    Deployment {
        metadata: owner.child_meta(&names.common, collector_labels(names)),
        spec: Some(DeploymentSpec {
            replicas: Some(COLLECTOR_REPLICAS),
            selector: selector(names),
            template: template(names, pod, config_hash),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{InputSpec, InputType, ReceiverSpec, ReceiverType},
        kubernetes::resources::tests::forwarder,
    };

    const CLOUDWATCH: &str = r#"
serviceAccount:
  name: logcollector
outputs:
  - name: cw
    type: cloudwatch
    cloudwatch:
      region: us-east-1
      groupName: logs
      authentication:
        type: accessKey
        accessKeyId:
          secretName: cw-secret
          key: aws_access_key_id
        accessKeySecret:
          secretName: cw-secret
          key: aws_secret_access_key
pipelines:
  - name: all
    inputRefs: [application]
    outputRefs: [cw]
"#;

    fn cloudwatch_forwarder() -> ClusterLogForwarder {
        let mut clf = forwarder("collector", "logcollector");
        clf.spec = serde_yaml::from_str(CLOUDWATCH).unwrap();
        clf
    }

    fn mount_path<'a>(pod: &'a PodSpec, volume: &str) -> Option<&'a str> {
        pod.containers[0]
            .volume_mounts
            .iter()
            .flatten()
            .find(|m| m.name == volume)
            .map(|m| m.mount_path.as_str())
    }

    #[test]
    fn referenced_secrets_are_mounted() {
        let clf = cloudwatch_forwarder();
        let names = ResourceNames::new(&clf);
        let pod = collector_pod_spec(&clf, &names, "vector:latest", Workload::DaemonSet);

        assert_eq!(
            mount_path(&pod, "secret-cw-secret"),
            Some("/var/run/ocp-collector/secrets/cw-secret")
        );
        assert_eq!(
            mount_path(&pod, "secret-collector-token"),
            Some("/var/run/ocp-collector/secrets/collector-token")
        );
        assert_eq!(mount_path(&pod, "collector-config"), Some(CONFIG_DIR));
        assert_eq!(mount_path(&pod, "sa-token"), Some("/var/run/ocp-collector/serviceaccount"));
        assert_eq!(mount_path(&pod, "varlogpods"), Some("/var/log/pods"));
        assert_eq!(pod.service_account_name.as_deref(), Some("logcollector"));
        assert_eq!(pod.node_selector.unwrap()["kubernetes.io/os"], "linux");
    }

    #[test]
    fn config_hash_lands_on_the_pod_template() {
        let clf = cloudwatch_forwarder();
        let names = ResourceNames::new(&clf);
        let owner = Owner::of(&clf).unwrap();
        let pod = collector_pod_spec(&clf, &names, "vector:latest", Workload::DaemonSet);
        let ds = daemon_set(&owner, &names, pod, "abc123");

        let template = ds.spec.unwrap().template;
        let annotations = template.metadata.unwrap().annotations.unwrap();
        assert_eq!(annotations[ANNOTATION_CONFIG_HASH], "abc123");
        assert_eq!(ds.metadata.owner_references.unwrap()[0].name, "collector");
    }

    #[test]
    fn http_receivers_may_run_as_deployment() {
        let mut clf = forwarder("collector", "collector");
        clf.spec.inputs.push(InputSpec {
            receiver: Some(ReceiverSpec {
                type_: ReceiverType::Http,
                port: 8443,
                tls: None,
                http: None,
            }),
            ..InputSpec::reserved("audit").unwrap()
        });
        clf.spec.inputs[0].name = "http-audit".into();
        clf.spec.inputs[0].type_ = InputType::Receiver;
        clf.spec.pipelines = serde_yaml::from_str(
            "- name: p\n  inputRefs: [http-audit]\n  outputRefs: [x]\n",
        )
        .unwrap();
        assert_eq!(Workload::for_forwarder(&clf), Workload::DaemonSet);

        clf.metadata.annotations = Some(BTreeMap::from([(
            ANNOTATION_COLLECTOR_AS_DEPLOYMENT.to_string(),
            "true".to_string(),
        )]));
        assert_eq!(Workload::for_forwarder(&clf), Workload::Deployment);

        let names = ResourceNames::new(&clf);
        let pod = collector_pod_spec(&clf, &names, "vector:latest", Workload::Deployment);
        assert_eq!(mount_path(&pod, "varlogpods"), None);
        assert_eq!(
            mount_path(&pod, "receiver-http-audit"),
            Some("/etc/collector/receiver/http-audit")
        );
        let deployment = deployment(&Owner::of(&clf).unwrap(), &names, pod, "h");
        assert_eq!(deployment.spec.unwrap().replicas, Some(COLLECTOR_REPLICAS));
    }
}
