use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec},
        core::v1::{
            Container, ContainerPort, HostPathVolumeSource, PodSpec, PodTemplateSpec,
            SecretVolumeSource, Service, ServiceAccount, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use super::{
    Owner, ServiceMonitor,
    collector::{linux_node_selector, restricted_security_context, tolerations},
    common_labels, monitoring, selector_labels,
};
use crate::api::{
    LogFileMetricExporter,
    constants::{COMPONENT_EXPORTER, EXPORTER_PORT},
};

/// The only exporter instance that is reconciled.
pub const EXPORTER_NAME: &str = "instance";
pub const EXPORTER_NAMESPACE: &str = "openshift-logging";

/// Name of the daemonset, service, service monitor and service account.
const OBJECT_NAME: &str = "logfilesmetricexporter";
const PORT_NAME: &str = "exporter-port";
const METRICS_SECRET: &str = "lfme-secret";
const METRICS_DIR: &str = "/etc/logfilemetricexporter/metrics";

fn labels() -> BTreeMap<String, String> {
    common_labels(OBJECT_NAME, COMPONENT_EXPORTER, OBJECT_NAME)
}

fn host_path(name: &str, path: &str) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.into(),
        host_path: Some(HostPathVolumeSource {
            path: path.into(),
            type_: None,
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        read_only: Some(true),
        ..Default::default()
    };
    (volume, mount)
}

fn exporter_args(min_tls_version: Option<&str>, ciphers: &[String]) -> String {
    let mut command = format!(
        "/usr/local/bin/log-file-metric-exporter -verbosity=2 -dir=/var/log/pods -http=:{EXPORTER_PORT} \
         -keyFile={METRICS_DIR}/tls.key -crtFile={METRICS_DIR}/tls.crt"
    );
    if let Some(version) = min_tls_version {
        command.push_str(&format!(" -tlsMinVersion={version}"));
    }
    if !ciphers.is_empty() {
        command.push_str(&format!(" -cipherSuites={}", ciphers.join(",")));
    }
    command
}

pub fn exporter_service_account(owner: &Owner) -> ServiceAccount {
    ServiceAccount {
        metadata: owner.child_meta(OBJECT_NAME, labels()),
        ..Default::default()
    }
}

pub fn exporter_daemon_set(
    owner: &Owner,
    exporter: &LogFileMetricExporter,
    image: &str,
    min_tls_version: Option<&str>,
    ciphers: &[String],
) -> DaemonSet {
    let spec = &exporter.spec;
    let (pods_volume, pods_mount) = host_path("varlogpods", "/var/log/pods");
    let (containers_volume, containers_mount) = host_path("varlogcontainers", "/var/log/containers");
    let metrics_volume = Volume {
        name: "lfme-metrics".into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(METRICS_SECRET.into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let metrics_mount = VolumeMount {
        name: "lfme-metrics".into(),
        mount_path: METRICS_DIR.into(),
        read_only: Some(true),
        ..Default::default()
    };

    let container = Container {
        name: OBJECT_NAME.into(),
        image: Some(image.into()),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(vec!["/bin/bash".into()]),
        args: Some(vec!["-c".into(), exporter_args(min_tls_version, ciphers)]),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.into()),
            container_port: EXPORTER_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        resources: spec.resources.clone(),
        volume_mounts: Some(vec![containers_mount, pods_mount, metrics_mount]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    DaemonSet {
        metadata: owner.child_meta(OBJECT_NAME, labels()),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector_labels(COMPONENT_EXPORTER, OBJECT_NAME)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    node_selector: Some(linux_node_selector(&spec.node_selector)),
                    tolerations: Some(tolerations(&spec.tolerations)),
                    priority_class_name: Some("system-node-critical".into()),
                    service_account_name: Some(OBJECT_NAME.into()),
                    termination_grace_period_seconds: Some(10),
                    volumes: Some(vec![containers_volume, pods_volume, metrics_volume]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn exporter_service(owner: &Owner) -> Service {
    monitoring::tls_service(
        owner,
        OBJECT_NAME,
        labels(),
        selector_labels(COMPONENT_EXPORTER, OBJECT_NAME),
        PORT_NAME,
        EXPORTER_PORT,
        METRICS_SECRET,
    )
}

pub fn exporter_service_monitor(owner: &Owner) -> ServiceMonitor {
    monitoring::tls_service_monitor(
        owner,
        OBJECT_NAME,
        labels(),
        selector_labels(COMPONENT_EXPORTER, OBJECT_NAME),
        PORT_NAME,
    )
}
