use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{
            Container, EnvVar, PodSpec, PodTemplateSpec, ProjectedVolumeSource,
            ResourceRequirements, Toleration, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::api::resource::Quantity,
};

use super::{Comparison, Differ, metadata, missing_entries};
use crate::quantity::same_value;

pub fn daemon_set(current: &DaemonSet, desired: &DaemonSet) -> Comparison {
    let template = |ds: &DaemonSet| ds.spec.as_ref().map(|s| s.template.clone());
    Differ::new()
        .nested("metadata", metadata(&current.metadata, &desired.metadata))
        .nested(
            "template",
            optional_template(template(current).as_ref(), template(desired).as_ref()),
        )
        .finish()
}

pub fn deployment(current: &Deployment, desired: &Deployment) -> Comparison {
    let replicas = |d: &Deployment| d.spec.as_ref().and_then(|s| s.replicas);
    let template = |d: &Deployment| d.spec.as_ref().map(|s| s.template.clone());
    Differ::new()
        .nested("metadata", metadata(&current.metadata, &desired.metadata))
        .field("replicas", &replicas(current), &replicas(desired))
        .nested(
            "template",
            optional_template(template(current).as_ref(), template(desired).as_ref()),
        )
        .finish()
}

fn optional_template(
    current: Option<&PodTemplateSpec>,
    desired: Option<&PodTemplateSpec>,
) -> Comparison {
    match (current, desired) {
        (Some(current), Some(desired)) => pod_template(current, desired),
        (None, None) => (true, String::new()),
        _ => (false, "pod template added or removed".into()),
    }
}

/// Compares the parts of a pod template the operator sets.
pub fn pod_template(current: &PodTemplateSpec, desired: &PodTemplateSpec) -> Comparison {
    let current_meta = current.metadata.clone().unwrap_or_default();
    let desired_meta = desired.metadata.clone().unwrap_or_default();
    let current_spec = current.spec.clone().unwrap_or_default();
    let desired_spec = desired.spec.clone().unwrap_or_default();
    Differ::new()
        .with(|| {
            missing_entries(
                "pod label",
                current_meta.labels.as_ref(),
                desired_meta.labels.as_ref(),
            )
        })
        .with(|| {
            missing_entries(
                "pod annotation",
                current_meta.annotations.as_ref(),
                desired_meta.annotations.as_ref(),
            )
        })
        .nested("pod", pod_spec(&current_spec, &desired_spec))
        .finish()
}

fn pod_spec(current: &PodSpec, desired: &PodSpec) -> Comparison {
    let init_images = |pod: &PodSpec| -> Vec<Option<String>> {
        pod.init_containers
            .iter()
            .flatten()
            .map(|c| c.image.clone())
            .collect()
    };
    let differ = Differ::new()
        .field(
            "node selector",
            &current.node_selector.clone().unwrap_or_default(),
            &desired.node_selector.clone().unwrap_or_default(),
        )
        .field(
            "tolerations",
            &toleration_set(current.tolerations.as_deref()),
            &toleration_set(desired.tolerations.as_deref()),
        )
        .field(
            "service account",
            &current.service_account_name,
            &desired.service_account_name,
        )
        .field(
            "volumes",
            &volume_identities(current.volumes.as_deref()),
            &volume_identities(desired.volumes.as_deref()),
        )
        .field(
            "number of containers",
            &current.containers.len(),
            &desired.containers.len(),
        )
        .field(
            "init container images",
            &init_images(current),
            &init_images(desired),
        );
    current
        .containers
        .iter()
        .zip(&desired.containers)
        .fold(differ, |differ, (current, desired)| {
            differ.nested(
                &format!("container {}", desired.name),
                container(current, desired),
            )
        })
        .finish()
}

fn container(current: &Container, desired: &Container) -> Comparison {
    let ports = |c: &Container| -> Vec<(Option<String>, i32)> {
        c.ports
            .iter()
            .flatten()
            .map(|p| (p.name.clone(), p.container_port))
            .collect()
    };
    Differ::new()
        .field("name", &current.name, &desired.name)
        .field("image", &current.image, &desired.image)
        .field("command", &current.command, &desired.command)
        .field("args", &current.args, &desired.args)
        .field("ports", &ports(current), &ports(desired))
        .with(|| resources(current.resources.as_ref(), desired.resources.as_ref()))
        .field(
            "env",
            &sorted_env(current.env.as_deref()),
            &sorted_env(desired.env.as_deref()),
        )
        .field(
            "volume mounts",
            &mount_identities(current.volume_mounts.as_deref()),
            &mount_identities(desired.volume_mounts.as_deref()),
        )
        .finish()
}

/// Toleration order carries no meaning.
pub(super) fn toleration_set(tolerations: Option<&[Toleration]>) -> BTreeSet<String> {
    tolerations
        .into_iter()
        .flatten()
        .map(|t| {
            format!(
                "{}:{}:{}:{}:{:?}",
                t.key.as_deref().unwrap_or_default(),
                t.operator.as_deref().unwrap_or("Equal"),
                t.value.as_deref().unwrap_or_default(),
                t.effect.as_deref().unwrap_or_default(),
                t.toleration_seconds,
            )
        })
        .collect()
}

/// What a volume points at, ignoring defaulted fields such as file modes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum VolumeSource {
    Secret(String),
    ConfigMap(String),
    HostPath(String),
    EmptyDir(String),
    Projected(String),
    Other,
}

fn projected_identity(projected: &ProjectedVolumeSource) -> String {
    projected
        .sources
        .iter()
        .flatten()
        .map(|source| {
            if let Some(token) = &source.service_account_token {
                format!("token:{}:{:?}", token.path, token.audience)
            } else if let Some(secret) = &source.secret {
                format!("secret:{}", secret.name.as_deref().unwrap_or_default())
            } else if let Some(config_map) = &source.config_map {
                format!("configmap:{}", config_map.name.as_deref().unwrap_or_default())
            } else {
                "other".into()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn volume_source(volume: &Volume) -> VolumeSource {
    if let Some(secret) = &volume.secret {
        VolumeSource::Secret(secret.secret_name.clone().unwrap_or_default())
    } else if let Some(config_map) = &volume.config_map {
        VolumeSource::ConfigMap(config_map.name.clone().unwrap_or_default())
    } else if let Some(host_path) = &volume.host_path {
        VolumeSource::HostPath(host_path.path.clone())
    } else if let Some(empty_dir) = &volume.empty_dir {
        VolumeSource::EmptyDir(empty_dir.medium.clone().unwrap_or_default())
    } else if let Some(projected) = &volume.projected {
        VolumeSource::Projected(projected_identity(projected))
    } else {
        VolumeSource::Other
    }
}

fn volume_identities(volumes: Option<&[Volume]>) -> BTreeMap<String, VolumeSource> {
    volumes
        .into_iter()
        .flatten()
        .map(|v| (v.name.clone(), volume_source(v)))
        .collect()
}

fn mount_identities(mounts: Option<&[VolumeMount]>) -> BTreeSet<(String, String, bool)> {
    mounts
        .into_iter()
        .flatten()
        .map(|m| {
            (
                m.name.clone(),
                m.mount_path.clone(),
                m.read_only.unwrap_or_default(),
            )
        })
        .collect()
}

fn sorted_env(env: Option<&[EnvVar]>) -> Vec<EnvVar> {
    let mut env = env.map(<[EnvVar]>::to_vec).unwrap_or_default();
    env.sort_by(|a, b| a.name.cmp(&b.name));
    env
}

fn quantities_differ(
    what: &str,
    current: Option<&BTreeMap<String, Quantity>>,
    desired: Option<&BTreeMap<String, Quantity>>,
) -> Option<String> {
    let empty = BTreeMap::new();
    let current = current.unwrap_or(&empty);
    let desired = desired.unwrap_or(&empty);
    let keys: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();
    keys.into_iter().find_map(|key| match (current.get(key), desired.get(key)) {
        (Some(a), Some(b)) if same_value(a, b) => None,
        (a, b) => Some(format!(
            "{what} {key} changed: {:?} -> {:?}",
            a.map(|q| q.0.as_str()),
            b.map(|q| q.0.as_str())
        )),
    })
}

/// CPU and memory limits and requests compared as quantities, so `1Gi` equals `1024Mi`.
pub(super) fn resources(
    current: Option<&ResourceRequirements>,
    desired: Option<&ResourceRequirements>,
) -> Option<String> {
    let limits = |r: Option<&ResourceRequirements>| r.and_then(|r| r.limits.clone());
    let requests = |r: Option<&ResourceRequirements>| r.and_then(|r| r.requests.clone());
    quantities_differ("limit", limits(current).as_ref(), limits(desired).as_ref()).or_else(|| {
        quantities_differ(
            "request",
            requests(current).as_ref(),
            requests(desired).as_ref(),
        )
    })
}
