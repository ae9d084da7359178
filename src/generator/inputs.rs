//! Inputs to collector sources.
//!
//! Every input renders its sources, one `_meta` remap per source stamping `.log_source`, and a
//! final remap named after the input (`input_<name>`) stamping `.log_type`. Pipelines only ever
//! reference that final id.

use toml::Value;

use super::{
    Options,
    elements::{Element, Source, Transform, strings, table},
    ids::{input_id, with_suffix},
    template::quote,
    tls::receiver_tls,
};
use crate::api::{
    Application, AuditSource, ClusterLogForwarderSpec, InfrastructureSource, InputSource,
    InputSpec, NamespaceContainerSpec, ReceiverSpec, ReceiverType,
};

const POD_LOGS: &str = "/var/log/pods";
const EXCLUDED_EXTENSIONS: [&str; 3] = ["gz", "tmp", "log.*"];
const INFRA_NAMESPACES: [&str; 5] = ["default", "openshift", "openshift-*", "kube", "kube-*"];

pub(super) fn sources(
    spec: &ClusterLogForwarderSpec,
    namespace: &str,
    options: &Options,
) -> Vec<Element> {
    spec.referenced_inputs()
        .iter()
        .flat_map(|input| input_elements(input, namespace, options))
        .collect()
}

fn input_elements(input: &InputSpec, namespace: &str, options: &Options) -> Vec<Element> {
    let id = input_id(&input.name);
    let mut elements = Vec::new();
    let mut tails = Vec::new();

    match input.source() {
        Some(InputSource::Application(app)) => {
            let (includes, excludes) = application_globs(app, namespace, options);
            container(&id, includes, excludes, Some(app), &mut elements, &mut tails);
        }
        Some(InputSource::Infrastructure(infra)) => {
            if infra.includes(InfrastructureSource::Container) {
                let includes = INFRA_NAMESPACES
                    .iter()
                    .map(|ns| pod_glob(Some(ns), None))
                    .collect();
                let excludes = collector_excludes(namespace, options);
                container(&id, includes, excludes, None, &mut elements, &mut tails);
            }
            if infra.includes(InfrastructureSource::Node) {
                journal(&id, &mut elements, &mut tails);
            }
        }
        Some(InputSource::Audit(audit)) => {
            for source in [
                AuditSource::Auditd,
                AuditSource::KubeApi,
                AuditSource::OpenshiftApi,
                AuditSource::Ovn,
            ] {
                if audit.includes(source) {
                    audit_file(&id, source, &mut elements, &mut tails);
                }
            }
        }
        Some(InputSource::Receiver(receiver)) => {
            receiver_source(&id, &input.name, receiver, options, &mut elements, &mut tails);
        }
        None => return elements,
    }

    let tenant = input.tenant().unwrap_or_default();
    elements.push(
        Transform::remap(
            id,
            tails,
            format!(
                ".log_type = {}\n.hostname = get_env_var(\"VECTOR_SELF_NODE_NAME\") ?? \"\"",
                quote(tenant)
            ),
        )
        .into(),
    );
    elements
}

fn pod_glob(namespace: Option<&str>, container: Option<&str>) -> String {
    format!(
        "{POD_LOGS}/{}_*/{}/*.log",
        namespace.unwrap_or("*"),
        container.unwrap_or("*")
    )
}

fn extension_globs() -> impl Iterator<Item = String> {
    EXCLUDED_EXTENSIONS
        .iter()
        .map(|ext| format!("{POD_LOGS}/*/*/*.{ext}"))
}

/// The collector must not read its own logs.
fn collector_excludes(namespace: &str, options: &Options) -> Vec<String> {
    let mut excludes = Vec::new();
    if !options.forwarder_name.is_empty() {
        excludes.push(format!(
            "{POD_LOGS}/{namespace}_{}-*/*/*.log",
            options.forwarder_name
        ));
    }
    excludes.extend(extension_globs());
    excludes
}

/// Infrastructure namespaces still excluded from an application input given its includes.
fn pruned_infra_namespaces(includes: &[NamespaceContainerSpec]) -> Vec<&'static str> {
    let mut remaining = INFRA_NAMESPACES.to_vec();
    let mut remove = |names: &[&str]| remaining.retain(|ns| !names.contains(ns));
    for namespace in includes.iter().filter_map(|i| i.namespace.as_deref()) {
        match namespace {
            "default" => remove(&["default"]),
            "openshift" => remove(&["openshift"]),
            "openshift*" => remove(&["openshift", "openshift-*"]),
            "kube" => remove(&["kube"]),
            "kube*" => remove(&["kube", "kube-*"]),
            ns if ns.len() > "openshift-".len() && ns.starts_with("openshift-") => {
                remove(&["openshift-*"])
            }
            ns if ns.len() > "kube-".len() && ns.starts_with("kube-") => remove(&["kube-*"]),
            _ => {}
        }
    }
    remaining
}

fn application_globs(
    app: &Application,
    namespace: &str,
    options: &Options,
) -> (Vec<String>, Vec<String>) {
    let includes = app
        .includes
        .iter()
        .map(|i| pod_glob(i.namespace.as_deref(), i.container.as_deref()))
        .collect();

    let mut excludes: Vec<String> = pruned_infra_namespaces(&app.includes)
        .into_iter()
        .map(|ns| pod_glob(Some(ns), None))
        .collect();
    excludes.extend(
        app.excludes
            .iter()
            .map(|e| pod_glob(e.namespace.as_deref(), e.container.as_deref())),
    );
    excludes.extend(collector_excludes(namespace, options));
    (includes, excludes)
}

fn label_selector(app: &Application) -> Option<String> {
    let labels = app.selector.as_ref()?.match_labels.as_ref()?;
    (!labels.is_empty()).then(|| {
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    })
}

fn meta(base: &str, upstream: &str, log_source: &str) -> Transform {
    Transform::remap(
        with_suffix(base, "meta"),
        vec![upstream.to_string()],
        format!(".log_source = {}", quote(log_source)),
    )
}

fn container(
    id: &str,
    includes: Vec<String>,
    excludes: Vec<String>,
    app: Option<&Application>,
    elements: &mut Vec<Element>,
    tails: &mut Vec<String>,
) {
    let base = with_suffix(id, "container");
    let mut source = Source::new(&base, "kubernetes_logs")
        .with("auto_partial_merge", true)
        .with("max_read_bytes", 3_145_728)
        .with("glob_minimum_cooldown_ms", 15_000)
        .with("rotate_wait_secs", 5)
        .with("use_apiserver_cache", true)
        .with("exclude_paths_glob_patterns", strings(&excludes))
        .with(
            "pod_annotation_fields",
            table([
                ("pod_labels", "kubernetes.labels".into()),
                ("pod_namespace", "kubernetes.namespace_name".into()),
                ("pod_annotations", "kubernetes.annotations".into()),
                ("pod_uid", "kubernetes.pod_id".into()),
                ("pod_node_name", "hostname".into()),
            ]),
        )
        .with(
            "namespace_annotation_fields",
            table([("namespace_uid", "kubernetes.namespace_id".into())]),
        );
    if !includes.is_empty() {
        source = source.with("include_paths_glob_patterns", strings(&includes));
    }
    if let Some(selector) = app.and_then(label_selector) {
        source = source.with("extra_label_selector", selector);
    }
    elements.push(source.into());

    let meta = meta(&base, &base, "container");
    let mut tail = meta.id.clone();
    elements.push(meta.into());

    if let Some(limit) = app.and_then(Application::rate_limit_per_container) {
        let throttle = Transform::new(with_suffix(&base, "throttle"), "throttle", vec![tail])
            .with("window_secs", 1)
            .with("threshold", limit)
            .with("key_field", "{{ file }}");
        tail = throttle.id.clone();
        elements.push(throttle.into());
    }
    tails.push(tail);
}

fn journal(id: &str, elements: &mut Vec<Element>, tails: &mut Vec<String>) {
    let base = with_suffix(id, "journal");
    elements.push(
        Source::new(&base, "journald")
            .with("journal_directory", "/var/log/journal")
            .into(),
    );
    let mut meta = meta(&base, &base, "node");
    if let Some(Value::String(source)) = meta.options.get_mut("source") {
        source.push_str("\n.level = to_syslog_level(to_int(.PRIORITY) ?? 6) ?? \"unknown\"");
    }
    tails.push(meta.id.clone());
    elements.push(meta.into());
}

fn audit_file(id: &str, source: AuditSource, elements: &mut Vec<Element>, tails: &mut Vec<String>) {
    let (suffix, log_source, paths): (&str, &str, &[&str]) = match source {
        AuditSource::Auditd => ("host_audit", "auditd", &["/var/log/audit/audit.log"]),
        AuditSource::KubeApi => ("k8s_audit", "kubeAPI", &["/var/log/kube-apiserver/audit.log"]),
        AuditSource::OpenshiftApi => (
            "openshift_audit",
            "openshiftAPI",
            &[
                "/var/log/oauth-apiserver/audit.log",
                "/var/log/openshift-apiserver/audit.log",
                "/var/log/oauth-server/audit.log",
            ],
        ),
        AuditSource::Ovn => ("ovn_audit", "ovn", &["/var/log/ovn/acl-audit-log.log"]),
    };
    let base = with_suffix(id, suffix);
    elements.push(
        Source::new(&base, "file")
            .with("include", strings(paths))
            .with("host_key", "hostname")
            .with("glob_minimum_cooldown_ms", 15_000)
            .into(),
    );
    let mut meta = meta(&base, &base, log_source);
    if matches!(source, AuditSource::KubeApi | AuditSource::OpenshiftApi) {
        if let Some(Value::String(vrl)) = meta.options.get_mut("source") {
            vrl.push_str(
                "\nparsed, err = parse_json(.message)\nif err == null { . = merge(., object(parsed) ?? {}) }",
            );
        }
    }
    tails.push(meta.id.clone());
    elements.push(meta.into());
}

fn receiver_source(
    id: &str,
    name: &str,
    receiver: &ReceiverSpec,
    options: &Options,
    elements: &mut Vec<Element>,
    tails: &mut Vec<String>,
) {
    let base = with_suffix(id, "receiver");
    let address = format!("[::]:{}", receiver.port);
    let tls = receiver_tls(name, receiver.tls.as_ref(), options);
    match receiver.type_ {
        ReceiverType::Http => {
            elements.push(
                Source::new(&base, "http_server")
                    .with("address", address)
                    .with("decoding", table([("codec", "json".into())]))
                    .tls(tls)
                    .into(),
            );
            let split = Transform::remap(
                with_suffix(&base, "split"),
                vec![base.clone()],
                "if exists(.items) && is_array(.items) { . = unnest!(.items) } else { . }",
            );
            let items = Transform::remap(
                with_suffix(&base, "items"),
                vec![split.id.clone()],
                "if exists(.items) { . = .items } else { . }",
            );
            let meta = meta(&base, &items.id, "kubeAPI");
            tails.push(meta.id.clone());
            elements.extend([split.into(), items.into(), meta.into()]);
        }
        ReceiverType::Syslog => {
            elements.push(
                Source::new(&base, "syslog")
                    .with("mode", "tcp")
                    .with("address", address)
                    .tls(tls)
                    .into(),
            );
            let meta = meta(&base, &base, "syslog");
            tails.push(meta.id.clone());
            elements.push(meta.into());
        }
    }
}
