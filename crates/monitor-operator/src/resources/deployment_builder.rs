use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    HTTPGetAction, PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{config_map_name, pvc_name, selector_labels, workload_name, Component, StackContext};
use crate::constants::{paths, ports, probes, security};
use crate::crds::{self, ResourceValues};
use crate::normalize::{GrafanaConfig, PrometheusConfig};

/// Build the single-replica Prometheus Deployment.
///
/// The TSDB lives on the PVC when storage was sized, otherwise on an
/// emptyDir that dies with the pod.
pub fn build_prometheus_deployment(ctx: &StackContext, prometheus: &PrometheusConfig) -> Deployment {
    let component = Component::Prometheus;

    let data_volume = match &prometheus.storage {
        Some(_) => Volume {
            name: "data".into(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: pvc_name(&ctx.name, component),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => empty_dir("data"),
    };

    let container = Container {
        name: component.as_str().into(),
        image: Some(prometheus.image_ref()),
        args: Some(prometheus_args(&prometheus.retention)),
        ports: Some(vec![container_port("web", ports::PROMETHEUS)]),
        resources: Some(resource_requirements(&prometheus.resources)),
        liveness_probe: Some(liveness_probe(
            probes::PROMETHEUS_LIVENESS_PATH,
            ports::PROMETHEUS,
        )),
        readiness_probe: Some(readiness_probe(
            probes::PROMETHEUS_READINESS_PATH,
            ports::PROMETHEUS,
        )),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "config".into(),
                mount_path: paths::PROMETHEUS_CONFIG_DIR.into(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: "data".into(),
                mount_path: paths::PROMETHEUS_DATA_DIR.into(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        config_map_volume("config", config_map_name(&ctx.name, component)),
        data_volume,
    ];

    deployment(ctx, component, security::PROMETHEUS_UID, container, volumes)
}

/// Build the single-replica Grafana Deployment.
pub fn build_grafana_deployment(ctx: &StackContext, grafana: &GrafanaConfig) -> Deployment {
    let component = Component::Grafana;

    let mut volume_mounts = vec![VolumeMount {
        name: "grafana-storage".into(),
        mount_path: paths::GRAFANA_DATA_DIR.into(),
        ..Default::default()
    }];
    let mut volumes = vec![empty_dir("grafana-storage")];

    if !grafana.datasources.is_empty() {
        volume_mounts.push(VolumeMount {
            name: "datasources".into(),
            mount_path: paths::GRAFANA_DATASOURCES_DIR.into(),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(config_map_volume(
            "datasources",
            config_map_name(&ctx.name, component),
        ));
    }

    let container = Container {
        name: component.as_str().into(),
        image: Some(grafana.image_ref()),
        env: Some(grafana_env(&grafana.admin_password)),
        ports: Some(vec![container_port("grafana", ports::GRAFANA)]),
        resources: Some(resource_requirements(&grafana.resources)),
        liveness_probe: Some(liveness_probe(probes::GRAFANA_HEALTH_PATH, ports::GRAFANA)),
        readiness_probe: Some(readiness_probe(probes::GRAFANA_HEALTH_PATH, ports::GRAFANA)),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    deployment(ctx, component, security::GRAFANA_UID, container, volumes)
}

fn deployment(
    ctx: &StackContext,
    component: Component,
    uid: i64,
    container: Container,
    volumes: Vec<Volume>,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(workload_name(&ctx.name, component)),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(ctx.labels(component)),
            owner_references: Some(vec![ctx.owner_ref.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            // Horizontal scaling is not supported.
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&ctx.name, component)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(ctx.pod_labels(component)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        run_as_user: Some(uid),
                        fs_group: Some(uid),
                        ..Default::default()
                    }),
                    containers: vec![container],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn prometheus_args(retention: &str) -> Vec<String> {
    vec![
        format!(
            "--config.file={}/{}",
            paths::PROMETHEUS_CONFIG_DIR,
            paths::PROMETHEUS_CONFIG_KEY
        ),
        format!("--storage.tsdb.path={}", paths::PROMETHEUS_DATA_DIR),
        "--web.console.libraries=/etc/prometheus/console_libraries".into(),
        "--web.console.templates=/etc/prometheus/consoles".into(),
        "--web.enable-lifecycle".into(),
        "--web.enable-admin-api".into(),
        format!("--storage.tsdb.retention.time={retention}"),
    ]
}

fn grafana_env(admin_password: &str) -> Vec<EnvVar> {
    [
        ("GF_SECURITY_ADMIN_PASSWORD", admin_password),
        ("GF_USERS_ALLOW_SIGN_UP", "false"),
        ("GF_PATHS_DATA", paths::GRAFANA_DATA_DIR),
        ("GF_PATHS_LOGS", paths::GRAFANA_LOGS_DIR),
        ("GF_PATHS_PLUGINS", paths::GRAFANA_PLUGINS_DIR),
        ("GF_PATHS_PROVISIONING", paths::GRAFANA_PROVISIONING_DIR),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    })
    .collect()
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.into()),
        container_port: port,
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

fn liveness_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(http_get(path, port)),
        initial_delay_seconds: Some(probes::LIVENESS_INITIAL_DELAY_SECS),
        period_seconds: Some(probes::LIVENESS_PERIOD_SECS),
        timeout_seconds: Some(probes::LIVENESS_TIMEOUT_SECS),
        failure_threshold: Some(probes::FAILURE_THRESHOLD),
        ..Default::default()
    }
}

fn readiness_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(http_get(path, port)),
        initial_delay_seconds: Some(probes::READINESS_INITIAL_DELAY_SECS),
        period_seconds: Some(probes::READINESS_PERIOD_SECS),
        timeout_seconds: Some(probes::READINESS_TIMEOUT_SECS),
        failure_threshold: Some(probes::FAILURE_THRESHOLD),
        ..Default::default()
    }
}

fn http_get(path: &str, port: i32) -> HTTPGetAction {
    HTTPGetAction {
        path: Some(path.into()),
        port: IntOrString::Int(port),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn config_map_volume(name: &str, config_map: String) -> Volume {
    Volume {
        name: name.into(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Translate spec resources into container requirements, leaving out
/// anything unset.
fn resource_requirements(resources: &crds::ResourceRequirements) -> ResourceRequirements {
    ResourceRequirements {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        ..Default::default()
    }
}

fn quantities(values: &ResourceValues) -> Option<BTreeMap<String, Quantity>> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = values.cpu.as_ref().filter(|v| !v.is_empty()) {
        map.insert("cpu".into(), Quantity(cpu.clone()));
    }
    if let Some(mem) = values.memory.as_ref().filter(|v| !v.is_empty()) {
        map.insert("memory".into(), Quantity(mem.clone()));
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{DatasourceSpec, MonitorStackSpec};
    use crate::normalize::{normalize, NormalizedSpec};
    use crate::resources::test_support::context;

    fn normalized(json: &str) -> NormalizedSpec {
        let spec: MonitorStackSpec = serde_json::from_str(json).unwrap();
        normalize(&spec).unwrap()
    }

    fn pod_spec(deploy: &Deployment) -> &PodSpec {
        deploy
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_prometheus_deployment_shape() {
        let prom = normalized(r#"{"prometheus":{"enabled":true}}"#).prometheus.unwrap();
        let deploy = build_prometheus_deployment(&context("acme"), &prom);

        assert_eq!(deploy.metadata.name.as_deref(), Some("acme-prometheus"));
        assert_eq!(deploy.spec.as_ref().unwrap().replicas, Some(1));

        let pod = pod_spec(&deploy);
        assert_eq!(pod.containers.len(), 1);
        let sc = pod.security_context.as_ref().unwrap();
        assert_eq!(sc.run_as_user, Some(65534));
        assert_eq!(sc.run_as_non_root, Some(true));

        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("prom/prometheus:latest"));
        let args = container.args.as_ref().unwrap();
        assert!(args.contains(&"--storage.tsdb.retention.time=15d".to_string()));
        assert!(args.contains(&"--config.file=/etc/prometheus/prometheus.yml".to_string()));

        let liveness = container.liveness_probe.as_ref().unwrap();
        assert_eq!(
            liveness.http_get.as_ref().unwrap().path.as_deref(),
            Some("/-/healthy")
        );
        assert_eq!(liveness.initial_delay_seconds, Some(30));
        assert_eq!(liveness.period_seconds, Some(10));
        let readiness = container.readiness_probe.as_ref().unwrap();
        assert_eq!(
            readiness.http_get.as_ref().unwrap().path.as_deref(),
            Some("/-/ready")
        );
        assert_eq!(readiness.initial_delay_seconds, Some(5));
        assert_eq!(readiness.failure_threshold, Some(3));

        let requests = container
            .resources
            .as_ref()
            .unwrap()
            .requests
            .as_ref()
            .unwrap();
        assert_eq!(requests["cpu"].0, "100m");
        assert_eq!(requests["memory"].0, "256Mi");
    }

    #[test]
    fn test_prometheus_data_volume_follows_storage() {
        let ephemeral = normalized(r#"{"prometheus":{"enabled":true}}"#).prometheus.unwrap();
        let deploy = build_prometheus_deployment(&context("acme"), &ephemeral);
        let volumes = pod_spec(&deploy).volumes.as_ref().unwrap();
        let data = volumes.iter().find(|v| v.name == "data").unwrap();
        assert!(data.empty_dir.is_some());
        assert!(data.persistent_volume_claim.is_none());

        let durable = normalized(r#"{"prometheus":{"enabled":true,"storage":{"size":"10Gi"}}}"#)
            .prometheus
            .unwrap();
        let deploy = build_prometheus_deployment(&context("acme"), &durable);
        let volumes = pod_spec(&deploy).volumes.as_ref().unwrap();
        let data = volumes.iter().find(|v| v.name == "data").unwrap();
        assert_eq!(
            data.persistent_volume_claim.as_ref().unwrap().claim_name,
            "acme-prometheus-data"
        );
    }

    #[test]
    fn test_config_mount_is_read_only() {
        let prom = normalized(r#"{"prometheus":{"enabled":true}}"#).prometheus.unwrap();
        let deploy = build_prometheus_deployment(&context("acme"), &prom);
        let mounts = pod_spec(&deploy).containers[0].volume_mounts.as_ref().unwrap();
        let config = mounts.iter().find(|m| m.name == "config").unwrap();
        assert_eq!(config.read_only, Some(true));
        assert_eq!(config.mount_path, "/etc/prometheus");
    }

    #[test]
    fn test_selector_ignores_user_labels() {
        let prom = normalized(r#"{"prometheus":{"enabled":true}}"#).prometheus.unwrap();
        let mut ctx = context("acme");
        ctx.user_labels.insert("team".into(), "sre".into());
        let deploy = build_prometheus_deployment(&ctx, &prom);

        let spec = deploy.spec.as_ref().unwrap();
        let selector = spec.selector.match_labels.as_ref().unwrap();
        assert!(!selector.contains_key("team"));
        let template_labels = spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(template_labels["team"], "sre");
        assert!(selector.iter().all(|(k, v)| template_labels.get(k) == Some(v)));
    }

    #[test]
    fn test_selector_matches_template_when_identity_label_overridden() {
        let grafana = normalized(r#"{"grafana":{"enabled":true}}"#).grafana.unwrap();
        let mut ctx = context("acme");
        for key in [
            "app.kubernetes.io/name",
            "app.kubernetes.io/instance",
            "app.kubernetes.io/component",
        ] {
            ctx.user_labels.insert(key.into(), "shared".into());
        }
        let deploy = build_grafana_deployment(&ctx, &grafana);

        let labels = deploy.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["app.kubernetes.io/instance"], "shared");
        let spec = deploy.spec.as_ref().unwrap();
        let selector = spec.selector.match_labels.as_ref().unwrap();
        let template_labels = spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert!(selector.iter().all(|(k, v)| template_labels.get(k) == Some(v)));
        assert_eq!(template_labels["app.kubernetes.io/instance"], "acme");
    }

    #[test]
    fn test_grafana_deployment_mounts_datasources_only_when_present() {
        let grafana = normalized(r#"{"grafana":{"enabled":true}}"#).grafana.unwrap();
        let deploy = build_grafana_deployment(&context("acme"), &grafana);
        let pod = pod_spec(&deploy);
        assert_eq!(pod.volumes.as_ref().unwrap().len(), 1);
        assert_eq!(pod.security_context.as_ref().unwrap().run_as_user, Some(472));

        let mut grafana = grafana;
        grafana.datasources.push(DatasourceSpec {
            name: "prom".into(),
            type_: "prometheus".into(),
            url: "http://acme-prometheus:9090".into(),
        });
        let deploy = build_grafana_deployment(&context("acme"), &grafana);
        let pod = pod_spec(&deploy);
        let ds = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .find(|v| v.name == "datasources")
            .unwrap();
        assert_eq!(ds.config_map.as_ref().unwrap().name, "acme-grafana-datasources");
        let mount = pod.containers[0]
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == "datasources")
            .unwrap();
        assert_eq!(mount.read_only, Some(true));
    }

    #[test]
    fn test_grafana_env_carries_admin_password() {
        let grafana = normalized(r#"{"grafana":{"enabled":true,"adminPassword":"s3cret"}}"#)
            .grafana
            .unwrap();
        let deploy = build_grafana_deployment(&context("acme"), &grafana);
        let env = pod_spec(&deploy).containers[0].env.as_ref().unwrap();
        let password = env
            .iter()
            .find(|e| e.name == "GF_SECURITY_ADMIN_PASSWORD")
            .unwrap();
        assert_eq!(password.value.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_builders_are_deterministic() {
        let spec = normalized(
            r#"{"prometheus":{"enabled":true,"storage":{"size":"1Gi"}},"grafana":{"enabled":true}}"#,
        );
        let ctx = context("acme");
        let prom = spec.prometheus.as_ref().unwrap();
        let grafana = spec.grafana.as_ref().unwrap();
        assert_eq!(
            build_prometheus_deployment(&ctx, prom),
            build_prometheus_deployment(&ctx, prom)
        );
        assert_eq!(
            build_grafana_deployment(&ctx, grafana),
            build_grafana_deployment(&ctx, grafana)
        );
    }

    #[test]
    fn test_empty_limits_are_omitted() {
        let reqs = resource_requirements(&crds::ResourceRequirements::default());
        assert!(reqs.requests.is_none());
        assert!(reqs.limits.is_none());
    }
}
