use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{config_map_name, Component, StackContext};
use crate::config_generator;
use crate::constants::paths;
use crate::normalize::{GrafanaConfig, PrometheusConfig};

/// Build the ConfigMap holding `prometheus.yml`.
///
/// A raw config in the spec is used verbatim; otherwise the generated scrape
/// configuration is rendered.
pub fn build_prometheus_configmap(
    ctx: &StackContext,
    prometheus: &PrometheusConfig,
) -> Result<ConfigMap, serde_yaml::Error> {
    let config = match &prometheus.raw_config {
        Some(raw) => raw.clone(),
        None => config_generator::generate_prometheus_config()?,
    };

    Ok(configmap(
        ctx,
        Component::Prometheus,
        paths::PROMETHEUS_CONFIG_KEY,
        config,
    ))
}

/// Build the ConfigMap provisioning Grafana datasources.
///
/// Returns `None` when no datasources are configured; the Deployment then
/// mounts nothing either.
pub fn build_grafana_datasources_configmap(
    ctx: &StackContext,
    grafana: &GrafanaConfig,
) -> Result<Option<ConfigMap>, serde_yaml::Error> {
    if grafana.datasources.is_empty() {
        return Ok(None);
    }

    let doc = config_generator::generate_datasources(&grafana.datasources)?;
    Ok(Some(configmap(
        ctx,
        Component::Grafana,
        paths::GRAFANA_DATASOURCES_KEY,
        doc,
    )))
}

fn configmap(ctx: &StackContext, component: Component, key: &str, contents: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&ctx.name, component)),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(ctx.labels(component)),
            owner_references: Some(vec![ctx.owner_ref.clone()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(key.to_string(), contents)])),
        ..Default::default()
    }
}
