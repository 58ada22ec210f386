use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    ComponentStatus, Condition, DashboardSpec, DatasourceSpec, ResourceRequirements, ServiceSpec,
    StackPhase, StorageSpec,
};

/// Desired state of a Prometheus + Grafana monitoring stack.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "monitoring.cillian.website",
    version = "v1",
    kind = "MonitorStack",
    namespaced,
    status = "MonitorStackStatus",
    shortname = "ms",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Prometheus","type":"boolean","jsonPath":".status.prometheusStatus.ready"}"#,
    printcolumn = r#"{"name":"Grafana","type":"boolean","jsonPath":".status.grafanaStatus.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStackSpec {
    /// Prometheus configuration.
    #[serde(default)]
    pub prometheus: PrometheusSpec,

    /// Grafana configuration.
    #[serde(default)]
    pub grafana: GrafanaSpec,

    /// Target namespace. Children are always created next to the
    /// MonitorStack, so only an empty value or the stack's own namespace
    /// has any effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Labels merged over the generated labels of every child resource.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Prometheus configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Image repository, defaults to `prom/prometheus`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image tag, defaults to `latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub storage: StorageSpec,

    #[serde(default)]
    pub service: ServiceSpec,

    /// Raw `prometheus.yml`. Replaces the generated scrape configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// TSDB retention (e.g., "15d").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
}

/// Grafana configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Image repository, defaults to `grafana/grafana`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image tag, defaults to `latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub service: ServiceSpec,

    /// Admin password, defaults to `admin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,

    /// Datasources to provision, in order. The first one is marked default
    /// when it is a Prometheus datasource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasources: Vec<DatasourceSpec>,

    /// Dashboards to import. Kept in the schema so existing manifests
    /// round-trip; the operator does not act on them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboards: Vec<DashboardSpec>,
}

/// Status for MonitorStack.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStackStatus {
    /// Current phase: Pending, Ready, Failed, Updating.
    #[serde(default)]
    pub phase: Option<StackPhase>,

    /// Detailed status description.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub prometheus_status: ComponentStatus,

    #[serde(default)]
    pub grafana_status: ComponentStatus,

    /// Time of the last status write (RFC 3339).
    #[serde(default)]
    pub last_updated: Option<String>,

    /// Last observed generation of the spec.
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Status conditions.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
