use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource requirements (requests and limits).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRequirements {
    /// Resource requests.
    #[serde(default)]
    pub requests: ResourceValues,

    /// Resource limits.
    #[serde(default)]
    pub limits: ResourceValues,
}

/// CPU and memory values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceValues {
    /// CPU (e.g., "500m", "2").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory (e.g., "1Gi", "4Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Persistent storage configuration. Setting `size` switches the data volume
/// from an emptyDir to a PersistentVolumeClaim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage size (e.g., "50Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Kubernetes StorageClass name. Cluster default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Service exposure for one component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Kubernetes Service type: ClusterIP, NodePort, LoadBalancer, ExternalName.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Service port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Fixed node port, honoured only for NodePort services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,

    /// Extra labels for the Service object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A Grafana datasource to provision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatasourceSpec {
    /// Datasource name.
    pub name: String,

    /// Grafana datasource plugin type (e.g., "prometheus", "loki").
    #[serde(rename = "type")]
    pub type_: String,

    /// Datasource URL.
    pub url: String,
}

/// A Grafana dashboard reference. Accepted in the schema but not
/// provisioned yet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardSpec {
    pub name: String,

    /// Dashboard JSON model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,

    /// URL to fetch the dashboard from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Overall phase of a MonitorStack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum StackPhase {
    Pending,
    Ready,
    Failed,
    Updating,
}

impl StackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackPhase::Pending => "Pending",
            StackPhase::Ready => "Ready",
            StackPhase::Failed => "Failed",
            StackPhase::Updating => "Updating",
        }
    }
}

impl fmt::Display for StackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of one component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Whether at least one replica is ready.
    #[serde(default)]
    pub ready: bool,

    /// Replica count reported by the Deployment.
    #[serde(default)]
    pub replicas: i32,

    /// Human-readable status message.
    #[serde(default)]
    pub message: Option<String>,

    /// In-cluster URL, set only while ready.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ComponentStatus {
    pub fn disabled() -> Self {
        Self {
            message: Some("Disabled".into()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Kubernetes-style condition for status reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Ready").
    #[serde(rename = "type")]
    pub type_: String,

    /// Status: "True", "False", or "Unknown".
    pub status: String,

    /// Machine-readable reason (e.g., "ComponentsReady").
    #[serde(default)]
    pub reason: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,

    /// Last transition time (RFC 3339 string).
    #[serde(default)]
    pub last_transition_time: Option<String>,
}
