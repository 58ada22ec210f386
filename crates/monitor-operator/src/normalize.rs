//! Validation and defaulting of a MonitorStack spec.
//!
//! The API server already applies schema defaults and validation, but the
//! operator repeats both on every pass so builders can rely on a fully
//! populated, already-checked configuration. Nothing here performs I/O.

use std::collections::BTreeMap;

use crate::constants::{defaults, ports, SERVICE_TYPES};
use crate::crds::{
    DatasourceSpec, GrafanaSpec, MonitorStackSpec, PrometheusSpec, ResourceRequirements,
    ServiceSpec,
};
use crate::error::ValidationError;
use crate::resources::Component;

/// A validated spec with every default filled in. A component that is
/// disabled is simply absent.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedSpec {
    pub prometheus: Option<PrometheusConfig>,
    pub grafana: Option<GrafanaConfig>,
    pub namespace_override: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl NormalizedSpec {
    pub fn is_enabled(&self, component: Component) -> bool {
        match component {
            Component::Prometheus => self.prometheus.is_some(),
            Component::Grafana => self.grafana.is_some(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub type_: String,
    pub port: i32,
    pub node_port: Option<i32>,
    pub labels: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// Node port to request from the API server, if any.
    pub fn requested_node_port(&self) -> Option<i32> {
        if self.type_ == "NodePort" {
            self.node_port.filter(|p| *p > 0)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub size: String,
    pub storage_class: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrometheusConfig {
    pub image: String,
    pub tag: String,
    pub resources: ResourceRequirements,
    pub service: ServiceConfig,
    /// Present only when a size was configured.
    pub storage: Option<StorageConfig>,
    pub retention: String,
    pub raw_config: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrafanaConfig {
    pub image: String,
    pub tag: String,
    pub resources: ResourceRequirements,
    pub service: ServiceConfig,
    pub admin_password: String,
    pub datasources: Vec<DatasourceSpec>,
}

impl PrometheusConfig {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl GrafanaConfig {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// Validate `spec` and fill every unset field with its default.
///
/// Explicit values are never overwritten; an explicitly empty string is
/// rejected instead of defaulted.
pub fn normalize(spec: &MonitorStackSpec) -> Result<NormalizedSpec, ValidationError> {
    if !spec.prometheus.enabled && !spec.grafana.enabled {
        return Err(ValidationError::NoComponentEnabled);
    }

    let prometheus = if spec.prometheus.enabled {
        Some(normalize_prometheus(&spec.prometheus)?)
    } else {
        None
    };

    let grafana = if spec.grafana.enabled {
        Some(normalize_grafana(&spec.grafana)?)
    } else {
        None
    };

    Ok(NormalizedSpec {
        prometheus,
        grafana,
        namespace_override: spec.namespace.clone().filter(|ns| !ns.is_empty()),
        labels: spec.labels.clone(),
    })
}

fn normalize_prometheus(spec: &PrometheusSpec) -> Result<PrometheusConfig, ValidationError> {
    let component = Component::Prometheus.as_str();

    let image = non_empty(component, "image", &spec.image, defaults::PROMETHEUS_IMAGE)?;
    let tag = non_empty(component, "tag", &spec.tag, defaults::TAG)?;
    let service = normalize_service(component, &spec.service, ports::PROMETHEUS)?;
    let retention = spec
        .retention
        .clone()
        .unwrap_or_else(|| defaults::RETENTION.to_string());
    if !is_duration(&retention) {
        return Err(ValidationError::Retention {
            component,
            retention,
        });
    }

    let storage = spec
        .storage
        .size
        .as_ref()
        .filter(|size| !size.is_empty())
        .map(|size| StorageConfig {
            size: size.clone(),
            storage_class: spec.storage.storage_class.clone().filter(|c| !c.is_empty()),
        });

    Ok(PrometheusConfig {
        image,
        tag,
        resources: with_default_requests(
            &spec.resources,
            defaults::CPU_REQUEST,
            defaults::PROMETHEUS_MEMORY_REQUEST,
        ),
        service,
        storage,
        retention,
        raw_config: spec.config.clone().filter(|c| !c.is_empty()),
    })
}

fn normalize_grafana(spec: &GrafanaSpec) -> Result<GrafanaConfig, ValidationError> {
    let component = Component::Grafana.as_str();

    let image = non_empty(component, "image", &spec.image, defaults::GRAFANA_IMAGE)?;
    let tag = non_empty(component, "tag", &spec.tag, defaults::TAG)?;
    let service = normalize_service(component, &spec.service, ports::GRAFANA)?;
    let admin_password = non_empty(
        component,
        "adminPassword",
        &spec.admin_password,
        defaults::ADMIN_PASSWORD,
    )?;

    for (i, ds) in spec.datasources.iter().enumerate() {
        for (field, value) in [("name", &ds.name), ("type", &ds.type_), ("url", &ds.url)] {
            if value.is_empty() {
                return Err(ValidationError::Empty {
                    component,
                    field: format!("datasources[{i}].{field}"),
                });
            }
        }
    }

    Ok(GrafanaConfig {
        image,
        tag,
        resources: with_default_requests(
            &spec.resources,
            defaults::CPU_REQUEST,
            defaults::GRAFANA_MEMORY_REQUEST,
        ),
        service,
        admin_password,
        datasources: spec.datasources.clone(),
    })
}

fn normalize_service(
    component: &'static str,
    spec: &ServiceSpec,
    default_port: i32,
) -> Result<ServiceConfig, ValidationError> {
    let type_ = non_empty(component, "service.type", &spec.type_, defaults::SERVICE_TYPE)?;
    if !SERVICE_TYPES.contains(&type_.as_str()) {
        return Err(ValidationError::ServiceType {
            component,
            service_type: type_,
        });
    }

    let port = spec.port.unwrap_or(default_port);
    if !(1..=65535).contains(&port) {
        return Err(ValidationError::PortOutOfRange { component, port });
    }

    if type_ == "NodePort" {
        if let Some(node_port) = spec.node_port.filter(|p| *p > 0) {
            if !(ports::NODE_PORT_MIN..=ports::NODE_PORT_MAX).contains(&node_port) {
                return Err(ValidationError::NodePortOutOfRange {
                    component,
                    node_port,
                });
            }
        }
    }

    Ok(ServiceConfig {
        type_,
        port,
        node_port: spec.node_port,
        labels: spec.labels.clone(),
    })
}

fn non_empty(
    component: &'static str,
    field: &str,
    value: &Option<String>,
    default: &str,
) -> Result<String, ValidationError> {
    match value {
        None => Ok(default.to_string()),
        Some(v) if v.is_empty() => Err(ValidationError::Empty {
            component,
            field: field.to_string(),
        }),
        Some(v) => Ok(v.clone()),
    }
}

fn with_default_requests(
    resources: &ResourceRequirements,
    cpu: &str,
    memory: &str,
) -> ResourceRequirements {
    let mut out = resources.clone();
    if out.requests.cpu.as_deref().map_or(true, str::is_empty) {
        out.requests.cpu = Some(cpu.to_string());
    }
    if out.requests.memory.as_deref().map_or(true, str::is_empty) {
        out.requests.memory = Some(memory.to_string());
    }
    out
}

/// `^[0-9]+[smhdy]$`
fn is_duration(value: &str) -> bool {
    let Some(unit) = value.chars().last() else {
        return false;
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    matches!(unit, 's' | 'm' | 'h' | 'd' | 'y')
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
}
