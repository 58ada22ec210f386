//! Builders for the child resources of a MonitorStack.
//!
//! Every builder is a pure function of the normalized spec: calling it twice
//! yields identical objects, which is what drift detection relies on.

pub mod configmap_builder;
pub mod deployment_builder;
pub mod merge;
pub mod pvc_builder;
pub mod service_builder;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::constants::{labels, values};
use crate::crds::MonitorStack;
use crate::error::{OperatorError, Result};

/// The two independently toggleable components of a stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    Prometheus,
    Grafana,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::Prometheus, Component::Grafana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Prometheus => "prometheus",
            Component::Grafana => "grafana",
        }
    }

    /// Suffix of the component's ConfigMap name.
    fn config_suffix(&self) -> &'static str {
        match self {
            Component::Prometheus => "config",
            Component::Grafana => "datasources",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{stack}-{component}`, shared by the Deployment and the Service.
pub fn workload_name(stack: &str, component: Component) -> String {
    format!("{stack}-{component}")
}

pub fn service_name(stack: &str, component: Component) -> String {
    workload_name(stack, component)
}

/// `{stack}-prometheus-config` or `{stack}-grafana-datasources`.
pub fn config_map_name(stack: &str, component: Component) -> String {
    format!("{stack}-{component}-{}", component.config_suffix())
}

pub fn pvc_name(stack: &str, component: Component) -> String {
    format!("{stack}-{component}-data")
}

/// Labels identifying a component's pods. Deployment selectors are
/// immutable, so user labels never take part in them.
pub fn selector_labels(stack: &str, component: Component) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::NAME.into(), values::APP_NAME.into()),
        (labels::INSTANCE.into(), stack.into()),
        (labels::COMPONENT.into(), component.as_str().into()),
    ])
}

/// Full label set for a component's children: the fixed identity labels with
/// the stack's user labels merged over them.
pub fn component_labels(
    stack: &str,
    component: Component,
    user_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = selector_labels(stack, component);
    out.insert(labels::MANAGED_BY.into(), values::MANAGED_BY.into());
    out.insert(labels::PART_OF.into(), values::PART_OF.into());
    out.extend(user_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Build the controller OwnerReference pointing at a MonitorStack.
pub fn owner_reference(stack: &MonitorStack) -> Result<OwnerReference> {
    let uid = stack
        .metadata
        .uid
        .clone()
        .ok_or(OperatorError::MissingField("metadata.uid"))?;

    Ok(OwnerReference {
        api_version: MonitorStack::api_version(&()).to_string(),
        kind: MonitorStack::kind(&()).to_string(),
        name: stack.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Identity shared by every builder for one stack.
#[derive(Clone, Debug)]
pub struct StackContext {
    pub name: String,
    pub namespace: String,
    pub user_labels: BTreeMap<String, String>,
    pub owner_ref: OwnerReference,
}

impl StackContext {
    pub fn new(stack: &MonitorStack) -> Result<Self> {
        Ok(Self {
            name: stack.name_any(),
            namespace: stack
                .namespace()
                .ok_or(OperatorError::MissingField("metadata.namespace"))?,
            user_labels: stack.spec.labels.clone(),
            owner_ref: owner_reference(stack)?,
        })
    }

    pub fn labels(&self, component: Component) -> BTreeMap<String, String> {
        component_labels(&self.name, component, &self.user_labels)
    }

    /// Labels for a component's pods. User labels may override identity
    /// keys on the children themselves, but the pods always carry the
    /// selector labels so the Deployment and Service keep matching them.
    pub fn pod_labels(&self, component: Component) -> BTreeMap<String, String> {
        let mut out = self.labels(component);
        out.extend(selector_labels(&self.name, component));
        out
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context(name: &str) -> StackContext {
        StackContext {
            name: name.into(),
            namespace: "monitoring".into(),
            user_labels: BTreeMap::new(),
            owner_ref: OwnerReference {
                api_version: "monitoring.cillian.website/v1".into(),
                kind: "MonitorStack".into(),
                name: name.into(),
                uid: "test-uid".into(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
        }
    }
}
