//! Field-scoped merge of desired child state onto fetched objects.
//!
//! Each kind names the fields this operator owns. Everything else on the
//! live object (status, clusterIP, annotations written by other tools,
//! resourceVersion) is carried over untouched when the object is replaced.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ResourceRequirements, Service, ServicePort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::annotations;
use crate::error::Result;

/// A namespaced object the engine can read and write through an
/// [`ObjectStore`](crate::store::ObjectStore).
pub trait ChildResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ChildResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A child whose owned fields are kept in sync after creation.
pub trait OwnedResource: ChildResource {
    /// Whether any owned field of `existing` differs from `desired`.
    fn drifted(existing: &Self, desired: &Self) -> Result<bool>;

    /// Copy the owned fields of `desired` onto `existing`.
    fn merge_owned(existing: &mut Self, desired: &Self);
}

impl OwnedResource for ConfigMap {
    fn drifted(existing: &Self, desired: &Self) -> Result<bool> {
        Ok(labels_drifted(existing, desired) || existing.data != desired.data)
    }

    fn merge_owned(existing: &mut Self, desired: &Self) {
        merge_labels(existing, desired);
        existing.data = desired.data.clone();
    }
}

impl OwnedResource for Deployment {
    fn drifted(existing: &Self, desired: &Self) -> Result<bool> {
        if labels_drifted(existing, desired) {
            return Ok(true);
        }
        let (live, want) = match (&existing.spec, &desired.spec) {
            (Some(live), Some(want)) => (live, want),
            (None, None) => return Ok(false),
            _ => return Ok(true),
        };

        if live.replicas != want.replicas
            || live.selector != want.selector
            || template_labels(live) != template_labels(want)
            || containers_drifted(containers(live), containers(want))
        {
            return Ok(true);
        }

        // The API server fills in defaults (strategy, imagePullPolicy,
        // terminationMessagePath, ...), so for everything else the live spec
        // only has to contain the desired one. Resources were compared above
        // in canonical form.
        let mut want = serde_json::to_value(want)?;
        if let Some(containers) = want
            .pointer_mut("/template/spec/containers")
            .and_then(Value::as_array_mut)
        {
            for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                container.remove("resources");
            }
        }
        Ok(!contains(&serde_json::to_value(live)?, &want))
    }

    fn merge_owned(existing: &mut Self, desired: &Self) {
        merge_labels(existing, desired);
        existing.spec = desired.spec.clone();
    }
}

impl OwnedResource for Service {
    fn drifted(existing: &Self, desired: &Self) -> Result<bool> {
        if labels_drifted(existing, desired) {
            return Ok(true);
        }
        let (live, want) = match (&existing.spec, &desired.spec) {
            (Some(live), Some(want)) => (live, want),
            (None, None) => return Ok(false),
            _ => return Ok(true),
        };

        Ok(live.type_ != want.type_
            || live.selector != want.selector
            || ports_drifted(
                live.ports.as_deref().unwrap_or(&[]),
                want.ports.as_deref().unwrap_or(&[]),
            ))
    }

    fn merge_owned(existing: &mut Self, desired: &Self) {
        merge_labels(existing, desired);
        let Some(want) = &desired.spec else {
            return;
        };
        let live = existing.spec.get_or_insert_with(Default::default);

        let keep_allocated = matches!(want.type_.as_deref(), Some("NodePort" | "LoadBalancer"));
        let live_ports = live.ports.take().unwrap_or_default();
        let ports = want
            .ports
            .iter()
            .flatten()
            .map(|port| {
                let mut port = port.clone();
                if port.node_port.is_none() && keep_allocated {
                    port.node_port = live_ports
                        .iter()
                        .find(|p| p.name == port.name)
                        .and_then(|p| p.node_port);
                }
                port
            })
            .collect();

        live.type_ = want.type_.clone();
        live.selector = want.selector.clone();
        live.ports = Some(ports);
    }
}

fn template_labels(spec: &DeploymentSpec) -> Option<&BTreeMap<String, String>> {
    spec.template.metadata.as_ref().and_then(|m| m.labels.as_ref())
}

fn containers(spec: &DeploymentSpec) -> &[Container] {
    spec.template
        .spec
        .as_ref()
        .map(|p| p.containers.as_slice())
        .unwrap_or(&[])
}

/// Fields the server never defaults are compared exactly, so removing one
/// from the MonitorStack is drift too.
fn containers_drifted(live: &[Container], want: &[Container]) -> bool {
    live.len() != want.len()
        || live.iter().zip(want).any(|(l, w)| {
            l.name != w.name
                || l.image != w.image
                || l.args != w.args
                || l.env != w.env
                || resources_drifted(l.resources.as_ref(), w.resources.as_ref())
        })
}

fn resources_drifted(
    live: Option<&ResourceRequirements>,
    want: Option<&ResourceRequirements>,
) -> bool {
    quantities_drifted(
        live.and_then(|r| r.requests.as_ref()),
        want.and_then(|r| r.requests.as_ref()),
    ) || quantities_drifted(
        live.and_then(|r| r.limits.as_ref()),
        want.and_then(|r| r.limits.as_ref()),
    )
}

fn quantities_drifted(
    live: Option<&BTreeMap<String, Quantity>>,
    want: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let (live, want) = (live.unwrap_or(&empty), want.unwrap_or(&empty));
    live.len() != want.len()
        || want.iter().any(|(name, w)| {
            live.get(name)
                .map_or(true, |l| !quantities_equal(&l.0, &w.0))
        })
}

/// Compare two quantities by value, so `0.5` and `500m` or `1Gi` and
/// `1024Mi` are equal. Unparseable values fall back to string equality.
fn quantities_equal(a: &str, b: &str) -> bool {
    match (parse_quantity(a), parse_quantity(b)) {
        (Some(x), Some(y)) => (x - y).abs() <= 1e-9 * x.abs().max(y.abs()),
        _ => a == b,
    }
}

fn parse_quantity(quantity: &str) -> Option<f64> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);
    let number: f64 = number.parse().ok()?;

    let binary = |exp: i32| 1024f64.powi(exp);
    let scale = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        other => {
            let exp: i32 = other.strip_prefix(['e', 'E'])?.parse().ok()?;
            10f64.powi(exp)
        }
    };
    Some(number * scale)
}

/// Ports differ when any field set on the desired port differs. An
/// allocated node port is not drift unless a specific one was requested.
fn ports_drifted(live: &[ServicePort], want: &[ServicePort]) -> bool {
    live.len() != want.len()
        || live.iter().zip(want).any(|(l, w)| {
            l.name != w.name
                || l.port != w.port
                || l.target_port != w.target_port
                || l.protocol != w.protocol
                || (w.node_port.is_some() && l.node_port != w.node_port)
        })
}

fn managed_keys<K: Resource>(obj: &K) -> Vec<&str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::MANAGED_LABELS))
        .map(|keys| keys.split(',').filter(|k| !k.is_empty()).collect())
        .unwrap_or_default()
}

fn label_keys<K: Resource>(obj: &K) -> String {
    obj.meta()
        .labels
        .iter()
        .flatten()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn set_managed_keys<K: Resource>(obj: &mut K, keys: String) {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(annotations::MANAGED_LABELS.into(), keys);
}

/// Remember which label keys this operator applies to a new child.
pub fn record_managed_labels<K: Resource>(obj: &mut K) {
    let keys = label_keys(obj);
    set_managed_keys(obj, keys);
}

/// Labels drift when a desired label is missing or different, or when a
/// label this operator applied earlier is no longer desired. Labels written
/// by other tools are not drift.
fn labels_drifted<K: Resource>(existing: &K, desired: &K) -> bool {
    let live = existing.meta().labels.as_ref();
    let want = desired.meta().labels.as_ref();

    let missing = want
        .iter()
        .flat_map(|w| w.iter())
        .any(|(k, v)| live.and_then(|l| l.get(k)) != Some(v));
    let stale = managed_keys(existing).into_iter().any(|k| {
        live.is_some_and(|l| l.contains_key(k)) && !want.is_some_and(|w| w.contains_key(k))
    });
    missing || stale
}

fn merge_labels<K: Resource>(existing: &mut K, desired: &K) {
    let want = desired.meta().labels.clone().unwrap_or_default();
    let stale: Vec<String> = managed_keys(existing)
        .into_iter()
        .filter(|k| !want.contains_key(*k))
        .map(String::from)
        .collect();

    let labels = existing.meta_mut().labels.get_or_insert_with(BTreeMap::new);
    for key in &stale {
        labels.remove(key);
    }
    labels.extend(want);
    set_managed_keys(existing, label_keys(desired));
}

/// Structural containment: every field present in `want` is present in
/// `live` with a contained value. Arrays must match element-wise.
pub(crate) fn contains(live: &Value, want: &Value) -> bool {
    match (live, want) {
        (Value::Object(l), Value::Object(w)) => w
            .iter()
            .all(|(k, wv)| wv.is_null() || l.get(k).is_some_and(|lv| contains(lv, wv))),
        (Value::Array(l), Value::Array(w)) => {
            l.len() == w.len() && l.iter().zip(w).all(|(lv, wv)| contains(lv, wv))
        }
        _ => live == want,
    }
}
