//! In-memory object store shared by the reconciler tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use monitor_operator::crds::{MonitorStack, MonitorStackSpec, MonitorStackStatus};
use monitor_operator::error::{OperatorError, Result};
use monitor_operator::resources::merge::ChildResource;
use monitor_operator::ObjectStore;

pub const NAMESPACE: &str = "monitoring";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Replace,
    Delete,
    Finalizers,
    Status,
}

/// A mutating call that reached the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: String,
    pub name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String, String), Value>,
    stacks: BTreeMap<(String, String), MonitorStack>,
    calls: Vec<Call>,
    statuses: Vec<MonitorStackStatus>,
    failures: Vec<(Op, String, String, u16)>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn check_failure(&self, op: Op, kind: &str, name: &str) -> Result<()> {
        match self
            .failures
            .iter()
            .find(|(o, k, n, _)| *o == op && k == kind && n == name)
        {
            Some((_, _, _, code)) => Err(api_error(*code, "injected failure")),
            None => Ok(()),
        }
    }

    fn record(&mut self, op: Op, kind: &str, name: &str) {
        self.calls.push(Call {
            op,
            kind: kind.into(),
            name: name.into(),
        });
    }

    /// Drop every child owned by a stack uid, the way the garbage collector
    /// would once the stack is gone.
    fn collect_garbage(&mut self, uid: &str) {
        self.objects.retain(|_, obj| {
            !obj["metadata"]["ownerReferences"]
                .as_array()
                .is_some_and(|refs| refs.iter().any(|r| r["uid"] == uid))
        });
    }
}

pub fn api_error(code: u16, message: &str) -> OperatorError {
    OperatorError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: message.into(),
        reason: match code {
            404 => "NotFound",
            409 => "Conflict",
            _ => "InternalError",
        }
        .into(),
        code,
    }))
}

/// Object store keeping everything in memory and recording every mutation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a MonitorStack as the API server would, with a uid and
    /// generation 1.
    pub async fn put_stack(&self, name: &str, spec: MonitorStackSpec) -> MonitorStack {
        let mut state = self.state.lock().await;
        let mut stack = MonitorStack::new(name, spec);
        stack.metadata.namespace = Some(NAMESPACE.into());
        stack.metadata.uid = Some(format!("uid-{name}"));
        stack.metadata.generation = Some(1);
        stack.metadata.resource_version = Some(state.next_version());
        state
            .stacks
            .insert((NAMESPACE.into(), name.into()), stack.clone());
        stack
    }

    pub async fn stack(&self, name: &str) -> Option<MonitorStack> {
        let state = self.state.lock().await;
        state.stacks.get(&(NAMESPACE.into(), name.into())).cloned()
    }

    pub async fn status(&self, name: &str) -> MonitorStackStatus {
        self.stack(name)
            .await
            .and_then(|s| s.status)
            .unwrap_or_default()
    }

    /// Edit the spec the way `kubectl apply` would, bumping the generation.
    pub async fn update_spec(&self, name: &str, edit: impl FnOnce(&mut MonitorStackSpec)) {
        let mut state = self.state.lock().await;
        let version = state.next_version();
        let stack = state
            .stacks
            .get_mut(&(NAMESPACE.into(), name.into()))
            .expect("stack exists");
        edit(&mut stack.spec);
        stack.metadata.generation = stack.metadata.generation.map(|g| g + 1);
        stack.metadata.resource_version = Some(version);
    }

    /// Record a deletion request; the stack stays until its finalizers clear.
    pub async fn mark_deleted(&self, name: &str) {
        let mut state = self.state.lock().await;
        let version = state.next_version();
        let stack = state
            .stacks
            .get_mut(&(NAMESPACE.into(), name.into()))
            .expect("stack exists");
        stack.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        stack.metadata.resource_version = Some(version);
    }

    pub async fn object<K: ChildResource>(&self, name: &str) -> Option<K> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&(K::kind(&()).to_string(), NAMESPACE.into(), name.into()))
            .map(|v| serde_json::from_value(v.clone()).expect("stored object deserializes"))
    }

    pub async fn exists<K: ChildResource>(&self, name: &str) -> bool {
        self.object::<K>(name).await.is_some()
    }

    /// Apply an out-of-band edit to a stored object, as another client would.
    pub async fn edit_object<K: ChildResource>(&self, name: &str, edit: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().await;
        let version = state.next_version();
        let obj = state
            .objects
            .get_mut(&(K::kind(&()).to_string(), NAMESPACE.into(), name.into()))
            .expect("object exists");
        edit(obj);
        obj["metadata"]["resourceVersion"] = json!(version);
    }

    /// Report a Deployment's rollout progress.
    pub async fn set_deployment_ready(&self, name: &str, replicas: i32, ready: i32) {
        self.edit_object::<Deployment>(name, |obj| {
            obj["status"] = json!({ "replicas": replicas, "readyReplicas": ready });
        })
        .await;
    }

    /// Make every call matching `op`, `kind` and `name` fail with `code`.
    pub async fn fail(&self, op: Op, kind: &str, name: &str, code: u16) {
        let mut state = self.state.lock().await;
        state.failures.push((op, kind.into(), name.into(), code));
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Every status written, oldest first.
    pub async fn status_history(&self) -> Vec<MonitorStackStatus> {
        self.state.lock().await.statuses.clone()
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Creates and replaces issued against child resources.
    pub async fn child_writes(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| matches!(c.op, Op::Create | Op::Replace))
            .collect()
    }

    pub async fn object_names(&self, kind: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .objects
            .keys()
            .filter(|(k, _, _)| k == kind)
            .map(|(_, _, n)| n.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let state = self.state.lock().await;
        let kind = K::kind(&()).to_string();
        state.check_failure(Op::Get, &kind, name)?;

        match state.objects.get(&(kind, namespace.into(), name.into())) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut state = self.state.lock().await;
        let kind = K::kind(&()).to_string();
        let name = obj.name_any();
        state.check_failure(Op::Create, &kind, &name)?;

        let key = (kind.clone(), namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(api_error(409, "already exists"));
        }

        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["resourceVersion"] = json!(state.next_version());
        value["metadata"]["uid"] = json!(format!("uid-{kind}-{name}"));
        state.objects.insert(key, value.clone());
        state.record(Op::Create, &kind, &name);

        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: ChildResource>(&self, namespace: &str, name: &str, obj: &K) -> Result<K> {
        let mut state = self.state.lock().await;
        let kind = K::kind(&()).to_string();
        state.check_failure(Op::Replace, &kind, name)?;

        let key = (kind.clone(), namespace.to_string(), name.to_string());
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(api_error(404, "not found"));
        };
        if stored["metadata"]["resourceVersion"].as_str() != obj.resource_version().as_deref() {
            return Err(api_error(409, "the object has been modified"));
        }

        let mut value = serde_json::to_value(obj)?;
        // Status is a subresource; replace never changes it.
        value["status"] = stored["status"].clone();
        value["metadata"]["resourceVersion"] = json!(state.next_version());
        state.objects.insert(key, value.clone());
        state.record(Op::Replace, &kind, name);

        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let kind = K::kind(&()).to_string();
        state.check_failure(Op::Delete, &kind, name)?;

        let key = (kind.clone(), namespace.to_string(), name.to_string());
        if state.objects.remove(&key).is_none() {
            return Err(api_error(404, "not found"));
        }
        state.record(Op::Delete, &kind, name);
        Ok(())
    }

    async fn get_stack(&self, namespace: &str, name: &str) -> Result<Option<MonitorStack>> {
        let state = self.state.lock().await;
        state.check_failure(Op::Get, "MonitorStack", name)?;
        Ok(state
            .stacks
            .get(&(namespace.into(), name.into()))
            .cloned())
    }

    async fn set_finalizers(&self, stack: &MonitorStack, finalizers: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let name = stack.name_any();
        let key = (stack.namespace().unwrap_or_default(), name.clone());
        state.check_failure(Op::Finalizers, "MonitorStack", &name)?;

        let version = state.next_version();
        let Some(stored) = state.stacks.get_mut(&key) else {
            return Err(api_error(404, "not found"));
        };
        if stored.metadata.resource_version != stack.metadata.resource_version {
            return Err(api_error(409, "the object has been modified"));
        }

        stored.metadata.finalizers = Some(finalizers.clone());
        stored.metadata.resource_version = Some(version);
        let deleting = stored.metadata.deletion_timestamp.is_some();
        let uid = stored.metadata.uid.clone().unwrap_or_default();
        state.record(Op::Finalizers, "MonitorStack", &name);

        if deleting && finalizers.is_empty() {
            state.stacks.remove(&key);
            state.collect_garbage(&uid);
        }
        Ok(())
    }

    async fn patch_status(&self, stack: &MonitorStack, status: &MonitorStackStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let name = stack.name_any();
        let key = (stack.namespace().unwrap_or_default(), name.clone());
        state.check_failure(Op::Status, "MonitorStack", &name)?;

        let version = state.next_version();
        let Some(stored) = state.stacks.get_mut(&key) else {
            return Err(api_error(404, "not found"));
        };
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        state.statuses.push(status.clone());
        state.record(Op::Status, "MonitorStack", &name);
        Ok(())
    }
}
