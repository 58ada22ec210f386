//! Access to the cluster object store.
//!
//! The reconciler talks to Kubernetes only through [`ObjectStore`], so the
//! whole convergence loop can run against an in-memory store in tests.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use crate::constants::FIELD_MANAGER;
use crate::crds::{MonitorStack, MonitorStackStatus};
use crate::error::Result;
use crate::resources::merge::ChildResource;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a child by name; `None` when it does not exist.
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Replace a child. `obj` carries the resourceVersion it was read at, so
    /// a concurrent writer surfaces as a conflict.
    async fn replace<K: ChildResource>(&self, namespace: &str, name: &str, obj: &K) -> Result<K>;

    /// Delete a child. A missing object is reported as a 404 error.
    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_stack(&self, namespace: &str, name: &str) -> Result<Option<MonitorStack>>;

    /// Overwrite the finalizer list of a MonitorStack.
    async fn set_finalizers(&self, stack: &MonitorStack, finalizers: Vec<String>) -> Result<()>;

    /// Write the status subresource.
    async fn patch_status(&self, stack: &MonitorStack, status: &MonitorStackStatus) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stacks(&self, stack: &MonitorStack) -> Api<MonitorStack> {
        match stack.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.into()),
            ..Default::default()
        };
        Ok(api.create(&pp, obj).await?)
    }

    async fn replace<K: ChildResource>(&self, namespace: &str, name: &str, obj: &K) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.into()),
            ..Default::default()
        };
        Ok(api.replace(name, &pp, obj).await?)
    }

    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn get_stack(&self, namespace: &str, name: &str) -> Result<Option<MonitorStack>> {
        let api: Api<MonitorStack> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn set_finalizers(&self, stack: &MonitorStack, finalizers: Vec<String>) -> Result<()> {
        // resourceVersion turns the merge patch into an optimistic update.
        let patch = json!({
            "metadata": {
                "resourceVersion": stack.resource_version(),
                "finalizers": finalizers,
            }
        });

        self.stacks(stack)
            .patch(
                &stack.name_any(),
                &PatchParams::default(),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_status(&self, stack: &MonitorStack, status: &MonitorStackStatus) -> Result<()> {
        let patch = json!({ "status": status });

        self.stacks(stack)
            .patch_status(
                &stack.name_any(),
                &PatchParams::default(),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }
}
