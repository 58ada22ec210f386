//! Reconciliation logic for MonitorStack resources.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::constants::defaults;
use crate::crds::{ComponentStatus, MonitorStack, MonitorStackStatus, StackPhase};
use crate::error::{OperatorError, Result};
use crate::finalizer::{add_finalizer, has_finalizer, remove_finalizer};
use crate::normalize::{normalize, GrafanaConfig, PrometheusConfig};
use crate::resources::configmap_builder::{
    build_grafana_datasources_configmap, build_prometheus_configmap,
};
use crate::resources::deployment_builder::{build_grafana_deployment, build_prometheus_deployment};
use crate::resources::merge::{record_managed_labels, ChildResource, OwnedResource};
use crate::resources::pvc_builder::build_prometheus_pvc;
use crate::resources::service_builder::{build_grafana_service, build_prometheus_service};
use crate::resources::{config_map_name, service_name, workload_name, Component, StackContext};
use crate::status::{
    aggregate_phase, component_status, endpoint, now, phase_message, set_phase, MSG_INITIALIZING,
};
use crate::store::ObjectStore;

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Converged; check again on the regular interval.
    Continue,
    /// Something failed transiently; try again after the given delay.
    RetryAfter(Duration),
    /// The desired state cannot be realised; wait for it to change.
    Fatal(String),
    /// Nothing left to do until the object changes.
    Done,
}

impl Step {
    pub fn into_action(self) -> Action {
        match self {
            Step::Continue => Action::requeue(Duration::from_secs(defaults::REQUEUE_SYNCED_SECS)),
            Step::RetryAfter(delay) => Action::requeue(delay),
            Step::Fatal(_) | Step::Done => Action::await_change(),
        }
    }

    /// Label used for the reconciliation metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Step::Continue => "success",
            Step::RetryAfter(_) => "retry",
            Step::Fatal(_) => "fatal",
            Step::Done => "done",
        }
    }
}

fn retry_failed() -> Step {
    Step::RetryAfter(Duration::from_secs(defaults::REQUEUE_FAILED_SECS))
}

fn retry_cleanup() -> Step {
    Step::RetryAfter(Duration::from_secs(defaults::REQUEUE_CLEANUP_FAILED_SECS))
}

/// Drives MonitorStack children towards the desired state through an
/// [`ObjectStore`].
pub struct Reconciler<S> {
    store: S,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one reconciliation pass for the named MonitorStack.
    ///
    /// Errors are only returned when the stack itself cannot be read or
    /// written; child failures are folded into the returned [`Step`].
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Step> {
        let Some(stack) = self.store.get_stack(namespace, name).await? else {
            debug!(%name, %namespace, "MonitorStack is gone, nothing to do");
            return Ok(Step::Done);
        };

        if stack.meta().deletion_timestamp.is_some() {
            return self.handle_deletion(&stack).await;
        }

        if !has_finalizer(&stack) {
            add_finalizer(&self.store, &stack).await?;
            return Ok(Step::Done);
        }

        self.apply(&stack).await
    }

    async fn apply(&self, stack: &MonitorStack) -> Result<Step> {
        let name = stack.name_any();
        let namespace = stack.namespace().unwrap_or_default();
        info!(%name, %namespace, "Reconciling MonitorStack");

        let mut written = stack.status.clone().unwrap_or_default();
        let mut status = written.clone();
        status.observed_generation = stack.meta().generation;

        if status.phase.is_none() {
            set_phase(&mut status, StackPhase::Pending, "Initializing", MSG_INITIALIZING);
            self.write_status(stack, &mut written, status.clone()).await?;
        }

        let spec = match normalize(&stack.spec) {
            Ok(spec) => spec,
            Err(e) => {
                let message = e.to_string();
                warn!(%name, %namespace, error = %message, "Rejecting invalid MonitorStack");
                set_phase(&mut status, StackPhase::Failed, "InvalidSpec", &message);
                self.write_status(stack, &mut written, status).await?;
                return Ok(Step::Fatal(message));
            }
        };

        if let Some(target) = spec.namespace_override.as_deref() {
            if target != namespace {
                warn!(
                    %name,
                    %namespace,
                    requested = %target,
                    "Namespace override ignored, children stay next to the MonitorStack"
                );
            }
        }

        let ctx = StackContext::new(stack)?;
        let mut failures = Vec::new();

        // Components converge independently; one failing does not stop the other.
        let prometheus = match &spec.prometheus {
            Some(config) => self.converge_prometheus(&ctx, config).await,
            None => self.cleanup_disabled(&ctx, Component::Prometheus).await,
        };
        status.prometheus_status = self.record(&ctx, Component::Prometheus, prometheus, &mut failures);

        let grafana = match &spec.grafana {
            Some(config) => self.converge_grafana(&ctx, config).await,
            None => self.cleanup_disabled(&ctx, Component::Grafana).await,
        };
        status.grafana_status = self.record(&ctx, Component::Grafana, grafana, &mut failures);

        if !failures.is_empty() {
            let message = failures.join("; ");
            set_phase(&mut status, StackPhase::Failed, "ReconcileFailed", &message);
            self.write_status(stack, &mut written, status).await?;
            return Ok(retry_failed());
        }

        let phase = aggregate_phase(&spec, &status.prometheus_status, &status.grafana_status);
        let reason = match phase {
            StackPhase::Ready => "ComponentsReady",
            _ => "ComponentsNotReady",
        };
        set_phase(&mut status, phase, reason, phase_message(phase));
        self.write_status(stack, &mut written, status).await?;

        info!(%name, %namespace, %phase, "Reconciled MonitorStack");
        Ok(Step::Continue)
    }

    fn record(
        &self,
        ctx: &StackContext,
        component: Component,
        result: Result<ComponentStatus>,
        failures: &mut Vec<String>,
    ) -> ComponentStatus {
        match result {
            Ok(status) => status,
            Err(e) => {
                error!(
                    name = %ctx.name,
                    namespace = %ctx.namespace,
                    %component,
                    error = %e,
                    "Failed to converge component"
                );
                failures.push(format!("{component}: {e}"));
                ComponentStatus::failed(e.to_string())
            }
        }
    }

    async fn converge_prometheus(
        &self,
        ctx: &StackContext,
        config: &PrometheusConfig,
    ) -> Result<ComponentStatus> {
        let ns = &ctx.namespace;

        self.apply_child(ns, build_prometheus_configmap(ctx, config)?).await?;
        if let Some(storage) = &config.storage {
            self.ensure_created(ns, build_prometheus_pvc(ctx, storage)).await?;
        }
        let deployment = self
            .apply_child(ns, build_prometheus_deployment(ctx, config))
            .await?;
        self.apply_child(ns, build_prometheus_service(ctx, &config.service)).await?;

        Ok(component_status(
            Some(&deployment),
            endpoint(
                &service_name(&ctx.name, Component::Prometheus),
                ns,
                config.service.port,
            ),
        ))
    }

    async fn converge_grafana(
        &self,
        ctx: &StackContext,
        config: &GrafanaConfig,
    ) -> Result<ComponentStatus> {
        let ns = &ctx.namespace;

        if let Some(datasources) = build_grafana_datasources_configmap(ctx, config)? {
            self.apply_child(ns, datasources).await?;
        }
        let deployment = self
            .apply_child(ns, build_grafana_deployment(ctx, config))
            .await?;
        self.apply_child(ns, build_grafana_service(ctx, &config.service)).await?;

        Ok(component_status(
            Some(&deployment),
            endpoint(
                &service_name(&ctx.name, Component::Grafana),
                ns,
                config.service.port,
            ),
        ))
    }

    /// Create the child if absent, otherwise merge the owned fields onto the
    /// live object when they drifted. Returns the live object.
    async fn apply_child<K: OwnedResource>(&self, namespace: &str, mut desired: K) -> Result<K> {
        let name = desired.name_any();
        let kind = K::kind(&());

        match self.store.get::<K>(namespace, &name).await? {
            None => {
                info!(%kind, %name, %namespace, "Creating");
                record_managed_labels(&mut desired);
                self.store.create(namespace, &desired).await
            }
            Some(mut existing) => {
                if !K::drifted(&existing, &desired)? {
                    debug!(%kind, %name, %namespace, "Up to date");
                    return Ok(existing);
                }
                info!(%kind, %name, %namespace, "Updating drifted resource");
                K::merge_owned(&mut existing, &desired);
                self.store.replace(namespace, &name, &existing).await
            }
        }
    }

    /// Create the child if absent and never touch it afterwards.
    async fn ensure_created<K: ChildResource>(&self, namespace: &str, desired: K) -> Result<()> {
        let name = desired.name_any();
        if self.store.get::<K>(namespace, &name).await?.is_none() {
            info!(kind = %K::kind(&()), %name, %namespace, "Creating");
            self.store.create(namespace, &desired).await?;
        }
        Ok(())
    }

    async fn cleanup_disabled(
        &self,
        ctx: &StackContext,
        component: Component,
    ) -> Result<ComponentStatus> {
        match self
            .cleanup(&ctx.namespace, &ctx.name, component)
            .await
            .into_iter()
            .next()
        {
            Some(e) => Err(e),
            None => Ok(ComponentStatus::disabled()),
        }
    }

    /// Delete a component's children. Every deletion is attempted; the
    /// errors that were not 404s are returned.
    async fn cleanup(
        &self,
        namespace: &str,
        stack: &str,
        component: Component,
    ) -> Vec<OperatorError> {
        let workload = workload_name(stack, component);
        let service = service_name(stack, component);

        let mut results = vec![
            self.delete_child::<Deployment>(namespace, &workload).await,
            self.delete_child::<Service>(namespace, &service).await,
        ];
        if component == Component::Prometheus {
            let config = config_map_name(stack, component);
            results.push(self.delete_child::<ConfigMap>(namespace, &config).await);
        }

        results.into_iter().filter_map(|r| r.err()).collect()
    }

    async fn delete_child<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()> {
        match self.store.delete::<K>(namespace, name).await {
            Ok(()) => {
                info!(kind = %K::kind(&()), %name, %namespace, "Deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn handle_deletion(&self, stack: &MonitorStack) -> Result<Step> {
        let name = stack.name_any();
        let namespace = stack.namespace().unwrap_or_default();

        if !has_finalizer(stack) {
            return Ok(Step::Done);
        }

        info!(%name, %namespace, "Cleaning up MonitorStack");

        let mut failed = false;
        for component in Component::ALL {
            for e in self.cleanup(&namespace, &name, component).await {
                warn!(%name, %namespace, %component, error = %e, "Cleanup failed");
                failed = true;
            }
        }
        if failed {
            return Ok(retry_cleanup());
        }

        remove_finalizer(&self.store, stack).await?;
        Ok(Step::Done)
    }

    /// Persist `next` unless it matches what was last written, ignoring the
    /// timestamp. Every actual write refreshes `lastUpdated`.
    async fn write_status(
        &self,
        stack: &MonitorStack,
        written: &mut MonitorStackStatus,
        mut next: MonitorStackStatus,
    ) -> Result<()> {
        next.last_updated = written.last_updated.clone();
        if next == *written {
            return Ok(());
        }

        next.last_updated = Some(now());
        self.store.patch_status(stack, &next).await?;
        *written = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_actions() {
        assert_eq!(
            Step::Continue.into_action(),
            Action::requeue(Duration::from_secs(300))
        );
        assert_eq!(
            Step::RetryAfter(Duration::from_secs(60)).into_action(),
            Action::requeue(Duration::from_secs(60))
        );
        assert_eq!(Step::Fatal("bad".into()).into_action(), Action::await_change());
        assert_eq!(Step::Done.into_action(), Action::await_change());
    }

    #[test]
    fn test_retry_intervals() {
        assert_eq!(retry_failed(), Step::RetryAfter(Duration::from_secs(60)));
        assert_eq!(retry_cleanup(), Step::RetryAfter(Duration::from_secs(30)));
    }
}
