//! Controller wiring for MonitorStack resources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use tracing::{error, info};

use crate::config::OperatorConfig;
use crate::constants::defaults;
use crate::crds::MonitorStack;
use crate::error::OperatorError;
use crate::metrics;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;

/// Controller context
pub struct Context {
    pub reconciler: Reconciler<KubeStore>,
}

/// Run the controller until the watch streams end.
pub async fn run(client: Client, config: &OperatorConfig) {
    let (stacks, deployments, services, config_maps, pvcs) = match config.watch_namespace() {
        Some(ns) => {
            info!(namespace = %ns, "Starting MonitorStack controller");
            (
                Api::<MonitorStack>::namespaced(client.clone(), ns),
                Api::<Deployment>::namespaced(client.clone(), ns),
                Api::<Service>::namespaced(client.clone(), ns),
                Api::<ConfigMap>::namespaced(client.clone(), ns),
                Api::<PersistentVolumeClaim>::namespaced(client.clone(), ns),
            )
        }
        None => {
            info!("Starting MonitorStack controller for all namespaces");
            (
                Api::<MonitorStack>::all(client.clone()),
                Api::<Deployment>::all(client.clone()),
                Api::<Service>::all(client.clone()),
                Api::<ConfigMap>::all(client.clone()),
                Api::<PersistentVolumeClaim>::all(client.clone()),
            )
        }
    };

    let context = Arc::new(Context {
        reconciler: Reconciler::new(KubeStore::new(client)),
    });

    Controller::new(stacks, Config::default())
        .owns(deployments, Config::default())
        .owns(services, Config::default())
        .owns(config_maps, Config::default())
        .owns(pvcs, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => info!("Reconciled {obj:?}, next {action:?}"),
                Err(e) => error!("Reconcile failed: {e:?}"),
            }
        })
        .await;

    info!("MonitorStack controller stopped");
}

async fn reconcile(stack: Arc<MonitorStack>, ctx: Arc<Context>) -> Result<Action, OperatorError> {
    let name = stack.name_any();
    let namespace = stack.namespace().unwrap_or_default();

    let start = Instant::now();
    let result = ctx.reconciler.reconcile(&namespace, &name).await;
    metrics::observe_reconcile_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(step) => {
            metrics::record_reconciliation(step.label());
            Ok(step.into_action())
        }
        Err(e) => {
            metrics::record_reconciliation("error");
            error!(%name, %namespace, error = %e, "Reconciliation failed");
            Err(e)
        }
    }
}

/// Requeue API failures on the short interval; anything else needs the
/// MonitorStack to change first.
fn error_policy(_stack: Arc<MonitorStack>, error: &OperatorError, _ctx: Arc<Context>) -> Action {
    if error.is_transient() {
        Action::requeue(Duration::from_secs(defaults::REQUEUE_FAILED_SECS))
    } else {
        Action::await_change()
    }
}
