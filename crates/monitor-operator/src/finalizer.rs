//! Finalizer handling for MonitorStack resources.

use kube::ResourceExt;
use tracing::info;

use crate::constants::FINALIZER;
use crate::crds::MonitorStack;
use crate::error::Result;
use crate::store::ObjectStore;

pub fn has_finalizer(stack: &MonitorStack) -> bool {
    stack.finalizers().iter().any(|f| f == FINALIZER)
}

/// Add the finalizer to a MonitorStack, keeping any finalizers owned by
/// other controllers.
pub async fn add_finalizer<S: ObjectStore>(store: &S, stack: &MonitorStack) -> Result<()> {
    info!(name = %stack.name_any(), "Adding finalizer to MonitorStack");

    let mut finalizers = stack.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    store.set_finalizers(stack, finalizers).await
}

/// Remove the finalizer from a MonitorStack.
pub async fn remove_finalizer<S: ObjectStore>(store: &S, stack: &MonitorStack) -> Result<()> {
    info!(name = %stack.name_any(), "Removing finalizer from MonitorStack");

    let mut finalizers = stack.finalizers().to_vec();
    finalizers.retain(|f| f != FINALIZER);
    store.set_finalizers(stack, finalizers).await
}
