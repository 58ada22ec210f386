pub mod common;
pub mod monitor_stack;

pub use common::{
    ComponentStatus, Condition, DashboardSpec, DatasourceSpec, ResourceRequirements,
    ResourceValues, ServiceSpec, StackPhase, StorageSpec,
};
pub use monitor_stack::{
    GrafanaSpec, MonitorStack, MonitorStackSpec, MonitorStackStatus, PrometheusSpec,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing::info;

use crate::constants::FIELD_MANAGER;

/// Server-side apply the MonitorStack CRD.
pub async fn install_crd(client: Client) -> Result<(), kube::Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd = MonitorStack::crd();
    let name = MonitorStack::crd_name();

    info!("Installing CRD {name}");
    crds.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;

    Ok(())
}
