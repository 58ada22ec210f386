use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{pvc_name, Component, StackContext};
use crate::constants::defaults;
use crate::normalize::StorageConfig;

/// Build the PVC backing the Prometheus TSDB.
///
/// The claim is only ever created, never updated: size and class cannot be
/// changed in place.
pub fn build_prometheus_pvc(ctx: &StackContext, storage: &StorageConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(pvc_name(&ctx.name, Component::Prometheus)),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(ctx.labels(Component::Prometheus)),
            owner_references: Some(vec![ctx.owner_ref.clone()]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: storage.storage_class.clone(),
            access_modes: Some(vec![defaults::ACCESS_MODE.into()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".into(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
