use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{selector_labels, service_name, Component, StackContext};
use crate::constants::ports;
use crate::normalize::ServiceConfig;

pub fn build_prometheus_service(ctx: &StackContext, service: &ServiceConfig) -> Service {
    build_service(ctx, Component::Prometheus, "web", ports::PROMETHEUS, service)
}

pub fn build_grafana_service(ctx: &StackContext, service: &ServiceConfig) -> Service {
    build_service(ctx, Component::Grafana, "grafana", ports::GRAFANA, service)
}

/// One TCP port forwarding to the container port. A node port is only set
/// when the type is NodePort and the user pinned one; otherwise the API
/// server allocates it.
fn build_service(
    ctx: &StackContext,
    component: Component,
    port_name: &str,
    target_port: i32,
    service: &ServiceConfig,
) -> Service {
    let mut labels = ctx.labels(component);
    labels.extend(service.labels.clone());

    Service {
        metadata: ObjectMeta {
            name: Some(service_name(&ctx.name, component)),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![ctx.owner_ref.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service.type_.clone()),
            selector: Some(selector_labels(&ctx.name, component)),
            ports: Some(vec![ServicePort {
                name: Some(port_name.into()),
                port: service.port,
                target_port: Some(IntOrString::Int(target_port)),
                node_port: service.requested_node_port(),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
