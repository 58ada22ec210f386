//! Status aggregation for MonitorStack.

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;

use crate::crds::{ComponentStatus, Condition, MonitorStackStatus, StackPhase};
use crate::normalize::NormalizedSpec;
use crate::resources::Component;

pub const MSG_INITIALIZING: &str = "Initializing MonitorStack";
pub const MSG_ALL_READY: &str = "All enabled components are ready";
pub const MSG_WAITING: &str = "Waiting for components to be ready";

pub const CONDITION_READY: &str = "Ready";

/// In-cluster URL of a component's Service.
pub fn endpoint(service: &str, namespace: &str, port: i32) -> String {
    format!("http://{service}.{namespace}.svc.cluster.local:{port}")
}

/// Read a component's status back from its Deployment.
///
/// A component is ready once any replica is; the endpoint is published only
/// then.
pub fn component_status(deployment: Option<&Deployment>, endpoint: String) -> ComponentStatus {
    let status = deployment.and_then(|d| d.status.as_ref());
    let ready_replicas = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let replicas = status.and_then(|s| s.replicas).unwrap_or(0);
    let ready = ready_replicas > 0;

    ComponentStatus {
        ready,
        replicas,
        message: Some(if ready { "Ready" } else { "Not Ready" }.into()),
        endpoint: ready.then_some(endpoint),
    }
}

/// `Ready` iff every enabled component is ready, `Pending` otherwise.
/// `Failed` is never produced here.
pub fn aggregate_phase(
    spec: &NormalizedSpec,
    prometheus: &ComponentStatus,
    grafana: &ComponentStatus,
) -> StackPhase {
    let all_ready = Component::ALL.iter().all(|c| {
        !spec.is_enabled(*c)
            || match c {
                Component::Prometheus => prometheus.ready,
                Component::Grafana => grafana.ready,
            }
    });

    if all_ready {
        StackPhase::Ready
    } else {
        StackPhase::Pending
    }
}

pub fn phase_message(phase: StackPhase) -> &'static str {
    match phase {
        StackPhase::Ready => MSG_ALL_READY,
        _ => MSG_WAITING,
    }
}

/// Build the `Ready` condition, keeping the previous transition time when
/// the condition status did not change.
pub fn ready_condition(
    phase: StackPhase,
    reason: &str,
    message: &str,
    previous: &[Condition],
) -> Condition {
    let status = if phase == StackPhase::Ready { "True" } else { "False" };
    let last_transition_time = previous
        .iter()
        .find(|c| c.type_ == CONDITION_READY && c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(now);

    Condition {
        type_: CONDITION_READY.into(),
        status: status.into(),
        reason: Some(reason.into()),
        message: Some(message.into()),
        last_transition_time: Some(last_transition_time),
    }
}

/// Set phase, message and the `Ready` condition together.
pub fn set_phase(status: &mut MonitorStackStatus, phase: StackPhase, reason: &str, message: &str) {
    status.conditions = vec![ready_condition(phase, reason, message, &status.conditions)];
    status.phase = Some(phase);
    status.message = Some(message.into());
}

pub fn now() -> String {
    Utc::now().to_rfc3339()
}
