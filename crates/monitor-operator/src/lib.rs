//! MonitorStack Kubernetes Operator
//!
//! Converges `MonitorStack` custom resources into a Prometheus and Grafana
//! deployment: ConfigMaps, an optional PVC, Deployments and Services, all
//! owned by the stack.

pub mod config;
pub mod config_generator;
pub mod constants;
pub mod controller;
pub mod crds;
pub mod error;
pub mod finalizer;
pub mod metrics;
pub mod normalize;
pub mod reconciler;
pub mod resources;
pub mod status;
pub mod store;
pub mod telemetry;

pub use crds::MonitorStack;
pub use reconciler::{Reconciler, Step};
pub use store::{KubeStore, ObjectStore};
