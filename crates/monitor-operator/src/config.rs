use clap::Parser;

/// Runtime configuration of the operator binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "monitor-operator",
    about = "Kubernetes operator running Prometheus and Grafana stacks from MonitorStack resources",
    version
)]
pub struct OperatorConfig {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Bind address of the metrics and health server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Only watch MonitorStacks in this namespace (all namespaces when empty)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Apply the MonitorStack CRD on startup
    #[arg(long, env = "INSTALL_CRD", default_value_t = false)]
    pub install_crd: bool,
}

impl OperatorConfig {
    pub fn watch_namespace(&self) -> Option<&str> {
        Some(self.watch_namespace.as_str()).filter(|ns| !ns.is_empty())
    }
}
