/// Kubernetes label keys following the app.kubernetes.io convention.
pub mod labels {
    pub const NAME: &str = "app.kubernetes.io/name";
    pub const INSTANCE: &str = "app.kubernetes.io/instance";
    pub const COMPONENT: &str = "app.kubernetes.io/component";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const PART_OF: &str = "app.kubernetes.io/part-of";
}

/// Label values.
pub mod values {
    pub const APP_NAME: &str = "monitor-operator";
    pub const MANAGED_BY: &str = "monitor-operator";
    pub const PART_OF: &str = "monitoring-stack";
}

/// Annotation keys written by this operator.
pub mod annotations {
    /// Comma-separated label keys last applied to a child, so labels dropped
    /// from the MonitorStack can be removed again.
    pub const MANAGED_LABELS: &str = "monitoring.cillian.website/managed-labels";
}

/// Finalizer guarding child cleanup before the MonitorStack is removed.
pub const FINALIZER: &str = "monitoring.cillian.website/finalizer";

/// Field manager used for patches issued by this operator.
pub const FIELD_MANAGER: &str = "monitor-operator";

/// Container ports. Service ports are configurable, target ports are not.
pub mod ports {
    pub const PROMETHEUS: i32 = 9090;
    pub const GRAFANA: i32 = 3000;
    pub const NODE_PORT_MIN: i32 = 30000;
    pub const NODE_PORT_MAX: i32 = 32767;
}

/// Fixed non-root identities for the workloads.
pub mod security {
    /// `nobody`, as shipped by the Prometheus image.
    pub const PROMETHEUS_UID: i64 = 65534;
    /// The `grafana` user baked into the Grafana image.
    pub const GRAFANA_UID: i64 = 472;
}

/// Probe paths and timings shared by both workloads.
pub mod probes {
    pub const PROMETHEUS_LIVENESS_PATH: &str = "/-/healthy";
    pub const PROMETHEUS_READINESS_PATH: &str = "/-/ready";
    pub const GRAFANA_HEALTH_PATH: &str = "/api/health";

    pub const LIVENESS_INITIAL_DELAY_SECS: i32 = 30;
    pub const LIVENESS_PERIOD_SECS: i32 = 10;
    pub const LIVENESS_TIMEOUT_SECS: i32 = 5;
    pub const READINESS_INITIAL_DELAY_SECS: i32 = 5;
    pub const READINESS_PERIOD_SECS: i32 = 5;
    pub const READINESS_TIMEOUT_SECS: i32 = 3;
    pub const FAILURE_THRESHOLD: i32 = 3;
}

/// File names and mount paths inside the containers.
pub mod paths {
    pub const PROMETHEUS_CONFIG_KEY: &str = "prometheus.yml";
    pub const PROMETHEUS_CONFIG_DIR: &str = "/etc/prometheus";
    pub const PROMETHEUS_DATA_DIR: &str = "/prometheus";
    pub const GRAFANA_DATASOURCES_KEY: &str = "datasources.yaml";
    pub const GRAFANA_DATASOURCES_DIR: &str = "/etc/grafana/provisioning/datasources";
    pub const GRAFANA_DATA_DIR: &str = "/var/lib/grafana";
    pub const GRAFANA_LOGS_DIR: &str = "/var/log/grafana";
    pub const GRAFANA_PLUGINS_DIR: &str = "/var/lib/grafana/plugins";
    pub const GRAFANA_PROVISIONING_DIR: &str = "/etc/grafana/provisioning";
}

/// Values `normalize` fills in for unset fields.
pub mod defaults {
    pub const PROMETHEUS_IMAGE: &str = "prom/prometheus";
    pub const GRAFANA_IMAGE: &str = "grafana/grafana";
    pub const TAG: &str = "latest";
    pub const SERVICE_TYPE: &str = "ClusterIP";
    pub const RETENTION: &str = "15d";
    pub const ADMIN_PASSWORD: &str = "admin";
    pub const CPU_REQUEST: &str = "100m";
    pub const PROMETHEUS_MEMORY_REQUEST: &str = "256Mi";
    pub const GRAFANA_MEMORY_REQUEST: &str = "128Mi";
    pub const ACCESS_MODE: &str = "ReadWriteOnce";

    /// Datasource type that may be marked as the Grafana default.
    pub const DEFAULT_DATASOURCE_TYPE: &str = "prometheus";

    /// Requeue intervals in seconds.
    pub const REQUEUE_SYNCED_SECS: u64 = 300;
    pub const REQUEUE_FAILED_SECS: u64 = 60;
    pub const REQUEUE_CLEANUP_FAILED_SECS: u64 = 30;
}

/// Service types accepted by the MonitorStack schema.
pub const SERVICE_TYPES: &[&str] = &["ClusterIP", "NodePort", "LoadBalancer", "ExternalName"];
