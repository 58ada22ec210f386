use thiserror::Error;

/// Rejected desired state. Never retried until the MonitorStack changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one component (prometheus or grafana) must be enabled")]
    NoComponentEnabled,

    #[error("{component}: {field} cannot be empty")]
    Empty {
        component: &'static str,
        field: String,
    },

    #[error("{component}: service port must be between 1 and 65535, got {port}")]
    PortOutOfRange { component: &'static str, port: i32 },

    #[error("{component}: nodePort must be between 30000 and 32767, got {node_port}")]
    NodePortOutOfRange {
        component: &'static str,
        node_port: i32,
    },

    #[error("{component}: unsupported service type {service_type:?}")]
    ServiceType {
        component: &'static str,
        service_type: String,
    },

    #[error("{component}: retention {retention:?} must look like <number><s|m|h|d|y>")]
    Retention {
        component: &'static str,
        retention: String,
    },
}

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("MonitorStack is missing {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Whether the API server answered 404 for the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OperatorError::Kube(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. }))
        )
    }

    /// Whether this error is transient and the reconciliation should be retried.
    ///
    /// Every API failure counts, including 409 conflicts from a concurrent
    /// writer bumping the resource version.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperatorError::Kube(_))
    }
}
