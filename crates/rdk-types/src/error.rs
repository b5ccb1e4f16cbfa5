use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boundary status attached to every failed call.
///
/// Callers that only need to branch on the broad failure class match on
/// [`RdkError::code`] instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Unimplemented,
    Canceled,
    DeadlineExceeded,
    Unavailable,
    Unknown,
}

/// Error type shared by the registry, the resolver, the transport and every
/// resource implementation.
///
/// The enum is serializable so that an error raised by a resource on a remote
/// robot reaches the caller as the very same variant.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RdkError {
    #[error("resource {0:?} not found")]
    NotFound(String),

    #[error("resource {name} does not implement {expected}")]
    TypeMismatch { name: String, expected: String },

    #[error("resource {0:?} already exists")]
    DuplicateResource(String),

    #[error("model {model} is already registered for api {api}")]
    DuplicateRegistration { api: String, model: String },

    #[error("no model {model} registered for api {api}")]
    UnknownModel { api: String, model: String },

    #[error("api {0} is not registered")]
    UnknownApi(String),

    #[error("invalid config at {path}: {message}")]
    ConfigValidation { path: String, message: String },

    #[error("dependency {dependency:?} of {resource} not found")]
    DependencyNotFound { resource: String, dependency: String },

    #[error("dependency {dependency:?} of {resource} is ambiguous: {candidates:?}")]
    AmbiguousDependency {
        resource: String,
        dependency: String,
        candidates: Vec<String>,
    },

    #[error("cyclic dependency: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("resource {0} must be rebuilt to apply its new config")]
    MustRebuild(String),

    #[error("method {0} is unimplemented")]
    Unimplemented(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation canceled")]
    Canceled,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}

impl RdkError {
    /// Shorthand for a [`RdkError::HardwareFault`] raised by a resource.
    pub fn fault(component: impl Into<String>, details: impl Into<String>) -> Self {
        RdkError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        RdkError::ConfigValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            RdkError::NotFound(_)
            | RdkError::UnknownModel { .. }
            | RdkError::UnknownApi(_)
            | RdkError::DependencyNotFound { .. } => StatusCode::NotFound,
            RdkError::DuplicateResource(_) | RdkError::DuplicateRegistration { .. } => {
                StatusCode::AlreadyExists
            }
            RdkError::ConfigValidation { .. }
            | RdkError::AmbiguousDependency { .. }
            | RdkError::DependencyCycle(_)
            | RdkError::InvalidArgument(_) => StatusCode::InvalidArgument,
            RdkError::TypeMismatch { .. } | RdkError::MustRebuild(_) => {
                StatusCode::FailedPrecondition
            }
            RdkError::Unimplemented(_) => StatusCode::Unimplemented,
            RdkError::Canceled => StatusCode::Canceled,
            RdkError::Timeout(_) => StatusCode::DeadlineExceeded,
            RdkError::ConnectionRefused(_) | RdkError::Transport(_) => StatusCode::Unavailable,
            RdkError::HardwareFault { .. } => StatusCode::Unknown,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == StatusCode::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_roundtrips_through_json() {
        let err = RdkError::fault("enc2", "position unavailable");
        let json = serde_json::to_string(&err).unwrap();
        let back: RdkError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);

        let json = serde_json::to_string(&RdkError::Canceled).unwrap();
        let back: RdkError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RdkError::Canceled);
    }

    #[test]
    fn dispatch_errors_have_distinct_codes() {
        let not_found = RdkError::NotFound("enc3".into());
        let mismatch = RdkError::TypeMismatch {
            name: "rdk:component:motor/m1".into(),
            expected: "dyn Encoder".into(),
        };
        assert_eq!(not_found.code(), StatusCode::NotFound);
        assert_eq!(mismatch.code(), StatusCode::FailedPrecondition);
        assert_ne!(not_found.code(), mismatch.code());
    }

    #[test]
    fn dial_failures_are_distinguishable() {
        assert!(RdkError::Canceled.to_string().contains("canceled"));
        assert_eq!(RdkError::Canceled.code(), StatusCode::Canceled);
        assert_eq!(
            RdkError::ConnectionRefused("127.0.0.1:1".into()).code(),
            StatusCode::Unavailable
        );
        assert_eq!(
            RdkError::Timeout("dial".into()).code(),
            StatusCode::DeadlineExceeded
        );
    }

    #[test]
    fn dependency_errors_name_the_dependency() {
        let err = RdkError::DependencyNotFound {
            resource: "rdk:component:motor/m1".into(),
            dependency: "b".into(),
        };
        assert!(err.to_string().contains("\"b\""));

        let cycle = RdkError::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(cycle.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn hardware_fault_display_names_component() {
        let err = RdkError::fault("arm_joint_1", "overcurrent");
        assert!(err.to_string().contains("arm_joint_1"));
        assert!(err.to_string().contains("overcurrent"));
    }
}
