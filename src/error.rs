//! Error types for the service container

use thiserror::Error;

/// Errors that can occur while binding, resolving or watching services
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    /// `make` was called for a name that has no binding
    #[error("Undeclared service \"{name}\"")]
    UndeclaredService { name: String },

    /// The resolved instance is not of the requested type
    #[error("Service \"{name}\" is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// Factory failed to create service
    #[error("Failed to create service \"{name}\": {reason}")]
    CreationFailed { name: String, reason: String },

    /// A dependency map was asked for a name it does not hold
    #[error("Service \"{name}\" is not part of this dependency set")]
    MissingDependency { name: String },

    /// `make_now` was asked for a service that needs to suspend to be built
    #[error("Service \"{name}\" cannot be resolved without suspending")]
    NotSynchronous { name: String },

    /// Container is locked and cannot be modified
    #[error("Container is locked - cannot bind service \"{name}\"")]
    Locked { name: String },

    /// A watcher was discarded before it could deliver its services
    #[error("Watcher was dropped before its dependencies were delivered")]
    WatcherDropped,

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create an UndeclaredService error
    #[inline]
    pub fn undeclared(name: impl Into<String>) -> Self {
        Self::UndeclaredService { name: name.into() }
    }

    /// Create a TypeMismatch error for a type
    #[inline]
    pub fn type_mismatch<T: 'static>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    ///
    /// Factories use this to report construction failures:
    ///
    /// ```rust
    /// use service_container::DiError;
    ///
    /// let err = DiError::creation_failed("db", "connection refused");
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Failed to create service \"db\": connection refused"
    /// );
    /// ```
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingDependency error
    #[inline]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingDependency { name: name.into() }
    }

    /// Create a NotSynchronous error
    #[inline]
    pub fn not_synchronous(name: impl Into<String>) -> Self {
        Self::NotSynchronous { name: name.into() }
    }

    /// The service name this error is about, if any
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::UndeclaredService { name }
            | Self::TypeMismatch { name, .. }
            | Self::CreationFailed { name, .. }
            | Self::MissingDependency { name }
            | Self::NotSynchronous { name }
            | Self::Locked { name } => Some(name.as_str()),
            Self::WatcherDropped | Self::Internal(_) => None,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_message_carries_name() {
        let err = DiError::undeclared("mailer");
        assert_eq!(err.to_string(), "Undeclared service \"mailer\"");
        assert_eq!(err.service_name(), Some("mailer"));
    }

    #[test]
    fn test_type_mismatch_names_expected_type() {
        let err = DiError::type_mismatch::<u32>("port");
        assert!(err.to_string().contains("u32"));
        assert_eq!(err.service_name(), Some("port"));
    }

    #[test]
    fn test_not_synchronous_message() {
        let err = DiError::not_synchronous("db");
        assert_eq!(
            err.to_string(),
            "Service \"db\" cannot be resolved without suspending"
        );
        assert_eq!(err.service_name(), Some("db"));
    }

    #[test]
    fn test_nameless_errors() {
        assert_eq!(DiError::WatcherDropped.service_name(), None);
        assert_eq!(DiError::Internal("x".into()).service_name(), None);
    }
}
