//! Error types for the replication session manager.

use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while managing replication sessions.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Caller input was missing or malformed.
    #[error("bad parameter {field}: {message}")]
    BadParameter {
        /// Name of the offending parameter.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The engine has no database with this name.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Requested database name.
        name: String,
    },

    /// The remote URL could not be parsed or is not a sync endpoint.
    #[error("invalid remote URL {url:?}: {reason}")]
    InvalidRemoteUrl {
        /// The URL as supplied by the caller.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The engine's sync transport failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A session was asked to make a transition its state does not allow.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted operation or target state.
        to: String,
    },

    /// A document or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The database engine reported an internal failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// I/O error while reading engine content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more sessions failed during a bulk operation.
    ///
    /// Every matching session was attempted; this lists the ones that failed.
    #[error("{} replication session(s) failed: {}", .0.len(), SessionFailure::join(.0))]
    SessionFailures(Vec<SessionFailure>),
}

/// A per-session failure collected by a bulk registry operation.
#[derive(Debug)]
pub struct SessionFailure {
    /// Remote URL of the failing session.
    pub remote_url: String,
    /// The error it reported.
    pub error: ReplicationError,
}

impl SessionFailure {
    fn join(failures: &[SessionFailure]) -> String {
        failures
            .iter()
            .map(|f| format!("{} ({})", f.remote_url, f.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl ReplicationError {
    /// Creates a bad parameter error.
    pub fn bad_parameter(field: &'static str, message: impl Into<String>) -> Self {
        Self::BadParameter {
            field,
            message: message.into(),
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplicationError::Transport { retryable, .. } => *retryable,
            ReplicationError::Io(_) => true,
            ReplicationError::SessionFailures(failures) => {
                failures.iter().all(|f| f.error.is_retryable())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ReplicationError::transport_retryable("connection lost").is_retryable());
        assert!(!ReplicationError::transport_fatal("certificate rejected").is_retryable());
        assert!(!ReplicationError::DatabaseNotFound { name: "db".into() }.is_retryable());
        assert!(!ReplicationError::bad_parameter("type", "invalid").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ReplicationError::InvalidRemoteUrl {
            url: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("not a url"));

        let err = ReplicationError::bad_parameter("type", "expected push or pull");
        assert_eq!(err.to_string(), "bad parameter type: expected push or pull");
    }

    #[test]
    fn session_failures_list_every_session() {
        let err = ReplicationError::SessionFailures(vec![
            SessionFailure {
                remote_url: "https://a.example.com/db".into(),
                error: ReplicationError::transport_retryable("timeout"),
            },
            SessionFailure {
                remote_url: "https://b.example.com/db".into(),
                error: ReplicationError::transport_fatal("refused"),
            },
        ]);

        let msg = err.to_string();
        assert!(msg.starts_with("2 replication session(s) failed"));
        assert!(msg.contains("a.example.com"));
        assert!(msg.contains("b.example.com"));
        assert!(!err.is_retryable());
    }
}
