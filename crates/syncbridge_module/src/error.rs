//! Error types and host-facing error codes.

use serde::Serialize;
use syncbridge_core::ReplicationError;
use syncbridge_transfer::TransferError;
use thiserror::Error;

/// Result type for control-surface operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors returned by control-surface operations.
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Replication session management failed.
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// An attachment upload failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Exactly one of username and password was supplied.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Caller input was missing or malformed.
    #[error("bad parameter {field}: {message}")]
    BadParameter {
        /// Name of the offending parameter.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The requested document or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The log subscriber could not be installed or reloaded.
    #[error("logging error: {0}")]
    Logging(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error categories reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing input, detected before any I/O.
    BadParameter,
    /// Inconsistent listener credentials.
    InvalidCredentials,
    /// Unknown database name.
    DatabaseNotFound,
    /// Unusable remote URL.
    InvalidRemoteUrl,
    /// Network or file I/O failure.
    TransportFailure,
    /// Non-2xx status from the remote endpoint.
    UpstreamRejected,
    /// 2xx status with an unparseable body.
    MalformedResponse,
    /// Missing document or attachment.
    NotFound,
    /// Operation not allowed in the session's current state.
    InvalidState,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// The code string sent to the host.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadParameter => "BAD_PARAMETER",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::DatabaseNotFound => "DATABASE_NOT_FOUND",
            ErrorKind::InvalidRemoteUrl => "INVALID_REMOTE_URL",
            ErrorKind::TransportFailure => "TRANSPORT_FAILURE",
            ErrorKind::UpstreamRejected => "UPSTREAM_REJECTED",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure as delivered to the host: a code and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Error category.
    pub code: ErrorKind,
    /// Detail text.
    pub message: String,
}

impl ModuleError {
    /// Creates a bad parameter error.
    pub fn bad_parameter(field: &'static str, message: impl Into<String>) -> Self {
        Self::BadParameter {
            field,
            message: message.into(),
        }
    }

    /// Maps the error onto its host-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::Replication(e) => replication_kind(e),
            ModuleError::Transfer(e) => match e {
                TransferError::BadParameter { .. } => ErrorKind::BadParameter,
                TransferError::Transport(_) => ErrorKind::TransportFailure,
                TransferError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
                TransferError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            },
            ModuleError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            ModuleError::BadParameter { .. } => ErrorKind::BadParameter,
            ModuleError::NotFound(_) => ErrorKind::NotFound,
            ModuleError::Logging(_) => ErrorKind::Internal,
            ModuleError::Io(_) => ErrorKind::TransportFailure,
        }
    }

    /// The detail text for the host.
    ///
    /// Rejected and malformed uploads carry the raw response text.
    pub fn detail(&self) -> String {
        match self {
            ModuleError::Transfer(e) => e
                .response_body()
                .map_or_else(|| e.to_string(), str::to_string),
            other => other.to_string(),
        }
    }

    /// Builds the report delivered to the host.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.kind(),
            message: self.detail(),
        }
    }
}

fn replication_kind(error: &ReplicationError) -> ErrorKind {
    match error {
        ReplicationError::BadParameter { .. } => ErrorKind::BadParameter,
        ReplicationError::DatabaseNotFound { .. } => ErrorKind::DatabaseNotFound,
        ReplicationError::InvalidRemoteUrl { .. } => ErrorKind::InvalidRemoteUrl,
        ReplicationError::Transport { .. } | ReplicationError::Io(_) => {
            ErrorKind::TransportFailure
        }
        ReplicationError::InvalidStateTransition { .. } => ErrorKind::InvalidState,
        ReplicationError::NotFound(_) => ErrorKind::NotFound,
        ReplicationError::Engine(_) => ErrorKind::Internal,
        ReplicationError::SessionFailures(failures) => failures
            .first()
            .map_or(ErrorKind::TransportFailure, |f| replication_kind(&f.error)),
    }
}
