//! Error types for attachment transfers.

use thiserror::Error;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors that can occur during an attachment transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    /// A request parameter was missing or not allowed.
    ///
    /// Raised before any I/O is started.
    #[error("bad parameter {field}: {value:?}")]
    BadParameter {
        /// Name of the offending parameter.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Reading the source or talking to the target failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The target answered with a status other than 200 or 202.
    #[error("upstream rejected upload with status {status}: {body}")]
    UpstreamRejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The target accepted the upload but its body is not a JSON object.
    #[error("malformed response ({reason}): {body}")]
    MalformedResponse {
        /// Raw response body.
        body: String,
        /// Parse failure.
        reason: String,
    },
}

impl TransferError {
    /// Creates a bad parameter error.
    pub fn bad_parameter(field: &'static str, value: impl Into<String>) -> Self {
        Self::BadParameter {
            field,
            value: value.into(),
        }
    }

    /// The raw response text, for errors that carry one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            TransferError::UpstreamRejected { body, .. }
            | TransferError::MalformedResponse { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::Transport(describe(&e))
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Transport(describe(&e))
    }
}

/// Formats an error with its chain of causes.
pub(crate) fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn error_display() {
        let err = TransferError::bad_parameter("method", "GET");
        assert_eq!(err.to_string(), "bad parameter method: \"GET\"");

        let err = TransferError::UpstreamRejected {
            status: 500,
            body: "server error".into(),
        };
        assert!(err.to_string().contains("500"));
        assert_eq!(err.response_body(), Some("server error"));
        assert_eq!(TransferError::Transport("x".into()).response_body(), None);
    }

    #[test]
    fn io_errors_become_transport_errors() {
        let err: TransferError = io::Error::new(io::ErrorKind::NotFound, "no such file").into();
        assert!(matches!(err, TransferError::Transport(ref m) if m.contains("no such file")));
    }

    #[test]
    fn describe_walks_causes() {
        let inner = io::Error::new(io::ErrorKind::Other, "connection reset");
        let outer = io::Error::new(io::ErrorKind::Other, inner);
        assert!(describe(&outer).contains("connection reset"));
    }
}
