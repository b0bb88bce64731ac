//! Configuration for replication sessions.

use crate::error::{ReplicationError, ReplicationResult};
use crate::types::Direction;

/// Cookie name used when the caller does not pick one.
pub const DEFAULT_COOKIE_NAME: &str = "SyncGatewaySession";

/// Session auth cookie attached to every request the sync transport issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Opaque session token.
    pub value: String,
    /// Cookie domain, if restricted.
    pub domain: Option<String>,
    /// Cookie path, if restricted.
    pub path: Option<String>,
    /// Only send over TLS.
    pub secure: bool,
    /// Hidden from scripts on the remote side.
    pub http_only: bool,
}

/// Options for a continuous replication request.
#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    /// Replication direction.
    pub direction: Direction,
    /// Session token sent as the cookie value.
    pub session_id: String,
    /// Cookie name.
    pub cookie_name: String,
    /// Whether the cookie is TLS-only.
    pub secure: bool,
    /// Optional cookie domain.
    pub cookie_domain: Option<String>,
    /// Optional cookie path.
    pub cookie_path: Option<String>,
}

impl ReplicationOptions {
    /// Creates options with the default cookie name and an insecure cookie.
    pub fn new(direction: Direction, session_id: impl Into<String>) -> Self {
        Self {
            direction,
            session_id: session_id.into(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            secure: false,
            cookie_domain: None,
            cookie_path: None,
        }
    }

    /// Sets the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Marks the cookie as TLS-only.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Restricts the cookie to a domain.
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Restricts the cookie to a path.
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Checks the options without touching any session.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.session_id.is_empty() {
            return Err(ReplicationError::bad_parameter(
                "sessionId",
                "must be a non-empty session token",
            ));
        }
        if self.cookie_name.is_empty() {
            return Err(ReplicationError::bad_parameter(
                "cookieName",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Builds the HTTP-only session cookie described by these options.
    pub fn cookie(&self) -> SessionCookie {
        SessionCookie {
            name: self.cookie_name.clone(),
            value: self.session_id.clone(),
            domain: self.cookie_domain.clone(),
            path: self.cookie_path.clone(),
            secure: self.secure,
            http_only: true,
        }
    }
}

/// What the engine's sync transport is told when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorConfig {
    /// Keep the session open and apply subsequent changes.
    pub continuous: bool,
    /// Cookie to attach to outgoing requests.
    pub cookie: SessionCookie,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = ReplicationOptions::new(Direction::Pull, "abc123");
        assert_eq!(options.cookie_name, DEFAULT_COOKIE_NAME);
        assert!(!options.secure);

        let cookie = options.cookie();
        assert_eq!(cookie.name, "SyncGatewaySession");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, None);
        assert_eq!(cookie.path, None);
        assert!(cookie.http_only);
    }

    #[test]
    fn options_builder() {
        let cookie = ReplicationOptions::new(Direction::Push, "token")
            .with_cookie_name("Session")
            .with_secure(true)
            .with_cookie_domain("sync.example.com")
            .with_cookie_path("/db")
            .cookie();

        assert_eq!(cookie.name, "Session");
        assert!(cookie.secure);
        assert_eq!(cookie.domain.as_deref(), Some("sync.example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/db"));
    }

    #[test]
    fn options_validation() {
        assert!(ReplicationOptions::new(Direction::Pull, "t").validate().is_ok());

        let err = ReplicationOptions::new(Direction::Pull, "")
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::BadParameter { field: "sessionId", .. }
        ));

        let err = ReplicationOptions::new(Direction::Pull, "t")
            .with_cookie_name("")
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::BadParameter { field: "cookieName", .. }
        ));
    }
}
