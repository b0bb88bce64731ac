//! Identity types shared by sessions, the registry and events.

use crate::error::{ReplicationError, ReplicationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Direction of data flow relative to the local database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local changes are sent to the remote endpoint.
    Push,
    /// Remote changes are applied to the local database.
    Pull,
}

impl Direction {
    /// Returns the wire name (`"push"` or `"pull"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Push => "push",
            Direction::Pull => "pull",
        }
    }

    /// Returns true for pull replications.
    pub fn is_pull(&self) -> bool {
        matches!(self, Direction::Pull)
    }
}

impl FromStr for Direction {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Direction::Push),
            "pull" => Ok(Direction::Pull),
            other => Err(ReplicationError::bad_parameter(
                "type",
                format!("invalid type {other:?}, expected \"push\" or \"pull\""),
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses and validates a remote sync endpoint URL.
///
/// Only absolute `http`, `https`, `ws` and `wss` URLs with a host are accepted.
pub fn parse_remote_url(raw: &str) -> ReplicationResult<Url> {
    let invalid = |reason: String| ReplicationError::InvalidRemoteUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }

    Ok(url)
}

/// Returns true if two URLs address the same endpoint.
///
/// Compares scheme, host, effective port, path and query. Fragments and
/// credentials embedded in the URL do not take part.
pub fn same_endpoint(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path() == b.path()
        && a.query() == b.query()
}

/// The deduplication key of a replication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// Local database name.
    pub database: String,
    /// Replication direction.
    pub direction: Direction,
    /// Remote endpoint.
    pub remote_url: Url,
}

impl SessionKey {
    /// Creates a new session key.
    pub fn new(database: impl Into<String>, direction: Direction, remote_url: Url) -> Self {
        Self {
            database: database.into(),
            direction,
            remote_url,
        }
    }

    /// Returns true if this key names the given direction and endpoint.
    pub fn matches(&self, direction: Direction, remote_url: &Url) -> bool {
        self.direction == direction && same_endpoint(&self.remote_url, remote_url)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.database, self.direction, self.remote_url)
    }
}
