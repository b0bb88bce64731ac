//! Configuration for attachment transfers.

use std::time::Duration;

/// Configuration for the uploader.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes read from the source and written per chunk.
    pub chunk_size: usize,
    /// Connect and read timeout for every HTTP connection.
    pub timeout: Duration,
    /// URI scheme handled by the content resolver.
    pub content_scheme: String,
}

impl TransferConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            chunk_size: 1024,
            timeout: Duration::from_secs(100),
            content_scheme: "content".to_string(),
        }
    }

    /// Sets the chunk size. Zero is raised to one byte.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the connect and read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the content-handle scheme.
    pub fn with_content_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.content_scheme = scheme.into();
        self
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.timeout, Duration::from_secs(100));
        assert_eq!(config.content_scheme, "content");
    }

    #[test]
    fn builder() {
        let config = TransferConfig::new()
            .with_chunk_size(0)
            .with_timeout(Duration::from_secs(5))
            .with_content_scheme("ph");
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.content_scheme, "ph");
    }
}
