//! Upload requests and source locators.

use crate::error::{TransferError, TransferResult};
use std::path::PathBuf;
use url::Url;

/// The only method accepted for uploads.
pub const UPLOAD_METHOD: &str = "PUT";

/// Parameters of one attachment upload.
///
/// An empty (or whitespace-only) field is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// HTTP method; must be `PUT` in any letter case.
    pub method: String,
    /// Value sent verbatim in the `Authorization` header.
    pub auth_header: String,
    /// Source locator: a path, a `file:` URI, a content handle or a URL.
    pub source: String,
    /// Target URL.
    pub target: String,
    /// Value sent in the `Content-Type` header.
    pub content_type: String,
}

impl UploadRequest {
    /// Creates a request.
    pub fn new(
        method: impl Into<String>,
        auth_header: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            auth_header: auth_header.into(),
            source: source.into(),
            target: target.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates a `PUT` request.
    pub fn put(
        auth_header: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self::new(UPLOAD_METHOD, auth_header, source, target, content_type)
    }

    /// Checks the request without touching the source or the network.
    pub fn validate(&self) -> TransferResult<()> {
        if !self.method.trim().eq_ignore_ascii_case(UPLOAD_METHOD) {
            return Err(TransferError::bad_parameter("method", self.method.as_str()));
        }
        for (field, value) in [
            ("authHeader", &self.auth_header),
            ("sourceUri", &self.source),
            ("targetUri", &self.target),
            ("contentType", &self.content_type),
        ] {
            if value.trim().is_empty() {
                return Err(TransferError::bad_parameter(field, value.as_str()));
            }
        }
        Ok(())
    }
}

/// Where upload bytes are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A local file.
    File(PathBuf),
    /// A platform content handle, opened through a content resolver.
    ContentHandle(String),
    /// Any other locator, read with an HTTP GET.
    Remote(String),
}

impl SourceLocator {
    /// Classifies a source string.
    ///
    /// Absolute paths and `file:` URIs are files, `<content_scheme>:` URIs
    /// are content handles and everything else is fetched remotely.
    pub fn parse(raw: &str, content_scheme: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('/') {
            return SourceLocator::File(PathBuf::from(raw));
        }
        if let Some(rest) = strip_scheme(raw, "file") {
            let path = Url::parse(raw)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .unwrap_or_else(|| PathBuf::from(format!("/{}", rest.trim_start_matches('/'))));
            return SourceLocator::File(path);
        }
        if strip_scheme(raw, content_scheme).is_some() {
            return SourceLocator::ContentHandle(raw.to_string());
        }
        SourceLocator::Remote(raw.to_string())
    }
}

fn strip_scheme<'a>(raw: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = raw.split_once(':')?;
    head.eq_ignore_ascii_case(scheme).then_some(rest)
}
