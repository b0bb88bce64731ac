//! Opening upload sources as async byte streams.

use crate::error::{TransferError, TransferResult};
use crate::request::SourceLocator;
use futures::TryStreamExt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// A readable upload source.
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Opens platform content handles.
///
/// Hosts that expose content URIs (media stores, document providers)
/// register an implementation with the uploader.
pub trait ContentResolver: Send + Sync {
    /// Opens the content behind `uri` for reading.
    fn open(&self, uri: &str) -> io::Result<SourceReader>;
}

/// Opens a source for reading.
pub(crate) async fn open_source(
    locator: &SourceLocator,
    client: &reqwest::Client,
    resolver: Option<&Arc<dyn ContentResolver>>,
) -> TransferResult<SourceReader> {
    match locator {
        SourceLocator::File(path) => {
            debug!(path = %path.display(), "opening file source");
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(file))
        }
        SourceLocator::ContentHandle(uri) => {
            debug!(%uri, "opening content handle");
            let resolver = resolver.ok_or_else(|| {
                TransferError::Transport(format!("no content resolver registered for {uri}"))
            })?;
            Ok(resolver.open(uri)?)
        }
        SourceLocator::Remote(url) => {
            debug!(%url, "opening remote source");
            let response = client.get(url.as_str()).send().await?.error_for_status()?;
            let stream = response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
            Ok(Box::new(StreamReader::new(Box::pin(stream))))
        }
    }
}
