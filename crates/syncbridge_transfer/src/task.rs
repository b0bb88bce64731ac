//! Background upload tasks.
//!
//! An upload runs on the Tokio runtime, streams the source to the target in
//! fixed-size chunks and reports each chunk on a progress channel. Every
//! failure after validation is captured into an [`UploadResult`] with status
//! `-1`; nothing escapes the task as a panic or an early error.

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::request::{SourceLocator, UploadRequest};
use crate::source::{open_source, ContentResolver, SourceReader};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Status code of a result that never reached the target.
pub const SYNTHETIC_FAILURE_STATUS: i32 = -1;

/// One chunk written to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes in this chunk.
    pub bytes: usize,
}

/// Terminal result of an upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// HTTP status, or `-1` when the upload failed before a response.
    pub status_code: i32,
    /// Response text, or the failure message.
    pub body: String,
}

impl UploadResult {
    fn failed(cause: impl std::fmt::Display) -> Self {
        Self {
            status_code: SYNTHETIC_FAILURE_STATUS,
            body: format!("Failed to save attachment {cause}"),
        }
    }

    /// Returns true if the task never got a response.
    pub fn is_synthetic_failure(&self) -> bool {
        self.status_code == SYNTHETIC_FAILURE_STATUS
    }

    /// Interprets the result.
    ///
    /// 200 and 202 must carry a JSON object; any other status is a rejection.
    pub fn into_response(self) -> TransferResult<UploadResponse> {
        match self.status_code {
            200 | 202 => {
                let resp = serde_json::from_str::<Map<String, Value>>(&self.body).map_err(|e| {
                    TransferError::MalformedResponse {
                        reason: e.to_string(),
                        body: self.body.clone(),
                    }
                })?;
                Ok(UploadResponse {
                    status_code: self.status_code as u16,
                    resp,
                })
            }
            SYNTHETIC_FAILURE_STATUS => Err(TransferError::Transport(self.body)),
            status => Err(TransferError::UpstreamRejected {
                status: u16::try_from(status).unwrap_or_default(),
                body: self.body,
            }),
        }
    }
}

/// A successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// HTTP status (200 or 202).
    pub status_code: u16,
    /// Parsed response body.
    pub resp: Map<String, Value>,
}

/// Handle to a running upload.
#[derive(Debug)]
pub struct TransferHandle {
    progress: mpsc::UnboundedReceiver<TransferProgress>,
    task: JoinHandle<UploadResult>,
    cancel: CancellationToken,
}

impl TransferHandle {
    /// Requests cancellation. The upload stops before its next chunk and
    /// resolves with a `-1` result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the result, handing every progress report to `on_progress`
    /// in the order the chunks were written.
    pub async fn finish<F>(self, mut on_progress: F) -> UploadResult
    where
        F: FnMut(TransferProgress),
    {
        let TransferHandle {
            mut progress,
            mut task,
            ..
        } = self;
        loop {
            tokio::select! {
                biased;
                Some(report) = progress.recv() => on_progress(report),
                joined = &mut task => {
                    while let Ok(report) = progress.try_recv() {
                        on_progress(report);
                    }
                    return joined.unwrap_or_else(|e| {
                        warn!(error = %e, "upload task did not complete");
                        UploadResult::failed(e)
                    });
                }
            }
        }
    }

    /// Waits for the result, discarding progress.
    pub async fn wait(self) -> UploadResult {
        self.finish(|_| {}).await
    }
}

/// Runs attachment uploads in the background.
#[derive(Clone)]
pub struct Uploader {
    client: reqwest::Client,
    config: TransferConfig,
    resolver: Option<Arc<dyn ContentResolver>>,
}

impl Uploader {
    /// Creates an uploader whose connections use the configured timeouts.
    pub fn new(config: TransferConfig) -> TransferResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            resolver: None,
        })
    }

    /// Registers the resolver for content-handle sources.
    pub fn with_content_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Validates `request` and starts it on the current Tokio runtime.
    ///
    /// Validation errors are returned before the source is opened.
    pub fn spawn(&self, request: UploadRequest) -> TransferResult<TransferHandle> {
        request.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = UploadTask {
            client: self.client.clone(),
            locator: SourceLocator::parse(&request.source, &self.config.content_scheme),
            request,
            chunk_size: self.config.chunk_size,
            resolver: self.resolver.clone(),
            progress: tx,
            cancel: cancel.clone(),
        };

        Ok(TransferHandle {
            progress: rx,
            task: tokio::spawn(task.run()),
            cancel,
        })
    }

    /// Runs an upload to completion and interprets its result.
    pub async fn upload<F>(&self, request: UploadRequest, on_progress: F) -> TransferResult<UploadResponse>
    where
        F: FnMut(TransferProgress),
    {
        self.spawn(request)?.finish(on_progress).await.into_response()
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.config)
            .field("content_resolver", &self.resolver.is_some())
            .finish()
    }
}

struct UploadTask {
    client: reqwest::Client,
    request: UploadRequest,
    locator: SourceLocator,
    chunk_size: usize,
    resolver: Option<Arc<dyn ContentResolver>>,
    progress: mpsc::UnboundedSender<TransferProgress>,
    cancel: CancellationToken,
}

impl UploadTask {
    async fn run(self) -> UploadResult {
        let target = self.request.target.clone();
        match self.transfer().await {
            Ok(result) => {
                info!(%target, status = result.status_code, "attachment upload finished");
                result
            }
            Err(e) => {
                error!(%target, error = %e, "attachment upload failed");
                UploadResult::failed(e)
            }
        }
    }

    async fn transfer(self) -> TransferResult<UploadResult> {
        info!(
            source = %self.request.source,
            target = %self.request.target,
            "uploading attachment"
        );
        let source = open_source(&self.locator, &self.client, self.resolver.as_ref()).await?;
        let body = reqwest::Body::wrap_stream(chunks(
            source,
            self.chunk_size,
            self.progress,
            self.cancel,
        ));

        let response = self
            .client
            .put(self.request.target.as_str())
            .header(CONTENT_TYPE, self.request.content_type.as_str())
            .header(AUTHORIZATION, self.request.auth_header.as_str())
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, len = body.len(), "upload response received");
        Ok(UploadResult {
            status_code: i32::from(status),
            body,
        })
    }
}

/// Reads `source` in chunks of at most `chunk_size` bytes.
///
/// A chunk is reported once the body consumer polls for the next one, so a
/// request that fails mid-body never reports the chunk it was writing.
fn chunks(
    source: SourceReader,
    chunk_size: usize,
    progress: mpsc::UnboundedSender<TransferProgress>,
    cancel: CancellationToken,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    futures::stream::try_unfold((source, None), move |(mut source, written)| {
        let progress = progress.clone();
        let cancel = cancel.clone();
        async move {
            if let Some(bytes) = written {
                trace!(bytes, "chunk written");
                // The receiver may already be gone if the caller dropped the handle.
                let _ = progress.send(TransferProgress { bytes });
            }
            if cancel.is_cancelled() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
            }
            let mut buf = vec![0u8; chunk_size];
            let n = source.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), (source, Some(n)))))
        }
    })
}
