//! # syncbridge transfer
//!
//! Background attachment uploader.
//!
//! An upload reads its source (a local file, a platform content handle or a
//! remote URL) and streams it with `PUT` to the target in 1024-byte chunks,
//! reporting every chunk as progress. The task always finishes with an
//! [`UploadResult`]; failures that happen before a response is read are
//! captured as status `-1` with a `"Failed to save attachment ..."` body.
//!
//! ```text
//! UploadRequest ──validate──► Uploader::spawn ──► TransferHandle
//!                                   │                 │   ▲
//!                                   ▼                 │   │ progress
//!                      source ──chunks──► PUT target  │   │
//!                                   │                 ▼   │
//!                                   └──────────► UploadResult ──► UploadResponse
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod request;
mod source;
mod task;

pub use config::TransferConfig;
pub use error::{TransferError, TransferResult};
pub use request::{SourceLocator, UploadRequest, UPLOAD_METHOD};
pub use source::{ContentResolver, SourceReader};
pub use task::{
    TransferHandle, TransferProgress, UploadResponse, UploadResult, Uploader,
    SYNTHETIC_FAILURE_STATUS,
};
