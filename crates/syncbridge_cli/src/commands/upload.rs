//! Upload command implementation.

use syncbridge_transfer::{TransferConfig, UploadRequest, Uploader};
use tracing::{debug, info};

/// Runs the upload command.
pub async fn run(
    request: UploadRequest,
    chunk_size: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let uploader = Uploader::new(TransferConfig::new().with_chunk_size(chunk_size))?;
    let text = format != "json";
    debug!(chunk_size, format, "upload command");

    if text {
        println!("Uploading {} to {}", request.source, request.target);
    }

    let mut sent = 0usize;
    let mut chunks = 0usize;
    let result = uploader
        .upload(request, |progress| {
            sent += progress.bytes;
            chunks += 1;
            if text {
                print!("\r  {sent} bytes sent");
            }
        })
        .await;
    if text && chunks > 0 {
        println!();
    }

    let response = result?;
    info!(status = response.status_code, chunks, bytes = sent, "upload complete");
    if text {
        println!("Status: {}", response.status_code);
        println!("Chunks: {chunks}");
        println!("Response:");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
