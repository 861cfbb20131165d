//! Streamed file transfer.
//!
//! Bytes flow from the service's download URL into a private `.part` file.
//! Cancellation is cooperative and observed between chunks; any failure or
//! cancellation removes the partial file before returning.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::DownloadError;

#[instrument(skip(client, token, on_chunk), level = "debug")]
pub(crate) async fn transfer<F>(
    client: &Client,
    url: &str,
    part_path: &Path,
    token: &CancellationToken,
    max_file_size: Option<u64>,
    chunk_size: usize,
    on_chunk: F,
) -> Result<u64, DownloadError>
where
    F: FnMut(u64, Option<u64>),
{
    let result = run(client, url, part_path, token, max_file_size, chunk_size, on_chunk).await;
    if result.is_err() {
        // A cancelled or failed transfer never leaves a partial file behind.
        let _ = tokio::fs::remove_file(part_path).await;
    }
    result
}

async fn run<F>(
    client: &Client,
    url: &str,
    part_path: &Path,
    token: &CancellationToken,
    max_file_size: Option<u64>,
    chunk_size: usize,
    mut on_chunk: F,
) -> Result<u64, DownloadError>
where
    F: FnMut(u64, Option<u64>),
{
    let response = tokio::select! {
        _ = token.cancelled() => return Err(DownloadError::Cancelled),
        response = client.get(url).send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::http_status(status, url, "file download"));
    }

    let total = response.content_length();
    if let (Some(limit), Some(total)) = (max_file_size, total)
        && total > limit
    {
        return Err(DownloadError::download(format!(
            "advertised size {total} exceeds the {limit} byte limit"
        )));
    }

    let file = File::create(part_path).await?;
    let mut writer = BufWriter::with_capacity(chunk_size.max(8 * 1024), file);
    let mut stream = response.bytes_stream();
    let mut bytes_read: u64 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(url, bytes_read, "Transfer cancelled at chunk boundary");
                return Err(DownloadError::Cancelled);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    writer.write_all(&chunk).await?;
                    bytes_read += chunk.len() as u64;
                    if let Some(limit) = max_file_size
                        && bytes_read > limit
                    {
                        return Err(DownloadError::download(format!(
                            "transfer exceeded the {limit} byte limit"
                        )));
                    }
                    on_chunk(bytes_read, total);
                }
                Some(Err(e)) => return Err(DownloadError::Network { source: e }),
                None => break,
            }
        }
    }

    writer.flush().await?;

    if let Some(total) = total
        && bytes_read != total
    {
        return Err(DownloadError::Incomplete {
            expected: total,
            received: bytes_read,
        });
    }

    debug!(url, bytes_read, "Transfer complete");
    Ok(bytes_read)
}
