//! Cover art fetching with per-URL caching.
//!
//! Within an album or playlist batch every track shares the same cover
//! URL; the cache guarantees each distinct URL is fetched exactly once and
//! the bytes are reused across all tracks in the batch.

use bytes::Bytes;
use reqwest::Client;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TagError;

pub struct CoverCache {
    client: Client,
    /// Async mutex held across the fetch so two workers asking for the
    /// same URL concurrently still produce a single request.
    entries: Mutex<FxHashMap<String, Bytes>>,
}

impl CoverCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Bytes, TagError> {
        let mut entries = self.entries.lock().await;
        if let Some(bytes) = entries.get(url) {
            debug!(url, "Cover cache hit");
            return Ok(bytes.clone());
        }

        debug!(url, "Fetching cover");
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;
        entries.insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// Drop cached covers, e.g. between unrelated batches.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_cover_server(hits: Arc<AtomicUsize>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = b"jpeg-bytes";
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(body).await;
            }
        });
        format!("http://{addr}/cover/xl.jpg")
    }

    #[tokio::test]
    async fn test_distinct_url_fetched_once_per_batch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_cover_server(hits.clone()).await;
        let cache = CoverCache::new(Client::new());

        let first = cache.fetch(&url).await.unwrap();
        let second = cache.fetch(&url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_cover_server(hits.clone()).await;
        let cache = CoverCache::new(Client::new());

        cache.fetch(&url).await.unwrap();
        cache.clear().await;
        cache.fetch(&url).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let cache = CoverCache::new(Client::new());
        // Nothing listens here; the fetch must fail, not hang or cache.
        let err = cache.fetch("http://127.0.0.1:9/cover.jpg").await;
        assert!(err.is_err());
    }
}
