//! Shared fixtures for in-crate tests: a stub service adapter, a no-op
//! post-processor and minimal single-purpose HTTP servers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use audio_tagger::{PostProcess, TagError};
use media_types::{
    AudioFormat, MediaMetadata, MediaReference, MediaType, QualityTier, Service, TrackMetadata,
};
use service_adapters::{Adapter, AdapterError, ResolvedDownload, ServiceAdapter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub(crate) fn stub_track(media_id: &str) -> TrackMetadata {
    TrackMetadata::builder(media_id, format!("Track {media_id}"), "Stub Album")
        .artist("Stub Artist")
        .available(vec![QualityTier::Low, QualityTier::High, QualityTier::Lossless])
        .build()
}

/// Adapter that serves canned metadata and a fixed download URL.
pub(crate) struct StubAdapter {
    adapter: Adapter,
    pub download_url: String,
    pub album_children: Vec<String>,
}

impl StubAdapter {
    pub fn new(service: Service, download_url: impl Into<String>) -> Self {
        Self {
            adapter: Adapter::new(service, reqwest::Client::new()),
            download_url: download_url.into(),
            album_children: vec!["1".into(), "2".into()],
        }
    }
}

#[async_trait]
impl ServiceAdapter for StubAdapter {
    fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn resolve_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<MediaMetadata, AdapterError> {
        match reference.media_type() {
            MediaType::Track => Ok(MediaMetadata::Track(stub_track(reference.media_id()))),
            MediaType::Album | MediaType::Playlist => {
                Ok(MediaMetadata::Collection(media_types::AlbumMetadata {
                    id: reference.media_id().to_string(),
                    title: "Stub Collection".into(),
                    artist: "Stub Artist".into(),
                    track_ids: self.album_children.clone(),
                    release_year: Some(2020),
                    cover_url: None,
                    total_tracks: self.album_children.len() as u32,
                }))
            }
            MediaType::Artist => Ok(MediaMetadata::Collection(media_types::AlbumMetadata {
                id: reference.media_id().to_string(),
                title: "Stub Artist".into(),
                artist: "Stub Artist".into(),
                track_ids: Vec::new(),
                release_year: None,
                cover_url: None,
                total_tracks: 0,
            })),
        }
    }

    async fn list_children(&self, reference: &MediaReference) -> Result<Vec<String>, AdapterError> {
        match reference.media_type() {
            MediaType::Track => Ok(vec![reference.media_id().to_string()]),
            MediaType::Album | MediaType::Playlist => Ok(self.album_children.clone()),
            MediaType::Artist => Err(AdapterError::metadata("artist references cannot be expanded")),
        }
    }

    async fn resolve_download_url(
        &self,
        _media_id: &str,
        quality: QualityTier,
    ) -> Result<ResolvedDownload, AdapterError> {
        Ok(ResolvedDownload {
            url: self.download_url.clone(),
            quality,
            format: AudioFormat::Mp3,
        })
    }
}

/// Post-processor that just moves the part file into place.
pub(crate) struct NoopPost;

#[async_trait]
impl PostProcess for NoopPost {
    async fn finalize(
        &self,
        part_path: &Path,
        final_path: &Path,
        _track: &TrackMetadata,
        _format: AudioFormat,
    ) -> Result<PathBuf, TagError> {
        tokio::fs::rename(part_path, final_path).await?;
        Ok(final_path.to_path_buf())
    }
}

/// Serve `body` on every connection, split into `chunks` pieces with
/// `delay` between them. Returns the URL.
pub(crate) async fn serve_bytes(body: Vec<u8>, chunks: usize, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let chunk_len = body.len().div_ceil(chunks.max(1));
                for piece in body.chunks(chunk_len.max(1)) {
                    if socket.write_all(piece).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            });
        }
    });
    format!("http://{addr}/file")
}

/// Serve a bare status code on every connection.
pub(crate) async fn serve_status(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{addr}/file")
}

/// Advertise `advertised` bytes but close after `sent`.
pub(crate) async fn serve_truncated(advertised: usize, sent: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {advertised}\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&vec![0u8; sent]).await;
            // Drop the socket short of the advertised length.
        }
    });
    format!("http://{addr}/file")
}

/// Fail the first `failures` requests with 500, then serve `body`.
pub(crate) async fn serve_flaky(body: Vec<u8>, failures: usize) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits_counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let hit = hits_counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            if hit < failures {
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
            } else {
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
            }
        }
    });
    (format!("http://{addr}/file"), hits)
}
