use async_trait::async_trait;
use media_types::{
    AlbumMetadata, AudioFormat, MediaMetadata, MediaReference, MediaType, QualityTier, Service,
    TrackMetadata, metadata::year_from_date,
};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::adapter::{Adapter, ResolvedDownload, ServiceAdapter, select_tier};
use crate::error::AdapterError;

use super::models::{
    DeezerAlbum, DeezerArtist, DeezerGwResponse, DeezerPlaylist, DeezerTrack, available_tiers,
    native_quality,
};

/// Long-lived ARL browser cookie; Deezer's whole auth model.
#[derive(Debug, Clone)]
pub struct DeezerCredentials {
    pub arl: String,
}

pub struct Deezer {
    adapter: Adapter,
    api_base: String,
    gateway: String,
}

impl Deezer {
    pub const API_BASE: &str = "https://api.deezer.com/";
    pub const GATEWAY: &str = "https://www.deezer.com/ajax/gw-light.php";

    pub fn new(client: Client, credentials: DeezerCredentials) -> Self {
        let mut adapter = Adapter::new(Service::Deezer, client);
        adapter.add_cookie("arl", credentials.arl);
        Self {
            adapter,
            api_base: Self::API_BASE.to_string(),
            gateway: Self::GATEWAY.to_string(),
        }
    }

    /// Point the adapter at different endpoints. Test hook.
    pub fn with_bases(mut self, api_base: impl Into<String>, gateway: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.gateway = gateway.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T, AdapterError> {
        let request = self.adapter.get(&format!("{}{path}", self.api_base));
        self.adapter.send_json(request, operation).await
    }

    async fn get_track(&self, track_id: &str) -> Result<DeezerTrack, AdapterError> {
        self.get_json(&format!("track/{track_id}"), "track metadata")
            .await
    }

    fn map_track(&self, track: DeezerTrack) -> TrackMetadata {
        let artists: Vec<String> = if track.contributors.is_empty() {
            track.artist.into_iter().map(|a| a.name).collect()
        } else {
            track.contributors.into_iter().map(|c| c.name).collect()
        };
        let release_date = track
            .album
            .as_ref()
            .and_then(|a| a.release_date.as_deref())
            .or(track.release_date.as_deref());
        let release_year = release_date.and_then(year_from_date);
        TrackMetadata::builder(
            track.id.to_string(),
            track.title,
            track
                .album
                .as_ref()
                .map(|a| a.title.clone())
                .unwrap_or_default(),
        )
        .artists(artists)
        .duration_secs(track.duration)
        .explicit(track.explicit_lyrics)
        .release_year_opt(release_year)
        .cover_url_opt(track.album.and_then(|a| a.cover_xl))
        .isrc_opt(track.isrc)
        .quality(QualityTier::Lossless)
        .available(available_tiers())
        .track_number_opt(track.track_position)
        .build()
    }

    /// One `song.getFileUrl` gateway call for a given tier; `None` when the
    /// gateway has no URL for that quality code.
    async fn file_url_for_tier(
        &self,
        track_token: &str,
        media_id: &str,
        tier: QualityTier,
    ) -> Result<Option<String>, AdapterError> {
        let request = self
            .adapter
            .post(&self.gateway)
            .query(&[("api_version", "1.0"), ("api_token", track_token)])
            .json(&json!({
                "method": "song.getFileUrl",
                "params": {
                    "sng_id": media_id,
                    "quality": native_quality(tier),
                }
            }));
        let response: DeezerGwResponse = self.adapter.send_json(request, "file url").await?;
        Ok(response.results.and_then(|r| r.url))
    }
}

#[async_trait]
impl ServiceAdapter for Deezer {
    fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        // The ARL cookie is long-lived; nothing to exchange up front.
        // Expired cookies surface as 403s on the gateway call.
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn resolve_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<MediaMetadata, AdapterError> {
        let id = reference.media_id();
        match reference.media_type() {
            MediaType::Track => {
                let track = self.get_track(id).await?;
                Ok(MediaMetadata::Track(self.map_track(track)))
            }
            MediaType::Album => {
                let album: DeezerAlbum =
                    self.get_json(&format!("album/{id}"), "album metadata").await?;
                let track_ids: Vec<String> = album
                    .tracks
                    .map(|t| t.data.iter().map(|i| i.id.to_string()).collect())
                    .unwrap_or_default();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: album.id.to_string(),
                    title: album.title,
                    artist: album.artist.map(|a| a.name).unwrap_or_default(),
                    total_tracks: album.nb_tracks.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    release_year: album.release_date.as_deref().and_then(year_from_date),
                    cover_url: album.cover_xl,
                }))
            }
            MediaType::Playlist => {
                let playlist: DeezerPlaylist = self
                    .get_json(&format!("playlist/{id}"), "playlist metadata")
                    .await?;
                let track_ids: Vec<String> = playlist
                    .tracks
                    .map(|t| t.data.iter().map(|i| i.id.to_string()).collect())
                    .unwrap_or_default();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: playlist.id.to_string(),
                    title: playlist.title,
                    artist: playlist.creator.map(|c| c.name).unwrap_or_default(),
                    total_tracks: playlist.nb_tracks.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    // No release-year guarantee for playlists.
                    release_year: None,
                    cover_url: playlist.picture_xl,
                }))
            }
            MediaType::Artist => {
                let artist: DeezerArtist = self
                    .get_json(&format!("artist/{id}"), "artist metadata")
                    .await?;
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: artist.id.to_string(),
                    title: artist.name.clone(),
                    artist: artist.name,
                    track_ids: Vec::new(),
                    release_year: None,
                    cover_url: artist.picture_xl,
                    total_tracks: 0,
                }))
            }
        }
    }

    async fn list_children(&self, reference: &MediaReference) -> Result<Vec<String>, AdapterError> {
        match reference.media_type() {
            MediaType::Track => Ok(vec![reference.media_id().to_string()]),
            MediaType::Album | MediaType::Playlist => {
                match self.resolve_metadata(reference).await? {
                    MediaMetadata::Collection(collection) => Ok(collection.track_ids),
                    MediaMetadata::Track(track) => Ok(vec![track.id]),
                }
            }
            MediaType::Artist => Err(AdapterError::metadata(
                "artist references cannot be expanded into tracks",
            )),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn resolve_download_url(
        &self,
        media_id: &str,
        quality: QualityTier,
    ) -> Result<ResolvedDownload, AdapterError> {
        let available = available_tiers();
        let mut tier = Some(select_tier(quality, &available)?);

        // The track token is signed per track and short-lived; fetch it
        // right before the gateway call, never from cached metadata.
        let track = self.get_track(media_id).await?;
        let track_token = track
            .token
            .ok_or_else(|| AdapterError::metadata("track payload carried no download token"))?;

        while let Some(effective) = tier {
            match self
                .file_url_for_tier(&track_token, media_id, effective)
                .await?
            {
                Some(url) => {
                    let format = if effective >= QualityTier::Lossless {
                        AudioFormat::Flac
                    } else {
                        AudioFormat::Mp3
                    };
                    debug!(requested = %quality, effective = %effective, "Resolved Deezer file URL");
                    return Ok(ResolvedDownload {
                        url,
                        quality: effective,
                        format,
                    });
                }
                None => {
                    warn!(tier = %effective, "Gateway returned no URL; trying next lower tier");
                    tier = effective.next_lower();
                }
            }
        }

        Err(AdapterError::QualityUnavailable {
            requested: quality,
            available: Vec::new(),
        })
    }
}
