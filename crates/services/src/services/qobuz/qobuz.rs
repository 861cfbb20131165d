use async_trait::async_trait;
use md5::{Digest, Md5};
use media_types::{
    AlbumMetadata, AudioFormat, MediaMetadata, MediaReference, MediaType, QualityTier, Service,
    TrackMetadata, metadata::year_from_date,
};
use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::adapter::{Adapter, ResolvedDownload, ServiceAdapter, select_tier};
use crate::error::AdapterError;

use super::models::{
    QobuzAlbum, QobuzArtist, QobuzFileUrl, QobuzLogin, QobuzPlaylist, QobuzTrack, available_tiers,
    native_format_id,
};

#[derive(Debug, Clone)]
pub struct QobuzCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub username: String,
    pub password: String,
}

pub struct Qobuz {
    adapter: Adapter,
    credentials: QobuzCredentials,
    api_base: String,
    /// Session token from `user/login`; refreshed before URL resolution.
    token: RwLock<Option<String>>,
}

impl Qobuz {
    pub const API_BASE: &str = "https://www.qobuz.com/api.json/0.2/";

    pub fn new(client: Client, credentials: QobuzCredentials) -> Self {
        let mut adapter = Adapter::new(Service::Qobuz, client);
        adapter.add_header_typed(reqwest::header::ACCEPT, "application/json");
        Self {
            adapter,
            credentials,
            api_base: Self::API_BASE.to_string(),
            token: RwLock::new(None),
        }
    }

    /// Point the adapter at a different endpoint. Test hook.
    pub fn with_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn login(&self) -> Result<String, AdapterError> {
        let request = self
            .adapter
            .post(&format!("{}user/login", self.api_base))
            .query(&[("app_id", self.credentials.app_id.as_str())])
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ]);
        let login: QobuzLogin = self.adapter.send_json(request, "user login").await?;
        *self.token.write() = Some(login.user_auth_token.clone());
        Ok(login.user_auth_token)
    }

    async fn ensure_token(&self) -> Result<String, AdapterError> {
        let existing = self.token.read().clone();
        match existing {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<T, AdapterError> {
        let request = self
            .adapter
            .get(&format!("{}{path}", self.api_base))
            .query(&[("app_id", self.credentials.app_id.as_str())])
            .query(params);
        self.adapter.send_json(request, operation).await
    }

    async fn get_track(&self, track_id: &str) -> Result<QobuzTrack, AdapterError> {
        self.get_json("track/get", &[("track_id", track_id)], "track metadata")
            .await
    }

    fn map_track(&self, track: QobuzTrack) -> TrackMetadata {
        let available = available_tiers(track.streamable, track.hires, track.maximum_bit_depth);
        let top = *available.last().unwrap_or(&QualityTier::High);
        let album = track.album;
        TrackMetadata::builder(
            track.id.to_string(),
            track.title,
            album.as_ref().map(|a| a.title.clone()).unwrap_or_default(),
        )
        .artists(track.performer.into_iter().map(|p| p.name).collect())
        .duration_secs(track.duration)
        .explicit(track.parental_warning)
        .release_year_opt(
            album
                .as_ref()
                .and_then(|a| a.release_date_original.as_deref())
                .and_then(year_from_date),
        )
        .cover_url_opt(album.as_ref().and_then(|a| a.image.as_ref()).and_then(|i| i.large.clone()))
        .isrc_opt(track.isrc)
        .quality(top)
        .available(available)
        .track_number_opt(track.track_number)
        .total_tracks_opt(album.and_then(|a| a.tracks_count))
        .build()
    }

    /// Request signature for `track/getFileUrl`:
    /// `md5("trackgetFileUrlformat_id{fmt}intentstreamtrack_id{id}{ts}{secret}")`.
    fn sign_file_url_request(&self, track_id: &str, format_id: u32, timestamp: i64) -> String {
        let payload = format!(
            "trackgetFileUrlformat_id{format_id}intentstreamtrack_id{track_id}{timestamp}{}",
            self.credentials.app_secret
        );
        let digest = Md5::digest(payload.as_bytes());
        format!("{digest:x}")
    }
}

#[async_trait]
impl ServiceAdapter for Qobuz {
    fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        // Always exchange credentials for a fresh session token.
        self.login().await.map(|_| ())
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
                let album: QobuzAlbum = self
                    .get_json("album/get", &[("album_id", id)], "album metadata")
                    .await?;
                let track_ids: Vec<String> = album
                    .tracks
                    .map(|t| t.items.iter().map(|i| i.id.to_string()).collect())
                    .unwrap_or_default();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: album.id,
                    title: album.title,
                    artist: album.artist.map(|a| a.name).unwrap_or_default(),
                    total_tracks: album.tracks_count.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    release_year: album
                        .release_date_original
                        .as_deref()
                        .and_then(year_from_date),
                    cover_url: album.image.and_then(|i| i.large),
                }))
            }
            MediaType::Playlist => {
                let playlist: QobuzPlaylist = self
                    .get_json(
                        "playlist/get",
                        &[("playlist_id", id), ("extra", "tracks")],
                        "playlist metadata",
                    )
                    .await?;
                let track_ids: Vec<String> = playlist
                    .tracks
                    .map(|t| t.items.iter().map(|i| i.id.to_string()).collect())
                    .unwrap_or_default();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: playlist.id.to_string(),
                    title: playlist.name,
                    artist: playlist.owner.map(|o| o.name).unwrap_or_default(),
                    total_tracks: playlist.tracks_count.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    release_year: None,
                    cover_url: playlist.images300.into_iter().next(),
                }))
            }
            MediaType::Artist => {
                let artist: QobuzArtist = self
                    .get_json("artist/get", &[("artist_id", id)], "artist metadata")
                    .await?;
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: artist.id.to_string(),
                    title: artist.name.clone(),
                    artist: artist.name,
                    track_ids: Vec::new(),
                    release_year: None,
                    cover_url: artist.image.and_then(|i| i.large),
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
        let token = self.ensure_token().await?;

        let track = self.get_track(media_id).await?;
        let available = available_tiers(track.streamable, track.hires, track.maximum_bit_depth);
        let effective = select_tier(quality, &available)?;
        let format_id = native_format_id(effective);

        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign_file_url_request(media_id, format_id, timestamp);
        let timestamp = timestamp.to_string();
        let format_id_str = format_id.to_string();

        debug!(requested = %quality, effective = %effective, format_id, "Resolving Qobuz file URL");

        let request = self
            .adapter
            .get(&format!("{}track/getFileUrl", self.api_base))
            .query(&[
                ("app_id", self.credentials.app_id.as_str()),
                ("user_auth_token", token.as_str()),
                ("track_id", media_id),
                ("format_id", format_id_str.as_str()),
                ("intent", "stream"),
                ("request_ts", timestamp.as_str()),
                ("request_sig", signature.as_str()),
            ]);
        let file_url: QobuzFileUrl = self.adapter.send_json(request, "file url").await?;

        let url = file_url.url.ok_or(AdapterError::QualityUnavailable {
            requested: quality,
            available,
        })?;

        let format = if format_id == 5 {
            AudioFormat::Mp3
        } else {
            AudioFormat::Flac
        };

        Ok(ResolvedDownload {
            url,
            quality: effective,
            format,
        })
    }
}
