use async_trait::async_trait;
use media_types::{
    AlbumMetadata, AudioFormat, MediaMetadata, MediaReference, MediaType, QualityTier, Service,
    TrackMetadata, metadata::year_from_date,
};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::adapter::{Adapter, ResolvedDownload, ServiceAdapter, select_tier};
use crate::error::AdapterError;

use super::device::{self, DeviceAuthHandle, DeviceAuthorization};
use super::models::{
    TidalAlbum, TidalArtistPage, TidalPlaybackInfo, TidalPlaylist, TidalTrack, TidalTrackPage,
    available_tiers, cover_url, native_quality,
};

/// Credentials for the device-code (TV) login plus the optional mobile
/// client id needed for spatial formats.
#[derive(Debug, Clone)]
pub struct TidalCredentials {
    pub client_id: String,
    pub mobile_client_id: Option<String>,
}

#[derive(Debug, Clone)]
struct TidalSession {
    access_token: String,
    /// Separate token for Dolby Atmos / Sony 360; absent unless a mobile
    /// client id was configured and its grant succeeded.
    mobile_token: Option<String>,
}

const COVER_SIZE: u32 = 1280;

pub struct Tidal {
    adapter: Adapter,
    credentials: TidalCredentials,
    api_base: String,
    auth_base: String,
    session: RwLock<Option<TidalSession>>,
}

impl Tidal {
    pub const API_BASE: &str = "https://api.tidal.com/v1/";
    pub const AUTH_BASE: &str = "https://auth.tidal.com/v1/oauth2/";

    pub fn new(client: Client, credentials: TidalCredentials) -> Self {
        let mut adapter = Adapter::new(Service::Tidal, client);
        adapter.add_header_typed(reqwest::header::ACCEPT, "application/json");
        Self {
            adapter,
            credentials,
            api_base: Self::API_BASE.to_string(),
            auth_base: Self::AUTH_BASE.to_string(),
            session: RwLock::new(None),
        }
    }

    /// Point the adapter at different endpoints. Test hook.
    pub fn with_bases(mut self, api_base: impl Into<String>, auth_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.auth_base = auth_base.into();
        self
    }

    /// Start the device-code flow: returns the verification details for the
    /// auth collaborator to show, plus a cancellable poll handle.
    pub async fn begin_device_login(
        &self,
    ) -> Result<(DeviceAuthorization, DeviceAuthHandle), AdapterError> {
        let authorization = device::request_device_code(
            &self.adapter.client,
            &self.auth_base,
            &self.credentials.client_id,
        )
        .await?;
        let handle = device::spawn_token_poll(
            self.adapter.client.clone(),
            self.auth_base.clone(),
            self.credentials.client_id.clone(),
            authorization.clone(),
        );
        Ok((authorization, handle))
    }

    /// Await the poll result and install the session, including the mobile
    /// session when a mobile client id is configured.
    pub async fn complete_device_login(&self, handle: DeviceAuthHandle) -> Result<(), AdapterError> {
        let access_token = handle.wait().await?;
        let mobile_token = match &self.credentials.mobile_client_id {
            Some(mobile_client_id) => Some(self.mobile_session_token(mobile_client_id).await?),
            None => None,
        };
        self.install_session(access_token, mobile_token);
        Ok(())
    }

    /// Install a previously obtained session (e.g. restored by the settings
    /// collaborator) without running the device flow.
    pub fn install_session(&self, access_token: String, mobile_token: Option<String>) {
        *self.session.write() = Some(TidalSession {
            access_token,
            mobile_token,
        });
    }

    async fn mobile_session_token(&self, mobile_client_id: &str) -> Result<String, AdapterError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .adapter
            .client
            .post(format!("{}token", self.auth_base))
            .form(&[
                ("client_id", mobile_client_id),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::authentication(
                Service::Tidal,
                format!("mobile session grant returned {status}"),
            ));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    fn bearer(&self) -> Result<String, AdapterError> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| {
                AdapterError::authentication(Service::Tidal, "device authorization required")
            })
    }

    fn mobile_bearer(&self) -> Option<String> {
        self.session.read().as_ref()?.mobile_token.clone()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        bearer: &str,
        operation: &'static str,
    ) -> Result<T, AdapterError> {
        let request = self
            .adapter
            .get(&format!("{}{path}", self.api_base))
            .bearer_auth(bearer)
            .query(params);
        self.adapter.send_json(request, operation).await
    }

    async fn get_track(&self, track_id: &str) -> Result<TidalTrack, AdapterError> {
        let bearer = self.bearer()?;
        self.get_json(&format!("tracks/{track_id}"), &[], &bearer, "track metadata")
            .await
    }

    fn map_track(&self, track: TidalTrack) -> TrackMetadata {
        let (top, available) = available_tiers(track.audio_quality.as_deref(), &track.audio_modes);
        let artists: Vec<String> = if track.artists.is_empty() {
            track.artist.into_iter().map(|a| a.name).collect()
        } else {
            track.artists.into_iter().map(|a| a.name).collect()
        };
        TrackMetadata::builder(track.id.to_string(), track.title, track.album.title)
            .artists(artists)
            .duration_secs(track.duration)
            .explicit(track.explicit)
            .release_year_opt(track.album.release_date.as_deref().and_then(year_from_date))
            .cover_url_opt(track.album.cover.as_deref().map(|c| cover_url(c, COVER_SIZE)))
            .isrc_opt(track.isrc)
            .quality(top)
            .available(available)
            .track_number_opt(track.track_number)
            .build()
    }
}

#[async_trait]
impl ServiceAdapter for Tidal {
    fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        // The interactive device flow lives with the auth collaborator;
        // here we only verify that a session has been installed.
        self.bearer().map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    async fn resolve_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<MediaMetadata, AdapterError> {
        let bearer = self.bearer()?;
        let id = reference.media_id();
        match reference.media_type() {
            MediaType::Track => {
                let track = self.get_track(id).await?;
                Ok(MediaMetadata::Track(self.map_track(track)))
            }
            MediaType::Album => {
                let album: TidalAlbum = self
                    .get_json(&format!("albums/{id}"), &[], &bearer, "album metadata")
                    .await?;
                let tracks: TidalTrackPage = self
                    .get_json(&format!("albums/{id}/tracks"), &[], &bearer, "album tracks")
                    .await?;
                let track_ids: Vec<String> =
                    tracks.items.iter().map(|t| t.id.to_string()).collect();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: album.id.to_string(),
                    title: album.title,
                    artist: album.artist.map(|a| a.name).unwrap_or_default(),
                    total_tracks: album.number_of_tracks.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    release_year: album.release_date.as_deref().and_then(year_from_date),
                    cover_url: album.cover.as_deref().map(|c| cover_url(c, COVER_SIZE)),
                }))
            }
            MediaType::Playlist => {
                let playlist: TidalPlaylist = self
                    .get_json(&format!("playlists/{id}"), &[], &bearer, "playlist metadata")
                    .await?;
                let tracks: TidalTrackPage = self
                    .get_json(
                        &format!("playlists/{id}/tracks"),
                        &[],
                        &bearer,
                        "playlist tracks",
                    )
                    .await?;
                let track_ids: Vec<String> =
                    tracks.items.iter().map(|t| t.id.to_string()).collect();
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: playlist.uuid,
                    title: playlist.title,
                    artist: playlist
                        .creator
                        .and_then(|c| c.name)
                        .unwrap_or_default(),
                    total_tracks: playlist.number_of_tracks.unwrap_or(track_ids.len() as u32),
                    track_ids,
                    // No release-year guarantee for playlists.
                    release_year: None,
                    cover_url: playlist.image.as_deref().map(|c| cover_url(c, COVER_SIZE)),
                }))
            }
            MediaType::Artist => {
                let artist: TidalArtistPage = self
                    .get_json(&format!("artists/{id}"), &[], &bearer, "artist metadata")
                    .await?;
                Ok(MediaMetadata::Collection(AlbumMetadata {
                    id: artist.id.to_string(),
                    title: artist.name.clone(),
                    artist: artist.name,
                    track_ids: Vec::new(),
                    release_year: None,
                    cover_url: artist.picture.as_deref().map(|c| cover_url(c, COVER_SIZE)),
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
        let track = self.get_track(media_id).await?;
        let (_, available) = available_tiers(track.audio_quality.as_deref(), &track.audio_modes);

        // Spatial formats ride the mobile session; without one this is a
        // capability failure, not something to silently degrade.
        let mobile_bearer = self.mobile_bearer();
        if quality.is_spatial() && mobile_bearer.is_none() {
            return Err(AdapterError::QualityUnavailable {
                requested: quality,
                available: available
                    .into_iter()
                    .filter(|t| !t.is_spatial())
                    .collect(),
            });
        }

        let effective = select_tier(quality, &available)?;
        let bearer = match mobile_bearer {
            Some(token) if effective.is_spatial() => token,
            _ => self.bearer()?,
        };

        debug!(requested = %quality, effective = %effective, "Resolving Tidal playback info");

        let info: TidalPlaybackInfo = self
            .get_json(
                &format!("tracks/{media_id}/playbackinfopostpaywall"),
                &[
                    ("soundQuality", native_quality(effective)),
                    ("playbackmode", "STREAM"),
                ],
                &bearer,
                "playback info",
            )
            .await?;

        let url = info.manifest_url.or(info.url).ok_or_else(|| {
            AdapterError::QualityUnavailable {
                requested: quality,
                available,
            }
        })?;

        let format = match effective {
            QualityTier::Lossless | QualityTier::HiRes => AudioFormat::Flac,
            _ => AudioFormat::M4a,
        };

        Ok(ResolvedDownload {
            url,
            quality: effective,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tidal() -> Tidal {
        Tidal::new(
            Client::new(),
            TidalCredentials {
                client_id: "cid".into(),
                mobile_client_id: None,
            },
        )
    }

    #[tokio::test]
    async fn test_authenticate_requires_session() {
        let adapter = tidal();
        let err = adapter.authenticate().await.unwrap_err();
        assert!(matches!(err, AdapterError::Authentication { .. }));

        adapter.install_session("tok".into(), None);
        adapter.authenticate().await.unwrap();
    }

    #[tokio::test]
    async fn test_spatial_without_mobile_session_is_capability_failure() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Serve one track-metadata response; the playback endpoint must
        // never be reached.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = r#"{
                    "id": 1, "title": "T", "duration": 100,
                    "audioQuality": "HI_RES", "audioModes": ["STEREO", "DOLBY_ATMOS"],
                    "artists": [{"name": "A"}],
                    "album": {"title": "Al", "cover": "aa-bb", "releaseDate": "2020-01-01"}
                }"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        let adapter = tidal().with_bases(format!("http://{addr}/"), format!("http://{addr}/"));
        adapter.install_session("tok".into(), None);

        let err = adapter
            .resolve_download_url("1", QualityTier::DolbyAtmos)
            .await
            .unwrap_err();
        match err {
            AdapterError::QualityUnavailable {
                requested,
                available,
            } => {
                assert_eq!(requested, QualityTier::DolbyAtmos);
                assert!(available.iter().all(|t| !t.is_spatial()));
                assert!(available.contains(&QualityTier::HiRes));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_track_builds_cover_url() {
        let track: TidalTrack = serde_json::from_str(
            r#"{
                "id": 7, "title": "T", "duration": 10,
                "audioQuality": "LOSSLESS",
                "artists": [{"name": "A"}],
                "album": {"title": "Al", "cover": "x-y", "releaseDate": "1999-12-31"}
            }"#,
        )
        .unwrap();
        let mapped = tidal().map_track(track);
        assert_eq!(
            mapped.cover_url.as_deref(),
            Some("https://resources.tidal.com/images/x/y/1280x1280.jpg")
        );
        assert_eq!(mapped.release_year, Some(1999));
        assert_eq!(mapped.quality, QualityTier::Lossless);
    }
}
