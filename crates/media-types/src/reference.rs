use serde::{Deserialize, Serialize};

/// Streaming services known to the resolver and the adapter registry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Tidal,
    Qobuz,
    Deezer,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Tidal => "tidal",
            Service::Qobuz => "qobuz",
            Service::Deezer => "deezer",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content a URL points at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Track,
    Album,
    Playlist,
    Artist,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaType::Track => "track",
            MediaType::Album => "album",
            MediaType::Playlist => "playlist",
            MediaType::Artist => "artist",
        };
        f.write_str(s)
    }
}

/// A resolved (service, type, id) triple identifying a piece of content.
///
/// Immutable once constructed; everything downstream of the resolver carries
/// this instead of the raw URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaReference {
    service: Service,
    media_type: MediaType,
    media_id: String,
}

impl MediaReference {
    pub fn new(service: Service, media_type: MediaType, media_id: impl Into<String>) -> Self {
        Self {
            service,
            media_type,
            media_id: media_id.into(),
        }
    }

    #[inline]
    pub fn service(&self) -> Service {
        self.service
    }

    #[inline]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[inline]
    pub fn media_id(&self) -> &str {
        &self.media_id
    }
}

impl std::fmt::Display for MediaReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.media_type, self.media_id)
    }
}
