use media_types::QualityTier;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzName {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzImage {
    pub large: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzAlbumRef {
    pub title: String,
    pub image: Option<QobuzImage>,
    pub release_date_original: Option<String>,
    pub tracks_count: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzTrack {
    pub id: u64,
    pub title: String,
    pub duration: u32,
    pub isrc: Option<String>,
    pub track_number: Option<u32>,
    #[serde(default)]
    pub parental_warning: bool,
    pub performer: Option<QobuzName>,
    pub album: Option<QobuzAlbumRef>,
    #[serde(default)]
    pub hires: bool,
    pub maximum_bit_depth: Option<u32>,
    #[serde(default = "default_streamable")]
    pub streamable: bool,
}

fn default_streamable() -> bool {
    true
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzTrackRef {
    pub id: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzTrackList {
    #[serde(default)]
    pub items: Vec<QobuzTrackRef>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzAlbum {
    pub id: String,
    pub title: String,
    pub artist: Option<QobuzName>,
    pub image: Option<QobuzImage>,
    pub release_date_original: Option<String>,
    pub tracks_count: Option<u32>,
    pub tracks: Option<QobuzTrackList>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzPlaylist {
    pub id: u64,
    pub name: String,
    pub owner: Option<QobuzName>,
    pub tracks_count: Option<u32>,
    pub tracks: Option<QobuzTrackList>,
    #[serde(default)]
    pub images300: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzLogin {
    pub user_auth_token: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzFileUrl {
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct QobuzArtist {
    pub id: u64,
    pub name: String,
    pub image: Option<QobuzImage>,
}

/// Qobuz format ids: 5 = MP3 320, 6 = FLAC 16/44.1, 7 = FLAC 24/96,
/// 27 = FLAC 24/192.
pub(crate) fn native_format_id(tier: QualityTier) -> u32 {
    match tier {
        QualityTier::Low | QualityTier::High => 5,
        QualityTier::Lossless => 6,
        QualityTier::HiRes | QualityTier::DolbyAtmos | QualityTier::Sony360 => 27,
    }
}

/// Qobuz has no spatial formats; the ladder tops out at hi-res FLAC.
pub(crate) fn available_tiers(streamable: bool, hires: bool, maximum_bit_depth: Option<u32>) -> Vec<QualityTier> {
    let mut available = vec![QualityTier::Low, QualityTier::High];
    if streamable {
        available.push(QualityTier::Lossless);
        if hires || maximum_bit_depth.is_some_and(|bits| bits >= 24) {
            available.push(QualityTier::HiRes);
        }
    }
    available
}
