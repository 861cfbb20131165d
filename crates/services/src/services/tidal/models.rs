use media_types::QualityTier;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub(crate) struct TidalArtist {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalAlbumRef {
    pub title: String,
    /// Dash-delimited image id; see [`cover_url`].
    pub cover: Option<String>,
    #[serde(rename = "releaseDate")]
    pub release_date: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalTrack {
    pub id: u64,
    pub title: String,
    pub duration: u32,
    #[serde(default)]
    pub explicit: bool,
    #[serde(rename = "trackNumber")]
    pub track_number: Option<u32>,
    pub isrc: Option<String>,
    #[serde(rename = "audioQuality")]
    pub audio_quality: Option<String>,
    #[serde(rename = "audioModes", default)]
    pub audio_modes: Vec<String>,
    #[serde(default)]
    pub artists: Vec<TidalArtist>,
    pub artist: Option<TidalArtist>,
    pub album: TidalAlbumRef,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalAlbum {
    pub id: u64,
    pub title: String,
    pub artist: Option<TidalArtist>,
    pub cover: Option<String>,
    #[serde(rename = "releaseDate")]
    pub release_date: Option<String>,
    #[serde(rename = "numberOfTracks")]
    pub number_of_tracks: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalTrackPage {
    #[serde(default)]
    pub items: Vec<TidalTrack>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalPlaylistCreator {
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalPlaylist {
    pub uuid: String,
    pub title: String,
    pub creator: Option<TidalPlaylistCreator>,
    /// Image id in the same dash-delimited form as album covers.
    pub image: Option<String>,
    #[serde(rename = "numberOfTracks")]
    pub number_of_tracks: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalArtistPage {
    pub id: u64,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TidalPlaybackInfo {
    #[serde(rename = "manifest_url")]
    pub manifest_url: Option<String>,
    pub url: Option<String>,
}

/// Tidal nests cover art as a dash-delimited id that becomes a path:
/// `a1b2-c3d4-...` -> `https://resources.tidal.com/images/a1b2/c3d4/.../{size}x{size}.jpg`.
pub(crate) fn cover_url(cover_id: &str, size: u32) -> String {
    format!(
        "https://resources.tidal.com/images/{}/{size}x{size}.jpg",
        cover_id.replace('-', "/")
    )
}

/// Derive the available tier set from `audioQuality` plus `audioModes`.
///
/// The stereo ladder is cumulative: a `LOSSLESS` item also streams at
/// `HIGH` and `LOW`. Spatial modes are additive on top.
pub(crate) fn available_tiers(
    audio_quality: Option<&str>,
    audio_modes: &[String],
) -> (QualityTier, Vec<QualityTier>) {
    let top = match audio_quality {
        Some("HI_RES") | Some("HI_RES_LOSSLESS") => QualityTier::HiRes,
        Some("LOSSLESS") => QualityTier::Lossless,
        Some("LOW") => QualityTier::Low,
        _ => QualityTier::High,
    };

    let mut available: Vec<QualityTier> = [
        QualityTier::Low,
        QualityTier::High,
        QualityTier::Lossless,
        QualityTier::HiRes,
    ]
    .into_iter()
    .filter(|tier| *tier <= top)
    .collect();

    for mode in audio_modes {
        match mode.as_str() {
            "DOLBY_ATMOS" => available.push(QualityTier::DolbyAtmos),
            "SONY_360RA" => available.push(QualityTier::Sony360),
            _ => {}
        }
    }

    (top, available)
}

/// Abstract tier -> Tidal's `soundQuality` code. Spatial tiers ride the
/// `HI_RES` code on the mobile session.
pub(crate) fn native_quality(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Low => "LOW",
        QualityTier::High => "HIGH",
        QualityTier::Lossless => "LOSSLESS",
        QualityTier::HiRes | QualityTier::DolbyAtmos | QualityTier::Sony360 => "HI_RES",
    }
}
