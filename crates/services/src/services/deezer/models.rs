use media_types::QualityTier;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerName {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerAlbumRef {
    pub title: String,
    /// Ready-made XL cover URL, unlike Tidal's id-to-path scheme.
    pub cover_xl: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerTrack {
    pub id: u64,
    pub title: String,
    pub duration: u32,
    pub isrc: Option<String>,
    #[serde(default)]
    pub explicit_lyrics: bool,
    pub track_position: Option<u32>,
    pub artist: Option<DeezerName>,
    #[serde(default)]
    pub contributors: Vec<DeezerName>,
    pub album: Option<DeezerAlbumRef>,
    pub release_date: Option<String>,
    /// Per-track signed token, consumed by `song.getFileUrl` immediately
    /// after this payload is fetched.
    pub token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerTrackRef {
    pub id: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerTrackList {
    #[serde(default)]
    pub data: Vec<DeezerTrackRef>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerAlbum {
    pub id: u64,
    pub title: String,
    pub artist: Option<DeezerName>,
    pub release_date: Option<String>,
    pub cover_xl: Option<String>,
    pub nb_tracks: Option<u32>,
    pub tracks: Option<DeezerTrackList>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerPlaylist {
    pub id: u64,
    pub title: String,
    pub creator: Option<DeezerName>,
    pub picture_xl: Option<String>,
    pub nb_tracks: Option<u32>,
    pub tracks: Option<DeezerTrackList>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerArtist {
    pub id: u64,
    pub name: String,
    pub picture_xl: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerGwResults {
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeezerGwResponse {
    pub results: Option<DeezerGwResults>,
}

/// Deezer gateway quality codes: MP3_128 = 1, MP3_320 = 3, FLAC = 9.
pub(crate) fn native_quality(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Low => "1",
        QualityTier::High => "3",
        QualityTier::Lossless
        | QualityTier::HiRes
        | QualityTier::DolbyAtmos
        | QualityTier::Sony360 => "9",
    }
}

pub(crate) fn available_tiers() -> Vec<QualityTier> {
    vec![QualityTier::Low, QualityTier::High, QualityTier::Lossless]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_mapping_from_service_json() {
        let json = r#"{
            "id": 3135556,
            "title": "Harder, Better, Faster, Stronger",
            "duration": 224,
            "isrc": "GBDUW0000059",
            "explicit_lyrics": false,
            "track_position": 4,
            "artist": {"name": "Daft Punk"},
            "contributors": [{"name": "Daft Punk"}],
            "album": {
                "title": "Discovery",
                "cover_xl": "https://cdn-images.dzcdn.net/images/cover/xl.jpg",
                "release_date": "2001-03-07"
            },
            "token": "signed-token"
        }"#;
        let track: DeezerTrack = serde_json::from_str(json).unwrap();
        assert_eq!(track.track_position, Some(4));
        assert_eq!(
            track.album.as_ref().unwrap().cover_xl.as_deref(),
            Some("https://cdn-images.dzcdn.net/images/cover/xl.jpg")
        );
        assert_eq!(track.token.as_deref(), Some("signed-token"));
    }

    #[test]
    fn test_quality_codes() {
        assert_eq!(native_quality(QualityTier::Low), "1");
        assert_eq!(native_quality(QualityTier::High), "3");
        assert_eq!(native_quality(QualityTier::Lossless), "9");
    }
}
