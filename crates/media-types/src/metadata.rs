use serde::{Deserialize, Serialize};

use crate::quality::QualityTier;

/// Canonical track metadata produced by a service adapter.
///
/// Each adapter owns the mapping from its service's JSON field layout into
/// this shape; downstream code (queue, tagger, delivery) treats it as
/// read-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_secs: u32,
    pub release_year: Option<i32>,
    pub explicit: bool,
    pub cover_url: Option<String>,
    pub isrc: Option<String>,
    /// Best tier the service reports for this item.
    pub quality: QualityTier,
    /// Every tier the service reports as streamable for this item.
    pub available: Vec<QualityTier>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
}

impl TrackMetadata {
    pub fn builder(
        id: impl Into<String>,
        title: impl Into<String>,
        album: impl Into<String>,
    ) -> TrackMetadataBuilder {
        TrackMetadataBuilder::new(id, title, album)
    }

    /// Joined artist credit, the form that ends up in tags and filenames.
    pub fn artist_credit(&self) -> String {
        self.artists.join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct TrackMetadataBuilder {
    id: String,
    title: String,
    album: String,
    artists: Vec<String>,
    duration_secs: u32,
    release_year: Option<i32>,
    explicit: bool,
    cover_url: Option<String>,
    isrc: Option<String>,
    quality: QualityTier,
    available: Vec<QualityTier>,
    track_number: Option<u32>,
    total_tracks: Option<u32>,
}

impl TrackMetadataBuilder {
    pub fn new(id: impl Into<String>, title: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            album: album.into(),
            artists: Vec::new(),
            duration_secs: 0,
            release_year: None,
            explicit: false,
            cover_url: None,
            isrc: None,
            quality: QualityTier::High,
            available: vec![QualityTier::Low, QualityTier::High],
            track_number: None,
            total_tracks: None,
        }
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }

    pub fn artists(mut self, artists: Vec<String>) -> Self {
        self.artists = artists;
        self
    }

    pub fn duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn release_year_opt(mut self, year: Option<i32>) -> Self {
        self.release_year = year;
        self
    }

    pub fn explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn cover_url_opt(mut self, cover_url: Option<String>) -> Self {
        self.cover_url = cover_url;
        self
    }

    pub fn isrc_opt(mut self, isrc: Option<String>) -> Self {
        self.isrc = isrc;
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn available(mut self, available: Vec<QualityTier>) -> Self {
        self.available = available;
        self
    }

    pub fn track_number_opt(mut self, n: Option<u32>) -> Self {
        self.track_number = n;
        self
    }

    pub fn total_tracks_opt(mut self, n: Option<u32>) -> Self {
        self.total_tracks = n;
        self
    }

    pub fn build(self) -> TrackMetadata {
        TrackMetadata {
            id: self.id,
            title: self.title,
            artists: self.artists,
            album: self.album,
            duration_secs: self.duration_secs,
            release_year: self.release_year,
            explicit: self.explicit,
            cover_url: self.cover_url,
            isrc: self.isrc,
            quality: self.quality,
            available: self.available,
            track_number: self.track_number,
            total_tracks: self.total_tracks,
        }
    }
}

/// Album-shaped metadata; playlists reuse this with the creator's name in
/// `artist` and no release-year guarantee.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlbumMetadata {
    pub id: String,
    pub title: String,
    /// Album artist, or the playlist creator.
    pub artist: String,
    /// Track ids in album/playlist order.
    pub track_ids: Vec<String>,
    pub release_year: Option<i32>,
    pub cover_url: Option<String>,
    pub total_tracks: u32,
}

/// What `resolve_metadata` hands back: either a single track or an
/// album/playlist collection.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaMetadata {
    Track(TrackMetadata),
    Collection(AlbumMetadata),
}

impl MediaMetadata {
    pub fn title(&self) -> &str {
        match self {
            MediaMetadata::Track(t) => &t.title,
            MediaMetadata::Collection(c) => &c.title,
        }
    }
}

/// Extract a year from service date strings like `2021-05-07`.
pub fn year_from_date(date: &str) -> Option<i32> {
    let head = date.split('-').next()?;
    if head.len() == 4 {
        head.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let t = TrackMetadata::builder("1", "Song", "Album")
            .artist("Someone")
            .build();
        assert_eq!(t.artist_credit(), "Someone");
        assert!(!t.explicit);
        assert_eq!(t.quality, QualityTier::High);
    }

    #[test]
    fn test_artist_credit_joins() {
        let t = TrackMetadata::builder("1", "Song", "Album")
            .artists(vec!["A".into(), "B".into()])
            .build();
        assert_eq!(t.artist_credit(), "A, B");
    }

    #[test]
    fn test_year_from_date() {
        assert_eq!(year_from_date("2021-05-07"), Some(2021));
        assert_eq!(year_from_date("2021"), Some(2021));
        assert_eq!(year_from_date("07/05/21"), None);
        assert_eq!(year_from_date(""), None);
    }
}
