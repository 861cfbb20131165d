//! Tag writing via lofty.
//!
//! The tag block type follows the delivered container: ID3v2 for MP3,
//! Vorbis comments for FLAC, ilst atoms for M4A. Fields written: title,
//! artist credit, album, track number, date and ISRC, plus the front
//! cover when one is available.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use media_types::{AudioFormat, TrackMetadata};
use tracing::debug;

use crate::error::TagError;

/// The native tag block for a container.
pub fn tag_type_for(format: AudioFormat) -> TagType {
    match format {
        AudioFormat::Mp3 => TagType::Id3v2,
        AudioFormat::Flac => TagType::VorbisComments,
        AudioFormat::M4a => TagType::Mp4Ilst,
    }
}

/// Write tags (and optionally a front cover) to a downloaded file.
///
/// The path may carry a temporary extension; the container is probed from
/// content, not the filename.
pub fn write_tags(
    path: &Path,
    track: &TrackMetadata,
    format: AudioFormat,
    cover: Option<&[u8]>,
) -> Result<(), TagError> {
    let file = std::fs::File::open(path)?;
    let mut tagged_file = Probe::new(std::io::BufReader::new(file))
        .guess_file_type()?
        .read()
        .map_err(|e| TagError::conversion(format!("unreadable {format} container: {e}")))?;

    let tag_type = tag_type_for(format);
    let tag = match tagged_file.tag_mut(tag_type) {
        Some(tag) => tag,
        None => {
            tagged_file.insert_tag(Tag::new(tag_type));
            tagged_file
                .tag_mut(tag_type)
                .ok_or_else(|| TagError::metadata("failed to create tag block"))?
        }
    };

    tag.set_title(track.title.clone());
    tag.set_artist(track.artist_credit());
    tag.set_album(track.album.clone());
    if let Some(number) = track.track_number {
        tag.set_track(number);
    }
    if let Some(total) = track.total_tracks {
        tag.set_track_total(total);
    }
    if let Some(year) = track.release_year {
        tag.set_year(year as u32);
    }
    if let Some(isrc) = &track.isrc {
        tag.insert_text(ItemKey::Isrc, isrc.clone());
    }

    if let Some(data) = cover {
        let picture = Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            data.to_vec(),
        );
        tag.push_picture(picture);
    }

    debug!(path = %path.display(), tag_type = ?tag_type, "Writing tags");
    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::metadata(e.to_string()))
}
