//! Output path construction for finished downloads.

use std::path::{Path, PathBuf};

use media_types::{AudioFormat, TrackMetadata};

/// Strip characters that are unsafe in filenames, keeping letters, digits,
/// spaces, dots, dashes and underscores.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{dir}/{artist} - {title}.{ext}`
pub fn output_path(dir: &Path, track: &TrackMetadata, format: AudioFormat) -> PathBuf {
    let stem = sanitize_component(&format!("{} - {}", track.artist_credit(), track.title));
    dir.join(format!("{stem}.{}", format.extension()))
}

/// The private temporary path a worker streams into before finalization.
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut os_string = final_path.as_os_str().to_os_string();
    os_string.push(".part");
    PathBuf::from(os_string)
}
