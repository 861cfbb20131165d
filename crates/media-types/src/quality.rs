use serde::{Deserialize, Serialize};

/// Abstract quality ranking, mapped by each adapter to its native code.
///
/// The variant order is the ranking: `Low < High < Lossless < HiRes`, with
/// the spatial formats above the stereo ladder. Adapters walk
/// [`QualityTier::next_lower`] when the native code for the requested tier is
/// unavailable for a specific item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    High,
    Lossless,
    HiRes,
    DolbyAtmos,
    Sony360,
}

impl QualityTier {
    /// The next tier to try when this one is unavailable.
    ///
    /// Spatial tiers degrade into the stereo ladder at `HiRes`; `Low` has
    /// nowhere left to go.
    pub fn next_lower(&self) -> Option<QualityTier> {
        match self {
            QualityTier::Sony360 | QualityTier::DolbyAtmos => Some(QualityTier::HiRes),
            QualityTier::HiRes => Some(QualityTier::Lossless),
            QualityTier::Lossless => Some(QualityTier::High),
            QualityTier::High => Some(QualityTier::Low),
            QualityTier::Low => None,
        }
    }

    /// Spatial formats require service capabilities beyond the normal
    /// streaming session (e.g. Tidal's mobile session).
    #[inline]
    pub fn is_spatial(&self) -> bool {
        matches!(self, QualityTier::DolbyAtmos | QualityTier::Sony360)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::High => "high",
            QualityTier::Lossless => "lossless",
            QualityTier::HiRes => "hi_res",
            QualityTier::DolbyAtmos => "dolby_atmos",
            QualityTier::Sony360 => "sony_360",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container format of the delivered file, which also decides the tagging
/// strategy (ID3 for MP3, Vorbis comments for FLAC, ilst atoms for M4A).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Flac,
    M4a,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
        }
    }

    #[inline]
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
