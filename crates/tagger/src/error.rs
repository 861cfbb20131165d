use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    /// The file could not be parsed as the expected container.
    #[error("container error: {reason}")]
    Conversion { reason: String },

    #[error("metadata write failed: {reason}")]
    Metadata { reason: String },

    #[error("cover fetch failed: {0}")]
    CoverFetch(#[from] reqwest::Error),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl TagError {
    pub fn conversion(reason: impl Into<String>) -> Self {
        Self::Conversion {
            reason: reason.into(),
        }
    }

    pub fn metadata(reason: impl Into<String>) -> Self {
        Self::Metadata {
            reason: reason.into(),
        }
    }
}
