use std::time::Duration;

use audio_tagger::TagError;
use reqwest::StatusCode;
use service_adapters::AdapterError;

use crate::job::{JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("rate limited; retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },

    #[error("download failed: {reason}")]
    Download { reason: String },

    #[error("no job with id {id}")]
    JobNotFound { id: JobId },

    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

impl DownloadError {
    pub fn download(reason: impl Into<String>) -> Self {
        Self::Download {
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>, operation: &'static str) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    /// Whether the worker's retry loop should try again.
    ///
    /// Transient: transport failures, 5xx/429 and truncated transfers.
    /// Everything deterministic (4xx, auth, quality, tagging, cancellation)
    /// fails the job immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::RateLimited { .. }
            | Self::Tag(_)
            | Self::Download { .. }
            | Self::JobNotFound { .. }
            | Self::IllegalTransition { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Adapter(e) => e.is_transient(),
            Self::Network { .. } | Self::Io { .. } | Self::Incomplete { .. } => true,
        }
    }

    /// Stable error kind for the reporting collaborator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::RateLimited { .. } => "rate_limited",
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Incomplete { .. } => {
                "network_failure"
            }
            Self::Adapter(AdapterError::InvalidUrl(_)) => "invalid_url",
            Self::Adapter(AdapterError::UnsupportedService(_)) => "unsupported_service",
            Self::Adapter(AdapterError::Authentication { .. }) => "authentication_failure",
            Self::Adapter(AdapterError::QualityUnavailable { .. }) => "quality_unavailable",
            Self::Adapter(_) => "metadata_failure",
            Self::Tag(TagError::Conversion { .. }) => "conversion_failure",
            Self::Tag(_) => "metadata_failure",
            Self::Io { .. } | Self::Download { .. } => "download_failure",
            Self::JobNotFound { .. } | Self::IllegalTransition { .. } => "invalid_request",
        }
    }

    /// The single human-readable line surfaced to the end user. Full
    /// error detail only ever goes to the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => "Download cancelled.".to_string(),
            Self::RateLimited { retry_after } => format!(
                "You're sending requests too quickly. Try again in {} seconds.",
                retry_after.as_secs().max(1)
            ),
            Self::Adapter(AdapterError::InvalidUrl(_)) => {
                "That link doesn't look like a valid track, album or playlist URL.".to_string()
            }
            Self::Adapter(AdapterError::UnsupportedService(_)) => {
                "That streaming service isn't supported.".to_string()
            }
            Self::Adapter(AdapterError::Authentication { service, .. }) => {
                format!("Sign-in with {service} is required or has expired.")
            }
            Self::Adapter(AdapterError::QualityUnavailable { requested, .. }) => {
                format!("The requested quality ({requested}) isn't available for this item.")
            }
            Self::Adapter(_) => "The service returned something unexpected.".to_string(),
            Self::Tag(_) => "The file downloaded but tagging it failed.".to_string(),
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Io { .. }
            | Self::Incomplete { .. } => {
                "The download failed after several attempts. Please try again later.".to_string()
            }
            Self::Download { reason } => format!("Download failed: {reason}."),
            Self::JobNotFound { .. } => "That download no longer exists.".to_string(),
            Self::IllegalTransition { .. } => "That download already finished.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::QualityTier;

    #[test]
    fn test_retry_classification() {
        assert!(!DownloadError::Cancelled.is_retryable());
        assert!(
            DownloadError::http_status(StatusCode::BAD_GATEWAY, "http://x", "file download")
                .is_retryable()
        );
        assert!(
            !DownloadError::http_status(StatusCode::FORBIDDEN, "http://x", "file download")
                .is_retryable()
        );
        assert!(
            DownloadError::Incomplete {
                expected: 10,
                received: 5
            }
            .is_retryable()
        );
        let quality = DownloadError::Adapter(AdapterError::QualityUnavailable {
            requested: QualityTier::HiRes,
            available: vec![],
        });
        assert!(!quality.is_retryable());
    }

    #[test]
    fn test_user_message_is_short_and_plain() {
        let err = DownloadError::RateLimited {
            retry_after: Duration::from_secs(12),
        };
        let msg = err.user_message();
        assert!(msg.contains("12 seconds"));
        // No debug formatting should leak into user-facing text.
        assert!(!msg.contains("retry_after"));
    }
}
