use media_types::{QualityTier, Service};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported service host `{0}`")]
    UnsupportedService(String),

    #[error("authentication failed for {service}: {reason}")]
    Authentication { service: Service, reason: String },

    #[error("quality {requested} not available; available tiers: {available:?}")]
    QualityUnavailable {
        requested: QualityTier,
        available: Vec<QualityTier>,
    },

    #[error("metadata error: {reason}")]
    Metadata { reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with HTTP {status} during {operation}")]
    HttpStatus {
        status: StatusCode,
        operation: &'static str,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdapterError {
    pub fn metadata(reason: impl Into<String>) -> Self {
        Self::Metadata {
            reason: reason.into(),
        }
    }

    pub fn authentication(service: Service, reason: impl Into<String>) -> Self {
        Self::Authentication {
            service,
            reason: reason.into(),
        }
    }

    /// Whether a retry at the worker level could plausibly succeed.
    ///
    /// Auth, quality and mapping failures are deterministic; transport
    /// errors and server-side 5xx/429 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request() || e.is_body(),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidUrl(_)
            | Self::UnsupportedService(_)
            | Self::Authentication { .. }
            | Self::QualityUnavailable { .. }
            | Self::Metadata { .. }
            | Self::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_unavailable_names_tiers() {
        let err = AdapterError::QualityUnavailable {
            requested: QualityTier::HiRes,
            available: vec![QualityTier::Low, QualityTier::High],
        };
        let msg = err.to_string();
        assert!(msg.contains("hi_res"));
        assert!(msg.contains("Low"));
        assert!(msg.contains("High"));
    }

    #[test]
    fn test_deterministic_errors_not_transient() {
        assert!(!AdapterError::InvalidUrl("x".into()).is_transient());
        assert!(
            !AdapterError::authentication(Service::Tidal, "expired").is_transient()
        );
        let status = AdapterError::HttpStatus {
            status: StatusCode::BAD_GATEWAY,
            operation: "track metadata",
        };
        assert!(status.is_transient());
        let forbidden = AdapterError::HttpStatus {
            status: StatusCode::FORBIDDEN,
            operation: "track metadata",
        };
        assert!(!forbidden.is_transient());
    }
}
