use std::sync::Arc;

use async_trait::async_trait;
use media_types::{AudioFormat, MediaMetadata, MediaReference, QualityTier, Service};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AdapterError;
use crate::services::deezer::Deezer;
use crate::services::qobuz::Qobuz;
use crate::services::tidal::Tidal;

/// Base adapter shared by every service implementation.
///
/// Owns the HTTP client, the service-specific default headers and a cookie
/// store. Each adapter instance keeps its own session state; there is no
/// process-wide shared session.
#[derive(Debug, Clone)]
pub struct Adapter {
    pub service: Service,
    pub client: Client,
    headers: HeaderMap,
    cookies: FxHashMap<String, String>,
}

impl Adapter {
    pub fn new(service: Service, client: Client) -> Self {
        Self {
            service,
            client,
            headers: HeaderMap::new(),
            cookies: FxHashMap::default(),
        }
    }

    pub fn add_header_typed<K: Into<HeaderName>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(key.into(), value);
            }
            Err(e) => {
                debug!(error = %e, "Invalid header value; skipping");
            }
        }
    }

    pub fn add_cookie<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    fn build_cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut cookie_string = String::new();
        for (name, value) in &self.cookies {
            if !cookie_string.is_empty() {
                cookie_string.push_str("; ");
            }
            cookie_string.push_str(name);
            cookie_string.push('=');
            cookie_string.push_str(value);
        }
        Some(cookie_string)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create a request with the adapter's headers and cookies applied.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut headers = self.headers.clone();

        if let Some(cookie_header) = self.build_cookie_header() {
            match HeaderValue::from_str(&cookie_header) {
                Ok(value) => {
                    headers.insert(reqwest::header::COOKIE, value);
                }
                Err(e) => {
                    debug!(error = %e, "Failed to build Cookie header");
                }
            }
        }

        self.client.request(method, url).headers(headers)
    }

    /// Send a prepared request, enforce a success status and decode JSON.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, AdapterError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::HttpStatus { status, operation });
        }
        Ok(response.json().await?)
    }
}

/// The download URL an adapter resolved, together with the tier it actually
/// landed on after fallback and the container that tier is delivered in.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub url: String,
    pub quality: QualityTier,
    pub format: AudioFormat,
}

/// Capability set implemented once per streaming service.
///
/// Adapters are selected by the `service` field of a [`MediaReference`]
/// exactly once, at registry lookup; nothing downstream branches on the
/// service again.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn adapter(&self) -> &Adapter;

    fn service(&self) -> Service {
        self.adapter().service
    }

    /// Ensure a usable session exists, refreshing tokens where the service
    /// requires it. Interactive credential collection happens outside the
    /// core; this fails rather than prompting.
    async fn authenticate(&self) -> Result<(), AdapterError>;

    /// Fetch and map service metadata for a track, album, playlist or
    /// artist reference into the canonical model.
    async fn resolve_metadata(
        &self,
        reference: &MediaReference,
    ) -> Result<MediaMetadata, AdapterError>;

    /// Ordered child track ids of an album or playlist reference.
    async fn list_children(&self, reference: &MediaReference) -> Result<Vec<String>, AdapterError>;

    /// Resolve a direct download URL, degrading through lower tiers when
    /// the requested one is unavailable for this item.
    async fn resolve_download_url(
        &self,
        media_id: &str,
        quality: QualityTier,
    ) -> Result<ResolvedDownload, AdapterError>;
}

/// Walk the fallback chain until a tier the item actually offers is found.
///
/// Fails with `QualityUnavailable` naming the requested tier and the item's
/// available set only when the whole chain is exhausted.
pub(crate) fn select_tier(
    requested: QualityTier,
    available: &[QualityTier],
) -> Result<QualityTier, AdapterError> {
    let mut candidate = Some(requested);
    while let Some(tier) = candidate {
        if available.contains(&tier) {
            return Ok(tier);
        }
        candidate = tier.next_lower();
    }
    Err(AdapterError::QualityUnavailable {
        requested,
        available: available.to_vec(),
    })
}

/// Maps each [`Service`] to its adapter. Built once at startup from the
/// credentials the configuration collaborator supplies.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: FxHashMap<Service, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with every adapter the supplied credentials cover.
    pub fn with_credentials(client: Client, credentials: ServiceCredentials) -> Self {
        let mut registry = Self::new();
        if let Some(tidal) = credentials.tidal {
            registry.insert(Arc::new(Tidal::new(client.clone(), tidal)));
        }
        if let Some(qobuz) = credentials.qobuz {
            registry.insert(Arc::new(Qobuz::new(client.clone(), qobuz)));
        }
        if let Some(deezer) = credentials.deezer {
            registry.insert(Arc::new(Deezer::new(client.clone(), deezer)));
        }
        registry
    }

    pub fn insert(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        self.adapters.insert(adapter.service(), adapter);
    }

    pub fn get(&self, service: Service) -> Result<Arc<dyn ServiceAdapter>, AdapterError> {
        self.adapters.get(&service).cloned().ok_or_else(|| {
            AdapterError::authentication(service, "no credentials configured for this service")
        })
    }
}

/// Credentials handed in by the auth-flow collaborator.
#[derive(Debug, Clone, Default)]
pub struct ServiceCredentials {
    pub tidal: Option<crate::services::tidal::TidalCredentials>,
    pub qobuz: Option<crate::services::qobuz::QobuzCredentials>,
    pub deezer: Option<crate::services::deezer::DeezerCredentials>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_tier_direct_hit() {
        let available = [QualityTier::Low, QualityTier::High, QualityTier::Lossless];
        assert_eq!(
            select_tier(QualityTier::Lossless, &available).unwrap(),
            QualityTier::Lossless
        );
    }

    #[test]
    fn test_select_tier_falls_back() {
        let available = [QualityTier::Low, QualityTier::High];
        assert_eq!(
            select_tier(QualityTier::HiRes, &available).unwrap(),
            QualityTier::High
        );
    }

    #[test]
    fn test_select_tier_exhausted_names_request() {
        let err = select_tier(QualityTier::HiRes, &[]).unwrap_err();
        match err {
            AdapterError::QualityUnavailable {
                requested,
                available,
            } => {
                assert_eq!(requested, QualityTier::HiRes);
                assert!(available.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cookie_header_round_trip() {
        let mut adapter = Adapter::new(Service::Deezer, Client::new());
        adapter.add_cookie("arl", "abc123");
        assert_eq!(adapter.build_cookie_header().as_deref(), Some("arl=abc123"));
    }
}
