use std::sync::LazyLock;
use std::time::Duration;

use media_types::{MediaReference, MediaType, Service};
use regex::Regex;
use reqwest::{Client, Url, redirect};
use tracing::{debug, warn};

use crate::error::AdapterError;

static TIDAL_TRACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/track/(\d+)").unwrap());
static TIDAL_ALBUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/album/(\d+)").unwrap());
static TIDAL_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/playlist/([A-Za-z0-9-]+)").unwrap());
static TIDAL_ARTIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/artist/(\d+)").unwrap());

static QOBUZ_TRACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/track/(\d+)").unwrap());
static QOBUZ_ALBUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/album/([A-Za-z0-9]+)").unwrap());
static QOBUZ_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/playlist/(\d+)").unwrap());
static QOBUZ_ARTIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/artist/(\d+)").unwrap());

static DEEZER_TRACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/track/(\d+)").unwrap());
static DEEZER_ALBUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/album/(\d+)").unwrap());
static DEEZER_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/playlist/(\d+)").unwrap());
static DEEZER_ARTIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/artist/(\d+)").unwrap());

struct ServicePatterns {
    service: Service,
    domains: &'static [&'static str],
    /// Path patterns in fixed priority order; the first capture wins, so a
    /// track fragment can never be mistaken for a playlist.
    patterns: &'static [(MediaType, &'static LazyLock<Regex>)],
}

static SERVICES: &[ServicePatterns] = &[
    ServicePatterns {
        service: Service::Tidal,
        domains: &["tidal.com", "listen.tidal.com"],
        patterns: &[
            (MediaType::Track, &TIDAL_TRACK),
            (MediaType::Album, &TIDAL_ALBUM),
            (MediaType::Playlist, &TIDAL_PLAYLIST),
            (MediaType::Artist, &TIDAL_ARTIST),
        ],
    },
    ServicePatterns {
        service: Service::Qobuz,
        domains: &["qobuz.com", "play.qobuz.com", "open.qobuz.com"],
        patterns: &[
            (MediaType::Track, &QOBUZ_TRACK),
            (MediaType::Album, &QOBUZ_ALBUM),
            (MediaType::Playlist, &QOBUZ_PLAYLIST),
            (MediaType::Artist, &QOBUZ_ARTIST),
        ],
    },
    ServicePatterns {
        service: Service::Deezer,
        domains: &["deezer.com", "deezer.page.link"],
        patterns: &[
            (MediaType::Track, &DEEZER_TRACK),
            (MediaType::Album, &DEEZER_ALBUM),
            (MediaType::Playlist, &DEEZER_PLAYLIST),
            (MediaType::Artist, &DEEZER_ARTIST),
        ],
    },
];

/// Hosts that only ever serve redirects to the real catalogue URL.
static SHORT_LINK_HOSTS: &[&str] = &["deezer.page.link", "t.co", "qbz.fm"];

const SHORT_LINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Classifies a raw URL into a [`MediaReference`].
///
/// Short-link hosts get exactly one redirect-resolution hop; everything
/// else is matched locally against the per-service domain lists and path
/// patterns.
pub struct UrlResolver {
    /// Redirects disabled so the single hop stays a single hop.
    hop_client: Client,
}

impl UrlResolver {
    pub fn new() -> Self {
        let hop_client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(SHORT_LINK_TIMEOUT)
            .timeout(SHORT_LINK_TIMEOUT)
            .build()
            .expect("Failed to create short-link client");
        Self { hop_client }
    }

    pub async fn resolve(&self, raw: &str) -> Result<MediaReference, AdapterError> {
        let mut url = normalize(raw)?;

        if is_short_link(&url) {
            // Soft-fail: an unresolvable short link falls through to normal
            // matching with the original URL.
            match self.expand_short_link(&url).await {
                Some(expanded) => {
                    debug!(from = %url, to = %expanded, "Expanded short link");
                    url = expanded;
                }
                None => warn!(url = %url, "Short link expansion failed; using original"),
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| AdapterError::InvalidUrl(raw.to_string()))?;
        let entry = match_service(host)
            .ok_or_else(|| AdapterError::UnsupportedService(host.to_string()))?;

        let path = url.path();
        for (media_type, pattern) in entry.patterns {
            if let Some(caps) = pattern.captures(path)
                && let Some(id) = caps.get(1)
            {
                return Ok(MediaReference::new(entry.service, *media_type, id.as_str()));
            }
        }

        Err(AdapterError::InvalidUrl(format!(
            "no media reference in path `{path}`"
        )))
    }

    /// One HEAD request against the short-link host; `None` on any failure.
    async fn expand_short_link(&self, url: &Url) -> Option<Url> {
        let response = self.hop_client.head(url.clone()).send().await.ok()?;
        if !response.status().is_redirection() {
            return None;
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)?
            .to_str()
            .ok()?;
        // Location may be relative per RFC 7231.
        url.join(location).ok()
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(raw: &str) -> Result<Url, AdapterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::InvalidUrl(raw.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url =
        Url::parse(&with_scheme).map_err(|_| AdapterError::InvalidUrl(trimmed.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AdapterError::InvalidUrl(trimmed.to_string()));
    }

    Ok(url)
}

fn is_short_link(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| SHORT_LINK_HOSTS.contains(&host.trim_start_matches("www.")))
}

/// Suffix-match the host against each service's registered domains.
fn match_service(host: &str) -> Option<&'static ServicePatterns> {
    let host = host.to_ascii_lowercase();
    SERVICES.iter().find(|entry| {
        entry.domains.iter().any(|domain| {
            host == *domain || host.ends_with(&format!(".{domain}"))
        })
    })
}
