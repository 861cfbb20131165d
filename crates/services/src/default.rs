use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Shared HTTP client used by the resolver and every adapter.
///
/// No overall timeout: metadata calls set their own deadlines and file
/// transfers are long-lived streams bounded by the read timeout.
pub fn default_client() -> Client {
    Client::builder()
        .user_agent(DEFAULT_UA)
        .connect_timeout(Duration::from_secs(30))
        .read_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}
