use std::time::Duration;

use media_types::Service;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AdapterError;

/// Server response to a device-authorization request. The user visits
/// `verification_uri_complete` while we poll the token endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    #[serde(rename = "verificationUriComplete", alias = "verification_uri_complete")]
    pub verification_uri_complete: Option<String>,
    #[serde(rename = "verificationUri", alias = "verification_uri")]
    pub verification_uri: Option<String>,
    /// Poll cadence dictated by the server, in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Hard expiry dictated by the server, in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_interval() -> u64 {
    5
}

fn default_expires_in() -> u64 {
    300
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

/// A running device-code poll. Cancellable; the task resolves to the access
/// token once the user approves, or to `Authentication` on cancel/expiry.
pub struct DeviceAuthHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<String, AdapterError>>,
}

impl DeviceAuthHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<Result<String, AdapterError>>) -> Self {
        Self { cancel, task }
    }

    /// Stop the poll promptly; the task resolves to an `Authentication`
    /// error rather than waiting for natural expiry.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<String, AdapterError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(AdapterError::authentication(
                Service::Tidal,
                format!("device poll task failed: {e}"),
            )),
        }
    }
}

pub(crate) async fn request_device_code(
    client: &Client,
    auth_base: &str,
    client_id: &str,
) -> Result<DeviceAuthorization, AdapterError> {
    let response = client
        .post(format!("{auth_base}device_authorization"))
        .form(&[("client_id", client_id), ("scope", "r_usr w_usr w_sub")])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::HttpStatus {
            status,
            operation: "device authorization",
        });
    }
    Ok(response.json().await?)
}

/// Spawn the token poll as a cancellable background task.
///
/// Each round waits the server-provided interval under `tokio::select!`
/// against cancellation, then tries the token grant. HTTP 400 means the
/// user has not approved yet; transport errors are logged and retried on
/// the next round. The server's `expires_in` is a hard deadline.
pub(crate) fn spawn_token_poll(
    client: Client,
    auth_base: String,
    client_id: String,
    authorization: DeviceAuthorization,
) -> DeviceAuthHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
        let interval = Duration::from_secs(authorization.interval.max(1));

        loop {
            if Instant::now() >= deadline {
                return Err(AdapterError::authentication(
                    Service::Tidal,
                    "device authorization expired before approval",
                ));
            }

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Device authorization poll cancelled");
                    return Err(AdapterError::authentication(
                        Service::Tidal,
                        "device authorization cancelled",
                    ));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(AdapterError::authentication(
                        Service::Tidal,
                        "device authorization expired before approval",
                    ));
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let response = client
                .post(format!("{auth_base}token"))
                .form(&[
                    ("client_id", client_id.as_str()),
                    ("device_code", authorization.device_code.as_str()),
                    (
                        "grant_type",
                        "urn:ietf:params:oauth:grant-type:device_code",
                    ),
                ])
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let token: TokenResponse = response.json().await?;
                    return Ok(token.access_token);
                }
                // 400 = authorization_pending; keep polling.
                Ok(response) if response.status() == reqwest::StatusCode::BAD_REQUEST => {
                    debug!("Device authorization pending");
                }
                Ok(response) => {
                    return Err(AdapterError::authentication(
                        Service::Tidal,
                        format!("token endpoint returned {}", response.status()),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Device token poll request failed; retrying");
                }
            }
        }
    });

    DeviceAuthHandle::new(cancel, task)
}
