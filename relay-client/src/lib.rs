//! HTTP client for the fcm2up relay
//!
//! The relay holds a vendor push connection on behalf of an app and
//! forwards every message it receives to the app's UnifiedPush delivery
//! address. This crate speaks the relay's small JSON API:
//!
//! - `POST /register` associates a delivery address with an app and returns
//!   the token the relay obtained from the vendor
//! - `POST /unregister` stops delivery for an app
//! - `GET /health` reports relay status
//!
//! All calls are async and bounded by fixed connect and request timeouts.
//! Nothing here retries; callers decide when to try again.

mod error;
mod types;

pub use error::{RelayError, Result};
pub use types::{HealthResponse, RegisterRequest, RegisterResponse};

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use crate::types::UnregisterRequest;

/// Timeouts and identification for relay requests
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Time allowed to establish the connection
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Time allowed for the whole request, including reading the body
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("fcm2up-shim/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RelayClientConfig {
    /// Build an HTTP client honoring these timeouts
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(RelayError::Transport)
    }
}

/// Client for a single relay instance
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`
    pub fn new(base_url: &str, config: &RelayClientConfig) -> Result<Self> {
        let http = config.build_http_client()?;
        Self::with_http_client(base_url, http)
    }

    /// Create a client sharing an existing HTTP client
    ///
    /// Use this when several relay calls are made from one worker so
    /// connections are pooled.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            http,
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of a relay endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Register a delivery address with the relay
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Transport` if the request could not be completed,
    /// `RelayError::UnexpectedStatus` for any status other than 200 and
    /// `RelayError::MalformedResponse` if the 200 body is not valid JSON.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let url = self.endpoint("register");
        tracing::debug!("POST {} for app {}", url, request.app_id);

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(RelayError::unexpected_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| RelayError::MalformedResponse(e.to_string()))
    }

    /// Tell the relay to stop delivering for `app_id`
    ///
    /// Any 2xx answer counts as success; the body is ignored.
    pub async fn unregister(&self, app_id: &str) -> Result<()> {
        let url = self.endpoint("unregister");
        tracing::debug!("POST {} for app {}", url, app_id);

        let response = self
            .http
            .post(&url)
            .json(&UnregisterRequest { app_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::unexpected_status(status.as_u16(), &body));
        }

        Ok(())
    }

    /// Fetch the relay's health report
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint("health");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RelayError::unexpected_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| RelayError::MalformedResponse(e.to_string()))
    }
}

/// Check that `raw` is an absolute http(s) URL and strip trailing slashes
pub fn validate_base_url(raw: &str) -> Result<String> {
    let invalid = |reason: String| RelayError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let parsed = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(raw.trim().trim_end_matches('/').to_string())
}
