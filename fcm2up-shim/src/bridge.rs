//! Relay registration jobs
//!
//! The job is snapshotted from the registration record on the thread that
//! saw the trigger, then sent to the worker, which performs the request.

use relay_client::{RegisterRequest, RelayClient};
use state_store::StateStore;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::state::{AppMetadata, DeliveryAddress, RelayUrl, VendorCredentials};

/// A relay registration ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayJob {
    pub relay_url: String,
    pub request: RegisterRequest,
}

/// Snapshot a relay registration, if both a delivery address and a relay
/// are known
pub fn prepare_registration(store: &StateStore, app_id: &str) -> Option<RelayJob> {
    let Some(DeliveryAddress(address)) = store.get::<DeliveryAddress>().filter(|a| !a.0.is_empty())
    else {
        tracing::debug!("No delivery address yet; skipping relay registration");
        return None;
    };

    let Some(RelayUrl(relay_url)) = store.get::<RelayUrl>().filter(|u| !u.0.is_empty()) else {
        tracing::debug!("No relay configured; skipping relay registration");
        return None;
    };

    let credentials = store.get::<VendorCredentials>().unwrap_or_default();
    let metadata = store.get::<AppMetadata>().unwrap_or_default();

    let request = RegisterRequest::new(address, app_id)
        .with_firebase(credentials.app_id, credentials.project_id, credentials.api_key)
        .with_cert_sha1(metadata.cert_sha1)
        .with_app_version(metadata.app_version, metadata.app_version_name)
        .with_target_sdk(metadata.target_sdk);

    Some(RelayJob { relay_url, request })
}

/// Relay HTTP access shared by every job on one worker
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
}

impl BridgeClient {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let http = config.relay_client_config().build_http_client()?;
        Ok(Self { http })
    }

    /// Send a registration, returning the relay-issued token if any
    pub async fn register(&self, job: &RelayJob) -> relay_client::Result<Option<String>> {
        let client = RelayClient::with_http_client(&job.relay_url, self.http.clone())?;
        let response = client.register(&job.request).await?;

        if let Some(message) = response.message.as_deref() {
            tracing::debug!("Relay answered: {}", message);
        }
        Ok(response.relay_token().map(str::to_string))
    }

    /// Tell the relay this app no longer wants delivery
    pub async fn unregister(&self, relay_url: &str, app_id: &str) -> relay_client::Result<()> {
        RelayClient::with_http_client(relay_url, self.http.clone())?
            .unregister(app_id)
            .await
    }
}
