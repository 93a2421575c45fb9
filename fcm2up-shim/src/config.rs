//! Configuration for the shim engine

use std::time::Duration;

use relay_client::RelayClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShimError};
use crate::state::{AppMetadata, HandlerTarget, VendorCredentials, DEFAULT_DISTRIBUTOR};

/// Title used for fallback notifications without one
pub const DEFAULT_FALLBACK_TITLE: &str = "New message";

/// Configuration written by the packaging step for one app
///
/// Values here are persisted into the registration record by
/// [`Fcm2UpShim::configure`](crate::Fcm2UpShim::configure) and read from
/// there afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Package identifier of the app
    pub app_id: String,

    /// Base URL of the relay
    /// Default: None (relay registration disabled)
    pub relay_url: Option<String>,

    /// Package identifier of the UnifiedPush distributor
    /// Default: "io.heckel.ntfy"
    pub distributor_id: String,

    pub credentials: VendorCredentials,

    pub metadata: AppMetadata,

    /// App callable receiving decoded messages
    pub handler: Option<HandlerTarget>,

    /// App component started with raw messages
    pub message_service_class: Option<String>,

    /// Title for fallback notifications whose payload carries none
    /// Default: "New message"
    pub fallback_title: String,

    pub worker: WorkerConfig,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            relay_url: None,
            distributor_id: DEFAULT_DISTRIBUTOR.to_string(),
            credentials: VendorCredentials::default(),
            metadata: AppMetadata::default(),
            handler: None,
            message_service_class: None,
            fallback_title: DEFAULT_FALLBACK_TITLE.to_string(),
            worker: WorkerConfig::default(),
        }
    }
}

impl ShimConfig {
    /// Create a configuration for `app_id` with default values
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Parse the JSON config asset written by the packaging step
    ///
    /// Empty strings are read as unset, matching what the packaging step
    /// writes for values it does not know.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ShimConfig = serde_json::from_str(json)
            .map_err(|e| ShimError::InvalidConfiguration(format!("config asset: {}", e)))?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Replace empty strings with unset values and defaults
    pub fn normalized(mut self) -> Self {
        self.relay_url = non_empty(self.relay_url);
        if self.distributor_id.trim().is_empty() {
            self.distributor_id = DEFAULT_DISTRIBUTOR.to_string();
        }
        self.credentials = VendorCredentials {
            app_id: non_empty(self.credentials.app_id),
            project_id: non_empty(self.credentials.project_id),
            api_key: non_empty(self.credentials.api_key),
        };
        self.metadata.cert_sha1 = non_empty(self.metadata.cert_sha1);
        self.metadata.app_version_name = non_empty(self.metadata.app_version_name);
        self.handler = self
            .handler
            .filter(|h| !h.class.trim().is_empty() && !h.method.trim().is_empty());
        self.message_service_class = non_empty(self.message_service_class);
        if self.fallback_title.trim().is_empty() {
            self.fallback_title = DEFAULT_FALLBACK_TITLE.to_string();
        }
        self
    }

    /// Validate the configuration and return the first issue
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(ShimError::InvalidConfiguration(
                "app_id must not be empty".to_string(),
            ));
        }

        if let Some(url) = &self.relay_url {
            relay_client::validate_base_url(url)
                .map_err(|e| ShimError::InvalidConfiguration(e.to_string()))?;
        }

        self.worker.validate()
    }

    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    pub fn with_distributor(mut self, distributor_id: impl Into<String>) -> Self {
        self.distributor_id = distributor_id.into();
        self
    }

    pub fn with_credentials(mut self, credentials: VendorCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_metadata(mut self, metadata: AppMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_handler(mut self, class: impl Into<String>, method: impl Into<String>) -> Self {
        self.handler = Some(HandlerTarget::new(class, method));
        self
    }

    pub fn with_message_service(mut self, class: impl Into<String>) -> Self {
        self.message_service_class = Some(class.into());
        self
    }

    pub fn with_fallback_title(mut self, title: impl Into<String>) -> Self {
        self.fallback_title = title.into();
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }
}

/// Settings for the background worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs that can wait before new ones are dropped
    /// Default: 64
    pub queue_capacity: usize,

    /// Relay connect timeout
    /// Default: 10 seconds
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Relay request timeout, body included
    /// Default: 10 seconds
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Longest time `flush()` waits for queued work
    /// Default: 5 seconds
    #[serde(with = "duration_secs")]
    pub flush_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    /// Create a WorkerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for hosts on slow or metered networks
    pub fn slow_network() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(35),
            ..Self::default()
        }
    }

    /// Preset keeping memory use low on constrained devices
    pub fn resource_efficient() -> Self {
        Self {
            queue_capacity: 8,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ShimError::InvalidConfiguration(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
            ("flush_timeout", self.flush_timeout),
        ] {
            if value.is_zero() {
                return Err(ShimError::InvalidConfiguration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// HTTP settings for the worker's relay client
    pub fn relay_client_config(&self) -> RelayClientConfig {
        RelayClientConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            ..RelayClientConfig::default()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Durations as whole seconds in the config asset
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
