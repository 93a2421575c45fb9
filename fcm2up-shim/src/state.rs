//! Typed registration state
//!
//! Each field of the per-installation registration record is its own
//! [`Property`], so every read and write goes through one compile-time key.

use serde::{Deserialize, Serialize};
use state_store::{Backend, Property, StateStore};

/// Schema version of the persisted registration record
pub const SCHEMA_VERSION: u32 = 1;

/// Distributor used when none has been configured
pub const DEFAULT_DISTRIBUTOR: &str = "io.heckel.ntfy";

/// Open the registration record stored in `backend`
pub fn open(backend: impl Backend) -> state_store::Result<StateStore> {
    StateStore::open(backend, SCHEMA_VERSION)
}

/// Identifier this device presents to the distributor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionToken(pub String);

impl Property for SubscriptionToken {
    const KEY: &'static str = "subscription_token";
}

/// Distributor-issued endpoint for inbound delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress(pub String);

impl Property for DeliveryAddress {
    const KEY: &'static str = "delivery_address";
}

/// Token issued by the vendor SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorToken(pub String);

impl Property for VendorToken {
    const KEY: &'static str = "vendor_token";
}

/// Token issued by the relay; supersedes [`VendorToken`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayToken(pub String);

impl Property for RelayToken {
    const KEY: &'static str = "relay_token";
}

/// Whether the current [`RelayToken`] has reached the app's token callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDelivered(pub bool);

impl Property for TokenDelivered {
    const KEY: &'static str = "token_delivered";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayUrl(pub String);

impl Property for RelayUrl {
    const KEY: &'static str = "relay_url";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorId(pub String);

impl Property for DistributorId {
    const KEY: &'static str = "distributor_id";
}

/// Vendor credentials forwarded to the relay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorCredentials {
    pub app_id: Option<String>,
    pub project_id: Option<String>,
    pub api_key: Option<String>,
}

impl VendorCredentials {
    pub fn is_empty(&self) -> bool {
        self.app_id.is_none() && self.project_id.is_none() && self.api_key.is_none()
    }
}

impl Property for VendorCredentials {
    const KEY: &'static str = "vendor_credentials";
}

/// Device and app metadata sent along with relay registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// SHA-1 fingerprint of the original signing certificate
    pub cert_sha1: Option<String>,
    pub app_version: Option<i32>,
    pub app_version_name: Option<String>,
    pub target_sdk: Option<i32>,
}

impl AppMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Property for AppMetadata {
    const KEY: &'static str = "app_metadata";
}

/// App callable that receives decoded message payloads
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerTarget {
    pub class: String,
    pub method: String,
}

impl HandlerTarget {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl std::fmt::Display for HandlerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

impl Property for HandlerTarget {
    const KEY: &'static str = "handler_target";
}

/// App component started with the raw message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageServiceClass(pub String);

impl Property for MessageServiceClass {
    const KEY: &'static str = "message_service_class";
}

/// Read-only copy of the whole registration record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSnapshot {
    pub subscription_token: Option<String>,
    pub delivery_address: Option<String>,
    pub vendor_token: Option<String>,
    pub relay_token: Option<String>,
    pub token_delivered: bool,
    pub relay_url: Option<String>,
    pub distributor_id: String,
    pub credentials: VendorCredentials,
    pub metadata: AppMetadata,
    pub handler: Option<HandlerTarget>,
    pub message_service_class: Option<String>,
}

impl RegistrationSnapshot {
    pub fn read(store: &StateStore) -> Self {
        Self {
            subscription_token: store.get::<SubscriptionToken>().map(|t| t.0),
            delivery_address: store.get::<DeliveryAddress>().map(|a| a.0),
            vendor_token: store.get::<VendorToken>().map(|t| t.0),
            relay_token: store.get::<RelayToken>().map(|t| t.0),
            token_delivered: store.get::<TokenDelivered>().is_some_and(|d| d.0),
            relay_url: store.get::<RelayUrl>().map(|u| u.0),
            distributor_id: distributor_id(store),
            credentials: store.get::<VendorCredentials>().unwrap_or_default(),
            metadata: store.get::<AppMetadata>().unwrap_or_default(),
            handler: store.get::<HandlerTarget>(),
            message_service_class: store.get::<MessageServiceClass>().map(|c| c.0),
        }
    }
}

/// Configured distributor, or [`DEFAULT_DISTRIBUTOR`]
pub fn distributor_id(store: &StateStore) -> String {
    store
        .get::<DistributorId>()
        .map(|d| d.0)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DISTRIBUTOR.to_string())
}
