//! Wire types for the relay's JSON endpoints

use serde::{Deserialize, Serialize};

/// Body of `POST {relay}/register`
///
/// Associates a UnifiedPush delivery address with an app. Firebase
/// credentials let the relay authenticate toward the vendor as this app;
/// they may be omitted once the relay has seen them for `app_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// UnifiedPush endpoint the relay should forward messages to
    pub endpoint: String,
    /// App package name
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_api_key: Option<String>,
    /// SHA-1 of the app's original signing certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sdk: Option<i32>,
}

impl RegisterRequest {
    /// Create a request carrying only the endpoint and app id
    pub fn new(endpoint: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_id: app_id.into(),
            firebase_app_id: None,
            firebase_project_id: None,
            firebase_api_key: None,
            cert_sha1: None,
            app_version: None,
            app_version_name: None,
            target_sdk: None,
        }
    }

    /// Attach Firebase credentials; empty strings are treated as absent
    pub fn with_firebase(
        mut self,
        app_id: Option<String>,
        project_id: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        self.firebase_app_id = non_empty(app_id);
        self.firebase_project_id = non_empty(project_id);
        self.firebase_api_key = non_empty(api_key);
        self
    }

    pub fn with_cert_sha1(mut self, cert_sha1: Option<String>) -> Self {
        self.cert_sha1 = non_empty(cert_sha1);
        self
    }

    pub fn with_app_version(mut self, code: Option<i32>, name: Option<String>) -> Self {
        self.app_version = code;
        self.app_version_name = non_empty(name);
        self
    }

    pub fn with_target_sdk(mut self, target_sdk: Option<i32>) -> Self {
        self.target_sdk = target_sdk;
        self
    }
}

/// Body of a 200 answer to `/register`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    /// Vendor token the relay obtained on the app's behalf
    #[serde(default)]
    pub fcm_token: Option<String>,
}

impl RegisterResponse {
    /// Relay-issued token, if the relay assigned a non-empty one
    pub fn relay_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Body of `POST {relay}/unregister`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct UnregisterRequest<'a> {
    pub app_id: &'a str,
}

/// Body of `GET {relay}/health`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub registered_apps: usize,
    #[serde(default)]
    pub active_connections: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
