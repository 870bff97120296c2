//! Backing-service clients and the directory tools resolve them from.
//!
//! Tools never construct their own clients. The initializer builds every
//! client once, places it into a [`ClientDirectory`] under a well-known key,
//! and the registration engine hands the matching [`ClientHandle`] to each
//! tool constructor.

pub mod marketplace;
pub mod ratelimit;
pub mod sigv4;
pub mod storage;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::ModelRegistry;
use crate::state::TodoManager;

pub use marketplace::WbClient;
pub use ratelimit::{RateLimiter, RateLimiters, Throttled};
pub use storage::S3Client;

/// Well-known client directory keys.
pub mod keys {
    pub const WB_CLIENT: &str = "wb_client";
    pub const S3_CLIENT: &str = "s3_client";
    pub const MODEL_REGISTRY: &str = "model_registry";
    pub const TODO_MANAGER: &str = "todo_manager";
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error: status {status}, body: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("max retries exceeded, last error: {0}")]
    RetriesExhausted(String),

    #[error("ping status not OK: {0}")]
    PingFailed(String),

    #[error("marketplace client is running in demo mode; set WB_API_KEY to call the API")]
    DemoMode,
}

impl ClientError {
    /// Whether the failure was an authentication rejection.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Status { status: 401 | 403, .. })
    }
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "TS", default)]
    pub ts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub name: String,
    #[serde(rename = "parentName", default)]
    pub parent_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
}

/// Reference dictionaries fetched once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionaries {
    pub colors: Vec<Color>,
    pub genders: Vec<String>,
    pub countries: Vec<Country>,
    pub seasons: Vec<String>,
    pub vats: Vec<String>,
}

/// Paths of the dictionary endpoints on the content API.
pub mod directory_paths {
    pub const COLORS: &str = "/content/v2/directory/colors";
    pub const KINDS: &str = "/content/v2/directory/kinds";
    pub const SEASONS: &str = "/content/v2/directory/seasons";
    pub const VAT: &str = "/content/v2/directory/vat";
    pub const COUNTRIES: &str = "/content/v2/directory/countries";
}

/// Marketplace seller API.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// `GET base_url + path` with query parameters, returning the JSON body.
    async fn get(
        &self,
        base_url: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ClientError>;

    /// `POST base_url + path` with a JSON body, returning the JSON body.
    async fn post(&self, base_url: &str, path: &str, body: &Value) -> Result<Value, ClientError>;

    /// Whether this is the placeholder client built without credentials.
    fn is_demo(&self) -> bool {
        false
    }

    async fn ping(&self, base_url: &str) -> Result<PingResponse, ClientError> {
        let body = self.get(base_url, "/ping", &[]).await?;
        let resp: PingResponse = serde_json::from_value(body)?;
        if resp.status != "OK" {
            return Err(ClientError::PingFailed(resp.status));
        }
        Ok(resp)
    }

    /// Fetch every reference dictionary. Any single failure fails the whole load.
    async fn load_dictionaries(&self, base_url: &str) -> Result<Dictionaries, ClientError> {
        let locale = [("locale".to_string(), "ru".to_string())];
        Ok(Dictionaries {
            colors: data_field(self.get(base_url, directory_paths::COLORS, &[]).await?)?,
            genders: data_field(self.get(base_url, directory_paths::KINDS, &[]).await?)?,
            seasons: data_field(self.get(base_url, directory_paths::SEASONS, &[]).await?)?,
            vats: data_field(self.get(base_url, directory_paths::VAT, &locale).await?)?,
            countries: data_field(self.get(base_url, directory_paths::COUNTRIES, &locale).await?)?,
        })
    }
}

/// Extract and decode the `data` field of a marketplace envelope.
pub fn data_field<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ClientError> {
    let data = match body {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    Ok(serde_json::from_value(data)?)
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// One entry of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_modified: String,
}

/// S3-compatible object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// List every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, ClientError>;

    async fn get_object(&self, key: &str) -> Result<Bytes, ClientError>;

    fn bucket(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// A constructed client, tagged by what it can do.
#[derive(Clone)]
pub enum ClientHandle {
    Marketplace(Arc<dyn MarketplaceApi>),
    ObjectStorage(Arc<dyn ObjectStorage>),
    ModelRegistry(Arc<ModelRegistry>),
    TodoManager(Arc<TodoManager>),
}

impl ClientHandle {
    /// Short name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientHandle::Marketplace(_) => "marketplace",
            ClientHandle::ObjectStorage(_) => "object_storage",
            ClientHandle::ModelRegistry(_) => "model_registry",
            ClientHandle::TodoManager(_) => "todo_manager",
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientHandle").field(&self.kind()).finish()
    }
}

/// Symbolic client name to handle. Built by the caller, read by registration.
pub type ClientDirectory = HashMap<String, ClientHandle>;
