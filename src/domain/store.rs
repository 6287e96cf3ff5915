//! Request and response bodies of the remote store API.

use serde::{Deserialize, Serialize};

use super::record::Action;

/// Body of `POST /api/ips`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRequest {
    pub ips: Vec<String>,
    pub action: Action,
    pub key: String,
}

/// Generic envelope; `message` on success, `error` on rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentIps {
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentIpsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: CurrentIps,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    #[serde(default, rename = "totalIPs")]
    pub total_ips: u64,
    #[serde(default, rename = "contentSizeMB")]
    pub content_size_mb: serde_json::Value,
    #[serde(default, rename = "sampleIPs")]
    pub sample_ips: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: StoreStats,
    #[serde(default)]
    pub error: Option<String>,
}
