//! HTTP client for the remote key-value store.
//!
//! The API key travels only in the `X-API-Key` header.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::domain::record::{Action, RecordToken};
use crate::domain::store::{
    CurrentIpsResponse, HealthResponse, StatsResponse, StoreStats, SyncRequest, SyncResponse,
};
use crate::error::SyncError;

const API_KEY_HEADER: &str = "X-API-Key";

/// Anything that can publish the selected records.
pub trait Publisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        records: &'a [RecordToken],
        action: Action,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, SyncError>>;
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ipsift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `POST /api/ips`. Returns the store's message on success.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn upload(
        &self,
        records: &[RecordToken],
        action: Action,
        key: &str,
    ) -> Result<String, SyncError> {
        let body = SyncRequest {
            ips: records.iter().map(ToString::to_string).collect(),
            action,
            key: key.to_string(),
        };
        let resp = self
            .http
            .post(self.endpoint("/api/ips"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: SyncResponse = read_json(resp).await?;
        if parsed.success {
            let message = parsed.message.unwrap_or_default();
            tracing::info!(target: "sync", %action, key, "upload accepted: {message}");
            Ok(message)
        } else {
            Err(SyncError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }

    /// `GET /api/ips?format=json`: records currently held by the store.
    pub async fn fetch_current(&self, key: &str) -> Result<Vec<String>, SyncError> {
        let resp = self
            .http
            .get(self.endpoint("/api/ips"))
            .query(&[("format", "json"), ("key", key)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let parsed: CurrentIpsResponse = read_json(resp).await?;
        if !parsed.success {
            return Err(SyncError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(parsed.data.ips)
    }

    /// `GET /api/ips?format=text`: the raw stored content.
    pub async fn fetch_current_text(&self, key: &str) -> Result<String, SyncError> {
        let resp = self
            .http
            .get(self.endpoint("/api/ips"))
            .query(&[("format", "text"), ("key", key)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// `GET /api/health`; `Ok` only when the store reports `healthy`.
    pub async fn health(&self) -> Result<String, SyncError> {
        let resp = self
            .http
            .get(self.endpoint("/api/health"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let parsed: HealthResponse = read_json(resp).await?;
        if parsed.success && parsed.status == "healthy" {
            Ok(parsed.status)
        } else {
            Err(SyncError::Rejected(format!("store status '{}'", parsed.status)))
        }
    }

    /// `GET /api/stats`.
    pub async fn stats(&self) -> Result<StoreStats, SyncError> {
        let resp = self
            .http
            .get(self.endpoint("/api/stats"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let parsed: StatsResponse = read_json(resp).await?;
        if !parsed.success {
            return Err(SyncError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(parsed.data)
    }
}

impl Publisher for StoreClient {
    fn publish<'a>(
        &'a self,
        records: &'a [RecordToken],
        action: Action,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, SyncError>> {
        Box::pin(self.upload(records, action, key))
    }
}

/// Anything but 200 is a failure carrying the store's `error` text, or the raw
/// body when it is not an error envelope; a 200 body must parse.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, SyncError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status != StatusCode::OK {
        return Err(SyncError::Status {
            status: status.as_u16(),
            body: error_text(body),
        });
    }
    serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))
}

fn error_text(body: String) -> String {
    match serde_json::from_str::<SyncResponse>(&body) {
        Ok(SyncResponse {
            error: Some(error), ..
        }) => error,
        _ => body,
    }
}
