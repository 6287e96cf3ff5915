use std::time::Duration;

use crate::error::SourceError;

/// Client used for downloading candidate lists (no auth, own timeout).
pub fn list_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ipsift/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Fetch {
            url: String::new(),
            reason: e.to_string(),
        })
}

/// Download a plain-text address list. Any non-2xx status is an error.
pub async fn fetch_list(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    let fetch_err = |e: reqwest::Error| SourceError::Fetch {
        url: url.to_string(),
        reason: if e.is_timeout() {
            "timeout".to_string()
        } else {
            e.to_string()
        },
    };
    let resp = client.get(url).send().await.map_err(fetch_err)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    resp.text().await.map_err(fetch_err)
}
