use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::record::Action;
use crate::error::ConfigError;

/// Upper bound accepted for any timeout setting, seconds.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Everything a run needs, read-only for the duration of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub worker_url: String,
    pub worker_api_key: String,
    /// Per-attempt connect (+ handshake) timeout, seconds.
    pub timeout: f64,
    pub max_workers: usize,
    pub test_count: u32,
    pub best_count: usize,
    /// Cap on resolved candidates; 0 keeps them all.
    pub ip_count: usize,
    /// Addresses sampled from each CIDR block.
    pub cidr_sample: usize,
    pub default_ip_source: String,
    pub default_port: u16,
    pub default_action: Action,
    pub store_key: String,
    pub tls_ports: Vec<u16>,
    pub tls_sni: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_seed: Option<u64>,
    /// Timeout for store requests, seconds.
    pub http_timeout: f64,
    /// Timeout for candidate list downloads, seconds.
    pub fetch_timeout: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_url: String::new(),
            worker_api_key: String::new(),
            timeout: 3.0,
            max_workers: 50,
            test_count: 3,
            best_count: 16,
            ip_count: 0,
            cidr_sample: 10,
            default_ip_source: "official".into(),
            default_port: 443,
            default_action: Action::Replace,
            store_key: "ADD.txt".into(),
            tls_ports: vec![443],
            tls_sni: "cloudflare.com".into(),
            sample_seed: None,
            http_timeout: 30.0,
            fetch_timeout: 30.0,
        }
    }
}

impl RunConfig {
    /// Out-of-range values fall back to the default; [`RunConfig::validate`]
    /// rejects them before a run.
    pub fn probe_timeout(&self) -> Duration {
        seconds(self.timeout).unwrap_or(Duration::from_secs(3))
    }

    pub fn http_timeout(&self) -> Duration {
        seconds(self.http_timeout)
            .unwrap_or(Duration::from_secs(30))
            .max(Duration::from_secs(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        seconds(self.fetch_timeout)
            .unwrap_or(Duration::from_secs(30))
            .max(Duration::from_secs(1))
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        TlsPolicy::new(self.tls_ports.clone())
    }

    /// Checks that only the engine itself depends on; the store checks are in
    /// [`RunConfig::validate_store`].
    pub fn validate_probe(&self) -> Result<(), ConfigError> {
        check_timeout("timeout", self.timeout)?;
        check_timeout("fetch_timeout", self.fetch_timeout)?;
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_workers",
            });
        }
        if self.test_count == 0 {
            return Err(ConfigError::ZeroValue {
                field: "test_count",
            });
        }
        Ok(())
    }

    /// URL must carry a scheme and a host; the API key must be present.
    pub fn validate_store(&self) -> Result<(), ConfigError> {
        check_timeout("http_timeout", self.http_timeout)?;
        let raw = self.worker_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        let url = reqwest::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "expected an http(s) url with a host".into(),
            });
        }
        if self.worker_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_probe()?;
        self.validate_store()
    }
}

fn seconds(v: f64) -> Option<Duration> {
    (v > 0.0 && v <= MAX_TIMEOUT_SECS as f64)
        .then(|| Duration::try_from_secs_f64(v).ok())
        .flatten()
}

fn check_timeout(field: &'static str, v: f64) -> Result<(), ConfigError> {
    match seconds(v) {
        Some(_) => Ok(()),
        None => Err(ConfigError::InvalidTimeout {
            field,
            max: MAX_TIMEOUT_SECS,
        }),
    }
}

/// Which ports get a TLS handshake after the TCP connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    ports: Vec<u16>,
}

impl TlsPolicy {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }

    /// Plain TCP for every port.
    pub fn none() -> Self {
        Self { ports: Vec::new() }
    }

    pub fn is_tls(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::new(vec![443])
    }
}
