use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

/// Why a single connection attempt failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Refused,
    Connect(String),
    Handshake(String),
    Cancelled,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("timeout"),
            ProbeFailure::Refused => f.write_str("connection refused"),
            ProbeFailure::Connect(msg) => write!(f, "connect: {msg}"),
            ProbeFailure::Handshake(msg) => write!(f, "tls handshake: {msg}"),
            ProbeFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl From<std::io::Error> for ProbeFailure {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => ProbeFailure::Refused,
            std::io::ErrorKind::TimedOut => ProbeFailure::Timeout,
            _ => ProbeFailure::Connect(err.to_string()),
        }
    }
}

/// One timed attempt: latency in milliseconds or the reason it failed.
pub type ProbeTrial = Result<f64, ProbeFailure>;

/// Aggregated outcome of probing one candidate.
///
/// `success` holds exactly when `latency_ms > 0`; failed results carry `-1.0`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProbeResult {
    pub address: Ipv4Addr,
    pub port: u16,
    pub success: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn succeeded(address: Ipv4Addr, port: u16, latency_ms: f64) -> Self {
        debug_assert!(latency_ms > 0.0);
        Self {
            address,
            port,
            success: true,
            latency_ms,
            error: None,
        }
    }

    pub fn failed(address: Ipv4Addr, port: u16, reason: impl Into<String>) -> Self {
        Self {
            address,
            port,
            success: false,
            latency_ms: -1.0,
            error: Some(reason.into()),
        }
    }

    /// Fold trial outcomes into a result: mean of the successful latencies,
    /// rounded to two decimals. Failed trials are left out of the mean.
    pub fn from_trials(address: Ipv4Addr, port: u16, trials: &[ProbeTrial]) -> Self {
        let ok: Vec<f64> = trials.iter().filter_map(|t| t.as_ref().ok().copied()).collect();
        if ok.is_empty() {
            let reason = trials
                .iter()
                .rev()
                .find_map(|t| t.as_ref().err())
                .map(ToString::to_string)
                .unwrap_or_else(|| "no trials run".to_string());
            return Self::failed(address, port, reason);
        }
        let mean = ok.iter().sum::<f64>() / ok.len() as f64;
        // sub-10µs loopback connects would otherwise round to zero
        let latency = round2(mean).max(0.01);
        Self::succeeded(address, port, latency)
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
