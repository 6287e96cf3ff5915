use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// How the remote store merges uploaded records with what it already holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Replace,
    Append,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Replace => "replace",
            Action::Append => "append",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Action::Replace),
            "append" => Ok(Action::Append),
            other => Err(format!("unknown action '{other}' (expected replace or append)")),
        }
    }
}

/// A selected candidate in ranked position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedRecord {
    pub address: Ipv4Addr,
    pub port: u16,
    pub latency_ms: f64,
}

impl RankedRecord {
    pub fn token(&self) -> RecordToken {
        RecordToken {
            address: self.address,
            port: self.port,
            latency_ms: self.latency_ms,
        }
    }
}

/// Wire encoding of one record: `104.16.1.1:443#15.23ms`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordToken {
    pub address: Ipv4Addr,
    pub port: u16,
    pub latency_ms: f64,
}

impl fmt::Display for RecordToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{:.2}ms", self.address, self.port, self.latency_ms)
    }
}

impl FromStr for RecordToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| TokenError {
            token: s.to_string(),
            reason,
        };
        let (endpoint, latency) = s.trim().split_once('#').ok_or_else(|| err("missing '#'"))?;
        let latency = latency
            .strip_suffix("ms")
            .ok_or_else(|| err("missing 'ms' suffix"))?;
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| err("missing ':port'"))?;
        let address = host.parse::<Ipv4Addr>().map_err(|_| err("bad ipv4 address"))?;
        let port = port.parse::<u16>().map_err(|_| err("bad port"))?;
        let latency_ms = latency.parse::<f64>().map_err(|_| err("bad latency"))?;
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(err("latency out of range"));
        }
        Ok(RecordToken {
            address,
            port,
            latency_ms,
        })
    }
}
