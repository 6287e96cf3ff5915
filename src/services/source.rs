use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::instrument;

use crate::adapters::source_fetch;
use crate::error::SourceError;

/// Well-known candidate lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedSource {
    Official,
    Cm,
    As13335,
    As209242,
    ProxyIp,
}

impl NamedSource {
    pub const ALL: [NamedSource; 5] = [
        NamedSource::Official,
        NamedSource::Cm,
        NamedSource::As13335,
        NamedSource::As209242,
        NamedSource::ProxyIp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NamedSource::Official => "official",
            NamedSource::Cm => "cm",
            NamedSource::As13335 => "as13335",
            NamedSource::As209242 => "as209242",
            NamedSource::ProxyIp => "proxyip",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            NamedSource::Official => "https://www.cloudflare.com/ips-v4/",
            NamedSource::Cm => "https://raw.githubusercontent.com/cmliu/cmliu/main/CF-CIDR.txt",
            NamedSource::As13335 => {
                "https://raw.githubusercontent.com/ipverse/asn-ip/master/as/13335/ipv4-aggregated.txt"
            }
            NamedSource::As209242 => {
                "https://raw.githubusercontent.com/ipverse/asn-ip/master/as/209242/ipv4-aggregated.txt"
            }
            NamedSource::ProxyIp => "https://raw.githubusercontent.com/cmliu/ACL4SSR/main/baipiao.txt",
        }
    }

    pub fn format(&self) -> ListFormat {
        match self {
            NamedSource::ProxyIp => ListFormat::ProxyIp,
            _ => ListFormat::Cidr,
        }
    }
}

/// Line grammar of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// Literal addresses and CIDR blocks.
    #[default]
    Cidr,
    /// `ip[:port][#comment]` entries, no blocks.
    ProxyIp,
}

/// Where candidates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    Named(NamedSource),
    Url(String),
    File(PathBuf),
    Inline(String),
}

impl FromStr for SourceId {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(named) = NamedSource::ALL
            .iter()
            .find(|n| n.name().eq_ignore_ascii_case(s))
        {
            return Ok(SourceId::Named(*named));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(SourceId::Url(s.to_string()));
        }
        Err(SourceError::UnknownSource(s.to_string()))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Named(n) => f.write_str(n.name()),
            SourceId::Url(u) => f.write_str(u),
            SourceId::File(p) => write!(f, "file:{}", p.display()),
            SourceId::Inline(_) => f.write_str("inline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingOptions {
    /// Addresses drawn from each CIDR block.
    pub per_block: usize,
    /// Fixed seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            per_block: 10,
            seed: None,
        }
    }
}

impl SamplingOptions {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub content: String,
    pub reason: String,
}

/// Deduplicated candidates in first-seen order, plus the lines that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBatch {
    pub addresses: Vec<Ipv4Addr>,
    pub skipped: Vec<SkippedLine>,
}

impl SourceBatch {
    fn push(&mut self, seen: &mut HashSet<Ipv4Addr>, ip: Ipv4Addr) {
        if seen.insert(ip) {
            self.addresses.push(ip);
        }
    }

    fn skip(&mut self, line_no: usize, content: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(target: "source", line = line_no, content, "skipping line: {reason}");
        self.skipped.push(SkippedLine {
            line_no,
            content: content.to_string(),
            reason,
        });
    }

    /// Keep a uniform random subset of `limit` addresses, in their original order.
    pub fn limit_to<R: Rng + ?Sized>(&mut self, limit: usize, rng: &mut R) {
        if limit == 0 || self.addresses.len() <= limit {
            return;
        }
        let mut picked = index::sample(rng, self.addresses.len(), limit).into_vec();
        picked.sort_unstable();
        self.addresses = picked.into_iter().map(|i| self.addresses[i]).collect();
    }
}

/// Parse list text with a fresh rng from `opts`.
pub fn parse(text: &str, format: ListFormat, opts: &SamplingOptions) -> SourceBatch {
    parse_with_rng(text, format, opts.per_block, &mut opts.rng())
}

pub fn parse_with_rng<R: Rng + ?Sized>(
    text: &str,
    format: ListFormat,
    per_block: usize,
    rng: &mut R,
) -> SourceBatch {
    let mut batch = SourceBatch::default();
    let mut seen = HashSet::new();
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match format {
            ListFormat::ProxyIp => match parse_proxyip_line(line) {
                Some(ip) => batch.push(&mut seen, ip),
                None => batch.skip(line_no, line, "not an ipv4 address"),
            },
            ListFormat::Cidr if line.contains('/') => match sample_cidr(line, per_block, rng) {
                Ok(hosts) => {
                    for ip in hosts {
                        batch.push(&mut seen, ip);
                    }
                }
                Err(reason) => batch.skip(line_no, line, reason),
            },
            ListFormat::Cidr => match line.parse::<Ipv4Addr>() {
                Ok(ip) => batch.push(&mut seen, ip),
                Err(_) => batch.skip(line_no, line, "not an ipv4 address"),
            },
        }
    }
    batch
}

fn parse_proxyip_line(line: &str) -> Option<Ipv4Addr> {
    let line = line.split('#').next().unwrap_or("").trim();
    let host = line.split(':').next().unwrap_or("").trim();
    host.parse().ok()
}

/// Usable host range of a block as `(first, count)`.
///
/// Blocks up to /30 drop the network and broadcast addresses; /31 keeps both,
/// /32 is the single address. Host bits in the base address are ignored.
pub fn host_range(cidr: &str) -> Result<(Ipv4Addr, u64), String> {
    let (base, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| format!("'{cidr}' is not a cidr block"))?;
    let base: Ipv4Addr = base
        .trim()
        .parse()
        .map_err(|_| format!("invalid network address '{base}'"))?;
    let prefix: u32 = prefix
        .trim()
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| format!("invalid prefix length '{prefix}'"))?;
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = u32::from(base) & mask;
    let size = 1u64 << (32 - prefix);
    Ok(match prefix {
        32 => (Ipv4Addr::from(network), 1),
        31 => (Ipv4Addr::from(network), 2),
        _ => (Ipv4Addr::from(network + 1), size - 2),
    })
}

/// Draw up to `cap` distinct host addresses from a block.
pub fn sample_cidr<R: Rng + ?Sized>(
    cidr: &str,
    cap: usize,
    rng: &mut R,
) -> Result<Vec<Ipv4Addr>, String> {
    let (first, count) = host_range(cidr)?;
    let count = usize::try_from(count).map_err(|_| format!("block '{cidr}' too large"))?;
    let amount = cap.min(count);
    let mut picked = index::sample(rng, count, amount).into_vec();
    picked.sort_unstable();
    let first = u32::from(first);
    Ok(picked
        .into_iter()
        .map(|offset| Ipv4Addr::from(first + offset as u32))
        .collect())
}

/// Turns a [`SourceId`] into a candidate batch.
#[derive(Debug, Clone)]
pub struct SourceProvider {
    http: reqwest::Client,
    sampling: SamplingOptions,
}

impl SourceProvider {
    pub fn new(sampling: SamplingOptions, fetch_timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: source_fetch::list_client(fetch_timeout)?,
            sampling,
        })
    }

    pub fn sampling(&self) -> &SamplingOptions {
        &self.sampling
    }

    /// Fetch, parse, deduplicate, then cap at `limit` (0 = no cap).
    ///
    /// Remote failures come back as `Err`; the caller decides what an empty
    /// run means.
    #[instrument(skip(self, source), fields(source = %source))]
    pub async fn resolve(&self, source: &SourceId, limit: usize) -> Result<SourceBatch, SourceError> {
        let (text, format) = match source {
            SourceId::Named(named) => (
                source_fetch::fetch_list(&self.http, named.url()).await?,
                named.format(),
            ),
            SourceId::Url(url) => (
                source_fetch::fetch_list(&self.http, url).await?,
                ListFormat::Cidr,
            ),
            SourceId::File(path) => (
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.clone(),
                        source,
                    })?,
                ListFormat::Cidr,
            ),
            SourceId::Inline(text) => (text.clone(), ListFormat::Cidr),
        };
        let mut rng = self.sampling.rng();
        let mut batch = parse_with_rng(&text, format, self.sampling.per_block, &mut rng);
        batch.limit_to(limit, &mut rng);
        tracing::info!(
            target: "source",
            candidates = batch.addresses.len(),
            skipped = batch.skipped.len(),
            "source resolved"
        );
        Ok(batch)
    }
}
