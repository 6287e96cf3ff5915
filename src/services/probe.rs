use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::adapters::prober::{ProberFn, TrialSpec, tcp_prober};
use crate::config::{RunConfig, TlsPolicy};
use crate::domain::probe::{ProbeFailure, ProbeResult, ProbeTrial};

/// Per-run probing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub port: u16,
    /// Hard limit for each connection attempt.
    pub timeout: Duration,
    pub trials: u32,
    pub concurrency: usize,
}

impl ProbeSettings {
    pub fn from_config(cfg: &RunConfig, port: u16) -> Self {
        Self {
            port,
            timeout: cfg.probe_timeout(),
            trials: cfg.test_count,
            concurrency: cfg.max_workers,
        }
    }
}

/// Bounded-concurrency latency prober.
#[derive(Clone)]
pub struct ProbeEngine {
    prober: ProberFn,
    tls: TlsPolicy,
}

impl std::fmt::Debug for ProbeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeEngine").field("tls", &self.tls).finish()
    }
}

impl ProbeEngine {
    pub fn new(prober: ProberFn, tls: TlsPolicy) -> Self {
        Self { prober, tls }
    }

    /// TCP/TLS prober with the config's SNI and TLS ports.
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(tcp_prober(&cfg.tls_sni), cfg.tls_policy())
    }

    pub async fn probe(
        &self,
        addresses: &[Ipv4Addr],
        settings: &ProbeSettings,
        cancel: &CancellationToken,
    ) -> Vec<ProbeResult> {
        self.probe_with_progress(addresses, settings, cancel, |_, _| {})
            .await
    }

    /// Probe every address, at most `settings.concurrency` at a time.
    ///
    /// Returns one result per address in input order. Once `cancel` fires no
    /// new address or trial is started; addresses never dispatched have no
    /// result. `progress` is called with `(completed, total)`.
    #[instrument(skip_all, fields(total = addresses.len(), port = settings.port))]
    pub async fn probe_with_progress<F>(
        &self,
        addresses: &[Ipv4Addr],
        settings: &ProbeSettings,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Vec<ProbeResult>
    where
        F: FnMut(usize, usize),
    {
        let total = addresses.len();
        let tls = self.tls.is_tls(settings.port);
        let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let mut tasks: JoinSet<ProbeResult> = JoinSet::new();
        let mut index_of: HashMap<Id, usize> = HashMap::with_capacity(total);
        let mut slots: Vec<Option<ProbeResult>> = vec![None; total];
        let mut done = 0usize;

        for (idx, &address) in addresses.iter().enumerate() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    permit = semaphore.clone().acquire_owned() => break permit.ok(),
                    Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                        store(joined, &index_of, addresses, settings.port, &mut slots);
                        done += 1;
                        progress(done, total);
                    }
                }
            };
            let Some(permit) = permit else {
                tracing::info!(target: "probe", dispatched = idx, total, "dispatch stopped");
                break;
            };

            let prober = self.prober.clone();
            let cancel = cancel.clone();
            let settings = *settings;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                probe_address(&prober, address, &settings, tls, &cancel).await
            });
            index_of.insert(handle.id(), idx);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            store(joined, &index_of, addresses, settings.port, &mut slots);
            done += 1;
            progress(done, total);
        }

        let results: Vec<ProbeResult> = slots.into_iter().flatten().collect();
        tracing::info!(
            target: "probe",
            completed = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            total,
            "probing finished"
        );
        results
    }
}

fn store(
    joined: Result<(Id, ProbeResult), JoinError>,
    index_of: &HashMap<Id, usize>,
    addresses: &[Ipv4Addr],
    port: u16,
    slots: &mut [Option<ProbeResult>],
) {
    match joined {
        Ok((id, result)) => {
            if let Some(&idx) = index_of.get(&id) {
                slots[idx] = Some(result);
            }
        }
        Err(err) => {
            tracing::warn!(target: "probe", error = %err, "probe task failed");
            if let Some(&idx) = index_of.get(&err.id()) {
                slots[idx] = Some(ProbeResult::failed(
                    addresses[idx],
                    port,
                    format!("probe task failed: {err}"),
                ));
            }
        }
    }
}

async fn probe_address(
    prober: &ProberFn,
    address: Ipv4Addr,
    settings: &ProbeSettings,
    tls: bool,
    cancel: &CancellationToken,
) -> ProbeResult {
    let spec = TrialSpec {
        addr: SocketAddr::new(IpAddr::V4(address), settings.port),
        tls,
        timeout: settings.timeout,
    };
    let mut trials: Vec<ProbeTrial> = Vec::with_capacity(settings.trials as usize);
    for _ in 0..settings.trials {
        if cancel.is_cancelled() {
            break;
        }
        // the prober is trusted to honor the timeout, but never wait past it
        let trial = tokio::time::timeout(spec.timeout, prober(spec))
            .await
            .unwrap_or(Err(ProbeFailure::Timeout));
        if let Err(reason) = &trial {
            tracing::debug!(target: "probe", ip = %address, port = settings.port, %reason, "trial failed");
        }
        trials.push(trial);
    }
    if trials.is_empty() && cancel.is_cancelled() {
        return ProbeResult::failed(address, settings.port, ProbeFailure::Cancelled.to_string());
    }
    ProbeResult::from_trials(address, settings.port, &trials)
}
