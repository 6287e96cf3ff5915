//! Resolve → probe → select → upload, with cancellation and progress events.

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::adapters::store_client::{Publisher, StoreClient};
use crate::config::RunConfig;
use crate::domain::probe::ProbeResult;
use crate::domain::record::{Action, RankedRecord, RecordToken};
use crate::error::{IpsiftError, SyncError};
use crate::events::{Observer, ProgressEvent, Stage};
use crate::services::probe::{ProbeEngine, ProbeSettings};
use crate::services::rank;
use crate::services::source::{SamplingOptions, SourceId, SourceProvider};
use crate::stats::{LatencyStats, compute_stats};

/// Probe progress is reported every this many completions.
const PROGRESS_STEP: usize = 50;

/// What one run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub source: SourceId,
    pub port: u16,
    pub action: Action,
    /// Stop after selection, never contact the store.
    pub dry_run: bool,
}

impl RunRequest {
    /// Request built from the config's default source, port and action.
    pub fn from_config(cfg: &RunConfig) -> Result<Self, IpsiftError> {
        Ok(Self {
            source: cfg.default_ip_source.parse()?,
            port: cfg.default_port,
            action: cfg.default_action,
            dry_run: false,
        })
    }
}

/// Why a run ended without publishing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunFailure {
    #[error("could not obtain candidates: {0}")]
    SourceFetch(String),
    #[error("no candidate addresses resolved")]
    NoCandidates,
    #[error("no usable result: {succeeded} of {probed} probed addresses responded")]
    SelectionEmpty { probed: usize, succeeded: usize },
    #[error("upload failed: {0}")]
    Sync(#[from] SyncError),
    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Uploaded { message: String },
    /// Selection finished; upload skipped on request.
    DryRun,
    Failed(RunFailure),
}

/// Terminal outcome plus everything observed on the way.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub messages: Vec<ProgressEvent>,
    pub candidates: usize,
    pub results: Vec<ProbeResult>,
    pub stats: Option<LatencyStats>,
    pub selected: Vec<RankedRecord>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            status: RunStatus::DryRun,
            messages: Vec::new(),
            candidates: 0,
            results: Vec::new(),
            stats: None,
            selected: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, RunStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match &self.status {
            RunStatus::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn tokens(&self) -> Vec<RecordToken> {
        rank::tokens(&self.selected)
    }
}

/// Publisher for runs that have no store configured; every upload fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl Publisher for Offline {
    fn publish<'a>(
        &'a self,
        _records: &'a [RecordToken],
        _action: Action,
        _key: &'a str,
    ) -> BoxFuture<'a, Result<String, SyncError>> {
        Box::pin(async { Err(SyncError::Transport("no remote store configured".into())) })
    }
}

struct Journal<'a> {
    observer: &'a dyn Observer,
    report: RunReport,
}

impl Journal<'_> {
    fn emit(&mut self, event: ProgressEvent) {
        self.observer.notify(&event);
        self.report.messages.push(event);
    }

    fn fail(mut self, stage: Stage, failure: RunFailure) -> RunReport {
        self.emit(ProgressEvent::error(stage, failure.to_string()));
        self.report.status = RunStatus::Failed(failure);
        self.report
    }
}

/// Drives one run at a time; cheap to share behind an `Arc`.
pub struct Orchestrator<P = StoreClient> {
    config: RunConfig,
    sources: SourceProvider,
    engine: ProbeEngine,
    publisher: P,
    cancel: CancellationToken,
}

impl Orchestrator<StoreClient> {
    /// Production wiring. Fails when the config does not validate.
    pub fn from_config(config: RunConfig) -> Result<Self, IpsiftError> {
        config.validate()?;
        let publisher = StoreClient::new(
            &config.worker_url,
            &config.worker_api_key,
            config.http_timeout(),
        )?;
        Self::wire(config, publisher)
    }
}

impl Orchestrator<Offline> {
    /// Wiring for dry runs: store settings are not required.
    pub fn offline(config: RunConfig) -> Result<Self, IpsiftError> {
        config.validate_probe()?;
        Self::wire(config, Offline)
    }
}

impl<P: Publisher> Orchestrator<P> {
    fn wire(config: RunConfig, publisher: P) -> Result<Self, IpsiftError> {
        let sampling = SamplingOptions {
            per_block: config.cidr_sample,
            seed: config.sample_seed,
        };
        let sources = SourceProvider::new(sampling, config.fetch_timeout())?;
        let engine = ProbeEngine::from_config(&config);
        Ok(Self::new(config, sources, engine, publisher))
    }

    pub fn new(
        config: RunConfig,
        sources: SourceProvider,
        engine: ProbeEngine,
        publisher: P,
    ) -> Self {
        Self {
            config,
            sources,
            engine,
            publisher,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Token shared with the running stages; cancelling it stops new work.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[instrument(skip_all, fields(source = %request.source, port = request.port, action = %request.action))]
    pub async fn run(&self, request: &RunRequest, observer: &dyn Observer) -> RunReport {
        let mut journal = Journal {
            observer,
            report: RunReport::new(),
        };

        // resolve
        if self.cancel.is_cancelled() {
            return journal.fail(Stage::Resolve, RunFailure::Cancelled { stage: Stage::Resolve });
        }
        journal.emit(ProgressEvent::info(
            Stage::Resolve,
            format!("fetching candidates from {}", request.source),
        ));
        let batch = match self.sources.resolve(&request.source, self.config.ip_count).await {
            Ok(batch) => batch,
            Err(err) => {
                return journal.fail(Stage::Resolve, RunFailure::SourceFetch(err.to_string()));
            }
        };
        for skipped in &batch.skipped {
            journal.emit(ProgressEvent::warn(
                Stage::Resolve,
                format!(
                    "skipped line {} '{}': {}",
                    skipped.line_no, skipped.content, skipped.reason
                ),
            ));
        }
        journal.report.candidates = batch.addresses.len();
        if batch.addresses.is_empty() {
            return journal.fail(Stage::Resolve, RunFailure::NoCandidates);
        }
        journal.emit(
            ProgressEvent::info(
                Stage::Resolve,
                format!("resolved {} candidate addresses", batch.addresses.len()),
            )
            .with_counts(batch.addresses.len(), batch.addresses.len()),
        );

        // probe
        if self.cancel.is_cancelled() {
            return journal.fail(Stage::Probe, RunFailure::Cancelled { stage: Stage::Probe });
        }
        let settings = ProbeSettings::from_config(&self.config, request.port);
        let total = batch.addresses.len();
        journal.emit(
            ProgressEvent::info(
                Stage::Probe,
                format!(
                    "probing {total} addresses on port {} ({} trials, {} workers)",
                    settings.port, settings.trials, settings.concurrency
                ),
            )
            .with_counts(0, total),
        );
        let results = {
            let observer = journal.observer;
            let mut progress_events = Vec::new();
            let results = self
                .engine
                .probe_with_progress(&batch.addresses, &settings, &self.cancel, |done, total| {
                    if done % PROGRESS_STEP == 0 || done == total {
                        let event = ProgressEvent::info(Stage::Probe, format!("probed {done}/{total}"))
                            .with_counts(done, total);
                        observer.notify(&event);
                        progress_events.push(event);
                    }
                })
                .await;
            journal.report.messages.extend(progress_events);
            results
        };
        let stats = compute_stats(&results);
        journal.report.results = results;
        journal.report.stats = Some(stats.clone());
        if self.cancel.is_cancelled() {
            return journal.fail(Stage::Probe, RunFailure::Cancelled { stage: Stage::Probe });
        }
        journal.emit(
            ProgressEvent::info(
                Stage::Probe,
                format!("{} of {} addresses responded", stats.succeeded, stats.count),
            )
            .with_counts(stats.succeeded, stats.count),
        );

        // select
        let selected = rank::select(&journal.report.results, self.config.best_count);
        if selected.is_empty() {
            return journal.fail(
                Stage::Select,
                RunFailure::SelectionEmpty {
                    probed: stats.count,
                    succeeded: stats.succeeded,
                },
            );
        }
        journal.emit(
            ProgressEvent::info(
                Stage::Select,
                format!("selected {} fastest addresses", selected.len()),
            )
            .with_counts(selected.len(), stats.succeeded),
        );
        journal.report.selected = selected;

        // upload
        if request.dry_run {
            journal.emit(ProgressEvent::info(Stage::Upload, "dry run, upload skipped"));
            journal.report.status = RunStatus::DryRun;
            return journal.report;
        }
        if self.cancel.is_cancelled() {
            return journal.fail(Stage::Upload, RunFailure::Cancelled { stage: Stage::Upload });
        }
        let tokens = journal.report.tokens();
        journal.emit(ProgressEvent::info(
            Stage::Upload,
            format!(
                "uploading {} records to '{}' ({})",
                tokens.len(),
                self.config.store_key,
                request.action
            ),
        ));
        match self
            .publisher
            .publish(&tokens, request.action, &self.config.store_key)
            .await
        {
            Ok(message) => {
                journal.emit(ProgressEvent::info(
                    Stage::Upload,
                    format!("upload accepted: {message}"),
                ));
                journal.report.status = RunStatus::Uploaded { message };
                journal.report
            }
            Err(err) => journal.fail(Stage::Upload, RunFailure::Sync(err)),
        }
    }
}
