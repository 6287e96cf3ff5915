//! ipsift: measure connect latency to candidate IPv4 endpoints, keep the
//! fastest, and publish them to a remote key-value store.

pub mod adapters;
pub mod config;
pub mod domain;
mod error;
pub mod events;
pub mod fmt;
pub mod services;
pub mod stats;

pub use adapters::store_client::{Publisher, StoreClient};
pub use config::{RunConfig, TlsPolicy};
pub use domain::probe::{ProbeFailure, ProbeResult};
pub use domain::record::{Action, RankedRecord, RecordToken};
pub use error::{ConfigError, IpsiftError, SourceError, SyncError, TokenError};
pub use events::{LogObserver, Observer, ProgressEvent, Severity, Stage};
pub use services::probe::{ProbeEngine, ProbeSettings};
pub use services::rank::select;
pub use services::run::{Offline, Orchestrator, RunFailure, RunReport, RunRequest, RunStatus};
pub use services::source::{SourceBatch, SourceId, SourceProvider};
