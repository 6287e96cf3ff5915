//! Progress notifications emitted by a run.
//!
//! The core never renders anything; front-ends subscribe through [`Observer`].

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Probe,
    Select,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolve => "resolve",
            Stage::Probe => "probe",
            Stage::Select => "select",
            Stage::Upload => "upload",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    /// `(done, total)` when the stage has a natural count.
    pub counts: Option<(usize, usize)>,
}

impl ProgressEvent {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            severity: Severity::Info,
            message: message.into(),
            counts: None,
        }
    }

    pub fn warn(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            ..Self::info(stage, message)
        }
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::info(stage, message)
        }
    }

    pub fn with_counts(mut self, done: usize, total: usize) -> Self {
        self.counts = Some((done, total));
        self
    }
}

/// Receives progress events. Must not block.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

impl Observer for UnboundedSender<ProgressEvent> {
    fn notify(&self, event: &ProgressEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.send(event.clone());
    }
}

/// Forwards events to `tracing` under the `run` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: &ProgressEvent) {
        match event.severity {
            Severity::Info => {
                tracing::info!(target: "run", stage = %event.stage, counts = ?event.counts, "{}", event.message)
            }
            Severity::Warn => {
                tracing::warn!(target: "run", stage = %event.stage, counts = ?event.counts, "{}", event.message)
            }
            Severity::Error => {
                tracing::error!(target: "run", stage = %event.stage, counts = ?event.counts, "{}", event.message)
            }
        }
    }
}
