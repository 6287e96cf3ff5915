use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use ipsift::adapters::prober::{ProberFn, TrialSpec};
use ipsift::domain::probe::ProbeTrial;
use ipsift::services::source::SamplingOptions;
use ipsift::{
    Action, Observer, Orchestrator, ProbeEngine, ProbeFailure, ProgressEvent, Publisher,
    RecordToken, RunConfig, RunFailure, RunRequest, RunStatus, Severity, SourceId,
    SourceProvider, Stage, SyncError, TlsPolicy,
};

#[derive(Default)]
struct Recorder {
    calls: AtomicUsize,
    last: Mutex<Option<(Vec<String>, Action, String)>>,
    reject: bool,
}

impl Publisher for Recorder {
    fn publish<'a>(
        &'a self,
        records: &'a [RecordToken],
        action: Action,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, SyncError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((
                records.iter().map(ToString::to_string).collect(),
                action,
                key.to_string(),
            ));
            if self.reject {
                Err(SyncError::Rejected("nope".into()))
            } else {
                Ok("ok".to_string())
            }
        })
    }
}

#[derive(Default)]
struct Collect(Mutex<Vec<ProgressEvent>>);

impl Observer for Collect {
    fn notify(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Latency equals the last octet; octets above 200 never answer.
fn octet_prober() -> ProberFn {
    Arc::new(|spec: TrialSpec| -> BoxFuture<'static, ProbeTrial> {
        Box::pin(async move {
            match spec.addr.ip() {
                IpAddr::V4(v4) if v4.octets()[3] <= 200 => Ok(f64::from(v4.octets()[3])),
                _ => Err(ProbeFailure::Timeout),
            }
        })
    })
}

fn config(best: usize) -> RunConfig {
    RunConfig {
        worker_url: "https://kv.example.dev".into(),
        worker_api_key: "secret".into(),
        best_count: best,
        test_count: 2,
        max_workers: 4,
        ..RunConfig::default()
    }
}

fn orchestrator(cfg: RunConfig, publisher: Recorder) -> Orchestrator<Recorder> {
    let sources = SourceProvider::new(
        SamplingOptions {
            per_block: 10,
            seed: Some(1),
        },
        Duration::from_secs(1),
    )
    .unwrap();
    let engine = ProbeEngine::new(octet_prober(), TlsPolicy::default());
    Orchestrator::new(cfg, sources, engine, publisher)
}

fn request(list: &str, dry_run: bool) -> RunRequest {
    RunRequest {
        source: SourceId::Inline(list.to_string()),
        port: 443,
        action: Action::Append,
        dry_run,
    }
}

#[tokio::test]
async fn uploads_fastest_records_in_latency_order() {
    let orch = orchestrator(config(2), Recorder::default());
    let observer = Collect::default();
    let report = orch
        .run(&request("1.0.0.30\n1.0.0.10\n1.0.0.20\n1.0.0.250\n", false), &observer)
        .await;

    assert_eq!(report.status, RunStatus::Uploaded { message: "ok".into() });
    assert_eq!(report.candidates, 4);
    assert_eq!(report.results.len(), 4);
    let stats = report.stats.clone().unwrap();
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 1);

    let published = orch.publisher().last.lock().unwrap().clone().unwrap();
    assert_eq!(
        published.0,
        vec!["1.0.0.10:443#10.00ms".to_string(), "1.0.0.20:443#20.00ms".to_string()]
    );
    assert_eq!(published.1, Action::Append);
    assert_eq!(published.2, "ADD.txt");
    assert_eq!(orch.publisher().calls.load(Ordering::SeqCst), 1);

    let events = observer.0.lock().unwrap();
    assert_eq!(events.len(), report.messages.len());
    assert!(events.iter().any(|e| e.stage == Stage::Upload));
}

#[tokio::test]
async fn all_unreachable_never_publishes() {
    let orch = orchestrator(config(16), Recorder::default());
    let report = orch
        .run(&request("1.0.0.201\n1.0.0.202\n", false), &Collect::default())
        .await;

    assert_eq!(
        report.failure(),
        Some(&RunFailure::SelectionEmpty {
            probed: 2,
            succeeded: 0
        })
    );
    assert_eq!(orch.publisher().calls.load(Ordering::SeqCst), 0);
    assert!(report.selected.is_empty());
}

#[tokio::test]
async fn empty_source_aborts_before_probing() {
    let orch = orchestrator(config(16), Recorder::default());
    let report = orch
        .run(&request("# nothing here\nbogus\n", false), &Collect::default())
        .await;

    assert_eq!(report.failure(), Some(&RunFailure::NoCandidates));
    assert!(report.results.is_empty());
    assert_eq!(orch.publisher().calls.load(Ordering::SeqCst), 0);
    let warnings = report
        .messages
        .iter()
        .filter(|e| e.severity == Severity::Warn)
        .count();
    assert_eq!(warnings, 1);
}

#[tokio::test]
async fn missing_file_is_a_source_failure() {
    let orch = orchestrator(config(16), Recorder::default());
    let req = RunRequest {
        source: SourceId::File("/definitely/not/here.txt".into()),
        ..request("", false)
    };
    let report = orch.run(&req, &Collect::default()).await;
    assert!(matches!(report.failure(), Some(RunFailure::SourceFetch(_))));
}

#[tokio::test]
async fn dry_run_selects_without_upload() {
    let orch = orchestrator(config(16), Recorder::default());
    let report = orch
        .run(&request("1.0.0.5\n1.0.0.3\n", true), &Collect::default())
        .await;

    assert_eq!(report.status, RunStatus::DryRun);
    assert!(report.is_success());
    assert_eq!(report.selected.len(), 2);
    assert_eq!(report.tokens()[0].to_string(), "1.0.0.3:443#3.00ms");
    assert_eq!(orch.publisher().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_rejection_fails_the_run() {
    let publisher = Recorder {
        reject: true,
        ..Recorder::default()
    };
    let orch = orchestrator(config(16), publisher);
    let report = orch
        .run(&request("1.0.0.5\n", false), &Collect::default())
        .await;

    assert_eq!(
        report.failure(),
        Some(&RunFailure::Sync(SyncError::Rejected("nope".into())))
    );
    assert_eq!(report.selected.len(), 1);
}

#[tokio::test]
async fn cancelled_run_publishes_nothing() {
    let orch = orchestrator(config(16), Recorder::default());
    orch.cancel();
    let report = orch
        .run(&request("1.0.0.5\n", false), &Collect::default())
        .await;

    assert_eq!(
        report.failure(),
        Some(&RunFailure::Cancelled {
            stage: Stage::Resolve
        })
    );
    assert_eq!(orch.publisher().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cidr_block_is_sampled_and_capped() {
    let mut cfg = config(3);
    cfg.ip_count = 5;
    let orch = orchestrator(cfg, Recorder::default());
    let report = orch
        .run(&request("1.0.0.0/24\n", true), &Collect::default())
        .await;

    assert_eq!(report.candidates, 5);
    assert!(report.selected.len() <= 3);
    for w in report.selected.windows(2) {
        assert!(w[0].latency_ms <= w[1].latency_ms);
    }
}
