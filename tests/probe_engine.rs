use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use ipsift::adapters::prober::{ProberFn, TrialSpec};
use ipsift::domain::probe::ProbeTrial;
use ipsift::{ProbeEngine, ProbeFailure, ProbeSettings, TlsPolicy};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn addrs(n: u8) -> Vec<Ipv4Addr> {
    (1..=n).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect()
}

fn settings(concurrency: usize, trials: u32) -> ProbeSettings {
    ProbeSettings {
        port: 443,
        timeout: Duration::from_secs(1),
        trials,
        concurrency,
    }
}

/// Sleeps `delay` then reports a latency derived from the last octet.
/// Addresses ending in an even octet are unreachable.
fn fake_prober(delay: Duration, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> ProberFn {
    Arc::new(move |spec: TrialSpec| -> BoxFuture<'static, ProbeTrial> {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            let octet = match spec.addr.ip() {
                std::net::IpAddr::V4(v4) => v4.octets()[3],
                _ => 0,
            };
            if octet % 2 == 0 {
                Err(ProbeFailure::Refused)
            } else {
                Ok(f64::from(octet) * 10.0)
            }
        })
    })
}

fn engine(delay: Duration) -> (ProbeEngine, Arc<AtomicUsize>) {
    let peak = Arc::new(AtomicUsize::new(0));
    let prober = fake_prober(delay, Arc::new(AtomicUsize::new(0)), peak.clone());
    (ProbeEngine::new(prober, TlsPolicy::default()), peak)
}

#[tokio::test(start_paused = true)]
async fn concurrency_bounds_wall_time_and_in_flight() {
    let (engine, peak) = engine(Duration::from_millis(100));
    let start = Instant::now();
    let results = engine
        .probe(&addrs(5), &settings(2, 1), &CancellationToken::new())
        .await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 5);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn one_result_per_address_in_input_order() {
    for concurrency in [1, 3, 50] {
        let (engine, _) = engine(Duration::from_millis(20));
        let input = addrs(7);
        let results = engine
            .probe(&input, &settings(concurrency, 2), &CancellationToken::new())
            .await;
        let got: Vec<Ipv4Addr> = results.iter().map(|r| r.address).collect();
        assert_eq!(got, input, "concurrency {concurrency}");
    }
}

#[tokio::test(start_paused = true)]
async fn success_iff_positive_latency() {
    let (engine, _) = engine(Duration::from_millis(5));
    let results = engine
        .probe(&addrs(6), &settings(4, 3), &CancellationToken::new())
        .await;
    for r in &results {
        assert_eq!(r.success, r.latency_ms > 0.0, "{r:?}");
        if r.success {
            assert!(r.error.is_none());
        } else {
            assert_eq!(r.latency_ms, -1.0);
            assert_eq!(r.error.as_deref(), Some("connection refused"));
        }
    }
    assert_eq!(results[0].latency_ms, 10.0);
    assert_eq!(results[2].latency_ms, 30.0);
}

#[tokio::test(start_paused = true)]
async fn slow_prober_is_cut_at_timeout() {
    let (engine, _) = engine(Duration::from_secs(5));
    let results = engine
        .probe(&addrs(1), &settings(1, 1), &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].error.as_deref(), Some("timeout"));
}

#[tokio::test(start_paused = true)]
async fn zero_concurrency_is_treated_as_one() {
    let (engine, peak) = engine(Duration::from_millis(10));
    let results = engine
        .probe(&addrs(3), &settings(0, 1), &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_dispatch() {
    let (engine, _) = engine(Duration::from_millis(100));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });
    let results = engine.probe(&addrs(10), &settings(2, 1), &cancel).await;
    // two waves of two were started before the token fired
    assert!(results.len() >= 2 && results.len() <= 4, "got {}", results.len());
    for w in results.windows(2) {
        assert!(w[0].address < w[1].address);
    }
}

#[tokio::test(start_paused = true)]
async fn zero_trials_fail_without_claiming_cancellation() {
    let (engine, peak) = engine(Duration::from_millis(10));
    let results = engine
        .probe(&addrs(2), &settings(2, 0), &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 2);
    for r in &results {
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("no trials run"));
    }
    assert_eq!(peak.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn progress_reaches_total() {
    let (engine, _) = engine(Duration::from_millis(1));
    let mut seen = Vec::new();
    engine
        .probe_with_progress(
            &addrs(4),
            &settings(2, 1),
            &CancellationToken::new(),
            |done, total| seen.push((done, total)),
        )
        .await;
    assert_eq!(seen.len(), 4);
    assert_eq!(seen.last(), Some(&(4, 4)));
}

#[tokio::test]
async fn empty_input_yields_nothing() {
    let (engine, _) = engine(Duration::from_millis(1));
    let results = engine
        .probe(&[], &settings(4, 1), &CancellationToken::new())
        .await;
    assert!(results.is_empty());
}
