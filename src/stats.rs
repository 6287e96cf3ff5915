use crate::domain::probe::{ProbeResult, round2};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub latency_min: f64,
    pub latency_avg: f64,
    pub latency_max: f64,
}

/// Summary over a probe run; latency figures only cover successful results
/// and are zero when nothing succeeded.
pub fn compute_stats(results: &[ProbeResult]) -> LatencyStats {
    let count = results.len();
    let ok: Vec<f64> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.latency_ms)
        .collect();
    let succeeded = ok.len();
    if succeeded == 0 {
        return LatencyStats {
            count,
            failed: count,
            ..LatencyStats::default()
        };
    }
    let latency_min = ok.iter().copied().fold(f64::INFINITY, f64::min);
    let latency_max = ok.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let latency_avg = round2(ok.iter().sum::<f64>() / succeeded as f64);
    LatencyStats {
        count,
        succeeded,
        failed: count - succeeded,
        latency_min,
        latency_avg,
        latency_max,
    }
}
