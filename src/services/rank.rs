use crate::domain::probe::ProbeResult;
use crate::domain::record::{RankedRecord, RecordToken};

/// Best `best_count` successful results, fastest first.
///
/// The sort is stable, so equal latencies keep their input order and the same
/// input always ranks the same way. `best_count == 0` selects nothing.
pub fn select(results: &[ProbeResult], best_count: usize) -> Vec<RankedRecord> {
    let mut ok: Vec<&ProbeResult> = results
        .iter()
        .filter(|r| r.success && r.latency_ms > 0.0)
        .collect();
    ok.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
    let selected: Vec<RankedRecord> = ok
        .into_iter()
        .take(best_count)
        .map(|r| RankedRecord {
            address: r.address,
            port: r.port,
            latency_ms: r.latency_ms,
        })
        .collect();
    tracing::info!(target: "rank", selected = selected.len(), best_count, "selection done");
    selected
}

pub fn tokens(records: &[RankedRecord]) -> Vec<RecordToken> {
    records.iter().map(RankedRecord::token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ok(last: u8, latency: f64) -> ProbeResult {
        ProbeResult::succeeded(Ipv4Addr::new(10, 0, 0, last), 443, latency)
    }

    fn bad(last: u8) -> ProbeResult {
        ProbeResult::failed(Ipv4Addr::new(10, 0, 0, last), 443, "timeout")
    }

    #[test]
    fn sorts_ascending_and_truncates() {
        let results = vec![ok(1, 30.0), bad(2), ok(3, 10.0), ok(4, 20.0), ok(5, 40.0)];
        let picked = select(&results, 3);
        let lat: Vec<f64> = picked.iter().map(|r| r.latency_ms).collect();
        assert_eq!(lat, vec![10.0, 20.0, 30.0]);
        let excluded_min = 40.0;
        assert!(picked.iter().all(|r| r.latency_ms <= excluded_min));
    }

    #[test]
    fn ties_keep_discovery_order() {
        let results = vec![ok(9, 12.5), ok(1, 12.5), ok(5, 12.5), ok(2, 3.0)];
        let picked = select(&results, 4);
        let order: Vec<u8> = picked.iter().map(|r| r.address.octets()[3]).collect();
        assert_eq!(order, vec![2, 9, 1, 5]);
        assert_eq!(select(&results, 4), picked);
    }

    #[test]
    fn zero_best_count_selects_nothing() {
        assert!(select(&[ok(1, 5.0)], 0).is_empty());
    }

    #[test]
    fn all_failed_selects_nothing() {
        let results: Vec<ProbeResult> = (1..=5).map(bad).collect();
        assert!(select(&results, 3).is_empty());
    }

    #[test]
    fn tokens_use_wire_format() {
        let picked = select(&[ok(7, 15.234)], 1);
        let t: Vec<String> = tokens(&picked).iter().map(ToString::to_string).collect();
        assert_eq!(t, vec!["10.0.0.7:443#15.23ms"]);
    }
}
