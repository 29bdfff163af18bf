//! Engine-wide properties: exclusivity, non-overlap, idempotence,
//! ordering, and thread-count independence.

use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use transfer_watch_core::{
    engine::WatchEngine,
    synthetic::{SyntheticBatch, SyntheticProfile},
    AlertKind, DetectionConfig, Evaluation,
};

fn config() -> DetectionConfig {
    DetectionConfig::new(dec!(1000000), 3, dec!(20000)).expect("valid config")
}

fn busy_profile() -> SyntheticProfile {
    SyntheticProfile {
        background_senders: 40,
        days: 45,
        daily_activity: 0.6,
        structuring_runs: 8,
        large_transfers: 10,
        malformed_rows: 4,
        ..SyntheticProfile::default()
    }
}

fn evaluation(seed: u64) -> Evaluation {
    let _ = env_logger::builder().is_test(true).try_init();
    let batch = SyntheticBatch::generate(seed, &busy_profile(), &config());
    WatchEngine::new(config()).expect("engine").evaluate(&batch.rows)
}

/// Every record at or above the threshold gets exactly one large-transfer
/// alert and never joins a structuring alert.
#[test]
fn large_records_flagged_once_and_never_structured() {
    let eval = evaluation(11);
    let threshold = config().large_amount_threshold;

    let mut large_hits: HashMap<&str, usize> = HashMap::new();
    let mut structured: HashSet<&str> = HashSet::new();
    for alert in &eval.alerts {
        for id in &alert.contributing_records {
            match alert.kind {
                AlertKind::SingleLargeTransfer => *large_hits.entry(id.as_str()).or_default() += 1,
                AlertKind::StructuredTransfers => {
                    structured.insert(id.as_str());
                }
            }
        }
    }

    for record in &eval.records {
        let id = record.record_id.as_str();
        if record.amount >= threshold {
            assert_eq!(large_hits.get(id), Some(&1), "record {id} not flagged exactly once");
            assert!(!structured.contains(id), "large record {id} inside a structuring alert");
        } else {
            assert!(!large_hits.contains_key(id), "small record {id} flagged as large");
        }
    }
}

/// No record appears in two structuring alerts, and every structuring
/// alert sits inside the band and the day window.
#[test]
fn structuring_alerts_are_disjoint_and_in_band() {
    let eval = evaluation(23);
    let config = config();
    let by_id: HashMap<&str, _> = eval.records.iter().map(|r| (r.record_id.as_str(), r)).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for alert in eval.alerts.iter().filter(|a| a.kind == AlertKind::StructuredTransfers) {
        assert!(alert.contributing_records.len() >= 2);
        assert!(config.in_structuring_band(alert.total_amount), "{alert:#?}");

        let sum: rust_decimal::Decimal = alert
            .contributing_records
            .iter()
            .map(|id| by_id[id.as_str()].amount)
            .sum();
        assert_eq!(sum, alert.total_amount);

        let start = alert.window_start.expect("window start");
        let end = alert.window_end.expect("window end");
        assert!(config.within_window(start, end), "{alert:#?}");

        for id in &alert.contributing_records {
            assert_eq!(by_id[id.as_str()].sender_id, alert.subject_id);
            assert!(seen.insert(id.as_str()), "record {id} in two structuring alerts");
        }
    }
}

/// Same input twice, same output: no hidden state between calls.
#[test]
fn evaluation_is_idempotent() {
    let batch = SyntheticBatch::generate(5, &busy_profile(), &config());
    let engine = WatchEngine::new(config()).expect("engine");

    let first = engine.evaluate(&batch.rows);
    let second = engine.evaluate(&batch.rows);
    assert_eq!(first, second);

    let again = engine.evaluate_records(&first.records);
    assert_eq!(again, first.alerts);
}

/// Worker count never changes the result.
#[test]
fn parallel_matches_sequential() {
    let batch = SyntheticBatch::generate(99, &busy_profile(), &config());
    let sequential = WatchEngine::new(config()).expect("engine").evaluate(&batch.rows);

    for workers in [2, 3, 8, 64] {
        let parallel = WatchEngine::new(config())
            .expect("engine")
            .with_workers(workers)
            .evaluate(&batch.rows);
        assert_eq!(parallel, sequential, "diverged with {workers} workers");
    }
}

/// Alerts come out grouped by subject, then kind, then earliest timestamp.
#[test]
fn alerts_are_ordered() {
    let eval = evaluation(3);
    let earliest: HashMap<&str, _> = eval.records.iter().map(|r| (r.record_id.as_str(), r.timestamp)).collect();

    let keys: Vec<_> = eval
        .alerts
        .iter()
        .map(|a| {
            let first = a
                .contributing_records
                .iter()
                .map(|id| earliest[id.as_str()])
                .min()
                .expect("non-empty");
            (a.subject_id.clone(), a.kind, first)
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

/// Every alert references records from the evaluated set only.
#[test]
fn alerts_reference_known_records() {
    let eval = evaluation(8);
    let ids: HashSet<&str> = eval.records.iter().map(|r| r.record_id.as_str()).collect();
    for alert in &eval.alerts {
        assert!(!alert.contributing_records.is_empty());
        for id in &alert.contributing_records {
            assert!(ids.contains(id.as_str()), "unknown record {id}");
        }
    }
}
