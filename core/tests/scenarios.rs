//! Reference scenarios: threshold 50,000, window 3 days, tolerance 1,000.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use transfer_watch_core::{
    engine::WatchEngine, summary::summarize, AlertKind, DetectionConfig, RawRecord,
};

fn engine() -> WatchEngine {
    let config = DetectionConfig::new(dec!(50000), 3, dec!(1000)).expect("valid config");
    WatchEngine::new(config).expect("engine")
}

/// Build rows for sender S, one per (day, amount).
fn rows(plan: &[(u32, &str)]) -> Vec<RawRecord> {
    plan.iter()
        .enumerate()
        .map(|(i, (day, amount))| {
            let value = json!({
                "record_id": format!("S-{i}"),
                "sender_id": "S",
                "receiver_id": format!("R-{i}"),
                "amount": amount,
                "timestamp": format!("2024-06-{day:02} 11:00:00"),
            });
            value.as_object().cloned().expect("object")
        })
        .collect()
}

/// Scenario A: 20,000 + 20,000 + 9,500 over days 1-3 sums to 49,500.
#[test]
fn scenario_a_three_transfers_inside_band() {
    let eval = engine().evaluate(&rows(&[(1, "20000"), (2, "20000"), (3, "9500")]));

    assert!(eval.rejections.is_empty());
    assert_eq!(eval.alerts.len(), 1, "alerts: {:#?}", eval.alerts);
    let alert = &eval.alerts[0];
    assert_eq!(alert.kind, AlertKind::StructuredTransfers);
    assert_eq!(alert.subject_id, "S");
    assert_eq!(alert.contributing_records, ["S-0", "S-1", "S-2"]);
    assert_eq!(alert.total_amount, dec!(49500));
    assert_eq!(
        alert.window_start.map(|t| t.to_string()).as_deref(),
        Some("2024-06-01 11:00:00")
    );
    assert_eq!(
        alert.window_end.map(|t| t.to_string()).as_deref(),
        Some("2024-06-03 11:00:00")
    );
}

/// Scenario B: 40,500 is below the tolerance band.
#[test]
fn scenario_b_sum_below_band() {
    let eval = engine().evaluate(&rows(&[(1, "20000"), (2, "20000"), (3, "500")]));
    assert!(eval.alerts.is_empty(), "alerts: {:#?}", eval.alerts);
}

/// Scenario C: a single 50,000 transfer is a large transfer, not structuring.
#[test]
fn scenario_c_single_transfer_at_threshold() {
    let eval = engine().evaluate(&rows(&[(1, "50000")]));
    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].kind, AlertKind::SingleLargeTransfer);
    assert_eq!(eval.alerts[0].contributing_records, ["S-0"]);
    assert_eq!(eval.count_of(AlertKind::StructuredTransfers), 0);
}

/// Scenario D: two transfers four days apart never share a 3-day window.
#[test]
fn scenario_d_transfers_outside_window() {
    let eval = engine().evaluate(&rows(&[(1, "30000"), (5, "25000")]));
    assert!(eval.alerts.is_empty(), "alerts: {:#?}", eval.alerts);
}

/// A sum exactly at the threshold is not structuring.
#[test]
fn sum_equal_to_threshold_is_excluded() {
    let eval = engine().evaluate(&rows(&[(1, "30000"), (2, "20000")]));
    assert!(eval.alerts.is_empty(), "alerts: {:#?}", eval.alerts);
}

/// The lower band edge is inclusive.
#[test]
fn sum_at_band_floor_is_flagged() {
    let eval = engine().evaluate(&rows(&[(1, "30000"), (2, "19000")]));
    assert_eq!(eval.count_of(AlertKind::StructuredTransfers), 1);
}

/// Amounts whose sum passes the decimal limit are evaluated, not a panic.
#[test]
fn sums_near_the_decimal_limit_do_not_panic() {
    let config = DetectionConfig::new(Decimal::MAX, 3, dec!(1000)).expect("valid config");
    let engine = WatchEngine::new(config).expect("engine");
    let half_plus = (Decimal::MAX / Decimal::TWO + dec!(1000)).to_string();

    let eval = engine.evaluate(&rows(&[(1, half_plus.as_str()), (2, half_plus.as_str())]));
    assert!(eval.rejections.is_empty(), "{:#?}", eval.rejections);
    assert!(eval.alerts.is_empty(), "alerts: {:#?}", eval.alerts);

    let summaries = summarize(&eval.records, &eval.alerts);
    assert_eq!(summaries[0].total_amount, Decimal::MAX);
}
