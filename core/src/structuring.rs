//! Structuring detector.
//!
//! Finds runs of sub-threshold transfers from one sender, inside one
//! `transfer_days_window` calendar-day span, whose cumulative amount
//! lands in `[threshold - tolerance, threshold)`.
//!
//! Two-pointer scan over the sender's records in time order:
//!   1. the trailing edge drops records that fell out of the day window;
//!   2. the leading edge admits the next record;
//!   3. the trailing edge drops records while the sum is past the ceiling;
//!   4. a window with enough records and a sum inside the band emits one
//!      alert, and the scan restarts after that window's last record.
//!
//! Every record enters and leaves the window at most once, so the scan
//! is linear in the sender's record count.

use crate::{
    alert::Alert,
    config::DetectionConfig,
    detector::{group_by_sender, Detector, SenderHistory},
    record::TransferRecord,
    types::Amount,
};
use rust_decimal::Decimal;

pub struct StructuringDetector;

impl Detector for StructuringDetector {
    fn name(&self) -> &'static str {
        "structuring"
    }

    fn detect(&self, history: &SenderHistory<'_>, config: &DetectionConfig) -> Vec<Alert> {
        // Large transfers are flagged on their own and never join a pattern.
        let candidates: Vec<&TransferRecord> = history
            .records
            .iter()
            .copied()
            .filter(|record| !config.is_large(record.amount))
            .collect();
        scan_sender(&candidates, config)
    }
}

/// Detect structuring across all senders in `records`.
pub fn detect_structuring(records: &[TransferRecord], config: &DetectionConfig) -> Vec<Alert> {
    group_by_sender(records)
        .iter()
        .flat_map(|history| StructuringDetector.detect(history, config))
        .collect()
}

/// Scan one sender's sub-threshold records, already sorted by time.
fn scan_sender(records: &[&TransferRecord], config: &DetectionConfig) -> Vec<Alert> {
    let min_records = config.structuring.min_records;
    if records.len() < min_records {
        return Vec::new();
    }

    let mut alerts = Vec::new();
    let mut start = 0usize;
    let mut sum: Amount = Decimal::ZERO;

    for end in 0..records.len() {
        let leading = records[end];

        while start < end && !config.within_window(records[start].timestamp, leading.timestamp) {
            sum -= records[start].amount;
            start += 1;
        }

        // A sum past `Decimal::MAX` is past any ceiling: shrink until it fits.
        let mut admitted = sum.checked_add(leading.amount);
        while admitted.is_none() && start < end {
            sum -= records[start].amount;
            start += 1;
            admitted = sum.checked_add(leading.amount);
        }
        sum = admitted.unwrap_or(leading.amount);

        while start <= end && config.over_ceiling(sum) {
            sum -= records[start].amount;
            start += 1;
        }

        let window = &records[start..=end];
        if window.len() >= min_records && config.in_structuring_band(sum) {
            if let Some(alert) = Alert::structured(window, config) {
                log::warn!(
                    "Structuring detected: {} ({} transfers, {} between {} and {})",
                    alert.subject_id,
                    window.len(),
                    alert.total_amount,
                    records[start].timestamp,
                    leading.timestamp
                );
                alerts.push(alert);
            }
            // Consume on match: the next window starts after this one.
            start = end + 1;
            sum = Decimal::ZERO;
        }
    }

    alerts
}
