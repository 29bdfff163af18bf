//! Threshold flagger: one alert per transfer at or above the threshold.

use crate::{
    alert::Alert,
    config::DetectionConfig,
    detector::{group_by_sender, Detector, SenderHistory},
    record::TransferRecord,
};

pub struct LargeTransferFlagger;

impl Detector for LargeTransferFlagger {
    fn name(&self) -> &'static str {
        "large_transfer"
    }

    fn detect(&self, history: &SenderHistory<'_>, config: &DetectionConfig) -> Vec<Alert> {
        history
            .records
            .iter()
            .filter(|record| config.is_large(record.amount))
            .map(|record| Alert::single_large(record, config))
            .collect()
    }
}

/// Flag every record with `amount >= large_amount_threshold`.
/// Output is grouped by sender.
pub fn flag_large_transfers(records: &[TransferRecord], config: &DetectionConfig) -> Vec<Alert> {
    group_by_sender(records)
        .iter()
        .flat_map(|history| LargeTransferFlagger.detect(history, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record(id: &str, sender: &str, amount: i64) -> TransferRecord {
        TransferRecord {
            record_id: id.into(),
            sender_id: sender.into(),
            receiver_id: "R".into(),
            amount: Decimal::new(amount, 0),
            timestamp: NaiveDate::from_ymd_opt(2024, 2, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
            description: None,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = DetectionConfig::new(Decimal::new(50_000, 0), 3, Decimal::new(1_000, 0)).unwrap();
        let records = vec![
            record("below", "S", 49_999),
            record("equal", "S", 50_000),
            record("above", "T", 80_000),
        ];
        let alerts = flag_large_transfers(&records, &config);
        let ids: Vec<&str> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, ["LARGE-equal", "LARGE-above"]);
        assert!(alerts.iter().all(|a| a.window_start.is_none()));
    }
}
