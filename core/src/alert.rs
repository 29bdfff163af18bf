//! Alerts and the aggregation boundary.

use crate::{
    config::DetectionConfig,
    record::TransferRecord,
    types::{Amount, PartyId, RecordId, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Declaration order is the report order within one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SingleLargeTransfer,
    StructuredTransfers,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleLargeTransfer => "single_large_transfer",
            Self::StructuredTransfers => "structured_transfers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub kind: AlertKind,
    /// The sender under suspicion.
    pub subject_id: PartyId,
    /// Ordered by timestamp, never empty.
    pub contributing_records: Vec<RecordId>,
    pub total_amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<Timestamp>,
    /// Distinct receivers, sorted.
    pub counterparties: Vec<PartyId>,
    pub description: String,
}

impl Alert {
    pub fn single_large(record: &TransferRecord, config: &DetectionConfig) -> Self {
        Self {
            alert_id: format!("LARGE-{}", record.record_id),
            kind: AlertKind::SingleLargeTransfer,
            subject_id: record.sender_id.clone(),
            contributing_records: vec![record.record_id.clone()],
            total_amount: record.amount,
            window_start: None,
            window_end: None,
            counterparties: vec![record.receiver_id.clone()],
            description: format!(
                "Transfer of {} to {} on {} meets the {} threshold",
                record.amount,
                record.receiver_id,
                record.timestamp.date(),
                config.large_amount_threshold
            ),
        }
    }

    /// Build a structuring alert from a time-ordered, non-empty window.
    /// `None` when the window is empty or its total overflows.
    pub fn structured(window: &[&TransferRecord], config: &DetectionConfig) -> Option<Self> {
        let first = window.first()?;
        let last = window.last()?;
        let total = window
            .iter()
            .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(r.amount))?;
        let counterparties: BTreeSet<&str> =
            window.iter().map(|r| r.receiver_id.as_str()).collect();
        let shortfall = config.large_amount_threshold - total;

        Some(Self {
            alert_id: format!("STRUCT-{}-{}-{}", first.sender_id, first.record_id, last.record_id),
            kind: AlertKind::StructuredTransfers,
            subject_id: first.sender_id.clone(),
            contributing_records: window.iter().map(|r| r.record_id.clone()).collect(),
            total_amount: total,
            window_start: Some(first.timestamp),
            window_end: Some(last.timestamp),
            counterparties: counterparties.into_iter().map(str::to_string).collect(),
            description: format!(
                "{} transfers totaling {} between {} and {}, {} short of the {} threshold",
                window.len(),
                total,
                first.timestamp.date(),
                last.timestamp.date(),
                shortfall.max(Decimal::ZERO),
                config.large_amount_threshold
            ),
        })
    }
}

/// Merge detector output into the final report.
///
/// - alerts naming a record outside `records` are dropped;
/// - an identical record set reported twice keeps its first alert;
/// - order is subject, then kind, then earliest contributing timestamp.
pub fn aggregate(alerts: Vec<Alert>, records: &[TransferRecord]) -> Vec<Alert> {
    let index: HashMap<&str, &TransferRecord> =
        records.iter().map(|r| (r.record_id.as_str(), r)).collect();
    let mut seen: HashSet<Vec<RecordId>> = HashSet::new();
    let mut keyed: Vec<(Timestamp, Alert)> = Vec::with_capacity(alerts.len());

    for alert in alerts {
        let earliest = alert
            .contributing_records
            .iter()
            .map(|id| index.get(id.as_str()).map(|r| r.timestamp))
            .collect::<Option<Vec<_>>>()
            .and_then(|stamps| stamps.into_iter().min());
        let Some(earliest) = earliest else {
            log::warn!(
                "Dropping alert {} for {}: references records outside this evaluation",
                alert.alert_id,
                alert.subject_id
            );
            continue;
        };

        let mut record_set = alert.contributing_records.clone();
        record_set.sort();
        if !seen.insert(record_set) {
            log::debug!("Dropping duplicate alert {}", alert.alert_id);
            continue;
        }
        keyed.push((earliest, alert));
    }

    keyed.sort_by(|(ta, a), (tb, b)| {
        a.subject_id
            .cmp(&b.subject_id)
            .then(a.kind.cmp(&b.kind))
            .then(ta.cmp(tb))
            .then_with(|| a.alert_id.cmp(&b.alert_id))
    });
    keyed.into_iter().map(|(_, alert)| alert).collect()
}
