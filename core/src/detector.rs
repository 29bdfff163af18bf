//! Detector trait and per-sender partitioning.
//!
//! RULE: every detector implements `Detector`.
//! The engine runs detectors in registration order, once per sender.
//! Senders are disjoint, so detectors never see another sender's records
//! and share nothing mutable.

use crate::{alert::Alert, config::DetectionConfig, record::TransferRecord};
use std::collections::BTreeMap;

/// One sender's records for a single evaluation, sorted by
/// `(timestamp, record_id)`.
#[derive(Debug, Clone)]
pub struct SenderHistory<'a> {
    pub sender_id: &'a str,
    pub records: Vec<&'a TransferRecord>,
}

impl<'a> SenderHistory<'a> {
    pub fn new(sender_id: &'a str, mut records: Vec<&'a TransferRecord>) -> Self {
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        Self { sender_id, records }
    }
}

/// Partition records by sender. Senders come out in ascending id order.
pub fn group_by_sender(records: &[TransferRecord]) -> Vec<SenderHistory<'_>> {
    let mut groups: BTreeMap<&str, Vec<&TransferRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.sender_id.as_str()).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(sender_id, records)| SenderHistory::new(sender_id, records))
        .collect()
}

/// The contract every detector must fulfil.
pub trait Detector: Send + Sync {
    /// Unique stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Inspect one sender's history. Must be a pure function of its inputs.
    fn detect(&self, history: &SenderHistory<'_>, config: &DetectionConfig) -> Vec<Alert>;
}
