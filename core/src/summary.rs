//! Reporting views over an evaluation: per-sender activity and
//! sender → receiver fund flows.

use crate::{
    alert::{Alert, AlertKind},
    detector::group_by_sender,
    record::TransferRecord,
    types::{Amount, PartyId, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSummary {
    pub sender_id: PartyId,
    pub transfer_count: usize,
    /// Saturates at `Decimal::MAX`.
    pub total_amount: Amount,
    pub first_transfer: Timestamp,
    pub last_transfer: Timestamp,
    pub large_transfer_alerts: usize,
    pub structuring_alerts: usize,
}

impl SenderSummary {
    pub fn alert_count(&self) -> usize {
        self.large_transfer_alerts + self.structuring_alerts
    }
}

/// Outgoing movement from one sender to one receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub sender_id: PartyId,
    pub receiver_id: PartyId,
    pub transfer_count: usize,
    /// Saturates at `Decimal::MAX`.
    pub total_amount: Amount,
}

/// One summary per sender with at least one record, in sender order.
pub fn summarize(records: &[TransferRecord], alerts: &[Alert]) -> Vec<SenderSummary> {
    let mut by_subject: HashMap<&str, (usize, usize)> = HashMap::new();
    for alert in alerts {
        let counts = by_subject.entry(alert.subject_id.as_str()).or_default();
        match alert.kind {
            AlertKind::SingleLargeTransfer => counts.0 += 1,
            AlertKind::StructuredTransfers => counts.1 += 1,
        }
    }

    group_by_sender(records)
        .into_iter()
        .filter_map(|history| {
            let first = history.records.first()?;
            let last = history.records.last()?;
            let (large, structuring) =
                by_subject.get(history.sender_id).copied().unwrap_or_default();
            Some(SenderSummary {
                sender_id: history.sender_id.to_string(),
                transfer_count: history.records.len(),
                total_amount: saturating_total(history.records.iter().map(|r| r.amount)),
                first_transfer: first.timestamp,
                last_transfer: last.timestamp,
                large_transfer_alerts: large,
                structuring_alerts: structuring,
            })
        })
        .collect()
}

/// Count and total per (sender, receiver) pair, ordered by sender then receiver.
pub fn summarize_flows(records: &[TransferRecord]) -> Vec<FlowSummary> {
    let mut flows: BTreeMap<(&str, &str), (usize, Amount)> = BTreeMap::new();
    for record in records {
        let entry = flows
            .entry((record.sender_id.as_str(), record.receiver_id.as_str()))
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(record.amount);
    }

    flows
        .into_iter()
        .map(|((sender, receiver), (count, total))| FlowSummary {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            transfer_count: count,
            total_amount: total,
        })
        .collect()
}

fn saturating_total(amounts: impl Iterator<Item = Amount>) -> Amount {
    amounts.fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount))
}
