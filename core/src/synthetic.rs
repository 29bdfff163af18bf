//! Seeded synthetic transfer batches for demos and recall tests.
//!
//! A batch holds background traffic that never reaches the structuring
//! band, plus planted patterns whose record ids are returned so callers
//! can check the detectors find them.
//!
//! Background amounts are capped at `threshold / (4 * window * 2)` with at
//! most two transfers a day, so any background window sums to at most half
//! the threshold. Planted runs are recalled exactly while
//! `tolerance * 11 < threshold`.

use crate::{
    config::DetectionConfig,
    record::RawRecord,
    rng::{Stream, WatchRng},
    types::{Amount, RecordId},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{json, Value};

const MAX_BACKGROUND_PER_DAY: u32 = 2;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SyntheticProfile {
    pub background_senders: usize,
    pub days: u32,
    /// Chance that a background sender transfers on a given day.
    pub daily_activity: f64,
    pub structuring_runs: usize,
    pub large_transfers: usize,
    pub malformed_rows: usize,
    pub start: NaiveDate,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            background_senders: 20,
            days: 30,
            daily_activity: 0.4,
            structuring_runs: 3,
            large_transfers: 2,
            malformed_rows: 1,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticBatch {
    pub rows: Vec<RawRecord>,
    /// Each planted structuring run, records in time order.
    pub planted_structuring: Vec<Vec<RecordId>>,
    pub planted_large: Vec<RecordId>,
    pub malformed_rows: usize,
}

impl SyntheticBatch {
    pub fn generate(seed: u64, profile: &SyntheticProfile, config: &DetectionConfig) -> Self {
        let mut generator = Generator {
            batch: SyntheticBatch::default(),
            next_id: 0,
            start: profile.start.and_hms_opt(0, 0, 0).unwrap_or_default(),
        };
        generator.background(seed, profile, config);
        generator.large_transfers(seed, profile, config);
        generator.structuring(seed, profile, config);
        generator.malformed(profile);

        log::debug!(
            "Synthetic batch seed={seed}: {} rows, {} planted runs, {} planted large",
            generator.batch.rows.len(),
            generator.batch.planted_structuring.len(),
            generator.batch.planted_large.len()
        );
        generator.batch
    }
}

struct Generator {
    batch: SyntheticBatch,
    next_id: u64,
    start: NaiveDateTime,
}

impl Generator {
    fn push(&mut self, sender: &str, receiver: &str, amount: Amount, at: NaiveDateTime) -> RecordId {
        let record_id = format!("TX-{:06}", self.next_id);
        self.next_id += 1;
        self.batch.rows.push(row(json!({
            "record_id": record_id,
            "sender_id": sender,
            "receiver_id": receiver,
            "amount": amount.to_string(),
            "timestamp": at.format(TIMESTAMP_FORMAT).to_string(),
        })));
        record_id
    }

    fn at(&self, rng: &mut WatchRng, day: u32) -> NaiveDateTime {
        let minute = rng.range_inclusive(8 * 60, 18 * 60 - 1);
        self.start + Duration::days(i64::from(day)) + Duration::minutes(minute)
    }

    fn background(&mut self, seed: u64, profile: &SyntheticProfile, config: &DetectionConfig) {
        let mut rng = WatchRng::new(seed, Stream::Background);
        let divisor = 4 * i64::from(config.transfer_days_window) * i64::from(MAX_BACKGROUND_PER_DAY);
        let cap = config.large_amount_threshold / Decimal::from(divisor);

        for sender in 0..profile.background_senders {
            let sender_id = format!("ACC-{sender:04}");
            for day in 0..profile.days {
                for _ in 0..MAX_BACKGROUND_PER_DAY {
                    if !rng.chance(profile.daily_activity) {
                        continue;
                    }
                    let basis_points = (rng.pareto(0.05, 1.5) * 10_000.0).min(10_000.0) as i64;
                    let amount = (cap * Decimal::new(basis_points, 4))
                        .round_dp(2)
                        .max(Decimal::new(1, 2));
                    let receiver = format!("PAYEE-{:03}", rng.next_u64_below(50));
                    let at = self.at(&mut rng, day);
                    self.push(&sender_id, &receiver, amount, at);
                }
            }
        }
    }

    fn large_transfers(&mut self, seed: u64, profile: &SyntheticProfile, config: &DetectionConfig) {
        let mut rng = WatchRng::new(seed, Stream::LargeTransfers);
        let senders = profile.background_senders.max(1) as u64;
        for _ in 0..profile.large_transfers {
            let sender_id = format!("ACC-{:04}", rng.next_u64_below(senders));
            // Between 1x and 3x the threshold.
            let factor = Decimal::new(rng.range_inclusive(100, 300), 2);
            let amount = (config.large_amount_threshold * factor).round_dp(2);
            let day = rng.next_u64_below(u64::from(profile.days.max(1))) as u32;
            let at = self.at(&mut rng, day);
            let id = self.push(&sender_id, "OFFSHORE-001", amount, at);
            self.batch.planted_large.push(id);
        }
    }

    fn structuring(&mut self, seed: u64, profile: &SyntheticProfile, config: &DetectionConfig) {
        if config.transfer_amount_tolerance <= Decimal::ZERO && profile.structuring_runs > 0 {
            log::warn!("Zero tolerance leaves an empty structuring band; no runs planted");
            return;
        }
        let mut rng = WatchRng::new(seed, Stream::Structuring);
        let window = config.transfer_days_window;

        for run in 0..profile.structuring_runs {
            let sender_id = format!("MULE-{run:03}");
            let parts = rng.range_inclusive(2, 4) as usize;

            // Target strictly inside [floor, threshold).
            let fraction = Decimal::new(rng.range_inclusive(0, 9_999), 4);
            let target = (config.structuring_floor() + config.transfer_amount_tolerance * fraction)
                .round_dp(2)
                .min(config.large_amount_threshold - Decimal::new(1, 2));

            let weights: Vec<i64> = (0..parts).map(|_| rng.range_inclusive(1, 3)).collect();
            let weight_sum: i64 = weights.iter().sum();
            let mut remaining = target;
            let mut amounts = Vec::with_capacity(parts);
            for (i, weight) in weights.iter().enumerate() {
                let amount = if i + 1 == parts {
                    remaining
                } else {
                    (target * Decimal::from(*weight) / Decimal::from(weight_sum)).round_dp(2)
                };
                remaining -= amount;
                amounts.push(amount);
            }

            let latest_start = profile.days.saturating_sub(window);
            let first_day = rng.next_u64_below(u64::from(latest_start) + 1) as u32;
            let mut days: Vec<u32> = (0..parts)
                .map(|_| first_day + rng.next_u64_below(u64::from(window)) as u32)
                .collect();
            days.sort_unstable();

            let mut stamps: Vec<NaiveDateTime> = days.iter().map(|d| self.at(&mut rng, *d)).collect();
            stamps.sort_unstable();

            let ids: Vec<RecordId> = amounts
                .into_iter()
                .zip(stamps)
                .enumerate()
                .map(|(i, (amount, at))| {
                    let receiver = format!("DROP-{run:03}-{i}");
                    self.push(&sender_id, &receiver, amount, at)
                })
                .collect();
            self.batch.planted_structuring.push(ids);
        }
    }

    fn malformed(&mut self, profile: &SyntheticProfile) {
        for n in 0..profile.malformed_rows {
            let bad = match n % 3 {
                0 => json!({ "record_id": format!("BAD-{n}"), "sender_id": "ACC-0000" }),
                1 => json!({
                    "record_id": format!("BAD-{n}"),
                    "sender_id": "ACC-0000",
                    "receiver_id": "PAYEE-000",
                    "amount": "-10",
                    "timestamp": "2024-01-01",
                }),
                _ => json!({
                    "record_id": format!("BAD-{n}"),
                    "sender_id": "ACC-0000",
                    "receiver_id": "PAYEE-000",
                    "amount": "10",
                    "timestamp": "yesterday",
                }),
            };
            self.batch.rows.push(row(bad));
            self.batch.malformed_rows += 1;
        }
    }
}

fn row(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}
