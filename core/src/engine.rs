//! The evaluation engine: the single entry point for callers.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Validation        raw rows → TransferRecords + Rejections
//!   2. Partition         records grouped by sender
//!   3. Detectors         per sender, in registration order:
//!        a. LargeTransferFlagger
//!        b. StructuringDetector
//!   4. Aggregation       dedupe, drop dangling references, order
//!
//! RULES:
//!   - The engine owns no state between calls. History spanning several
//!     calls is assembled by the caller and passed in as records.
//!   - Detectors only ever see one sender's records at a time.
//!   - Configuration is validated once, in `WatchEngine::new`.

use crate::{
    alert::{aggregate, Alert, AlertKind},
    config::DetectionConfig,
    detector::{group_by_sender, Detector, SenderHistory},
    error::{ConfigError, WatchResult},
    large_transfer::LargeTransferFlagger,
    record::{validate_batch, RawRecord, Rejection, TransferRecord},
    structuring::StructuringDetector,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Result of one evaluation call. Alerts and rejections are kept apart:
/// "could not parse" is never "flagged as suspicious".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub alerts: Vec<Alert>,
    pub rejections: Vec<Rejection>,
    /// The validated records the alerts refer to.
    pub records: Vec<TransferRecord>,
}

impl Evaluation {
    pub fn count_of(&self, kind: AlertKind) -> usize {
        self.alerts.iter().filter(|a| a.kind == kind).count()
    }
}

pub struct WatchEngine {
    config: DetectionConfig,
    detectors: Vec<Box<dyn Detector>>,
    workers: NonZeroUsize,
}

impl std::fmt::Debug for WatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchEngine")
            .field("config", &self.config)
            .field("detectors", &self.detector_names())
            .field("workers", &self.workers)
            .finish()
    }
}

impl WatchEngine {
    /// Build an engine with the standard detectors registered.
    pub fn new(config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut engine = Self {
            config,
            detectors: Vec::new(),
            workers: NonZeroUsize::MIN,
        };
        engine.register(Box::new(LargeTransferFlagger));
        engine.register(Box::new(StructuringDetector));
        Ok(engine)
    }

    /// Spread per-sender detection over `workers` scoped threads.
    /// Output is identical to the single-threaded path.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Register a detector. Call in the documented execution order.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Validate a raw batch and evaluate every accepted record.
    pub fn evaluate(&self, raw: &[RawRecord]) -> Evaluation {
        let outcome = validate_batch(raw);
        let alerts = self.evaluate_records(&outcome.records);

        log::info!(
            "Evaluated {} rows: {} records, {} rejections, {} large, {} structuring",
            raw.len(),
            outcome.records.len(),
            outcome.rejections.len(),
            alerts.iter().filter(|a| a.kind == AlertKind::SingleLargeTransfer).count(),
            alerts.iter().filter(|a| a.kind == AlertKind::StructuredTransfers).count(),
        );

        Evaluation {
            alerts,
            rejections: outcome.rejections,
            records: outcome.records,
        }
    }

    /// Evaluate records that already passed validation.
    pub fn evaluate_records(&self, records: &[TransferRecord]) -> Vec<Alert> {
        let histories = group_by_sender(records);
        log::debug!(
            "Running {} detectors over {} senders on {} worker(s)",
            self.detectors.len(),
            histories.len(),
            self.workers
        );

        let raw_alerts = if self.workers.get() > 1 && histories.len() > 1 {
            self.detect_parallel(&histories)
        } else {
            self.detect_all(&histories)
        };
        aggregate(raw_alerts, records)
    }

    fn detect_sender(&self, history: &SenderHistory<'_>) -> Vec<Alert> {
        self.detectors
            .iter()
            .flat_map(|detector| {
                let alerts = detector.detect(history, &self.config);
                if !alerts.is_empty() {
                    log::debug!(
                        "{}: {} alert(s) for {}",
                        detector.name(),
                        alerts.len(),
                        history.sender_id
                    );
                }
                alerts
            })
            .collect()
    }

    fn detect_all(&self, histories: &[SenderHistory<'_>]) -> Vec<Alert> {
        histories.iter().flat_map(|h| self.detect_sender(h)).collect()
    }

    fn detect_parallel(&self, histories: &[SenderHistory<'_>]) -> Vec<Alert> {
        let chunk_size = histories.len().div_ceil(self.workers.get());
        std::thread::scope(|scope| {
            let handles: Vec<_> = histories
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.detect_all(chunk)))
                .collect();
            // Joined in spawn order so the merge input is deterministic.
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(alerts) => alerts,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

/// One-shot evaluation: validate `config`, then evaluate `raw`.
pub fn evaluate(raw: &[RawRecord], config: &DetectionConfig) -> WatchResult<Evaluation> {
    let engine = WatchEngine::new(config.clone())?;
    Ok(engine.evaluate(raw))
}
