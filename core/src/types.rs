//! Shared primitive types used across the detection engine.

/// Stable identifier of a transfer record, unique within one batch.
pub type RecordId = String;

/// Identifier of a sender or receiver account.
pub type PartyId = String;

/// Name of a case (one investigation) in the store.
pub type CaseName = String;

/// Identifier assigned to a persisted evaluation.
pub type EvaluationId = String;

/// Monetary amount. Always exact decimal, never float.
pub type Amount = rust_decimal::Decimal;

/// Transfer timestamp, normalised to a single zone.
pub type Timestamp = chrono::NaiveDateTime;
