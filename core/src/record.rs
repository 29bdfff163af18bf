//! Record model and the validation boundary.
//!
//! Raw rows arrive as loose maps of primitive fields. Everything past
//! `validate_batch` works on `TransferRecord`s only. A bad row becomes a
//! `Rejection`; it never fails the batch.

use crate::types::{Amount, PartyId, RecordId, Timestamp};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, str::FromStr};
use thiserror::Error;

/// One untyped input row, as handed over by an ingestion collaborator.
pub type RawRecord = serde_json::Map<String, Value>;

pub const FIELD_RECORD_ID: &str = "record_id";
pub const FIELD_SENDER_ID: &str = "sender_id";
pub const FIELD_RECEIVER_ID: &str = "receiver_id";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_DESCRIPTION: &str = "description";

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// A validated, immutable financial transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub record_id: RecordId,
    pub sender_id: PartyId,
    pub receiver_id: PartyId,
    pub amount: Amount,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Why a single raw record was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' has unsupported type {found}")]
    InvalidField { field: String, found: String },

    #[error("amount '{value}' is not a number")]
    InvalidAmount { value: String },

    #[error("amount {value} must be > 0")]
    NonPositiveAmount { value: String },

    #[error("timestamp '{value}' cannot be parsed")]
    UnparseableTimestamp { value: String },

    /// The row at `first_index` with the same id was kept.
    #[error("duplicate record_id, first seen at row {first_index}")]
    DuplicateRecordId { first_index: usize },
}

/// A rejected input row and the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Position of the row in the raw batch.
    pub index: usize,
    pub record_id: Option<RecordId>,
    #[serde(flatten)]
    pub reason: ValidationError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub records: Vec<TransferRecord>,
    pub rejections: Vec<Rejection>,
}

/// Validate a raw batch. Partial success: every good row is kept.
pub fn validate_batch(raw: &[RawRecord]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    let mut seen: HashMap<RecordId, usize> = HashMap::with_capacity(raw.len());

    for (index, row) in raw.iter().enumerate() {
        match validate_record(row) {
            Ok(record) => {
                if let Some(&first_index) = seen.get(&record.record_id) {
                    outcome.rejections.push(Rejection {
                        index,
                        record_id: Some(record.record_id),
                        reason: ValidationError::DuplicateRecordId { first_index },
                    });
                    continue;
                }
                seen.insert(record.record_id.clone(), index);
                outcome.records.push(record);
            }
            Err(reason) => {
                let record_id = text_field(row, FIELD_RECORD_ID).ok();
                outcome.rejections.push(Rejection { index, record_id, reason });
            }
        }
    }

    log::debug!(
        "Validated {} raw records: {} accepted, {} rejected",
        raw.len(),
        outcome.records.len(),
        outcome.rejections.len()
    );
    outcome
}

/// Validate one raw row.
pub fn validate_record(row: &RawRecord) -> Result<TransferRecord, ValidationError> {
    let record_id = text_field(row, FIELD_RECORD_ID)?;
    let sender_id = text_field(row, FIELD_SENDER_ID)?;
    let receiver_id = text_field(row, FIELD_RECEIVER_ID)?;
    let amount = parse_amount(required(row, FIELD_AMOUNT)?)?;
    let timestamp = parse_timestamp(required(row, FIELD_TIMESTAMP)?)?;
    let description = row
        .get(FIELD_DESCRIPTION)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(TransferRecord {
        record_id,
        sender_id,
        receiver_id,
        amount,
        timestamp,
        description,
    })
}

fn required<'a>(row: &'a RawRecord, field: &str) -> Result<&'a Value, ValidationError> {
    match row.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { field: field.into() }),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::MissingField { field: field.into() })
        }
        Some(value) => Ok(value),
    }
}

/// Identifiers may arrive as strings or as bare numbers (account numbers).
fn text_field(row: &RawRecord, field: &str) -> Result<String, ValidationError> {
    match required(row, field)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ValidationError::InvalidField {
            field: field.into(),
            found: type_name(other).into(),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a positive amount from a JSON number or a numeric string.
pub fn parse_amount(value: &Value) -> Result<Amount, ValidationError> {
    let amount = match value {
        Value::Number(n) => parse_amount_str(&n.to_string()),
        Value::String(s) => parse_amount_str(s),
        other => {
            return Err(ValidationError::InvalidField {
                field: FIELD_AMOUNT.into(),
                found: type_name(other).into(),
            })
        }
    };
    let amount = amount.ok_or_else(|| ValidationError::InvalidAmount {
        value: value_text(value),
    })?;
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount {
            value: amount.to_string(),
        });
    }
    Ok(amount)
}

/// Parse a decimal, tolerating thousands separators and exponent notation.
pub fn parse_amount_str(raw: &str) -> Option<Amount> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
        .map(|d| d.normalize())
}

/// Parse a timestamp string. Offset-bearing values are converted to UTC.
pub fn parse_timestamp(value: &Value) -> Result<Timestamp, ValidationError> {
    let raw = match value {
        Value::String(s) => s.trim(),
        other => {
            return Err(ValidationError::InvalidField {
                field: FIELD_TIMESTAMP.into(),
                found: type_name(other).into(),
            })
        }
    };
    parse_timestamp_str(raw).ok_or_else(|| ValidationError::UnparseableTimestamp {
        value: raw.to_string(),
    })
}

pub fn parse_timestamp_str(raw: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
