//! SQLite case store: the persistence collaborator.
//!
//! RULE: only store.rs talks to the database, and the engine never
//! calls the store. Callers load a case's history from here, hand it to
//! the engine, and save the evaluation back.

use crate::{
    alert::Alert,
    config::DetectionConfig,
    engine::Evaluation,
    error::{WatchError, WatchResult},
    record::{Rejection, TransferRecord},
    types::{CaseName, EvaluationId},
};
use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Metadata of one persisted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub evaluation_id: EvaluationId,
    pub case_name: CaseName,
    pub created_at: String,
    pub record_count: i64,
    pub rejection_count: i64,
    pub alert_count: i64,
}

pub struct TransferStore {
    conn: Connection,
}

impl TransferStore {
    /// Open (or create) the case database at `path`.
    pub fn open(path: &str) -> WatchResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> WatchResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> WatchResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Cases ──────────────────────────────────────────────────

    pub fn create_case(&self, name: &str) -> WatchResult<()> {
        if self.case_exists(name)? {
            return Err(WatchError::CaseExists { name: name.into() });
        }
        self.conn.execute(
            "INSERT INTO watch_case (name, created_at) VALUES (?1, ?2)",
            params![name, now_text()],
        )?;
        log::info!("Created case {name}");
        Ok(())
    }

    /// Create the case unless it already exists.
    pub fn ensure_case(&self, name: &str) -> WatchResult<()> {
        if !self.case_exists(name)? {
            self.create_case(name)?;
        }
        Ok(())
    }

    /// Delete a case and everything stored under it.
    pub fn delete_case(&self, name: &str) -> WatchResult<()> {
        self.require_case(name)?;
        // Transfers, evaluations and alerts go with it via ON DELETE CASCADE.
        self.conn
            .execute("DELETE FROM watch_case WHERE name = ?1", params![name])?;
        log::info!("Deleted case {name}");
        Ok(())
    }

    pub fn case_exists(&self, name: &str) -> WatchResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM watch_case WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_cases(&self) -> WatchResult<Vec<CaseName>> {
        let mut stmt = self.conn.prepare("SELECT name FROM watch_case ORDER BY name ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn require_case(&self, name: &str) -> WatchResult<()> {
        if self.case_exists(name)? {
            Ok(())
        } else {
            Err(WatchError::CaseNotFound { name: name.into() })
        }
    }

    // ── Transfers ──────────────────────────────────────────────

    /// Insert records into a case. Records whose `record_id` is already
    /// stored for the case are left untouched. Returns the number inserted.
    pub fn upsert_records(&self, case: &str, records: &[TransferRecord]) -> WatchResult<usize> {
        self.require_case(case)?;
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO transfer
                 (case_name, record_id, sender_id, receiver_id, amount, timestamp, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    case,
                    record.record_id,
                    record.sender_id,
                    record.receiver_id,
                    record.amount.to_string(),
                    record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    record.description,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("Case {case}: {inserted} of {} records inserted", records.len());
        Ok(inserted)
    }

    /// Full history of a case, ordered by time.
    pub fn records_for_case(&self, case: &str) -> WatchResult<Vec<TransferRecord>> {
        self.require_case(case)?;
        let mut stmt = self.conn.prepare(
            "SELECT record_id, sender_id, receiver_id, amount, timestamp, description
             FROM transfer WHERE case_name = ?1
             ORDER BY timestamp ASC, record_id ASC",
        )?;
        let records = stmt
            .query_map(params![case], |row| {
                let amount: String = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok(TransferRecord {
                    record_id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    amount: Decimal::from_str(&amount)
                        .map_err(|e| conversion_error(3, Box::new(e)))?,
                    timestamp: NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
                        .map_err(|e| conversion_error(4, Box::new(e)))?,
                    description: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn record_count(&self, case: &str) -> WatchResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM transfer WHERE case_name = ?1",
            params![case],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Evaluations ────────────────────────────────────────────

    /// Persist an evaluation and its alerts. Returns the new evaluation id.
    pub fn save_evaluation(
        &self,
        case: &str,
        config: &DetectionConfig,
        evaluation: &Evaluation,
    ) -> WatchResult<EvaluationId> {
        self.require_case(case)?;
        let evaluation_id = uuid::Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO evaluation
             (evaluation_id, case_name, created_at, config_json,
              record_count, rejection_count, alert_count, rejections_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                evaluation_id,
                case,
                now_text(),
                serde_json::to_string(config)?,
                evaluation.records.len() as i64,
                evaluation.rejections.len() as i64,
                evaluation.alerts.len() as i64,
                serde_json::to_string(&evaluation.rejections)?,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO alert
                 (evaluation_id, position, alert_id, kind, subject_id, total_amount, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, alert) in evaluation.alerts.iter().enumerate() {
                stmt.execute(params![
                    evaluation_id,
                    position as i64,
                    alert.alert_id,
                    alert.kind.label(),
                    alert.subject_id,
                    alert.total_amount.to_string(),
                    serde_json::to_string(alert)?,
                ])?;
            }
        }
        tx.commit()?;
        log::info!(
            "Case {case}: saved evaluation {evaluation_id} ({} alerts)",
            evaluation.alerts.len()
        );
        Ok(evaluation_id)
    }

    /// Alerts of one evaluation, in report order.
    pub fn alerts_for_evaluation(&self, evaluation_id: &str) -> WatchResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM alert WHERE evaluation_id = ?1 ORDER BY position ASC",
        )?;
        let payloads = stmt
            .query_map(params![evaluation_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(WatchError::from))
            .collect()
    }

    pub fn rejections_for_evaluation(&self, evaluation_id: &str) -> WatchResult<Vec<Rejection>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT rejections_json FROM evaluation WHERE evaluation_id = ?1",
                params![evaluation_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Most recently saved evaluation of a case.
    pub fn latest_evaluation(&self, case: &str) -> WatchResult<Option<EvaluationRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT evaluation_id, case_name, created_at,
                        record_count, rejection_count, alert_count
                 FROM evaluation WHERE case_name = ?1
                 ORDER BY id DESC LIMIT 1",
                params![case],
                |row| {
                    Ok(EvaluationRow {
                        evaluation_id: row.get(0)?,
                        case_name: row.get(1)?,
                        created_at: row.get(2)?,
                        record_count: row.get(3)?,
                        rejection_count: row.get(4)?,
                        alert_count: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn conversion_error(column: usize, err: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err)
}

fn now_text() -> String {
    chrono::Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}
