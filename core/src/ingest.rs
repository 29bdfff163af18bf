//! Ingestion adapters: files in, `RawRecord`s out.
//!
//! Adapters only reshape rows. Every typed check happens in the validator,
//! so a broken row still reaches it and comes back as a rejection.

use crate::{
    error::{WatchError, WatchResult},
    record::{
        RawRecord, FIELD_AMOUNT, FIELD_DESCRIPTION, FIELD_RECEIVER_ID, FIELD_RECORD_ID,
        FIELD_SENDER_ID, FIELD_TIMESTAMP,
    },
};
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

/// Map a column header onto its canonical field name.
fn canonical_field(header: &str) -> String {
    let normalized = header.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
    let canonical = match normalized.as_str() {
        "id" | "record" | "transaction_id" | "txn_id" => FIELD_RECORD_ID,
        "sender" | "from" | "from_account" | "source" => FIELD_SENDER_ID,
        "receiver" | "to" | "to_account" | "destination" | "beneficiary" => FIELD_RECEIVER_ID,
        "value" | "amount_out" => FIELD_AMOUNT,
        "date" | "datetime" | "time" | "transaction_date" => FIELD_TIMESTAMP,
        "memo" | "narrative" => FIELD_DESCRIPTION,
        _ => return normalized,
    };
    canonical.to_string()
}

/// Read a headed CSV. Cells are carried as strings.
pub fn read_csv<R: Read>(reader: R) -> WatchResult<Vec<RawRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(canonical_field).collect();
    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(field, cell)| (field.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }
    log::debug!("Read {} CSV rows", rows.len());
    Ok(rows)
}

/// Read a JSON array of objects.
pub fn read_json<R: Read>(reader: R) -> WatchResult<Vec<RawRecord>> {
    let values: Vec<Value> = serde_json::from_reader(reader)?;
    Ok(values.into_iter().map(into_row).collect())
}

/// Read one JSON object per line. Blank lines are skipped.
pub fn read_json_lines<R: Read>(reader: R) -> WatchResult<Vec<RawRecord>> {
    let mut rows = Vec::new();
    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => rows.push(into_row(value)),
            Err(e) => {
                log::warn!("Line {}: not valid JSON ({e}); passing an empty row", line_no + 1);
                rows.push(RawRecord::new());
            }
        }
    }
    Ok(rows)
}

/// Dispatch on file extension: `csv`, `json`, `jsonl` / `ndjson`.
pub fn read_path(path: &Path) -> WatchResult<Vec<RawRecord>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let file = File::open(path)?;
    match extension.as_str() {
        "csv" => read_csv(file),
        "json" => read_json(BufReader::new(file)),
        "jsonl" | "ndjson" => read_json_lines(file),
        _ => Err(WatchError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

fn into_row(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_headers_are_aliased() {
        let data = "\u{feff}ID,From,To,Value,Date,Memo\n\
                    t-1,S-1,R-1,\"1,500\",2024-01-05,rent\n\
                    t-2,S-1,R-2,200,2024-01-06,\n";
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][FIELD_RECORD_ID], "t-1");
        assert_eq!(rows[0][FIELD_SENDER_ID], "S-1");
        assert_eq!(rows[0][FIELD_RECEIVER_ID], "R-1");
        assert_eq!(rows[0][FIELD_AMOUNT], "1,500");
        assert_eq!(rows[0][FIELD_TIMESTAMP], "2024-01-05");
        assert_eq!(rows[0][FIELD_DESCRIPTION], "rent");
        assert!(!rows[1].contains_key(FIELD_DESCRIPTION));
    }

    #[test]
    fn short_csv_rows_are_kept() {
        let data = "record_id,sender_id,receiver_id,amount,timestamp\nt-1,S-1\n";
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn json_lines_tolerate_garbage() {
        let data = "{\"record_id\":\"a\"}\n\n not json\n[1,2]\n";
        let rows = read_json_lines(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][FIELD_RECORD_ID], "a");
        assert!(rows[1].is_empty());
        assert!(rows[2].is_empty());
    }

    #[test]
    fn json_array_rows() {
        let data = r#"[{"record_id": "a", "amount": 10}, 5]"#;
        let rows = read_json(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][FIELD_AMOUNT], 10);
        assert!(rows[1].is_empty());
    }
}
