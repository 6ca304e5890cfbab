// JSONL file operations

use eyre::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Append a record to a JSONL file under an exclusive lock
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open JSONL file for appending")?;

    file.lock_exclusive().context("Failed to acquire file lock")?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    file.sync_all()?; // Ensure data is flushed to disk

    // Lock is released when file is dropped
    Ok(())
}

/// Tombstone line marking a record as deleted
pub fn tombstone(id: &str, updated_at: i64) -> Value {
    serde_json::json!({
        "id": id,
        "deleted": true,
        "updated_at": updated_at,
    })
}

/// Whether a JSONL line is a deletion marker
pub fn is_tombstone(value: &Value) -> bool {
    value.get("deleted").and_then(Value::as_bool).unwrap_or(false)
}

/// `updated_at` of a raw line, accepting numbers only
pub fn updated_at_of(value: &Value) -> i64 {
    value.get("updated_at").and_then(Value::as_i64).unwrap_or(0)
}

/// Read all lines from a JSONL file, returning the latest version per ID
///
/// Lines without a string "id" are skipped. For duplicate IDs the line with
/// the highest updated_at wins; on a tie the later line wins, since appends
/// are chronological. Tombstones are returned like any other line.
pub fn read_jsonl_latest(path: &Path) -> Result<HashMap<String, Value>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut records: HashMap<String, Value> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let record: Value = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
                continue;
            }
        };

        let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_string) else {
            warn!(file = ?path, line = line_num + 1, "Line has no id, skipping");
            continue;
        };

        let newer = records
            .get(&id)
            .is_none_or(|existing| updated_at_of(&record) >= updated_at_of(existing));
        if newer {
            records.insert(id, record);
        }
    }

    info!(
        file = ?path,
        count = records.len(),
        "Loaded latest records from JSONL"
    );

    Ok(records)
}
