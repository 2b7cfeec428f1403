//! Append-only audit trail of ingest attempts, one JSON object per line

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Hex SHA-256 of an uploaded payload
pub fn payload_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Trained,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub run_id: Uuid,
    pub at: DateTime<Utc>,
    pub filename: String,
    pub payload_sha256: String,
    pub rows_received: Option<usize>,
    pub rows_normalized: Option<usize>,
    pub history_rows: Option<usize>,
    pub artifact_id: Option<Uuid>,
    pub r2: Option<f64>,
    pub outcome: IngestOutcome,
    /// Error classification when rejected
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl IngestRecord {
    pub fn started(filename: &str, payload: &[u8]) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            at: Utc::now(),
            filename: filename.to_string(),
            payload_sha256: payload_sha256_hex(payload),
            rows_received: None,
            rows_normalized: None,
            history_rows: None,
            artifact_id: None,
            r2: None,
            outcome: IngestOutcome::Rejected,
            error_kind: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestLog {
    path: PathBuf,
}

impl IngestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &IngestRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Every record in the log, oldest first
    pub fn read_all(&self) -> Result<Vec<IngestRecord>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            payload_sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_append_then_read_back_in_order() {
        let dir = tempdir().unwrap();
        let log = IngestLog::new(dir.path().join("audit/ingest.ndjson"));

        let first = IngestRecord::started("a.csv", b"1");
        let mut second = IngestRecord::started("b.csv", b"2");
        second.outcome = IngestOutcome::Trained;
        second.r2 = Some(0.9);
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filename, "a.csv");
        assert_eq!(records[1].outcome, IngestOutcome::Trained);
        assert_ne!(records[0].run_id, records[1].run_id);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        assert!(IngestLog::new(dir.path().join("none.ndjson")).read_all().unwrap().is_empty());
    }
}
