use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use warden_core::contracts::AuditRecord;
use warden_core::errors::AuditError;
use warden_core::traits::AuditSink;
use warden_digest::sha256_bytes;

pub const GENESIS: &str = "genesis";

fn line_hash(line: &str) -> String {
    sha256_bytes(line.as_bytes()).prefixed()
}

/// Append-only JSONL sink with a hash chain.
///
/// Each line carries `prev_hash`: the SHA-256 of the previous line, or
/// `"genesis"` for the first one. Every append is flushed and synced before
/// returning; any I/O error is returned to the caller. Only one sink instance
/// should write a given file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    head: Mutex<Option<String>>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            head: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_head(&self) -> Result<String, AuditError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GENESIS.to_string()),
            Err(e) => return Err(e.into()),
        };
        let mut head = GENESIS.to_string();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                head = line_hash(&line);
            }
        }
        Ok(head)
    }

    /// Append any serializable JSON object, chaining it to the previous line.
    pub fn append_value<T: Serialize + ?Sized>(&self, entry: &T) -> Result<String, AuditError> {
        let mut head = self.head.lock().unwrap_or_else(PoisonError::into_inner);
        let prev_hash = match head.as_ref() {
            Some(h) => h.clone(),
            None => self.read_head()?,
        };

        let mut value = serde_json::to_value(entry).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let Value::Object(obj) = &mut value else {
            return Err(AuditError::InvalidRecord("audit entry must be a JSON object".into()));
        };
        obj.insert("prev_hash".into(), Value::String(prev_hash));
        let line = serde_json::to_string(&value).map_err(|e| AuditError::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        file.sync_data()?;

        let hash = line_hash(&line);
        *head = Some(hash.clone());
        Ok(hash)
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.append_value(record).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub entries: u64,
    pub head: String,
}

/// Walk the chain and report the entry count and head hash.
pub fn verify_chain(path: &Path) -> Result<ChainSummary> {
    let file = File::open(path).with_context(|| format!("cannot read audit {}", path.display()))?;
    let mut entries = 0u64;
    let mut head = GENESIS.to_string();

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("cannot read line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: Value =
            serde_json::from_str(&line).with_context(|| format!("invalid JSON at line {}", i + 1))?;
        let prev = entry.get("prev_hash").and_then(Value::as_str).unwrap_or("");
        if prev != head {
            bail!(
                "{}: expected prev_hash '{head}', got '{prev}'",
                AuditError::ChainCorruption(entries)
            );
        }
        head = line_hash(&line);
        entries += 1;
    }

    Ok(ChainSummary { entries, head })
}
