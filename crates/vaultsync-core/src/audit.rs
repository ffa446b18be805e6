//! Audit trail for vault operations
//!
//! Every request produces exactly one [`AuditRecord`]. Sinks are
//! fire-and-forget: [`AuditSink::record`] returns nothing, and a sink that
//! fails to persist a record logs the failure and carries on.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Kind of vault operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Read,
    Write,
}

/// Outcome tag of an audited request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Ok,
    NotFound,
    InvalidBody,
    InvalidVersion,
    VersionConflict,
    StorageError,
    Unauthorized,
    Forbidden,
    RateLimited,
}

impl AuditOutcome {
    /// HTTP-style result code for this outcome
    pub fn result_code(&self) -> u16 {
        match self {
            AuditOutcome::Ok => 200,
            AuditOutcome::InvalidBody | AuditOutcome::InvalidVersion => 400,
            AuditOutcome::Unauthorized => 401,
            AuditOutcome::Forbidden => 403,
            AuditOutcome::NotFound => 404,
            AuditOutcome::VersionConflict => 409,
            AuditOutcome::RateLimited => 429,
            AuditOutcome::StorageError => 500,
        }
    }
}

/// One audited request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub operation: AuditOperation,
    pub result_code: u16,
    pub client_address: String,
    pub outcome: AuditOutcome,
    /// Version written, read, or reported as conflicting
    pub vault_version: Option<i64>,
}

impl AuditRecord {
    pub fn new(
        user_id: impl Into<String>,
        operation: AuditOperation,
        outcome: AuditOutcome,
        client_address: impl Into<String>,
        vault_version: Option<i64>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.into(),
            operation,
            result_code: outcome.result_code(),
            client_address: client_address.into(),
            outcome,
            vault_version,
        }
    }
}

/// Receiver of audit records
pub trait AuditSink: Send + Sync {
    /// Record an entry. Must not panic or block for long.
    fn record(&self, record: AuditRecord);
}

/// Emits each record as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "vaultsync::audit",
            user_id = %record.user_id,
            operation = ?record.operation,
            result_code = record.result_code,
            client = %record.client_address,
            outcome = ?record.outcome,
            vault_version = ?record.vault_version,
            "vault operation"
        );
    }
}

/// Appends records to a JSON-lines file
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating it and its parent directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file.lock().write_all(line.as_bytes())?;
        Ok(())
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            tracing::warn!(
                "Audit record for '{}' dropped ({}): {}",
                record.user_id,
                self.path.display(),
                e
            );
        }
    }
}

/// Keeps the most recent records in memory
#[derive(Debug)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditRecord>>,
    max_entries: usize,
}

impl MemoryAuditSink {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    /// Most recent entries, newest first
    pub fn recent(&self, count: usize) -> Vec<AuditRecord> {
        let entries = self.entries.read();
        entries.iter().rev().take(count).cloned().collect()
    }

    /// All retained entries, oldest first
    pub fn all(&self) -> Vec<AuditRecord> {
        self.entries.read().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        let mut entries = self.entries.write();
        entries.push(record);

        if entries.len() > self.max_entries {
            let remove_count = entries.len() - self.max_entries;
            entries.drain(0..remove_count);
        }
    }
}
