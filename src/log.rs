//! Append-only event log
//!
//! Classification events from both producers land here as one JSON
//! object per line. The backend is pluggable behind [`EventStore`]: a
//! newline-delimited file for real deployments, an in-memory store for
//! tests and single-process embedding.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::error::{GuardError, Result};
use crate::types::{LogRecord, RawEvent};

/// Backend contract for the append-only event log
///
/// Appends are serialized so lines never interleave mid-write. Reads
/// tolerate an actively growing log and skip entries that do not parse,
/// never aborting the scan.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one record as a single line
    async fn append(&self, record: &LogRecord) -> Result<()>;

    /// Read every stored event in append order, skipping malformed entries
    async fn read_all(&self) -> Result<Vec<RawEvent>>;

    /// Remove all records (test/reset flows only)
    async fn clear(&self) -> Result<()>;
}

/// Newline-delimited JSON file store
///
/// One async mutex serializes appenders. Reads open the file
/// independently of the lock and tolerate a concurrent in-progress
/// append by skipping the trailing partial line.
pub struct FileEventStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FileEventStore {
    /// Create a store writing to the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// The log file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GuardError::io(format!("creating log directory {}", parent.display()), e)
                })?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| GuardError::io(format!("opening log file {}", self.path.display()), e))?;

        file.write_all(line.as_bytes()).await.map_err(|e| {
            GuardError::io(format!("appending to log file {}", self.path.display()), e)
        })?;
        file.flush().await.map_err(|e| {
            GuardError::io(format!("flushing log file {}", self.path.display()), e)
        })?;

        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<RawEvent>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GuardError::io(
                    format!("reading log file {}", self.path.display()),
                    e,
                ))
            }
        };

        Ok(parse_log_lines(&raw))
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GuardError::io(
                format!("removing log file {}", self.path.display()),
                e,
            )),
        }
    }
}

/// Parse newline-delimited JSON into events, skipping what doesn't parse
///
/// A trailing partial line left by an in-progress append fails to parse
/// like any other malformed line and is skipped with a warning.
fn parse_log_lines(raw: &[u8]) -> Vec<RawEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut events = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(error = %e, line = %line, "skipping malformed log line");
            }
        }
    }
    events
}

/// In-memory event store for tests and single-process embedding
///
/// Reads convert through the same tolerant event type as the file store
/// so both backends expose identical semantics.
#[derive(Default)]
pub struct MemoryEventStore {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when nothing has been appended
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<RawEvent>> {
        let records = self.records.read().await;
        Ok(records.iter().map(RawEvent::from).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
