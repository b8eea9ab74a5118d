//! Durable record of execution attempts.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::JournalResult;
use crate::types::ErrorKind;

/// One execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry identifier, reported as the result's log reference.
    pub id: Uuid,
    /// Originating request.
    pub request_id: Uuid,
    /// Tool name.
    pub tool: String,
    /// Capability name.
    pub capability: String,
    /// Calling user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time spent dispatching, in milliseconds.
    pub duration_ms: u64,
    /// When the attempt finished.
    pub recorded_at: DateTime<Utc>,
}

/// Sink for execution attempts.
#[async_trait]
pub trait ExecutionJournal: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: &JournalEntry) -> JournalResult<()>;

    /// Returns the most recent `limit` entries, oldest first.
    async fn tail(&self, limit: usize) -> JournalResult<Vec<JournalEntry>>;
}

/// File-backed journal writing newline-delimited JSON entries.
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl std::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournal").field("path", &self.path).finish_non_exhaustive()
    }
}

impl FileJournal {
    /// Opens the journal at `path` for appending, creating the file and its
    /// parent directories when missing.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> JournalResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExecutionJournal for FileJournal {
    async fn append(&self, entry: &JournalEntry) -> JournalResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }

    async fn tail(&self, limit: usize) -> JournalResult<Vec<JournalEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let data = {
            let _guard = self.file.lock().await;
            fs::read(&self.path).await?
        };
        let mut entries = data
            .split(|byte| *byte == b'\n')
            .filter(|chunk| !chunk.is_empty())
            .map(serde_json::from_slice)
            .collect::<Result<Vec<JournalEntry>, _>>()?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }
}

/// In-memory journal, mostly for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: StdMutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("journal poisoned").len()
    }

    /// Returns `true` when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExecutionJournal for MemoryJournal {
    async fn append(&self, entry: &JournalEntry) -> JournalResult<()> {
        self.entries.lock().expect("journal poisoned").push(entry.clone());
        Ok(())
    }

    async fn tail(&self, limit: usize) -> JournalResult<Vec<JournalEntry>> {
        let entries = self.entries.lock().expect("journal poisoned");
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }
}
