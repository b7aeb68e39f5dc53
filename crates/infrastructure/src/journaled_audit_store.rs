use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use gpuaudit_application::{AuditScan, AuditStore, Clock};
use gpuaudit_core::{AppError, AppResult};
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};

use crate::audit_index::AuditIndex;
use crate::clock::SystemClock;

/// Durable single-node audit store backed by a JSON Lines journal.
///
/// Every append is written and synced to the journal before it becomes
/// visible. On open the journal is replayed into an in-memory index that
/// serves all reads.
#[derive(Clone)]
pub struct JournaledAuditStore {
    inner: Arc<JournaledInner>,
}

struct JournaledInner {
    path: PathBuf,
    index: AuditIndex,
    journal: Mutex<Journal>,
    clock: Arc<dyn Clock>,
}

struct Journal {
    file: File,
    len: u64,
    poisoned: bool,
    #[cfg(test)]
    short_write_next: bool,
}

impl JournaledAuditStore {
    /// Opens or creates the journal at `path`, stamped by the system clock.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    /// Opens or creates the journal at `path`, stamped by the provided clock.
    ///
    /// An unterminated trailing line left by a crash is discarded. Any other
    /// unreadable line fails the open.
    pub async fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                return Err(AppError::store_unavailable(
                    "open",
                    format!("failed to read audit journal '{}': {error}", path.display()),
                ));
            }
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                AppError::store_unavailable(
                    "open",
                    format!("failed to create journal directory '{}': {error}", parent.display()),
                )
            })?;
        }

        let replay = replay_journal(&path, &contents)?;
        let record_count = replay.records.len();
        let index = AuditIndex::from_records(replay.records)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|error| {
                AppError::store_unavailable(
                    "open",
                    format!("failed to open audit journal '{}': {error}", path.display()),
                )
            })?;

        if replay.valid_len < contents.len() as u64 {
            warn!(
                path = %path.display(),
                discarded_bytes = contents.len() as u64 - replay.valid_len,
                "discarding unterminated trailing journal line"
            );
            file.set_len(replay.valid_len).await.map_err(|error| {
                AppError::store_unavailable(
                    "open",
                    format!("failed to truncate audit journal '{}': {error}", path.display()),
                )
            })?;
        }

        info!(path = %path.display(), records = record_count, "audit journal opened");

        Ok(Self {
            inner: Arc::new(JournaledInner {
                path,
                index,
                journal: Mutex::new(Journal {
                    file,
                    len: replay.valid_len,
                    poisoned: false,
                    #[cfg(test)]
                    short_write_next: false,
                }),
                clock,
            }),
        })
    }

    /// Returns the journal location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.index.snapshot().len()
    }

    /// Returns whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next journal write stop halfway and fail.
    #[cfg(test)]
    pub(crate) async fn fail_next_write(&self) {
        self.inner.journal.lock().await.short_write_next = true;
    }

    /// Swaps the journal handle, for example for a read-only one.
    #[cfg(test)]
    pub(crate) async fn replace_journal_file(&self, file: File) {
        self.inner.journal.lock().await.file = file;
    }
}

impl JournaledInner {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        let writer = self.index.writer().await;
        let sealed = writer.seal(self.clock.as_ref(), record);
        let mut line = serde_json::to_vec(&sealed).map_err(|error| {
            AppError::Internal(format!("failed to encode audit record: {error}"))
        })?;
        line.push(b'\n');

        self.journal.lock().await.write_line(&self.path, &line).await?;

        let log_id = sealed.log_id();
        writer.publish(sealed);
        Ok(log_id)
    }
}

impl Journal {
    async fn write_line(&mut self, path: &Path, line: &[u8]) -> AppResult<()> {
        if self.poisoned {
            return Err(AppError::store_unavailable(
                "append",
                "audit journal is unusable after a failed rollback",
            ));
        }

        match self.write_synced(line).await {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(write_error) => {
                if let Err(rollback_error) = self.file.set_len(self.len).await {
                    self.poisoned = true;
                    error!(
                        path = %path.display(),
                        error = %rollback_error,
                        "failed to roll back partial journal write"
                    );
                }
                Err(AppError::store_unavailable(
                    "append",
                    format!("failed to write audit journal: {write_error}"),
                ))
            }
        }
    }

    async fn write_synced(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.short_write(line).await?;
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

#[cfg(test)]
impl Journal {
    async fn short_write(&mut self, line: &[u8]) -> std::io::Result<()> {
        if !std::mem::take(&mut self.short_write_next) {
            return Ok(());
        }
        self.file.write_all(&line[..line.len() / 2]).await?;
        self.file.flush().await?;
        Err(std::io::Error::other("short write"))
    }
}

#[cfg(not(test))]
impl Journal {
    async fn short_write(&mut self, _line: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

struct Replay {
    records: Vec<AuditRecord>,
    valid_len: u64,
}

fn replay_journal(path: &Path, contents: &[u8]) -> AppResult<Replay> {
    let mut records = Vec::new();
    let mut valid_len = 0_u64;

    for (line_number, chunk) in contents.split_inclusive(|byte| *byte == b'\n').enumerate() {
        let Some(line) = chunk.strip_suffix(b"\n") else {
            break;
        };

        if !line.iter().all(u8::is_ascii_whitespace) {
            let record = serde_json::from_slice::<AuditRecord>(line).map_err(|error| {
                AppError::Internal(format!(
                    "audit journal '{}' is corrupt at line {}: {error}",
                    path.display(),
                    line_number + 1
                ))
            })?;
            records.push(record);
        }
        valid_len += chunk.len() as u64;
    }

    Ok(Replay { records, valid_len })
}

#[async_trait]
impl AuditStore for JournaledAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        record.validate()?;

        // Runs detached so a caller timeout cannot cut a journal write in half.
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.append(record).await })
            .await
            .map_err(|error| AppError::Internal(format!("audit append task failed: {error}")))?
    }

    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord> {
        self.inner
            .index
            .snapshot()
            .get(log_id)
            .ok_or_else(|| AppError::NotFound(format!("audit record '{log_id}' not found")))
    }

    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>> {
        Ok(self.inner.index.snapshot().scan(&scan))
    }

    async fn ping(&self) -> AppResult<()> {
        if self.inner.journal.lock().await.poisoned {
            return Err(AppError::store_unavailable(
                "ping",
                "audit journal is unusable after a failed rollback",
            ));
        }

        Ok(())
    }
}
