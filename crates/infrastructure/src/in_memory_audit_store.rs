use std::sync::Arc;

use async_trait::async_trait;
use gpuaudit_application::{AuditScan, AuditStore, Clock};
use gpuaudit_core::{AppError, AppResult};
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};

use crate::audit_index::AuditIndex;
use crate::clock::SystemClock;

/// In-memory append-only audit store.
///
/// Records live for the lifetime of the process. Reads never wait on appends.
pub struct InMemoryAuditStore {
    index: AuditIndex,
    clock: Arc<dyn Clock>,
}

impl InMemoryAuditStore {
    /// Creates an empty store stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamped by the provided clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            index: AuditIndex::default(),
            clock,
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.snapshot().len()
    }

    /// Returns whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        record.validate()?;

        let writer = self.index.writer().await;
        let sealed = writer.seal(self.clock.as_ref(), record);
        let log_id = sealed.log_id();
        writer.publish(sealed);

        Ok(log_id)
    }

    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord> {
        self.index
            .snapshot()
            .get(log_id)
            .ok_or_else(|| AppError::NotFound(format!("audit record '{log_id}' not found")))
    }

    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>> {
        Ok(self.index.snapshot().scan(&scan))
    }
}
