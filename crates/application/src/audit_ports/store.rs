use async_trait::async_trait;

use gpuaudit_core::AppResult;
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};

use super::scan::AuditScan;

/// Port for the append-only audit event store.
///
/// Implementations must make a record visible to readers only once it is
/// complete, and must never update or delete stored records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Assigns an identifier and timestamp, persists the record and returns its identifier.
    ///
    /// Durable backends return only after the record survives a crash.
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId>;

    /// Returns one record or `AppError::NotFound`.
    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord>;

    /// Returns records matching a filter and time window in the requested order.
    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
