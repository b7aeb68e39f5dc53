use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use gpuaudit_core::{AppError, AppResult};
use gpuaudit_domain::{AuditRecord, AuditRecordSummary, LogId, RecentAuditRecord};

use crate::deadline::within_deadline;
use crate::redaction::Redactor;
use crate::{AuditFilter, AuditScan, AuditStore, Clock, ScanOrder, TimeRange};

/// Default width of the recent-activity view.
pub const DEFAULT_RECENT_WINDOW: TimeDelta = TimeDelta::days(7);

/// Largest page returned by free-form searches.
pub const MAX_SEARCH_LIMIT: usize = 1_000;

/// Page size used when a search does not set a limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Read-only queries over the audit store.
///
/// Every query is computed from the store on each call, so results are never
/// staler than the last completed append.
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditStore>,
    redactor: Arc<Redactor>,
    clock: Arc<dyn Clock>,
}

impl AuditQueryService {
    /// Creates a query service.
    ///
    /// The redactor is used only to hash identifiers the same way ingestion does.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, redactor: Arc<Redactor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            redactor,
            clock,
        }
    }

    /// Returns records from `[now - window, now]`, newest first.
    pub async fn recent(
        &self,
        window: TimeDelta,
        timeout: Duration,
    ) -> AppResult<Vec<RecentAuditRecord>> {
        if window <= TimeDelta::zero() {
            return Err(AppError::validation(
                "window",
                "recent window must be positive",
            ));
        }

        let now = self.clock.now();
        let from = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let scan = AuditScan {
            filter: AuditFilter::default(),
            time_range: TimeRange::between(from, now),
            order: ScanOrder::Descending,
            limit: None,
        };

        let records = within_deadline("scan", timeout, self.store.scan(scan)).await?;
        Ok(records.iter().map(AuditRecord::recent_view).collect())
    }

    /// Returns every record of one principal, newest first.
    ///
    /// Accepts a raw identifier or its `sha256:` form. The projection leaves
    /// out payloads and identifiers.
    pub async fn by_user(
        &self,
        user_id: &str,
        timeout: Duration,
    ) -> AppResult<Vec<AuditRecordSummary>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::validation("user_id", "user id must not be empty"));
        }

        let scan = AuditScan {
            filter: AuditFilter {
                user_id: Some(self.redactor.hash_user_id(user_id)),
                ..AuditFilter::default()
            },
            time_range: TimeRange::default(),
            order: ScanOrder::Descending,
            limit: None,
        };

        let records = within_deadline("scan", timeout, self.store.scan(scan)).await?;
        Ok(records.iter().map(AuditRecord::summary).collect())
    }

    /// Returns one full record.
    pub async fn get(&self, log_id: LogId, timeout: Duration) -> AppResult<AuditRecord> {
        within_deadline("get_by_id", timeout, self.store.get_by_id(log_id)).await
    }

    /// Runs a bounded filtered scan. The limit is clamped to [`MAX_SEARCH_LIMIT`].
    pub async fn search(&self, scan: AuditScan, timeout: Duration) -> AppResult<Vec<AuditRecord>> {
        if scan.time_range.is_empty() {
            return Err(AppError::validation(
                "from",
                "time range start must not be after its end",
            ));
        }

        let scan = AuditScan {
            limit: Some(
                scan.limit
                    .unwrap_or(DEFAULT_SEARCH_LIMIT)
                    .clamp(1, MAX_SEARCH_LIMIT),
            ),
            ..scan
        };

        within_deadline("scan", timeout, self.store.scan(scan)).await
    }
}
