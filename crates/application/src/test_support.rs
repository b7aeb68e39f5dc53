use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::sync::Mutex;

use gpuaudit_core::{AppError, AppResult};
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};

use crate::{AuditScan, AuditStore, Clock};

pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub(crate) struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: StdMutex::new(now),
        })
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub(crate) fn advance(&self, delta: TimeDelta) {
        if let Ok(mut current) = self.now.lock() {
            *current += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| epoch())
    }
}

/// Vec-backed store stamping records from a manual clock.
pub(crate) struct FakeAuditStore {
    clock: Arc<ManualClock>,
    records: Mutex<Vec<AuditRecord>>,
    delay: Option<Duration>,
    unavailable: bool,
}

impl FakeAuditStore {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            records: Mutex::new(Vec::new()),
            delay: None,
            unavailable: false,
        }
    }

    /// Every store call sleeps for `delay` first.
    pub(crate) fn slow(clock: Arc<ManualClock>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(clock)
        }
    }

    pub(crate) fn unavailable(clock: Arc<ManualClock>) -> Self {
        Self {
            unavailable: true,
            ..Self::new(clock)
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub(crate) async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    async fn stall(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Inserts a record with a fixed identity, bypassing the clock.
    pub(crate) async fn insert_sealed(&self, record: AuditRecord) {
        self.records.lock().await.push(record);
    }
}

#[async_trait]
impl AuditStore for FakeAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        self.stall().await;
        if self.unavailable {
            return Err(AppError::store_unavailable("append", "connection refused"));
        }

        let log_id = LogId::new();
        self.records
            .lock()
            .await
            .push(AuditRecord::seal(log_id, self.clock.now(), record));
        Ok(log_id)
    }

    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord> {
        self.stall().await;
        self.records
            .lock()
            .await
            .iter()
            .find(|record| record.log_id() == log_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("audit record '{log_id}' not found")))
    }

    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>> {
        self.stall().await;
        if self.unavailable {
            return Err(AppError::store_unavailable("scan", "connection refused"));
        }

        let mut records: Vec<AuditRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| {
                scan.filter.matches(record) && scan.time_range.contains(record.timestamp())
            })
            .cloned()
            .collect();
        scan.finish(&mut records);
        Ok(records)
    }
}
