//! Copy-on-write record index shared by the in-process stores.
//!
//! Readers load an immutable [`AuditSnapshot`] without locking. The single
//! writer builds the next snapshot from the current one and publishes it with
//! one atomic swap, so a reader sees either all of an append or none of it.

mod segment;

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use gpuaudit_application::{AuditScan, Clock, ScanOrder};
use gpuaudit_core::{AppError, AppResult};
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};

use self::segment::Segment;

/// Immutable view of every published record.
#[derive(Debug, Clone, Default)]
pub(crate) struct AuditSnapshot {
    segments: Vec<Arc<Segment>>,
    len: usize,
}

impl AuditSnapshot {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.segments
            .last()
            .and_then(|segment| segment.last_timestamp())
    }

    pub(crate) fn get(&self, log_id: LogId) -> Option<AuditRecord> {
        self.segments
            .iter()
            .rev()
            .find_map(|segment| segment.get(log_id))
            .map(|record| AuditRecord::clone(record))
    }

    /// Runs a scan against this snapshot.
    ///
    /// Segments are visited in scan order. Once `limit` candidates are held,
    /// only segments that can still tie with the boundary timestamp are read.
    pub(crate) fn scan(&self, scan: &AuditScan) -> Vec<AuditRecord> {
        let segments: Box<dyn Iterator<Item = &Arc<Segment>>> = match scan.order {
            ScanOrder::Ascending => Box::new(self.segments.iter()),
            ScanOrder::Descending => Box::new(self.segments.iter().rev()),
        };

        let mut candidates: Vec<Arc<AuditRecord>> = Vec::new();
        let mut boundary: Option<DateTime<Utc>> = None;
        for segment in segments {
            if let Some(boundary) = boundary {
                let beyond = match scan.order {
                    ScanOrder::Ascending => segment
                        .first_timestamp()
                        .is_some_and(|first| first > boundary),
                    ScanOrder::Descending => segment
                        .last_timestamp()
                        .is_some_and(|last| last < boundary),
                };
                if beyond {
                    break;
                }
            }

            candidates.extend(segment.matching(&scan.filter, &scan.time_range));

            if let Some(limit) = scan.limit
                && candidates.len() >= limit
            {
                candidates.sort_by(|left, right| scan.order.compare(left, right));
                boundary = limit
                    .checked_sub(1)
                    .and_then(|index| candidates.get(index))
                    .map(|record| record.timestamp());
                if limit == 0 {
                    break;
                }
            }
        }

        let mut records: Vec<AuditRecord> = candidates
            .iter()
            .map(|record| AuditRecord::clone(record))
            .collect();
        scan.finish(&mut records);
        records
    }

    fn with_appended(&self, record: AuditRecord) -> Self {
        let mut segments = self.segments.clone();
        let tail = match segments.last() {
            Some(tail) if !tail.is_full() => segments.pop(),
            _ => None,
        };

        let mut tail = tail.map_or_else(Segment::default, Arc::unwrap_or_clone);
        tail.push(Arc::new(record));
        segments.push(Arc::new(tail));

        Self {
            segments,
            len: self.len + 1,
        }
    }
}

/// Shared index with lock-free reads and serialized appends.
#[derive(Debug)]
pub(crate) struct AuditIndex {
    current: ArcSwap<AuditSnapshot>,
    writer: Mutex<WriterState>,
}

#[derive(Debug, Default)]
struct WriterState {
    last_timestamp: Option<DateTime<Utc>>,
}

impl Default for AuditIndex {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(AuditSnapshot::default()),
            writer: Mutex::new(WriterState::default()),
        }
    }
}

impl AuditIndex {
    /// Rebuilds an index from records in their original append order.
    pub(crate) fn from_records(records: impl IntoIterator<Item = AuditRecord>) -> AppResult<Self> {
        let mut snapshot = AuditSnapshot::default();
        let mut seen = HashSet::new();
        for record in records {
            if snapshot
                .last_timestamp()
                .is_some_and(|last| record.timestamp() < last)
            {
                return Err(AppError::Internal(format!(
                    "audit record '{}' is older than its predecessor",
                    record.log_id()
                )));
            }
            if !seen.insert(record.log_id()) {
                return Err(AppError::Internal(format!(
                    "audit record '{}' appears more than once",
                    record.log_id()
                )));
            }
            snapshot = snapshot.with_appended(record);
        }

        let last_timestamp = snapshot.last_timestamp();
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(WriterState { last_timestamp }),
        })
    }

    /// Loads the current snapshot.
    pub(crate) fn snapshot(&self) -> Arc<AuditSnapshot> {
        self.current.load_full()
    }

    /// Waits for exclusive append access.
    pub(crate) async fn writer(&self) -> IndexWriter<'_> {
        IndexWriter {
            index: self,
            state: self.writer.lock().await,
        }
    }
}

/// Exclusive append handle. Dropping it without publishing discards the record.
pub(crate) struct IndexWriter<'a> {
    index: &'a AuditIndex,
    state: MutexGuard<'a, WriterState>,
}

impl IndexWriter<'_> {
    /// Assigns a fresh identifier and a timestamp that never precedes the
    /// previous append.
    pub(crate) fn seal(&self, clock: &dyn Clock, record: NewAuditRecord) -> AuditRecord {
        let now = clock.now();
        let timestamp = self
            .state
            .last_timestamp
            .map_or(now, |last| now.max(last));

        AuditRecord::seal(LogId::new(), timestamp, record)
    }

    /// Makes a sealed record visible to readers.
    pub(crate) fn publish(mut self, record: AuditRecord) {
        let timestamp = record.timestamp();
        let next = self.index.snapshot().with_appended(record);
        self.index.current.store(Arc::new(next));
        self.state.last_timestamp = Some(timestamp);
    }
}
