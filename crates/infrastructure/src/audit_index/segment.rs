use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gpuaudit_application::{AuditFilter, TimeRange};
use gpuaudit_domain::{AuditEventType, AuditRecord, AuditStatus, LogId, UserIdHash};

/// Records held by one segment before a new one is started.
pub(crate) const SEGMENT_CAPACITY: usize = 256;

/// Fixed-capacity run of records in append order with posting lists per
/// filterable column.
///
/// Timestamps are non-decreasing inside a segment and across consecutive
/// segments, so positions double as a time index.
#[derive(Debug, Clone, Default)]
pub(crate) struct Segment {
    records: Vec<Arc<AuditRecord>>,
    by_log_id: HashMap<LogId, u32>,
    by_event_type: HashMap<AuditEventType, Vec<u32>>,
    by_model_name: HashMap<String, Vec<u32>>,
    by_status: HashMap<AuditStatus, Vec<u32>>,
    by_user_id: HashMap<UserIdHash, Vec<u32>>,
    by_pii_redacted: [Vec<u32>; 2],
}

impl Segment {
    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= SEGMENT_CAPACITY
    }

    pub(crate) fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|record| record.timestamp())
    }

    pub(crate) fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|record| record.timestamp())
    }

    pub(crate) fn get(&self, log_id: LogId) -> Option<&Arc<AuditRecord>> {
        self.by_log_id
            .get(&log_id)
            .and_then(|position| self.records.get(*position as usize))
    }

    /// Appends a record. Callers guarantee capacity and timestamp order.
    pub(crate) fn push(&mut self, record: Arc<AuditRecord>) {
        let position = self.records.len() as u32;

        self.by_log_id.insert(record.log_id(), position);
        self.by_event_type
            .entry(record.event_type())
            .or_default()
            .push(position);
        self.by_model_name
            .entry(record.model_name().as_str().to_owned())
            .or_default()
            .push(position);
        self.by_status
            .entry(record.status())
            .or_default()
            .push(position);
        if let Some(user_id) = record.user_id() {
            self.by_user_id
                .entry(user_id.clone())
                .or_default()
                .push(position);
        }
        self.by_pii_redacted[usize::from(record.pii_redacted())].push(position);

        self.records.push(record);
    }

    /// Returns every record of this segment inside `time_range` that matches `filter`.
    pub(crate) fn matching(
        &self,
        filter: &AuditFilter,
        time_range: &TimeRange,
    ) -> Vec<Arc<AuditRecord>> {
        let start = time_range.from.map_or(0, |from| {
            self.records
                .partition_point(|record| record.timestamp() < from)
        });
        let end = time_range.to.map_or(self.records.len(), |to| {
            self.records
                .partition_point(|record| record.timestamp() <= to)
        });
        if start >= end {
            return Vec::new();
        }

        match self.narrowest_postings(filter) {
            Some(postings) => {
                let low = postings.partition_point(|position| (*position as usize) < start);
                let high = postings.partition_point(|position| (*position as usize) < end);
                postings[low..high]
                    .iter()
                    .filter_map(|position| self.records.get(*position as usize))
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            }
            None => self.records[start..end]
                .iter()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        }
    }

    /// Picks the shortest posting list among the filter columns that are set.
    ///
    /// An unknown key yields an empty list so the scan short-circuits.
    fn narrowest_postings(&self, filter: &AuditFilter) -> Option<&[u32]> {
        let candidates = [
            filter
                .event_type
                .map(|event_type| postings(&self.by_event_type, &event_type)),
            filter
                .model_name
                .as_ref()
                .map(|model_name| postings(&self.by_model_name, model_name)),
            filter
                .status
                .map(|status| postings(&self.by_status, &status)),
            filter
                .user_id
                .as_ref()
                .map(|user_id| postings(&self.by_user_id, user_id)),
            filter
                .pii_redacted
                .map(|pii_redacted| self.by_pii_redacted[usize::from(pii_redacted)].as_slice()),
        ];

        candidates
            .into_iter()
            .flatten()
            .min_by_key(|postings| postings.len())
    }
}

fn postings<'a, K>(index: &'a HashMap<K, Vec<u32>>, key: &K) -> &'a [u32]
where
    K: Eq + Hash,
{
    index.get(key).map(Vec::as_slice).unwrap_or_default()
}
