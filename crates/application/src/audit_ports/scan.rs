use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use gpuaudit_domain::{AuditEventType, AuditRecord, AuditStatus, UserIdHash};

/// Equality filters applied by audit scans. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Optional event category.
    pub event_type: Option<AuditEventType>,
    /// Optional model name.
    pub model_name: Option<String>,
    /// Optional outcome.
    pub status: Option<AuditStatus>,
    /// Optional redaction flag.
    pub pii_redacted: Option<bool>,
    /// Optional hashed principal.
    pub user_id: Option<UserIdHash>,
}

impl AuditFilter {
    /// Returns whether a record satisfies every set field.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.event_type
            .is_none_or(|event_type| record.event_type() == event_type)
            && self
                .model_name
                .as_deref()
                .is_none_or(|model_name| record.model_name().as_str() == model_name)
            && self.status.is_none_or(|status| record.status() == status)
            && self
                .pii_redacted
                .is_none_or(|pii_redacted| record.pii_redacted() == pii_redacted)
            && self
                .user_id
                .as_ref()
                .is_none_or(|user_id| record.user_id() == Some(user_id))
    }

    /// Returns whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Inclusive timestamp window. Open bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest timestamp included.
    pub from: Option<DateTime<Utc>>,
    /// Latest timestamp included.
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Creates a closed window `[from, to]`.
    #[must_use]
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Returns whether a timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| timestamp >= from) && self.to.is_none_or(|to| timestamp <= to)
    }

    /// Returns whether the window cannot contain any timestamp.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

/// Result ordering by `(timestamp, log_id)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanOrder {
    /// Oldest first.
    Ascending,
    /// Newest first. Ties are broken by descending `log_id`.
    #[default]
    Descending,
}

impl ScanOrder {
    /// Compares two records according to this order.
    #[must_use]
    pub fn compare(&self, left: &AuditRecord, right: &AuditRecord) -> Ordering {
        match self {
            Self::Ascending => left.sort_key().cmp(&right.sort_key()),
            Self::Descending => right.sort_key().cmp(&left.sort_key()),
        }
    }

    /// Returns a stable storage value for this order.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

/// Bounded audit store scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditScan {
    /// Equality filters.
    pub filter: AuditFilter,
    /// Timestamp window.
    pub time_range: TimeRange,
    /// Result ordering.
    pub order: ScanOrder,
    /// Maximum records returned. `None` returns every match.
    pub limit: Option<usize>,
}

impl AuditScan {
    /// Sorts records in scan order and applies the limit.
    pub fn finish(&self, records: &mut Vec<AuditRecord>) {
        records.sort_by(|left, right| self.order.compare(left, right));
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
    }
}
