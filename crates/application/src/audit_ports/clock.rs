use chrono::{DateTime, Utc};

/// Port for reading wall-clock time.
///
/// Stores assign record timestamps from a clock so that callers can never
/// backdate events.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}
