mod clock;
mod scan;
mod store;

pub use clock::Clock;
pub use scan::{AuditFilter, AuditScan, ScanOrder, TimeRange};
pub use store::AuditStore;
