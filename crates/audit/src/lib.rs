//! Shelf audit domain module.
//!
//! Session lifecycle, scan reconciliation, and the closing sweep, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage). Callers
//! fetch catalog data, pass it in, and persist what comes back.

pub mod reconcile;
pub mod record;
pub mod report;
pub mod session;
pub mod sweep;

pub use reconcile::{ScanOutcome, reconcile};
pub use record::{AuditRecord, Classification, UNKNOWN_FIELD};
pub use report::{AuditReport, FinalizeSummary, ScanSummary};
pub use session::{AuditSession, CounterDelta, SessionStatus, SessionTotals};
pub use sweep::{SweepOutcome, sweep_unseen};
