//! Read-side shapes returned by the audit operations.

use chrono::Duration;

use shelfaudit_core::SessionId;
use shelfaudit_inventory::Location;

use crate::record::AuditRecord;
use crate::session::{AuditSession, CounterDelta, SessionTotals};

/// Result of one scan batch: batch counts plus the session's running totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub session_id: SessionId,
    pub location: Location,
    pub batch: CounterDelta,
    /// Number of catalog records registered at `location`.
    pub expected_here: usize,
    pub totals: SessionTotals,
}

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub session_id: SessionId,
    pub totals: SessionTotals,
    pub books_marked_lost: u64,
    pub duration: Duration,
}

impl FinalizeSummary {
    pub fn from_session(session: &AuditSession, books_marked_lost: u64) -> Self {
        Self {
            session_id: session.session_id,
            totals: session.totals,
            books_marked_lost,
            duration: session.duration().unwrap_or_else(Duration::zero),
        }
    }
}

/// A session joined with its records, ordered by scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub session: AuditSession,
    pub records: Vec<AuditRecord>,
}

impl AuditReport {
    /// Records are sorted by `scanned_at`; equal timestamps keep insertion order.
    pub fn assemble(session: AuditSession, mut records: Vec<AuditRecord>) -> Self {
        records.sort_by_key(|r| r.scanned_at);
        Self { session, records }
    }

    /// Stored counters, as written; not recomputed from `records`.
    pub fn summary(&self) -> SessionTotals {
        self.session.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shelfaudit_inventory::Identifier;

    #[test]
    fn assemble_orders_by_scan_time_and_is_stable_on_ties() {
        let session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let here = Location::parse("1", "1").unwrap();
        let t0 = session.started_at;
        let t1 = t0 + Duration::seconds(5);
        let rec = |id: &str, at| {
            AuditRecord::unregistered(session.session_id, &Identifier::parse(id).unwrap(), &here, at)
        };

        let report = AuditReport::assemble(
            session.clone(),
            vec![rec("C", t1), rec("A", t0), rec("B", t0)],
        );

        let order: Vec<_> = report.records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn summary_uses_stored_counters() {
        let mut session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        session.totals.total_found = 7;
        let report = AuditReport::assemble(session, vec![]);
        assert_eq!(report.summary().total_found, 7);
    }

    #[test]
    fn finalize_summary_reports_duration() {
        let mut session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let end = session.started_at + Duration::milliseconds(1500);
        session.begin_finalize().unwrap();
        session.complete(end, None, 2).unwrap();

        let summary = FinalizeSummary::from_session(&session, 2);

        assert_eq!(summary.duration, Duration::milliseconds(1500));
        assert_eq!(summary.totals.total_missing, 2);
        assert_eq!(summary.books_marked_lost, 2);
    }
}
