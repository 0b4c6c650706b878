//! Closing sweep: find catalog items the session never saw.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use shelfaudit_core::SessionId;
use shelfaudit_inventory::{Identifier, InventoryRecord};

use crate::record::AuditRecord;

/// Loss records plus the catalog items they refer to.
///
/// `lost` keeps each item's status as it was before the sweep so a failed
/// finalize can put it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub records: Vec<AuditRecord>,
    pub lost: Vec<InventoryRecord>,
}

impl SweepOutcome {
    pub fn lost_identifiers(&self) -> Vec<Identifier> {
        self.lost.iter().map(|r| r.identifier.clone()).collect()
    }

    pub fn books_marked_lost(&self) -> u64 {
        self.lost.len() as u64
    }
}

/// Diff the full catalog against every identifier already recorded in the
/// session (all classifications count as seen).
///
/// Each unseen identifier yields exactly one `NeverScanned` record, even if
/// the catalog listing repeats it.
pub fn sweep_unseen(
    session_id: SessionId,
    catalog: &[InventoryRecord],
    written: &[AuditRecord],
    swept_at: DateTime<Utc>,
) -> SweepOutcome {
    let mut seen: HashSet<&Identifier> = written.iter().map(|r| &r.identifier).collect();

    let mut records = Vec::new();
    let mut lost = Vec::new();
    for item in catalog {
        if !seen.insert(&item.identifier) {
            continue;
        }
        records.push(AuditRecord::never_scanned(session_id, item, swept_at));
        lost.push(item.clone());
    }

    SweepOutcome { records, lost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Classification;
    use shelfaudit_inventory::{ItemStatus, Location};

    fn item(id: &str, rack: &str, shelf: &str, status: ItemStatus) -> InventoryRecord {
        InventoryRecord {
            identifier: Identifier::parse(id).unwrap(),
            accession_number: format!("ACC-{id}"),
            title: format!("Title {id}"),
            author: "Anon".to_string(),
            location: Location::parse(rack, shelf).unwrap(),
            status,
        }
    }

    #[test]
    fn unseen_items_become_never_scanned_records_at_their_own_location() {
        let session_id = SessionId::new();
        let i1 = item("I1", "1", "5", ItemStatus::Available);
        let i2 = item("I2", "1", "6", ItemStatus::Issued);
        let here = Location::parse("1", "5").unwrap();
        let written = vec![AuditRecord::found(session_id, &i1, &here, Utc::now())];

        let out = sweep_unseen(session_id, &[i1, i2.clone()], &written, Utc::now());

        assert_eq!(out.books_marked_lost(), 1);
        assert_eq!(out.lost, vec![i2.clone()]);
        let rec = &out.records[0];
        assert_eq!(rec.classification, Classification::NeverScanned);
        assert_eq!(rec.queried, i2.location);
        assert_eq!(rec.resolved, i2.location);
        assert!(rec.notes.contains("never scanned"));
    }

    #[test]
    fn any_recorded_classification_counts_as_seen() {
        let session_id = SessionId::new();
        let i1 = item("I1", "1", "5", ItemStatus::Available);
        let elsewhere = Location::parse("9", "9").unwrap();
        let written = vec![
            AuditRecord::misplaced(session_id, &i1, &elsewhere, Utc::now()),
            AuditRecord::unregistered(session_id, &Identifier::parse("I2").unwrap(), &elsewhere, Utc::now()),
        ];
        let i2 = item("I2", "2", "2", ItemStatus::Available);

        let out = sweep_unseen(session_id, &[i1, i2], &written, Utc::now());

        assert!(out.records.is_empty());
        assert!(out.lost_identifiers().is_empty());
    }

    #[test]
    fn repeated_catalog_entries_yield_one_record() {
        let i1 = item("I1", "1", "5", ItemStatus::Available);
        let out = sweep_unseen(SessionId::new(), &[i1.clone(), i1], &[], Utc::now());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.lost.len(), 1);
    }
}
