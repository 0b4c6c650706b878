//! Scan batch classification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use shelfaudit_core::SessionId;
use shelfaudit_inventory::{Identifier, InventoryRecord, Location};

use crate::record::{AuditRecord, Classification};
use crate::session::CounterDelta;

/// Records and counter increments produced by one scan batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub records: Vec<AuditRecord>,
    pub delta: CounterDelta,
}

/// Classify every scanned identifier against the catalog view of `queried`.
///
/// - `expected_here`: catalog records registered at `queried`.
/// - `registered`: catalog-wide lookup by identifier.
///
/// Output holds one record per scanned identifier, in input order. Repeated
/// identifiers are not collapsed: each occurrence is recorded and counted.
pub fn reconcile<'a, F>(
    session_id: SessionId,
    queried: &Location,
    expected_here: &[InventoryRecord],
    registered: F,
    scanned: &[Identifier],
    scanned_at: DateTime<Utc>,
) -> ScanOutcome
where
    F: Fn(&Identifier) -> Option<&'a InventoryRecord>,
{
    let expected: HashMap<&Identifier, &InventoryRecord> =
        expected_here.iter().map(|r| (&r.identifier, r)).collect();

    let mut delta = CounterDelta {
        scanned: scanned.len() as u64,
        ..CounterDelta::default()
    };
    let mut records = Vec::with_capacity(scanned.len());

    for id in scanned {
        let record = match expected.get(id) {
            Some(item) => AuditRecord::found(session_id, item, queried, scanned_at),
            None => match registered(id) {
                // The location index and the identifier lookup can disagree while the
                // catalog is being edited; trust the record's own location.
                Some(item) if item.is_at(queried) => {
                    AuditRecord::found(session_id, item, queried, scanned_at)
                }
                Some(item) => AuditRecord::misplaced(session_id, item, queried, scanned_at),
                None => AuditRecord::unregistered(session_id, id, queried, scanned_at),
            },
        };

        match record.classification {
            Classification::Found => delta.found += 1,
            Classification::Misplaced => delta.misplaced += 1,
            Classification::Unregistered | Classification::NeverScanned => delta.missing += 1,
        }
        records.push(record);
    }

    ScanOutcome { records, delta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shelfaudit_inventory::ItemStatus;

    fn item(id: &str, rack: &str, shelf: &str) -> InventoryRecord {
        InventoryRecord {
            identifier: Identifier::parse(id).unwrap(),
            accession_number: format!("ACC-{id}"),
            title: format!("Title {id}"),
            author: "Anon".to_string(),
            location: Location::parse(rack, shelf).unwrap(),
            status: ItemStatus::Available,
        }
    }

    fn ids(raw: &[&str]) -> Vec<Identifier> {
        raw.iter().map(|s| Identifier::parse(s).unwrap()).collect()
    }

    fn run(catalog: &[InventoryRecord], queried: &Location, scanned: &[Identifier]) -> ScanOutcome {
        let here: Vec<InventoryRecord> =
            catalog.iter().filter(|r| r.is_at(queried)).cloned().collect();
        reconcile(
            SessionId::new(),
            queried,
            &here,
            |id| catalog.iter().find(|r| &r.identifier == id),
            scanned,
            Utc::now(),
        )
    }

    #[test]
    fn classifies_found_misplaced_and_unregistered() {
        let catalog = vec![item("I1", "1", "5"), item("I2", "1", "6")];
        let at = Location::parse("1", "6").unwrap();

        let out = run(&catalog, &at, &ids(&["I2", "I1", "GHOST"]));

        assert_eq!(out.delta, CounterDelta { scanned: 3, found: 1, missing: 1, misplaced: 1 });
        let kinds: Vec<_> = out.records.iter().map(|r| r.classification).collect();
        assert_eq!(
            kinds,
            vec![Classification::Found, Classification::Misplaced, Classification::Unregistered]
        );

        let misplaced = &out.records[1];
        assert_eq!(misplaced.queried, at);
        assert_eq!(misplaced.resolved, Location::parse("1", "5").unwrap());
        assert!(misplaced.notes.contains("Rack 1, Shelf 6"));
        assert!(misplaced.notes.contains("Rack 1, Shelf 5"));

        let ghost = &out.records[2];
        assert_eq!(ghost.resolved, at);
        assert_eq!(ghost.title, crate::UNKNOWN_FIELD);
        assert_eq!(ghost.notes, "not found in catalog");
    }

    #[test]
    fn duplicate_scans_are_each_recorded_and_counted() {
        let catalog = vec![item("I1", "1", "5")];
        let at = Location::parse("1", "5").unwrap();

        let out = run(&catalog, &at, &ids(&["I1", "i1", "I1"]));

        assert_eq!(out.records.len(), 3);
        assert_eq!(out.delta.found, 3);
        assert_eq!(out.delta.scanned, 3);
    }

    #[test]
    fn stale_location_index_still_yields_found() {
        let catalog = vec![item("I1", "1", "5")];
        let at = Location::parse("1", "5").unwrap();

        // Location index returned nothing, identifier lookup says the item is here.
        let out = reconcile(
            SessionId::new(),
            &at,
            &[],
            |id| catalog.iter().find(|r| &r.identifier == id),
            &ids(&["I1"]),
            Utc::now(),
        );

        assert_eq!(out.delta.found, 1);
        assert_eq!(out.records[0].resolved, at);
    }

    fn arb_catalog() -> impl Strategy<Value = Vec<InventoryRecord>> {
        prop::collection::btree_map("[A-Z][0-9]{1,3}", (0u8..3, 0u8..3), 0..12).prop_map(|m| {
            m.into_iter()
                .map(|(id, (r, s))| item(&id, &r.to_string(), &s.to_string()))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every scanned identifier gets exactly one classification,
        /// and the resolved location follows the classification rules.
        #[test]
        fn every_scan_is_classified_exactly_once(
            catalog in arb_catalog(),
            rack in 0u8..3,
            shelf in 0u8..3,
            scanned in prop::collection::vec("[A-Z][0-9]{1,3}", 1..20),
        ) {
            let at = Location::parse(&rack.to_string(), &shelf.to_string()).unwrap();
            let scanned = scanned.iter().map(|s| Identifier::parse(s).unwrap()).collect::<Vec<_>>();

            let out = run(&catalog, &at, &scanned);

            prop_assert_eq!(out.records.len(), scanned.len());
            prop_assert_eq!(out.delta.classified(), scanned.len() as u64);
            prop_assert_eq!(out.delta.scanned, scanned.len() as u64);

            for (rec, id) in out.records.iter().zip(&scanned) {
                prop_assert_eq!(&rec.identifier, id);
                prop_assert_eq!(&rec.queried, &at);
                match catalog.iter().find(|r| &r.identifier == id) {
                    Some(reg) if reg.is_at(&at) => {
                        prop_assert_eq!(rec.classification, Classification::Found);
                        prop_assert_eq!(&rec.resolved, &at);
                    }
                    Some(reg) => {
                        prop_assert_eq!(rec.classification, Classification::Misplaced);
                        prop_assert_eq!(&rec.resolved, &reg.location);
                    }
                    None => {
                        prop_assert_eq!(rec.classification, Classification::Unregistered);
                        prop_assert_eq!(&rec.resolved, &at);
                    }
                }
            }
        }
    }
}
