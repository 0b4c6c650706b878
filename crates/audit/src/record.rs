use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfaudit_core::{AuditRecordId, DomainError, SessionId};
use shelfaudit_inventory::{Identifier, InventoryRecord, Location};

/// Placeholder for identity fields of identifiers the catalog does not know.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Outcome assigned to one audit record.
///
/// `Unregistered` and `NeverScanned` are both reported as "missing" to
/// clients; they are kept apart here because they mean different things
/// (a tag nobody catalogued vs. a catalogued item nobody saw).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Found,
    Misplaced,
    Unregistered,
    NeverScanned,
}

impl Classification {
    /// Client-facing label: `found`, `misplaced` or `missing`.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Found => "found",
            Classification::Misplaced => "misplaced",
            Classification::Unregistered | Classification::NeverScanned => "missing",
        }
    }

    /// Stable storage name, distinct per variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Found => "found",
            Classification::Misplaced => "misplaced",
            Classification::Unregistered => "unregistered",
            Classification::NeverScanned => "never_scanned",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Classification::Unregistered | Classification::NeverScanned)
    }
}

impl core::str::FromStr for Classification {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "found" => Ok(Classification::Found),
            "misplaced" => Ok(Classification::Misplaced),
            "unregistered" => Ok(Classification::Unregistered),
            "never_scanned" => Ok(Classification::NeverScanned),
            other => Err(DomainError::validation(format!("unknown classification '{other}'"))),
        }
    }
}

/// Immutable snapshot of one classified identifier within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: AuditRecordId,
    pub session_id: SessionId,
    pub identifier: Identifier,
    pub accession_number: String,
    pub title: String,
    pub author: String,
    /// Where the auditor was scanning.
    pub queried: Location,
    /// Where the catalog says the item belongs.
    pub resolved: Location,
    pub classification: Classification,
    pub notes: String,
    pub scanned_at: DateTime<Utc>,
}

impl AuditRecord {
    fn snapshot(
        session_id: SessionId,
        item: &InventoryRecord,
        queried: Location,
        resolved: Location,
        classification: Classification,
        notes: String,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: AuditRecordId::new(),
            session_id,
            identifier: item.identifier.clone(),
            accession_number: item.accession_number.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            queried,
            resolved,
            classification,
            notes,
            scanned_at,
        }
    }

    pub fn found(session_id: SessionId, item: &InventoryRecord, queried: &Location, at: DateTime<Utc>) -> Self {
        Self::snapshot(
            session_id,
            item,
            queried.clone(),
            queried.clone(),
            Classification::Found,
            String::new(),
            at,
        )
    }

    pub fn misplaced(session_id: SessionId, item: &InventoryRecord, queried: &Location, at: DateTime<Utc>) -> Self {
        let notes = format!("Scanned at {queried} but registered at {}", item.location);
        Self::snapshot(
            session_id,
            item,
            queried.clone(),
            item.location.clone(),
            Classification::Misplaced,
            notes,
            at,
        )
    }

    pub fn unregistered(session_id: SessionId, identifier: &Identifier, queried: &Location, at: DateTime<Utc>) -> Self {
        Self {
            record_id: AuditRecordId::new(),
            session_id,
            identifier: identifier.clone(),
            accession_number: UNKNOWN_FIELD.to_string(),
            title: UNKNOWN_FIELD.to_string(),
            author: UNKNOWN_FIELD.to_string(),
            queried: queried.clone(),
            resolved: queried.clone(),
            classification: Classification::Unregistered,
            notes: "not found in catalog".to_string(),
            scanned_at: at,
        }
    }

    pub fn never_scanned(session_id: SessionId, item: &InventoryRecord, at: DateTime<Utc>) -> Self {
        Self::snapshot(
            session_id,
            item,
            item.location.clone(),
            item.location.clone(),
            Classification::NeverScanned,
            "never scanned, marked lost".to_string(),
            at,
        )
    }
}
