use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shelfaudit_audit::{AuditRecord, AuditSession, CounterDelta};
use shelfaudit_core::SessionId;
use shelfaudit_inventory::{Identifier, InventoryRecord, ItemStatus, Location};

use super::{AuditStore, InventoryIndex, StoreError};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory catalog for tests/dev.
///
/// Keyed by identifier; `list_all` returns items in identifier order.
#[derive(Debug, Default)]
pub struct InMemoryInventoryIndex {
    items: RwLock<BTreeMap<Identifier, InventoryRecord>>,
}

impl InMemoryInventoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = InventoryRecord>) -> Self {
        let items = records
            .into_iter()
            .map(|r| (r.identifier.clone(), r))
            .collect();
        Self {
            items: RwLock::new(items),
        }
    }

    /// Insert or replace a catalog item (stands in for the external catalog's CRUD).
    pub fn upsert(&self, record: InventoryRecord) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(record.identifier.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InventoryIndex for InMemoryInventoryIndex {
    async fn find_by_location(&self, location: &Location) -> Result<Vec<InventoryRecord>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.values().filter(|r| r.is_at(location)).cloned().collect())
    }

    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(identifier).cloned())
    }

    async fn list_all(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.values().cloned().collect())
    }

    async fn bulk_set_status(&self, identifiers: &[Identifier], status: ItemStatus) -> Result<u64, StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let mut updated = 0;
        for id in identifiers {
            if let Some(item) = items.get_mut(id) {
                item.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[derive(Debug, Default)]
struct AuditState {
    sessions: HashMap<SessionId, AuditSession>,
    records: HashMap<SessionId, Vec<AuditRecord>>,
}

/// In-memory audit store for tests/dev.
///
/// A single lock covers sessions and records, so counter updates and record
/// appends are observed together.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: RwLock<AuditState>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create_session(&self, session: &AuditSession) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        state.sessions.insert(session.session_id, session.clone());
        state.records.insert(session.session_id, Vec::new());
        Ok(())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<AuditSession>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.sessions.get(&session_id).cloned())
    }

    async fn record_scan(
        &self,
        session_id: SessionId,
        records: Vec<AuditRecord>,
        delta: CounterDelta,
    ) -> Result<AuditSession, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::NotFound("audit session not found or expired".to_string()))?;

        session.record_scan(&delta)?;
        let updated = session.clone();

        state.records.entry(session_id).or_default().extend(records);
        Ok(updated)
    }

    async fn list_records(&self, session_id: SessionId) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.get(&session_id).cloned().unwrap_or_default())
    }

    async fn begin_finalize(&self, session_id: SessionId) -> Result<AuditSession, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::NotFound("audit session not found".to_string()))?;

        session.begin_finalize()?;
        Ok(session.clone())
    }

    async fn abort_finalize(&self, session_id: SessionId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::NotFound("audit session not found".to_string()))?;

        session.abort_finalize()?;
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        loss_records: Vec<AuditRecord>,
        ended_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<AuditSession, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::NotFound("audit session not found".to_string()))?;

        session.complete(ended_at, notes.as_deref(), loss_records.len() as u64)?;
        let closed = session.clone();

        state.records.entry(session_id).or_default().extend(loss_records);
        Ok(closed)
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<AuditSession>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut sessions: Vec<_> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shelfaudit_audit::{Classification, SessionStatus};

    fn book(id: &str, rack: &str, shelf: &str) -> InventoryRecord {
        InventoryRecord {
            identifier: Identifier::parse(id).unwrap(),
            accession_number: format!("ACC-{id}"),
            title: format!("Title {id}"),
            author: "Anon".to_string(),
            location: Location::parse(rack, shelf).unwrap(),
            status: ItemStatus::Available,
        }
    }

    #[tokio::test]
    async fn index_filters_by_location_and_updates_status_in_bulk() {
        let index = InMemoryInventoryIndex::with_records([book("I1", "1", "5"), book("I2", "1", "6")]);

        let here = index.find_by_location(&Location::parse("1", "5").unwrap()).await.unwrap();
        assert_eq!(here.len(), 1);
        assert_eq!(here[0].identifier.as_str(), "I1");

        let ids = [Identifier::parse("I2").unwrap(), Identifier::parse("NOPE").unwrap()];
        assert_eq!(index.bulk_set_status(&ids, ItemStatus::Lost).await.unwrap(), 1);

        let i2 = index.find_by_identifier(&ids[0]).await.unwrap().unwrap();
        assert_eq!(i2.status, ItemStatus::Lost);
    }

    #[tokio::test]
    async fn duplicate_session_id_is_a_conflict() {
        let store = InMemoryAuditStore::new();
        let session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();

        store.create_session(&session).await.unwrap();
        let err = store.create_session(&session).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn scans_and_completion_are_rejected_once_closed() {
        let store = InMemoryAuditStore::new();
        let session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let id = session.session_id;
        store.create_session(&session).await.unwrap();

        let here = Location::parse("1", "5").unwrap();
        let rec = AuditRecord::found(id, &book("I1", "1", "5"), &here, Utc::now());
        let delta = CounterDelta { scanned: 1, found: 1, ..Default::default() };
        store.record_scan(id, vec![rec.clone()], delta).await.unwrap();

        store.begin_finalize(id).await.unwrap();
        let closed = store.complete_session(id, vec![], Utc::now(), Some("ok".into())).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Completed);

        let err = store.record_scan(id, vec![rec], delta).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = store.complete_session(id, vec![], Utc::now(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let err = store.begin_finalize(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let after = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(after.totals.total_scanned, 1);
        assert_eq!(store.list_records(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_appends_loss_records_and_counts_them() {
        let store = InMemoryAuditStore::new();
        let session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let id = session.session_id;
        store.create_session(&session).await.unwrap();

        let loss = AuditRecord::never_scanned(id, &book("I2", "1", "6"), Utc::now());
        store.begin_finalize(id).await.unwrap();
        let closed = store.complete_session(id, vec![loss], Utc::now(), None).await.unwrap();

        assert_eq!(closed.totals.total_missing, 1);
        let records = store.list_records(id).await.unwrap();
        assert_eq!(records[0].classification, Classification::NeverScanned);
    }

    #[tokio::test]
    async fn finalize_claim_is_taken_once_and_blocks_scans() {
        let store = InMemoryAuditStore::new();
        let session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let id = session.session_id;
        store.create_session(&session).await.unwrap();

        let err = store.complete_session(id, vec![], Utc::now(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let claimed = store.begin_finalize(id).await.unwrap();
        assert_eq!(claimed.status, SessionStatus::Finalizing);
        assert!(matches!(store.begin_finalize(id).await, Err(StoreError::Conflict(_))));

        let delta = CounterDelta { scanned: 1, ..Default::default() };
        assert!(matches!(store.record_scan(id, vec![], delta).await, Err(StoreError::NotFound(_))));

        store.abort_finalize(id).await.unwrap();
        let back = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(back.status, SessionStatus::Active);
        assert!(matches!(
            store.begin_finalize(SessionId::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_sessions_is_newest_first_and_capped() {
        let store = InMemoryAuditStore::new();
        let t0 = Utc::now();
        for i in 0..5 {
            let s = AuditSession::start(SessionId::new(), &format!("a{i}"), t0 + Duration::minutes(i)).unwrap();
            store.create_session(&s).await.unwrap();
        }

        let listed = store.list_sessions(3).await.unwrap();

        let auditors: Vec<_> = listed.iter().map(|s| s.auditor.as_str()).collect();
        assert_eq!(auditors, vec!["a4", "a3", "a2"]);
    }
}
