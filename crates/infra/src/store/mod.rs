//! Storage boundaries for the shelf audit.
//!
//! Two collaborators sit behind traits:
//! - [`InventoryIndex`]: the catalog, read by location/identifier, with bulk status write-back.
//! - [`AuditStore`]: sessions (summary row with counters) plus append-only audit records.
//!
//! Counter updates happen inside the store together with the record inserts,
//! so callers never do read-modify-write on the totals.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shelfaudit_audit::{AuditRecord, AuditSession, CounterDelta};
use shelfaudit_core::{DomainError, SessionId};
use shelfaudit_inventory::{Identifier, InventoryRecord, ItemStatus, Location};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryAuditStore, InMemoryInventoryIndex};
pub use postgres::PostgresAuditStore;

/// Store / index operation error.
///
/// These are infrastructure outcomes; the service maps them to public error kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded into domain types.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(msg) => StoreError::NotFound(msg),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => StoreError::Corrupt(msg),
        }
    }
}

/// Catalog view consumed by the audit.
#[async_trait]
pub trait InventoryIndex: Send + Sync {
    async fn find_by_location(&self, location: &Location) -> Result<Vec<InventoryRecord>, StoreError>;

    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    async fn list_all(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Set `status` on every listed item in one write. Returns the number of items updated.
    async fn bulk_set_status(&self, identifiers: &[Identifier], status: ItemStatus) -> Result<u64, StoreError>;
}

/// Durable audit sessions and their records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert a new session. A duplicate id is a `Conflict`.
    async fn create_session(&self, session: &AuditSession) -> Result<(), StoreError>;

    async fn get_session(&self, session_id: SessionId) -> Result<Option<AuditSession>, StoreError>;

    /// Append scan records and add `delta` to the session counters as one unit.
    ///
    /// Fails with `NotFound` (and writes nothing) unless the session exists and is active.
    async fn record_scan(
        &self,
        session_id: SessionId,
        records: Vec<AuditRecord>,
        delta: CounterDelta,
    ) -> Result<AuditSession, StoreError>;

    /// All records of a session, in insertion order.
    async fn list_records(&self, session_id: SessionId) -> Result<Vec<AuditRecord>, StoreError>;

    /// Claim an active session for finalize (`active -> finalizing`) as a
    /// compare-and-set. Only the caller that wins the claim may touch the catalog.
    ///
    /// `NotFound` for unknown sessions, `Conflict` if it is not active.
    async fn begin_finalize(&self, session_id: SessionId) -> Result<AuditSession, StoreError>;

    /// Hand a claim back (`finalizing -> active`) after a failed finalize.
    async fn abort_finalize(&self, session_id: SessionId) -> Result<(), StoreError>;

    /// Close a claimed session as one unit: append the loss records, add their
    /// count to `total_missing`, flip status to completed, stamp `ended_at`, and
    /// replace notes when given.
    ///
    /// `NotFound` for unknown sessions, `Conflict` unless it is finalizing.
    async fn complete_session(
        &self,
        session_id: SessionId,
        loss_records: Vec<AuditRecord>,
        ended_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<AuditSession, StoreError>;

    /// Most recent sessions first, at most `limit`.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<AuditSession>, StoreError>;
}

#[async_trait]
impl<T> InventoryIndex for Arc<T>
where
    T: InventoryIndex + ?Sized,
{
    async fn find_by_location(&self, location: &Location) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).find_by_location(location).await
    }

    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).find_by_identifier(identifier).await
    }

    async fn list_all(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list_all().await
    }

    async fn bulk_set_status(&self, identifiers: &[Identifier], status: ItemStatus) -> Result<u64, StoreError> {
        (**self).bulk_set_status(identifiers, status).await
    }
}

#[async_trait]
impl<T> AuditStore for Arc<T>
where
    T: AuditStore + ?Sized,
{
    async fn create_session(&self, session: &AuditSession) -> Result<(), StoreError> {
        (**self).create_session(session).await
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<AuditSession>, StoreError> {
        (**self).get_session(session_id).await
    }

    async fn record_scan(
        &self,
        session_id: SessionId,
        records: Vec<AuditRecord>,
        delta: CounterDelta,
    ) -> Result<AuditSession, StoreError> {
        (**self).record_scan(session_id, records, delta).await
    }

    async fn list_records(&self, session_id: SessionId) -> Result<Vec<AuditRecord>, StoreError> {
        (**self).list_records(session_id).await
    }

    async fn begin_finalize(&self, session_id: SessionId) -> Result<AuditSession, StoreError> {
        (**self).begin_finalize(session_id).await
    }

    async fn abort_finalize(&self, session_id: SessionId) -> Result<(), StoreError> {
        (**self).abort_finalize(session_id).await
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        loss_records: Vec<AuditRecord>,
        ended_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<AuditSession, StoreError> {
        (**self).complete_session(session_id, loss_records, ended_at, notes).await
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<AuditSession>, StoreError> {
        (**self).list_sessions(limit).await
    }
}
