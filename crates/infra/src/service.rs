//! Audit application service: validation, orchestration, and error mapping.
//!
//! Each public method is one unit of work:
//! - `start_session`: create an active session
//! - `scan_shelf`: classify a batch and persist records + counter increments
//! - `finalize_audit`: sweep unseen items, mark them lost, close the session
//! - `audit_report` / `list_sessions`: read side
//!
//! Finalize spans two collaborators (catalog and audit store). It first claims
//! the session in the store (`active -> finalizing`), so at most one finalize
//! ever sweeps a session. If closing the session then fails, the items it
//! marked lost get their previous statuses back and the claim is released.

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use shelfaudit_audit::{
    AuditReport, AuditSession, FinalizeSummary, ScanSummary, reconcile, sweep_unseen,
};
use shelfaudit_core::{DomainError, SessionId, error::require_non_empty};
use shelfaudit_inventory::{Identifier, InventoryRecord, ItemStatus, Location};

use crate::config::DEFAULT_SESSION_LIST_LIMIT;
use crate::store::{AuditStore, InventoryIndex, StoreError};

/// Public error kinds of the audit operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// A required field was missing or empty. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// Unknown session, or an active session was required.
    #[error("{0}")]
    NotFound(String),

    /// Finalize on a completed session (or a duplicate session id).
    #[error("{0}")]
    Conflict(String),

    /// Catalog or session store failed.
    #[error("dependency unavailable: {0}")]
    Dependency(String),
}

impl AuditError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::Validation(_) => "validation_error",
            AuditError::NotFound(_) => "not_found",
            AuditError::Conflict(_) => "conflict",
            AuditError::Dependency(_) => "dependency_error",
        }
    }
}

impl From<DomainError> for AuditError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AuditError::Validation(msg),
            DomainError::InvalidId(_) => AuditError::NotFound("audit session not found".to_string()),
            DomainError::NotFound(msg) => AuditError::NotFound(msg),
            DomainError::Conflict(msg) => AuditError::Conflict(msg),
        }
    }
}

impl From<StoreError> for AuditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AuditError::NotFound(msg),
            StoreError::Conflict(msg) => AuditError::Conflict(msg),
            StoreError::Corrupt(msg) | StoreError::Unavailable(msg) => AuditError::Dependency(msg),
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, AuditError> {
    let raw = require_non_empty("session id", raw)?;
    Ok(raw.parse()?)
}

/// Shelf audit operations over a catalog `I` and an audit store `S`.
pub struct AuditService<I, S> {
    index: I,
    store: S,
    session_list_limit: usize,
}

impl<I, S> AuditService<I, S>
where
    I: InventoryIndex,
    S: AuditStore,
{
    pub fn new(index: I, store: S) -> Self {
        Self {
            index,
            store,
            session_list_limit: DEFAULT_SESSION_LIST_LIMIT,
        }
    }

    pub fn with_session_list_limit(mut self, limit: usize) -> Self {
        self.session_list_limit = limit.max(1);
        self
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    #[instrument(skip(self), err)]
    pub async fn start_session(&self, auditor: &str) -> Result<AuditSession, AuditError> {
        let session = AuditSession::start(SessionId::new(), auditor, Utc::now())?;
        self.store.create_session(&session).await?;

        tracing::info!(session_id = %session.session_id, auditor = %session.auditor, "audit session started");
        Ok(session)
    }

    #[instrument(skip(self, scanned_codes), fields(code_count = scanned_codes.len()), err)]
    pub async fn scan_shelf(
        &self,
        session_id: &str,
        rack: &str,
        shelf: &str,
        scanned_codes: &[String],
    ) -> Result<ScanSummary, AuditError> {
        let session_id = parse_session_id(session_id)?;
        let location = Location::parse(rack, shelf)?;
        if scanned_codes.is_empty() {
            return Err(AuditError::Validation("scanned codes required".to_string()));
        }
        let scanned = scanned_codes
            .iter()
            .map(|c| Identifier::parse(c))
            .collect::<Result<Vec<_>, _>>()?;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AuditError::NotFound("audit session not found or expired".to_string()))?;
        session.ensure_active()?;

        let expected_here = self.index.find_by_location(&location).await?;
        let elsewhere = self.lookup_elsewhere(&expected_here, &scanned).await?;

        let outcome = reconcile(
            session_id,
            &location,
            &expected_here,
            |id| elsewhere.get(id),
            &scanned,
            Utc::now(),
        );
        let delta = outcome.delta;

        let updated = self
            .store
            .record_scan(session_id, outcome.records, delta)
            .await?;

        tracing::info!(
            session_id = %session_id,
            rack = %location.rack,
            shelf = %location.shelf,
            found = delta.found,
            misplaced = delta.misplaced,
            missing = delta.missing,
            "shelf scanned"
        );

        Ok(ScanSummary {
            session_id,
            location,
            batch: delta,
            expected_here: expected_here.len(),
            totals: updated.totals,
        })
    }

    /// Catalog-wide lookups for scanned identifiers not registered at the queried location.
    async fn lookup_elsewhere(
        &self,
        expected_here: &[InventoryRecord],
        scanned: &[Identifier],
    ) -> Result<HashMap<Identifier, InventoryRecord>, AuditError> {
        let mut found = HashMap::new();
        let mut looked_up = std::collections::HashSet::new();
        for id in scanned {
            if expected_here.iter().any(|r| &r.identifier == id) || !looked_up.insert(id) {
                continue;
            }
            if let Some(record) = self.index.find_by_identifier(id).await? {
                found.insert(id.clone(), record);
            }
        }
        Ok(found)
    }

    #[instrument(skip(self, notes), err)]
    pub async fn finalize_audit(
        &self,
        session_id: &str,
        notes: Option<&str>,
    ) -> Result<FinalizeSummary, AuditError> {
        let session_id = parse_session_id(session_id)?;
        let notes = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        // The claim is the only guard against a concurrent finalize, including
        // one running in another process against the same store.
        self.store.begin_finalize(session_id).await?;

        let result = self.finalize_claimed(session_id, notes).await;
        if let Err(AuditError::Dependency(reason)) = &result {
            if let Err(err) = self.store.abort_finalize(session_id).await {
                tracing::error!(
                    session_id = %session_id,
                    reason = %reason,
                    error = %err,
                    "failed to release finalize claim"
                );
            }
        }
        result
    }

    async fn finalize_claimed(
        &self,
        session_id: SessionId,
        notes: Option<String>,
    ) -> Result<FinalizeSummary, AuditError> {
        let catalog = self.index.list_all().await?;
        let written = self.store.list_records(session_id).await?;
        let ended_at = Utc::now();
        let sweep = sweep_unseen(session_id, &catalog, &written, ended_at);

        let lost_ids = sweep.lost_identifiers();
        if !lost_ids.is_empty() {
            self.index.bulk_set_status(&lost_ids, ItemStatus::Lost).await?;
        }

        let closed = match self
            .store
            .complete_session(session_id, sweep.records.clone(), ended_at, notes)
            .await
        {
            Ok(closed) => closed,
            // Someone else owns the session state now; the Lost marks stand.
            Err(err @ (StoreError::Conflict(_) | StoreError::NotFound(_))) => {
                tracing::warn!(session_id = %session_id, error = %err, "finalize claim lost");
                return Err(err.into());
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "closing session failed; restoring item statuses"
                );
                self.restore_statuses(&sweep.lost).await;
                return Err(err.into());
            }
        };

        let summary = FinalizeSummary::from_session(&closed, sweep.books_marked_lost());
        tracing::info!(
            session_id = %session_id,
            books_marked_lost = summary.books_marked_lost,
            total_missing = summary.totals.total_missing,
            "audit finalized"
        );
        Ok(summary)
    }

    /// Compensating action: put every swept item back to the status it had.
    async fn restore_statuses(&self, lost: &[InventoryRecord]) {
        let mut by_status: HashMap<ItemStatus, Vec<Identifier>> = HashMap::new();
        for item in lost.iter().filter(|r| r.status != ItemStatus::Lost) {
            by_status
                .entry(item.status)
                .or_default()
                .push(item.identifier.clone());
        }

        for (status, ids) in by_status {
            if let Err(err) = self.index.bulk_set_status(&ids, status).await {
                tracing::error!(
                    status = status.as_str(),
                    count = ids.len(),
                    identifiers = ?ids,
                    error = %err,
                    "failed to restore item statuses after aborted finalize"
                );
            }
        }
    }

    #[instrument(skip(self), err)]
    pub async fn audit_report(&self, session_id: &str) -> Result<AuditReport, AuditError> {
        let session_id = parse_session_id(session_id)?;
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AuditError::NotFound("audit session not found".to_string()))?;
        let records = self.store.list_records(session_id).await?;
        Ok(AuditReport::assemble(session, records))
    }

    #[instrument(skip(self), err)]
    pub async fn list_sessions(&self) -> Result<Vec<AuditSession>, AuditError> {
        Ok(self.store.list_sessions(self.session_list_limit).await?)
    }
}
