use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use shelfaudit_core::{DomainError, DomainResult, SessionId, error::require_non_empty};

/// Session lifecycle: `Active -> Finalizing -> Completed`.
///
/// `Finalizing` is the claim taken before any catalog write; a failed finalize
/// hands it back (`Finalizing -> Active`). Scans are accepted only while active.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finalizing,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Finalizing => "finalizing",
            SessionStatus::Completed => "completed",
        }
    }
}

impl core::str::FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "finalizing" => Ok(SessionStatus::Finalizing),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(DomainError::validation(format!("unknown session status '{other}'"))),
        }
    }
}

/// Counter increments produced by one scan batch (or one sweep).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub scanned: u64,
    pub found: u64,
    pub missing: u64,
    pub misplaced: u64,
}

impl CounterDelta {
    /// Sum of the three classification counts.
    pub fn classified(&self) -> u64 {
        self.found + self.missing + self.misplaced
    }
}

/// Running totals stored on the session.
///
/// Accumulated incrementally as records are written; never recomputed from
/// the records themselves.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub total_scanned: u64,
    pub total_found: u64,
    pub total_missing: u64,
    pub total_misplaced: u64,
}

impl SessionTotals {
    pub fn apply(&mut self, delta: &CounterDelta) {
        self.total_scanned = self.total_scanned.saturating_add(delta.scanned);
        self.total_found = self.total_found.saturating_add(delta.found);
        self.total_missing = self.total_missing.saturating_add(delta.missing);
        self.total_misplaced = self.total_misplaced.saturating_add(delta.misplaced);
    }
}

/// One bounded audit exercise, from start to finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSession {
    pub session_id: SessionId,
    pub auditor: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub totals: SessionTotals,
    pub notes: String,
}

impl AuditSession {
    /// Open a new session for `auditor`.
    pub fn start(session_id: SessionId, auditor: &str, started_at: DateTime<Utc>) -> DomainResult<Self> {
        let auditor = require_non_empty("auditor name", auditor)?;
        Ok(Self {
            session_id,
            auditor,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
            totals: SessionTotals::default(),
            notes: String::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Fails the way a scan against this session must fail when it is closed.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::not_found("audit session not found or expired"));
        }
        Ok(())
    }

    /// Add one scan batch's counts to the running totals.
    pub fn record_scan(&mut self, delta: &CounterDelta) -> DomainResult<()> {
        self.ensure_active()?;
        self.totals.apply(delta);
        Ok(())
    }

    /// Claim the session for finalize. Only one claim can be held at a time.
    pub fn begin_finalize(&mut self) -> DomainResult<()> {
        match self.status {
            SessionStatus::Active => {
                self.status = SessionStatus::Finalizing;
                Ok(())
            }
            SessionStatus::Finalizing => Err(DomainError::conflict(
                "audit session finalize already in progress",
            )),
            SessionStatus::Completed => Err(DomainError::conflict("audit session already finalized")),
        }
    }

    /// Give a finalize claim back after a failed finalize.
    pub fn abort_finalize(&mut self) -> DomainResult<()> {
        if self.status != SessionStatus::Finalizing {
            return Err(DomainError::conflict("audit session is not being finalized"));
        }
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Close a claimed session after the sweep marked `books_marked_lost` items lost.
    ///
    /// Blank `notes` leave the existing notes untouched.
    pub fn complete(
        &mut self,
        ended_at: DateTime<Utc>,
        notes: Option<&str>,
        books_marked_lost: u64,
    ) -> DomainResult<()> {
        match self.status {
            SessionStatus::Finalizing => {}
            SessionStatus::Completed => {
                return Err(DomainError::conflict("audit session already finalized"));
            }
            SessionStatus::Active => {
                return Err(DomainError::conflict("audit session finalize not started"));
            }
        }
        self.totals.apply(&CounterDelta {
            missing: books_marked_lost,
            ..CounterDelta::default()
        });
        self.status = SessionStatus::Completed;
        self.ended_at = Some(ended_at);
        if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            self.notes = notes.to_string();
        }
        Ok(())
    }

    /// Elapsed time between start and end; `None` while active.
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}
