//! Postgres-backed catalog view and audit store.
//!
//! One pool serves both traits: the catalog lives in `books` (owned by the
//! catalog service; this code only reads it and writes `status`), sessions in
//! `audit_sessions`, records in `audit_records`.
//!
//! ## Atomicity
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ...`, so
//! `active -> finalizing -> completed` is a chain of compare-and-sets shared by
//! every process using the database. `record_scan` and `complete_session` each
//! run in one transaction that starts with that update; the row lock it takes
//! serializes concurrent scans of the same session.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | Decode / column errors | N/A | `Corrupt` |
//! | Pool / IO / other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use shelfaudit_audit::{
    AuditRecord, AuditSession, Classification, CounterDelta, SessionStatus, SessionTotals,
};
use shelfaudit_core::{AuditRecordId, SessionId};
use shelfaudit_inventory::{Identifier, InventoryRecord, ItemStatus, Location};

use super::{AuditStore, InventoryIndex, StoreError};

/// Schema for the audit tables (and the catalog table it reads).
pub const SCHEMA: &str = include_str!("../../migrations/0001_shelf_audit.sql");

const SESSION_COLUMNS: &str = "session_id, auditor, status, started_at, ended_at, \
     total_scanned, total_found, total_missing, total_misplaced, notes";

const BOOK_COLUMNS: &str = "identifier, accession_number, title, author, rack, shelf, status";

/// Postgres implementation of [`InventoryIndex`] and [`AuditStore`].
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryIndex for PostgresAuditStore {
    #[instrument(skip(self), fields(rack = %location.rack, shelf = %location.shelf), err)]
    async fn find_by_location(&self, location: &Location) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE rack = $1 AND shelf = $2 ORDER BY identifier"
        ))
        .bind(&location.rack)
        .bind(&location.shelf)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_location", e))?;

        rows.iter().map(book_from_row).collect()
    }

    #[instrument(skip(self), fields(identifier = %identifier), err)]
    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE identifier = $1"))
            .bind(identifier.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_identifier", e))?;

        row.as_ref().map(book_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_all(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY identifier"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all", e))?;

        rows.iter().map(book_from_row).collect()
    }

    #[instrument(skip(self, identifiers), fields(count = identifiers.len(), status = status.as_str()), err)]
    async fn bulk_set_status(&self, identifiers: &[Identifier], status: ItemStatus) -> Result<u64, StoreError> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = identifiers.iter().map(|i| i.as_str().to_string()).collect();

        let result = sqlx::query("UPDATE books SET status = $1 WHERE identifier = ANY($2)")
            .bind(status.as_str())
            .bind(&ids)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("bulk_set_status", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip(self, session), fields(session_id = %session.session_id), err)]
    async fn create_session(&self, session: &AuditSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_sessions (
                session_id, auditor, status, started_at, ended_at,
                total_scanned, total_found, total_missing, total_misplaced, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.session_id.as_uuid())
        .bind(&session.auditor)
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(to_i64(session.totals.total_scanned))
        .bind(to_i64(session.totals.total_found))
        .bind(to_i64(session.totals.total_missing))
        .bind(to_i64(session.totals.total_misplaced))
        .bind(&session.notes)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_session", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn get_session(&self, session_id: SessionId) -> Result<Option<AuditSession>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM audit_sessions WHERE session_id = $1"
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;

        row.as_ref().map(session_from_row).transpose()
    }

    #[instrument(
        skip(self, records),
        fields(session_id = %session_id, record_count = records.len()),
        err
    )]
    async fn record_scan(
        &self,
        session_id: SessionId,
        records: Vec<AuditRecord>,
        delta: CounterDelta,
    ) -> Result<AuditSession, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE audit_sessions
            SET total_scanned = total_scanned + $2,
                total_found = total_found + $3,
                total_missing = total_missing + $4,
                total_misplaced = total_misplaced + $5
            WHERE session_id = $1 AND status = 'active'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id.as_uuid())
        .bind(to_i64(delta.scanned))
        .bind(to_i64(delta.found))
        .bind(to_i64(delta.missing))
        .bind(to_i64(delta.misplaced))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("increment_counters", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound(
                "audit session not found or expired".to_string(),
            ));
        };
        let updated = session_from_row(&row)?;

        insert_records(&mut tx, &records).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(updated)
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn list_records(&self, session_id: SessionId) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                record_id, session_id, identifier, accession_number, title, author,
                queried_rack, queried_shelf, resolved_rack, resolved_shelf,
                classification, notes, scanned_at
            FROM audit_records
            WHERE session_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn begin_finalize(&self, session_id: SessionId) -> Result<AuditSession, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE audit_sessions
            SET status = 'finalizing'
            WHERE session_id = $1 AND status = 'active'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("begin_finalize", e))?;

        match row {
            Some(row) => session_from_row(&row),
            None => Err(self.not_claimable(session_id).await?),
        }
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn abort_finalize(&self, session_id: SessionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE audit_sessions SET status = 'active' \
             WHERE session_id = $1 AND status = 'finalizing'",
        )
        .bind(session_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("abort_finalize", e))?;

        if result.rows_affected() == 0 {
            return Err(self.not_claimable(session_id).await?);
        }
        Ok(())
    }

    #[instrument(
        skip(self, loss_records, notes),
        fields(session_id = %session_id, loss_count = loss_records.len()),
        err
    )]
    async fn complete_session(
        &self,
        session_id: SessionId,
        loss_records: Vec<AuditRecord>,
        ended_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<AuditSession, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let notes = notes.filter(|n| !n.trim().is_empty());
        let row = sqlx::query(&format!(
            r#"
            UPDATE audit_sessions
            SET status = 'completed',
                ended_at = $2,
                notes = COALESCE($3, notes),
                total_missing = total_missing + $4
            WHERE session_id = $1 AND status = 'finalizing'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id.as_uuid())
        .bind(ended_at)
        .bind(notes.as_deref().map(str::trim))
        .bind(to_i64(loss_records.len() as u64))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("complete_session", e))?;

        let Some(row) = row else {
            let exists = sqlx::query("SELECT 1 FROM audit_sessions WHERE session_id = $1")
                .bind(session_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("session_exists", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if exists {
                StoreError::Conflict("audit session is not being finalized".to_string())
            } else {
                StoreError::NotFound("audit session not found".to_string())
            });
        };
        let closed = session_from_row(&row)?;

        insert_records(&mut tx, &loss_records).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(closed)
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self, limit: usize) -> Result<Vec<AuditSession>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM audit_sessions \
             ORDER BY started_at DESC, session_id DESC LIMIT $1"
        ))
        .bind(to_i64(limit as u64))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sessions", e))?;

        rows.iter().map(session_from_row).collect()
    }
}

impl PostgresAuditStore {
    /// Error for a status compare-and-set that matched no row.
    async fn not_claimable(&self, session_id: SessionId) -> Result<StoreError, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM audit_sessions WHERE session_id = $1")
                .bind(session_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("session_status", e))?;

        Ok(match status.as_deref() {
            None => StoreError::NotFound("audit session not found".to_string()),
            Some("completed") => StoreError::Conflict("audit session already finalized".to_string()),
            Some(other) => StoreError::Conflict(format!("audit session is {other}")),
        })
    }
}

async fn insert_records(
    tx: &mut Transaction<'_, Postgres>,
    records: &[AuditRecord],
) -> Result<(), StoreError> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO audit_records (
                record_id, session_id, identifier, accession_number, title, author,
                queried_rack, queried_shelf, resolved_rack, resolved_shelf,
                classification, notes, scanned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.record_id.as_uuid())
        .bind(record.session_id.as_uuid())
        .bind(record.identifier.as_str())
        .bind(&record.accession_number)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.queried.rack)
        .bind(&record.queried.shelf)
        .bind(&record.resolved.rack)
        .bind(&record.resolved.shelf)
        .bind(record.classification.as_str())
        .bind(&record.notes)
        .bind(record.scanned_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_record", e))?;
    }
    Ok(())
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn counter(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let v: i64 = row.try_get(column).map_err(|e| corrupt(column, e))?;
    u64::try_from(v).map_err(|_| StoreError::Corrupt(format!("{column} is negative ({v})")))
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("failed to read {column}: {err}"))
}

fn text(row: &PgRow, column: &str) -> Result<String, StoreError> {
    row.try_get::<String, _>(column).map_err(|e| corrupt(column, e))
}

fn session_from_row(row: &PgRow) -> Result<AuditSession, StoreError> {
    let session_id: uuid::Uuid = row.try_get("session_id").map_err(|e| corrupt("session_id", e))?;
    let status: SessionStatus = text(row, "status")?.parse()?;
    Ok(AuditSession {
        session_id: SessionId::from_uuid(session_id),
        auditor: text(row, "auditor")?,
        status,
        started_at: row.try_get("started_at").map_err(|e| corrupt("started_at", e))?,
        ended_at: row.try_get("ended_at").map_err(|e| corrupt("ended_at", e))?,
        totals: SessionTotals {
            total_scanned: counter(row, "total_scanned")?,
            total_found: counter(row, "total_found")?,
            total_missing: counter(row, "total_missing")?,
            total_misplaced: counter(row, "total_misplaced")?,
        },
        notes: text(row, "notes")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let record_id: uuid::Uuid = row.try_get("record_id").map_err(|e| corrupt("record_id", e))?;
    let session_id: uuid::Uuid = row.try_get("session_id").map_err(|e| corrupt("session_id", e))?;
    let classification: Classification = text(row, "classification")?.parse()?;
    Ok(AuditRecord {
        record_id: AuditRecordId::from_uuid(record_id),
        session_id: SessionId::from_uuid(session_id),
        identifier: Identifier::parse(&text(row, "identifier")?)?,
        accession_number: text(row, "accession_number")?,
        title: text(row, "title")?,
        author: text(row, "author")?,
        queried: Location {
            rack: text(row, "queried_rack")?,
            shelf: text(row, "queried_shelf")?,
        },
        resolved: Location {
            rack: text(row, "resolved_rack")?,
            shelf: text(row, "resolved_shelf")?,
        },
        classification,
        notes: text(row, "notes")?,
        scanned_at: row.try_get("scanned_at").map_err(|e| corrupt("scanned_at", e))?,
    })
}

fn book_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    Ok(InventoryRecord {
        identifier: Identifier::parse(&text(row, "identifier")?)?,
        accession_number: text(row, "accession_number")?,
        title: text(row, "title")?,
        author: text(row, "author")?,
        location: Location {
            rack: text(row, "rack")?,
            shelf: text(row, "shelf")?,
        },
        status: text(row, "status")?.parse()?,
    })
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::Unavailable(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_all_tables() {
        for table in ["books", "audit_sessions", "audit_records"] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn non_database_errors_are_unavailable() {
        let err = map_sqlx_error("list_all", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.starts_with("list_all")));
    }

    #[test]
    fn counters_saturate_when_converted() {
        assert_eq!(to_i64(u64::MAX), i64::MAX);
        assert_eq!(to_i64(42), 42);
    }
}
