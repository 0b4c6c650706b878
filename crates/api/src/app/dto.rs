use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use shelfaudit_audit::{
    AuditRecord, AuditReport, AuditSession, FinalizeSummary, ScanSummary, SessionTotals,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

// Missing fields deserialize to empty values so the service reports them as
// validation errors with its own messages.

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub auditor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanShelfRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub rack: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub shelf: String,
    #[serde(default)]
    pub scanned_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeAuditRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Scanner clients send rack/shelf labels either as strings or bare numbers.
///
/// Numbers must be integral (`1` and `1.0` both mean rack "1"); anything else
/// is rejected rather than turned into a label no catalog entry carries.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => integral_label(&n)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a whole number, got {n}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn integral_label(n: &serde_json::Number) -> Option<String> {
    if let Some(i) = n.as_i64() {
        return Some(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Some(u.to_string());
    }
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15).then(|| format!("{f:.0}"))
}

/// Unwrap a JSON body, turning extractor rejections into our error shape.
pub fn body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|axum::Json(v)| v)
        .map_err(|rejection| {
            errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
        })
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn totals_json(totals: &SessionTotals) -> Value {
    json!({
        "totalScanned": totals.total_scanned,
        "totalFound": totals.total_found,
        "totalMissing": totals.total_missing,
        "totalMisplaced": totals.total_misplaced,
    })
}

pub fn session_json(session: &AuditSession) -> Value {
    json!({
        "sessionId": session.session_id.to_string(),
        "auditor": session.auditor,
        "status": session.status.as_str(),
        "startedAt": session.started_at,
        "endedAt": session.ended_at,
        "durationMs": session.duration().map(|d| d.num_milliseconds()),
        "totalScanned": session.totals.total_scanned,
        "totalFound": session.totals.total_found,
        "totalMissing": session.totals.total_missing,
        "totalMisplaced": session.totals.total_misplaced,
        "notes": session.notes,
    })
}

pub fn record_json(record: &AuditRecord) -> Value {
    json!({
        "identifier": record.identifier.as_str(),
        "accessionNumber": record.accession_number,
        "title": record.title,
        "author": record.author,
        "queriedRack": record.queried.rack,
        "queriedShelf": record.queried.shelf,
        "resolvedRack": record.resolved.rack,
        "resolvedShelf": record.resolved.shelf,
        "classification": record.classification.label(),
        "missingReason": record
            .classification
            .is_missing()
            .then(|| record.classification.as_str()),
        "notes": record.notes,
        "scannedAt": record.scanned_at,
    })
}

pub fn scan_json(summary: &ScanSummary) -> Value {
    json!({
        "message": "Shelf scanned successfully",
        "sessionId": summary.session_id.to_string(),
        "rack": summary.location.rack,
        "shelf": summary.location.shelf,
        "scannedCodes": summary.batch.scanned,
        "booksFound": summary.batch.found,
        "booksMissing": summary.batch.missing,
        "booksMisplaced": summary.batch.misplaced,
        "expectedBooks": summary.expected_here,
        "summary": totals_json(&summary.totals),
    })
}

pub fn finalize_json(summary: &FinalizeSummary) -> Value {
    let mut totals = totals_json(&summary.totals);
    totals["booksMarkedLost"] = json!(summary.books_marked_lost);
    json!({
        "message": "Audit session finalized successfully",
        "sessionId": summary.session_id.to_string(),
        "summary": totals,
        "duration": summary.duration.num_milliseconds(),
    })
}

pub fn report_json(report: &AuditReport) -> Value {
    json!({
        "auditSession": session_json(&report.session),
        "reports": report.records.iter().map(record_json).collect::<Vec<_>>(),
        "summary": totals_json(&report.summary()),
    })
}

pub fn sessions_json(sessions: &[AuditSession]) -> Value {
    json!({
        "sessions": sessions.iter().map(session_json).collect::<Vec<_>>(),
        "total": sessions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shelfaudit_core::SessionId;
    use shelfaudit_inventory::{Identifier, Location};

    #[test]
    fn scan_request_accepts_numeric_rack_and_shelf() {
        let req: ScanShelfRequest = serde_json::from_value(json!({
            "sessionId": "abc",
            "rack": 1,
            "shelf": "5",
            "scannedCodes": ["I1"],
        }))
        .unwrap();
        assert_eq!(req.rack, "1");
        assert_eq!(req.shelf, "5");

        let float: ScanShelfRequest =
            serde_json::from_value(json!({ "rack": 1.0, "shelf": 12 })).unwrap();
        assert_eq!(float.rack, "1");
        assert_eq!(float.shelf, "12");

        let empty: ScanShelfRequest = serde_json::from_value(json!({})).unwrap();
        assert!(empty.session_id.is_empty());
        assert!(empty.scanned_codes.is_empty());
    }

    #[test]
    fn scan_request_rejects_fractional_rack() {
        let err = serde_json::from_value::<ScanShelfRequest>(json!({ "rack": 1.5, "shelf": "5" }))
            .unwrap_err();
        assert!(err.to_string().contains("whole number"), "{err}");
    }

    #[test]
    fn unregistered_record_renders_as_missing_with_reason() {
        let here = Location::parse("1", "6").unwrap();
        let rec = AuditRecord::unregistered(
            SessionId::new(),
            &Identifier::parse("ghost").unwrap(),
            &here,
            Utc::now(),
        );

        let v = record_json(&rec);

        assert_eq!(v["classification"], "missing");
        assert_eq!(v["missingReason"], "unregistered");
        assert_eq!(v["identifier"], "GHOST");
        assert_eq!(v["queriedRack"], "1");
        assert_eq!(v["resolvedShelf"], "6");
        assert!(v.get("recordId").is_none());
        assert!(v.get("sessionId").is_none());
    }

    #[test]
    fn finalize_summary_carries_lost_count_and_duration() {
        let mut session = AuditSession::start(SessionId::new(), "Alice", Utc::now()).unwrap();
        let ended = session.started_at + chrono::Duration::milliseconds(1500);
        session.begin_finalize().unwrap();
        session.complete(ended, None, 2).unwrap();

        let v = finalize_json(&FinalizeSummary::from_session(&session, 2));

        assert_eq!(v["summary"]["booksMarkedLost"], 2);
        assert_eq!(v["summary"]["totalMissing"], 2);
        assert_eq!(v["duration"], 1500);
    }
}
