use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::colleges::{college_tree, load_student_records};
use crate::ipc::handlers::{dashboard, materials, medical, practice, setup};
use crate::ipc::helpers::{count, db_conn, now_ts, required_str};
use crate::ipc::types::{AppState, Request};
use crate::rollup;
use rusqlite::Connection;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Enrollment,
    Medical,
    Rooms,
    Materials,
    Practice,
    Weekly,
}

impl ReportKind {
    const ALL: [ReportKind; 6] = [
        ReportKind::Enrollment,
        ReportKind::Medical,
        ReportKind::Rooms,
        ReportKind::Materials,
        ReportKind::Practice,
        ReportKind::Weekly,
    ];

    fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }

    fn as_str(self) -> &'static str {
        match self {
            ReportKind::Enrollment => "enrollment",
            ReportKind::Medical => "medical",
            ReportKind::Rooms => "rooms",
            ReportKind::Materials => "materials",
            ReportKind::Practice => "practice",
            ReportKind::Weekly => "weekly",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ReportKind::Enrollment => "Student enrollment",
            ReportKind::Medical => "Medical records",
            ReportKind::Rooms => "Lecture room utilization",
            ReportKind::Materials => "Teaching materials inventory",
            ReportKind::Practice => "External practice",
            ReportKind::Weekly => "Weekly summary",
        }
    }
}

fn counts_by(
    conn: &Connection,
    table: &str,
    column: &str,
    values: &[&str],
) -> Result<serde_json::Map<String, serde_json::Value>, ApiError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column);
    let mut out = serde_json::Map::new();
    for v in values {
        out.insert((*v).to_string(), json!(count(conn, &sql, &[*v])?));
    }
    Ok(out)
}

fn enrollment_model(conn: &Connection) -> ApiResult {
    let records = load_student_records(conn)?;
    Ok(json!({
        "population": rollup::summarize_population(&records),
        "colleges": college_tree(conn)?,
    }))
}

fn medical_model(conn: &Connection) -> ApiResult {
    Ok(json!({
        "total": count(conn, "SELECT COUNT(*) FROM medical_records", &[])?,
        "byStatus": counts_by(conn, "medical_records", "status", medical::MEDICAL_STATES)?,
        "byTreatmentType": counts_by(
            conn,
            "medical_records",
            "treatment_type",
            medical::TREATMENT_TYPES
        )?,
    }))
}

fn rooms_model(conn: &Connection) -> ApiResult {
    let n = |sql: &str| count(conn, sql, &[]);
    Ok(json!({
        "totalRooms": n("SELECT COUNT(*) FROM lecture_rooms")?,
        "available": n("SELECT COUNT(*) FROM lecture_rooms WHERE status = 'available'")?,
        "occupied": n("SELECT COUNT(*) FROM lecture_rooms WHERE status = 'occupied'")?,
        "totalCapacity": n("SELECT COALESCE(SUM(capacity), 0) FROM lecture_rooms")?,
    }))
}

fn materials_model(conn: &Connection) -> ApiResult {
    Ok(json!({
        "totalItems": count(conn, "SELECT COUNT(*) FROM materials", &[])?,
        "totalQuantity": count(conn, "SELECT COALESCE(SUM(quantity), 0) FROM materials", &[])?,
        "lowStockThreshold": setup::low_stock_threshold(conn)?,
        "byStatus": counts_by(conn, "materials", "status", materials::STOCK_STATES)?,
    }))
}

fn practice_model(conn: &Connection) -> ApiResult {
    Ok(json!({
        "total": count(conn, "SELECT COUNT(*) FROM practice_sessions", &[])?,
        "byStatus": counts_by(conn, "practice_sessions", "status", practice::PRACTICE_STATES)?,
    }))
}

/// Dashboard totals plus what happened inside the configured window.
fn weekly_model(conn: &Connection) -> ApiResult {
    let days = setup::weekly_window_days(conn)?;
    let since = (chrono::Utc::now() - chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string();
    let since_ref = since.as_str();
    let n = |sql: &str| count(conn, sql, &[since_ref]);
    Ok(json!({
        "windowDays": days,
        "since": since_ref,
        "summary": dashboard::summary(conn)?,
        "activity": {
            "newStudents": n("SELECT COUNT(*) FROM students WHERE created_at >= ?")?,
            "medicalCheckIns": n("SELECT COUNT(*) FROM medical_records WHERE check_in_date >= ?")?,
            "incidents": n("SELECT COUNT(*) FROM student_incidents WHERE incident_date >= ?")?,
            "announcements": n("SELECT COUNT(*) FROM announcements WHERE created_at >= ?")?,
            "messagesReceived": n("SELECT COUNT(*) FROM messages WHERE created_at >= ?")?,
            "practiceSessions": n("SELECT COUNT(*) FROM practice_sessions WHERE date >= ?")?,
        },
    }))
}

fn handle_reports_list(_state: &mut AppState, _req: &Request) -> ApiResult {
    let reports: Vec<serde_json::Value> = ReportKind::ALL
        .into_iter()
        .map(|k| json!({ "kind": k.as_str(), "title": k.title() }))
        .collect();
    Ok(json!({ "reports": reports }))
}

fn handle_reports_generate(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let raw = required_str(req, "kind")?;
    let Some(kind) = ReportKind::parse(&raw) else {
        return Err(ApiError::bad_params(format!("unknown report kind: {}", raw)));
    };
    let model = match kind {
        ReportKind::Enrollment => enrollment_model(conn)?,
        ReportKind::Medical => medical_model(conn)?,
        ReportKind::Rooms => rooms_model(conn)?,
        ReportKind::Materials => materials_model(conn)?,
        ReportKind::Practice => practice_model(conn)?,
        ReportKind::Weekly => weekly_model(conn)?,
    };
    tracing::debug!(kind = kind.as_str(), "report generated");
    Ok(json!({
        "kind": kind.as_str(),
        "title": kind.title(),
        "generatedAt": now_ts(),
        "model": model
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.list" => handle_reports_list(state, req),
        "reports.generate" => handle_reports_generate(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::ReportKind;

    #[test]
    fn every_kind_parses_back() {
        for k in ReportKind::ALL {
            assert_eq!(ReportKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(ReportKind::parse("attendance"), None);
    }
}
