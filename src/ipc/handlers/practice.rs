use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    db_conn, delete_row, insert_row, new_id, optional_enum, read_create, required_enum,
    required_str, update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use serde_json::json;

/// Ordered: a session only ever moves rightwards.
pub const PRACTICE_STATES: &[&str] = &["planned", "in-progress", "completed"];

const PRACTICE_FIELDS: &[Field] = &[
    Field::new("sessionName", "session_name", FieldKind::Text),
    Field::new("location", "location", FieldKind::Text),
    Field::new("date", "date", FieldKind::Text),
    Field::new("startTime", "start_time", FieldKind::OptText),
    Field::new("endTime", "end_time", FieldKind::OptText),
    Field::new("transportDetails", "transport_details", FieldKind::OptText),
    Field::new("notes", "notes", FieldKind::OptText),
];

fn rank(status: &str) -> Option<usize> {
    PRACTICE_STATES.iter().position(|s| *s == status)
}

fn is_forward(from: &str, to: &str) -> bool {
    match (rank(from), rank(to)) {
        (Some(a), Some(b)) => b > a,
        _ => false,
    }
}

fn handle_practice_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let status = optional_enum(req, "status", PRACTICE_STATES)?;
    let mut stmt = conn.prepare(
        "SELECT id, session_name, location, date, start_time, end_time,
                transport_details, status, notes
         FROM practice_sessions
         ORDER BY date ASC, start_time ASC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let session_name: String = r.get(1)?;
            let location: String = r.get(2)?;
            let date: String = r.get(3)?;
            let start_time: Option<String> = r.get(4)?;
            let end_time: Option<String> = r.get(5)?;
            let transport: Option<String> = r.get(6)?;
            let status: String = r.get(7)?;
            let notes: Option<String> = r.get(8)?;
            Ok(json!({
                "id": id,
                "sessionName": session_name,
                "location": location,
                "date": date,
                "startTime": start_time,
                "endTime": end_time,
                "transportDetails": transport,
                "status": status,
                "notes": notes
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = serde_json::Map::new();
    for s in PRACTICE_STATES {
        let n = rows
            .iter()
            .filter(|r| r.get("status").and_then(|v| v.as_str()) == Some(*s))
            .count();
        counts.insert((*s).to_string(), json!(n));
    }
    let sessions: Vec<&serde_json::Value> = rows
        .iter()
        .filter(|r| status.is_none() || r.get("status").and_then(|v| v.as_str()) == status)
        .collect();
    Ok(json!({ "sessions": sessions, "counts": counts }))
}

fn handle_practice_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, PRACTICE_FIELDS)?;
    cols.push(("status", Value::Text("planned".to_string())));
    let session_id = new_id();
    insert_row(conn, "practice_sessions", &session_id, cols)?;
    tracing::info!(session_id = %session_id, "practice session planned");
    Ok(json!({ "sessionId": session_id }))
}

fn handle_practice_update_status(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let to = required_enum(req, "status", PRACTICE_STATES)?;
    let from: String = conn
        .query_row(
            "SELECT status FROM practice_sessions WHERE id = ?",
            [&session_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or(ApiError::NotFound("practice session"))?;
    if !is_forward(&from, to) {
        return Err(ApiError::BadTransition {
            from,
            to: to.to_string(),
        });
    }
    update_row(
        conn,
        "practice_sessions",
        &session_id,
        "practice session",
        vec![("status", Value::Text(to.to_string()))],
    )?;
    tracing::info!(session_id = %session_id, from = %from, to, "practice status changed");
    Ok(json!({ "sessionId": session_id, "status": to }))
}

fn handle_practice_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    delete_row(conn, "practice_sessions", &session_id, "practice session")?;
    Ok(json!({ "sessionId": session_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "practice.list" => handle_practice_list(state, req),
        "practice.create" => handle_practice_create(state, req),
        "practice.updateStatus" => handle_practice_update_status(state, req),
        "practice.delete" => handle_practice_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
