use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::students::latest_incident_state;
use crate::ipc::helpers::{
    assigned, assigned_text, db_conn, delete_row, ensure_exists, insert_row, new_id, now_ts,
    optional_enum, read_create, read_patch, required_str, set_assignment, today, update_row,
    Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use crate::rollup::IncidentType;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const INCIDENT_FIELDS: &[Field] = &[
    Field::new("studentId", "student_id", FieldKind::Text),
    Field::new(
        "incidentType",
        "incident_type",
        FieldKind::Enum {
            allowed: &IncidentType::RECORDABLE,
            default: None,
        },
    ),
    Field::new("incidentDate", "incident_date", FieldKind::OptText),
    Field::new("reason", "reason", FieldKind::Text),
    Field::new("notes", "notes", FieldKind::OptText),
];

/// Patchable subset; an incident never moves to another student.
const INCIDENT_PATCH_FIELDS: &[Field] = &[
    Field::new(
        "incidentType",
        "incident_type",
        FieldKind::Enum {
            allowed: &IncidentType::RECORDABLE,
            default: None,
        },
    ),
    Field::new("incidentDate", "incident_date", FieldKind::Text),
    Field::new("reason", "reason", FieldKind::Text),
    Field::new("notes", "notes", FieldKind::OptText),
];

/// The student's state always mirrors their most recent incident.
fn sync_student_incident(conn: &Connection, student_id: &str) -> Result<IncidentType, ApiError> {
    let state = latest_incident_state(conn, student_id)?;
    conn.execute(
        "UPDATE students SET incident_type = ?, updated_at = ? WHERE id = ?",
        (state.as_str(), now_ts(), student_id),
    )
    .map_err(ApiError::update("students"))?;
    Ok(state)
}

fn incident_student(conn: &Connection, incident_id: &str) -> Result<String, ApiError> {
    conn.query_row(
        "SELECT student_id FROM student_incidents WHERE id = ?",
        [incident_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(ApiError::NotFound("incident"))
}

fn handle_incidents_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let kind = optional_enum(req, "type", &IncidentType::RECORDABLE)?;
    let mut stmt = conn.prepare(
        "SELECT i.id, i.student_id, s.full_name, s.student_no, f.faculty_name, s.year,
                i.incident_type, i.incident_date, i.reason, i.notes
         FROM student_incidents i
         JOIN students s ON s.id = i.student_id
         LEFT JOIN faculties f ON f.id = s.faculty_id
         ORDER BY i.incident_date DESC, i.created_at DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let student_name: String = r.get(2)?;
            let student_no: String = r.get(3)?;
            let faculty_name: Option<String> = r.get(4)?;
            let year: Option<i64> = r.get(5)?;
            let incident_type: String = r.get(6)?;
            let incident_date: String = r.get(7)?;
            let reason: String = r.get(8)?;
            let notes: Option<String> = r.get(9)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "studentName": student_name,
                "studentNo": student_no,
                "facultyName": faculty_name,
                "year": year,
                "incidentType": incident_type,
                "incidentDate": incident_date,
                "reason": reason,
                "notes": notes
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let type_of = |r: &serde_json::Value| {
        r.get("incidentType")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let mut counts = serde_json::Map::new();
    for t in IncidentType::RECORDABLE {
        let n = rows.iter().filter(|r| type_of(r).as_deref() == Some(t)).count();
        counts.insert(t.to_string(), json!(n));
    }
    let incidents: Vec<&serde_json::Value> = rows
        .iter()
        .filter(|r| kind.is_none() || type_of(r).as_deref() == kind)
        .collect();
    Ok(json!({ "incidents": incidents, "counts": counts }))
}

fn handle_incidents_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, INCIDENT_FIELDS)?;
    let student_id = assigned_text(&cols, "student_id")
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_params("missing studentId"))?;
    let incident_type = assigned_text(&cols, "incident_type")
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_params("missing incidentType"))?;
    ensure_exists(conn, "students", &student_id, "student")?;
    if assigned(&cols, "incident_date") == Some(&Value::Null) {
        set_assignment(&mut cols, "incident_date", Value::Text(today()));
    }

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    let incident_id = new_id();
    insert_row(&tx, "student_incidents", &incident_id, cols)?;
    let current = sync_student_incident(&tx, &student_id)?;
    tx.commit().map_err(ApiError::tx)?;
    tracing::info!(
        incident_id = %incident_id,
        student_id = %student_id,
        incident_type = %incident_type,
        "incident recorded"
    );
    Ok(json!({
        "incidentId": incident_id,
        "studentIncidentType": current.as_str()
    }))
}

fn handle_incidents_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let incident_id = required_str(req, "incidentId")?;
    let cols = read_patch(req, INCIDENT_PATCH_FIELDS)?;
    let student_id = incident_student(conn, &incident_id)?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    update_row(&tx, "student_incidents", &incident_id, "incident", cols)?;
    let current = sync_student_incident(&tx, &student_id)?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({
        "incidentId": incident_id,
        "studentIncidentType": current.as_str()
    }))
}

fn handle_incidents_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let incident_id = required_str(req, "incidentId")?;
    let student_id = incident_student(conn, &incident_id)?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    delete_row(&tx, "student_incidents", &incident_id, "incident")?;
    let fallback = sync_student_incident(&tx, &student_id)?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({
        "incidentId": incident_id,
        "studentIncidentType": fallback.as_str()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "incidents.list" => handle_incidents_list(state, req),
        "incidents.create" => handle_incidents_create(state, req),
        "incidents.update" => handle_incidents_update(state, req),
        "incidents.delete" => handle_incidents_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
