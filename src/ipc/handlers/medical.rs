use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    assigned, assigned_text, db_conn, delete_row, ensure_exists, insert_row, new_id, now_ts,
    optional_enum, read_create, required_enum, required_str, set_assignment, update_row, Field,
    FieldKind,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub const MEDICAL_STATES: &[&str] = &["active", "recovering", "discharged"];
pub const TREATMENT_TYPES: &[&str] = &["in-school", "external"];

const MEDICAL_FIELDS: &[Field] = &[
    Field::new("studentId", "student_id", FieldKind::Text),
    Field::new("illnessDescription", "illness_description", FieldKind::Text),
    Field::new(
        "treatmentType",
        "treatment_type",
        FieldKind::Enum {
            allowed: TREATMENT_TYPES,
            default: Some("in-school"),
        },
    ),
    Field::new(
        "status",
        "status",
        FieldKind::Enum {
            allowed: MEDICAL_STATES,
            default: Some("active"),
        },
    ),
    Field::new("checkInDate", "check_in_date", FieldKind::OptText),
    Field::new("notes", "notes", FieldKind::OptText),
];

fn handle_medical_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let status = optional_enum(req, "status", MEDICAL_STATES)?;
    let mut stmt = conn.prepare(
        "SELECT m.id, m.student_id, s.full_name, s.student_no, m.illness_description,
                m.treatment_type, m.status, m.check_in_date, m.check_out_date, m.notes
         FROM medical_records m
         JOIN students s ON s.id = m.student_id
         ORDER BY m.check_in_date DESC, m.created_at DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let student_name: String = r.get(2)?;
            let student_no: String = r.get(3)?;
            let illness: String = r.get(4)?;
            let treatment_type: String = r.get(5)?;
            let status: String = r.get(6)?;
            let check_in: String = r.get(7)?;
            let check_out: Option<String> = r.get(8)?;
            let notes: Option<String> = r.get(9)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "studentName": student_name,
                "studentNo": student_no,
                "illnessDescription": illness,
                "treatmentType": treatment_type,
                "status": status,
                "checkInDate": check_in,
                "checkOutDate": check_out,
                "notes": notes
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let count_of = |s: &str| {
        rows.iter()
            .filter(|r| r.get("status").and_then(|v| v.as_str()) == Some(s))
            .count()
    };
    let counts = json!({
        "active": count_of("active"),
        "recovering": count_of("recovering"),
        "discharged": count_of("discharged"),
    });
    let records: Vec<&serde_json::Value> = rows
        .iter()
        .filter(|r| status.is_none() || r.get("status").and_then(|v| v.as_str()) == status)
        .collect();
    Ok(json!({ "records": records, "counts": counts }))
}

fn handle_medical_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, MEDICAL_FIELDS)?;
    if let Some(student_id) = assigned_text(&cols, "student_id") {
        ensure_exists(conn, "students", student_id, "student")?;
    }
    if assigned(&cols, "check_in_date") == Some(&Value::Null) {
        set_assignment(&mut cols, "check_in_date", Value::Text(now_ts()));
    }
    let record_id = new_id();
    insert_row(conn, "medical_records", &record_id, cols)?;
    tracing::info!(record_id = %record_id, "medical record opened");
    Ok(json!({ "medicalRecordId": record_id }))
}

fn current_status(conn: &Connection, record_id: &str) -> Result<String, ApiError> {
    conn.query_row(
        "SELECT status FROM medical_records WHERE id = ?",
        [record_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(ApiError::NotFound("medical record"))
}

/// Moves a record to `status`. Discharged records are closed for good.
fn transition(
    conn: &Connection,
    record_id: &str,
    status: &'static str,
    check_out: bool,
) -> ApiResult {
    let from = current_status(conn, record_id)?;
    if from == "discharged" {
        return Err(ApiError::BadTransition {
            from,
            to: status.to_string(),
        });
    }
    let mut cols = vec![("status", Value::Text(status.to_string()))];
    let check_out_date = check_out.then(now_ts);
    if let Some(ts) = &check_out_date {
        cols.push(("check_out_date", Value::Text(ts.clone())));
    }
    update_row(conn, "medical_records", record_id, "medical record", cols)?;
    tracing::info!(record_id, from = %from, to = status, "medical status changed");
    Ok(json!({
        "medicalRecordId": record_id,
        "status": status,
        "checkOutDate": check_out_date
    }))
}

fn handle_medical_update_status(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let record_id = required_str(req, "medicalRecordId")?;
    let status = required_enum(req, "status", MEDICAL_STATES)?;
    let check_out = match req.params.get("checkOut") {
        None | Some(serde_json::Value::Null) => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| ApiError::bad_params("checkOut must be boolean"))?,
    };
    transition(conn, &record_id, status, check_out)
}

fn handle_medical_discharge(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let record_id = required_str(req, "medicalRecordId")?;
    transition(conn, &record_id, "discharged", true)
}

fn handle_medical_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let record_id = required_str(req, "medicalRecordId")?;
    delete_row(conn, "medical_records", &record_id, "medical record")?;
    Ok(json!({ "medicalRecordId": record_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "medical.list" => handle_medical_list(state, req),
        "medical.create" => handle_medical_create(state, req),
        "medical.updateStatus" => handle_medical_update_status(state, req),
        "medical.discharge" => handle_medical_discharge(state, req),
        "medical.delete" => handle_medical_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
