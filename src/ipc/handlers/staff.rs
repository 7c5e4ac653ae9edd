use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    db_conn, delete_row, ensure_exists, insert_row, matches_search, new_id, now_ts, optional_str,
    read_create, read_patch, required_str, update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const STAFF_FIELDS: &[Field] = &[
    Field::new("staffNo", "staff_no", FieldKind::Text),
    Field::new("fullName", "full_name", FieldKind::Text),
    Field::new("position", "position", FieldKind::Text),
    Field::new("department", "department", FieldKind::Text),
    Field::new("contactPhone", "contact_phone", FieldKind::OptText),
    Field::new("contactEmail", "contact_email", FieldKind::OptText),
    Field::new("hostelRoom", "hostel_room", FieldKind::OptText),
];

struct StaffRow {
    id: String,
    staff_no: String,
    full_name: String,
    position: String,
    department: String,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    hostel_room: Option<String>,
    created_at: String,
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let search = optional_str(req, "search")?;
    let mut stmt = conn.prepare(
        "SELECT id, staff_no, full_name, position, department, contact_phone, contact_email,
                hostel_room, created_at
         FROM staff
         ORDER BY created_at DESC, full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(StaffRow {
                id: r.get(0)?,
                staff_no: r.get(1)?,
                full_name: r.get(2)?,
                position: r.get(3)?,
                department: r.get(4)?,
                contact_phone: r.get(5)?,
                contact_email: r.get(6)?,
                hostel_room: r.get(7)?,
                created_at: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let staff: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|s| {
            matches_search(
                search.as_deref(),
                &[s.full_name.as_str(), s.staff_no.as_str(), s.position.as_str()],
            )
        })
        .map(|s| {
            json!({
                "id": s.id,
                "staffNo": s.staff_no,
                "fullName": s.full_name,
                "position": s.position,
                "department": s.department,
                "contactPhone": s.contact_phone,
                "contactEmail": s.contact_email,
                "hostelRoom": s.hostel_room,
                "createdAt": s.created_at
            })
        })
        .collect();
    Ok(json!({ "staff": staff }))
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, STAFF_FIELDS)?;
    let staff_id = new_id();
    insert_row(conn, "staff", &staff_id, cols)?;
    tracing::info!(staff_id = %staff_id, "staff member created");
    Ok(json!({ "staffId": staff_id }))
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let staff_id = required_str(req, "staffId")?;
    let cols = read_patch(req, STAFF_FIELDS)?;
    update_row(conn, "staff", &staff_id, "staff member", cols)?;
    Ok(json!({ "staffId": staff_id }))
}

fn handle_staff_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let staff_id = required_str(req, "staffId")?;
    ensure_exists(conn, "staff", &staff_id, "staff member")?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    // Hostel history survives; it just stops pointing at the staff row.
    tx.execute(
        "UPDATE hostel_occupants SET staff_id = NULL, updated_at = ? WHERE staff_id = ?",
        (now_ts(), &staff_id),
    )
    .map_err(ApiError::update("hostel_occupants"))?;
    delete_row(&tx, "staff", &staff_id, "staff member")?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "staffId": staff_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "staff.list" => handle_staff_list(state, req),
        "staff.create" => handle_staff_create(state, req),
        "staff.update" => handle_staff_update(state, req),
        "staff.delete" => handle_staff_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
