use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    assigned_text, count, db_conn, delete_row, ensure_exists, insert_row, matches_search, new_id,
    now_ts, optional_enum, optional_str, read_create, read_patch, required_str, set_assignment,
    today, update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const OCCUPANT_GENDERS: &[&str] = &["male", "female"];
pub const OCCUPANT_STATES: &[&str] = &["checked_in", "checked_out"];

const HOUSE_FIELDS: &[Field] = &[
    Field::new("houseName", "house_name", FieldKind::Text),
    Field::new("houseNumber", "house_number", FieldKind::Int { min: 1 }),
    Field::new("description", "description", FieldKind::OptText),
];

const ROOM_FIELDS: &[Field] = &[
    Field::new("houseId", "house_id", FieldKind::Text),
    Field::new("roomNumber", "room_number", FieldKind::Text),
    Field::new("capacity", "capacity", FieldKind::Int { min: 1 }),
];

const CHECK_IN_FIELDS: &[Field] = &[
    Field::new("roomId", "room_id", FieldKind::Text),
    Field::new("staffId", "staff_id", FieldKind::OptText),
    Field::new("occupantName", "occupant_name", FieldKind::Text),
    Field::new(
        "gender",
        "gender",
        FieldKind::Enum {
            allowed: OCCUPANT_GENDERS,
            default: None,
        },
    ),
    Field::new("subjectTeaching", "subject_teaching", FieldKind::OptText),
    Field::new("yearLevel", "year_level", FieldKind::OptText),
    Field::new("checkInDate", "check_in_date", FieldKind::OptText),
    Field::new("notes", "notes", FieldKind::OptText),
];

const OCCUPANT_PATCH_FIELDS: &[Field] = &[
    Field::new("occupantName", "occupant_name", FieldKind::Text),
    Field::new(
        "gender",
        "gender",
        FieldKind::Enum {
            allowed: OCCUPANT_GENDERS,
            default: None,
        },
    ),
    Field::new("subjectTeaching", "subject_teaching", FieldKind::OptText),
    Field::new("yearLevel", "year_level", FieldKind::OptText),
    Field::new(
        "status",
        "status",
        FieldKind::Enum {
            allowed: OCCUPANT_STATES,
            default: None,
        },
    ),
    Field::new("checkOutDate", "check_out_date", FieldKind::OptText),
    Field::new("notes", "notes", FieldKind::OptText),
];

fn set_room_status(conn: &Connection, room_id: &str, status: &str) -> Result<(), ApiError> {
    conn.execute(
        "UPDATE hostel_rooms SET status = ?, updated_at = ? WHERE id = ?",
        (status, now_ts(), room_id),
    )
    .map_err(ApiError::update("hostel_rooms"))?;
    Ok(())
}

fn room_status(conn: &Connection, room_id: &str) -> Result<String, ApiError> {
    conn.query_row(
        "SELECT status FROM hostel_rooms WHERE id = ?",
        [room_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(ApiError::NotFound("hostel room"))
}

struct OccupantState {
    room_id: String,
    status: String,
}

fn occupant_state(conn: &Connection, occupant_id: &str) -> Result<OccupantState, ApiError> {
    conn.query_row(
        "SELECT room_id, status FROM hostel_occupants WHERE id = ?",
        [occupant_id],
        |r| {
            Ok(OccupantState {
                room_id: r.get(0)?,
                status: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(ApiError::NotFound("occupant"))
}

fn handle_houses_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT h.id, h.house_name, h.house_number, h.description,
                (SELECT COUNT(*) FROM hostel_rooms r WHERE r.house_id = h.id) AS room_count,
                (SELECT COUNT(*) FROM hostel_rooms r
                  WHERE r.house_id = h.id AND r.status = 'occupied') AS occupied_count
         FROM hostel_houses h
         ORDER BY h.house_number",
    )?;
    let houses = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let number: i64 = r.get(2)?;
            let description: Option<String> = r.get(3)?;
            let room_count: i64 = r.get(4)?;
            let occupied: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "houseName": name,
                "houseNumber": number,
                "description": description,
                "roomCount": room_count,
                "occupiedRooms": occupied
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "houses": houses }))
}

fn handle_houses_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, HOUSE_FIELDS)?;
    let house_id = new_id();
    insert_row(conn, "hostel_houses", &house_id, cols)?;
    Ok(json!({ "houseId": house_id }))
}

/// Refuses while anyone is checked in; otherwise removes rooms and their history.
fn handle_houses_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let house_id = required_str(req, "houseId")?;
    ensure_exists(conn, "hostel_houses", &house_id, "hostel house")?;
    let resident = count(
        conn,
        "SELECT COUNT(*) FROM hostel_occupants o
         JOIN hostel_rooms r ON r.id = o.room_id
         WHERE r.house_id = ? AND o.status = 'checked_in'",
        &[house_id.as_str()],
    )?;
    if resident > 0 {
        return Err(ApiError::Conflict(format!(
            "house still has {} checked-in occupant(s)",
            resident
        )));
    }

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    tx.execute(
        "DELETE FROM hostel_occupants
         WHERE room_id IN (SELECT id FROM hostel_rooms WHERE house_id = ?)",
        [&house_id],
    )
    .map_err(ApiError::delete("hostel_occupants"))?;
    let rooms_deleted = tx
        .execute("DELETE FROM hostel_rooms WHERE house_id = ?", [&house_id])
        .map_err(ApiError::delete("hostel_rooms"))?;
    delete_row(&tx, "hostel_houses", &house_id, "hostel house")?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "houseId": house_id, "roomsDeleted": rooms_deleted }))
}

fn handle_rooms_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let house_id = optional_str(req, "houseId")?;
    let mut stmt = conn.prepare(
        "SELECT r.id, r.house_id, h.house_name, h.house_number, r.room_number, r.capacity,
                r.status
         FROM hostel_rooms r
         JOIN hostel_houses h ON h.id = r.house_id
         WHERE ?1 IS NULL OR r.house_id = ?1
         ORDER BY h.house_number, r.room_number",
    )?;
    let rooms = stmt
        .query_map([house_id], |r| {
            let id: String = r.get(0)?;
            let house_id: String = r.get(1)?;
            let house_name: String = r.get(2)?;
            let house_number: i64 = r.get(3)?;
            let room_number: String = r.get(4)?;
            let capacity: i64 = r.get(5)?;
            let status: String = r.get(6)?;
            Ok(json!({
                "id": id,
                "houseId": house_id,
                "houseName": house_name,
                "houseNumber": house_number,
                "roomNumber": room_number,
                "capacity": capacity,
                "status": status
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "rooms": rooms }))
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, ROOM_FIELDS)?;
    if let Some(house_id) = assigned_text(&cols, "house_id") {
        ensure_exists(conn, "hostel_houses", house_id, "hostel house")?;
    }
    set_assignment(&mut cols, "status", Value::Text("available".to_string()));
    let room_id = new_id();
    insert_row(conn, "hostel_rooms", &room_id, cols)?;
    Ok(json!({ "roomId": room_id }))
}

struct OccupantRow {
    id: String,
    room_id: String,
    room_number: String,
    house_name: String,
    staff_id: Option<String>,
    occupant_name: String,
    gender: String,
    subject_teaching: Option<String>,
    year_level: Option<String>,
    check_in_date: String,
    check_out_date: Option<String>,
    status: String,
    notes: Option<String>,
}

fn handle_occupants_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let gender = optional_enum(req, "gender", OCCUPANT_GENDERS)?;
    let status = optional_enum(req, "status", OCCUPANT_STATES)?;
    let search = optional_str(req, "search")?;
    let mut stmt = conn.prepare(
        "SELECT o.id, o.room_id, r.room_number, h.house_name, o.staff_id, o.occupant_name,
                o.gender, o.subject_teaching, o.year_level, o.check_in_date, o.check_out_date,
                o.status, o.notes
         FROM hostel_occupants o
         JOIN hostel_rooms r ON r.id = o.room_id
         JOIN hostel_houses h ON h.id = r.house_id
         WHERE (?1 IS NULL OR o.gender = ?1)
           AND (?2 IS NULL OR o.status = ?2)
         ORDER BY o.check_in_date DESC, o.occupant_name",
    )?;
    let rows = stmt
        .query_map((gender, status), |r| {
            Ok(OccupantRow {
                id: r.get(0)?,
                room_id: r.get(1)?,
                room_number: r.get(2)?,
                house_name: r.get(3)?,
                staff_id: r.get(4)?,
                occupant_name: r.get(5)?,
                gender: r.get(6)?,
                subject_teaching: r.get(7)?,
                year_level: r.get(8)?,
                check_in_date: r.get(9)?,
                check_out_date: r.get(10)?,
                status: r.get(11)?,
                notes: r.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let occupants: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|o| {
            matches_search(
                search.as_deref(),
                &[
                    o.occupant_name.as_str(),
                    o.subject_teaching.as_deref().unwrap_or(""),
                ],
            )
        })
        .map(|o| {
            json!({
                "id": o.id,
                "roomId": o.room_id,
                "roomNumber": o.room_number,
                "houseName": o.house_name,
                "staffId": o.staff_id,
                "occupantName": o.occupant_name,
                "gender": o.gender,
                "subjectTeaching": o.subject_teaching,
                "yearLevel": o.year_level,
                "checkInDate": o.check_in_date,
                "checkOutDate": o.check_out_date,
                "status": o.status,
                "notes": o.notes
            })
        })
        .collect();
    Ok(json!({ "occupants": occupants }))
}

fn handle_check_in(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, CHECK_IN_FIELDS)?;
    let room_id = assigned_text(&cols, "room_id")
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_params("missing roomId"))?;
    if let Some(staff_id) = assigned_text(&cols, "staff_id") {
        ensure_exists(conn, "staff", staff_id, "staff member")?;
    }
    if assigned_text(&cols, "check_in_date").is_none() {
        set_assignment(&mut cols, "check_in_date", Value::Text(today()));
    }
    set_assignment(&mut cols, "status", Value::Text("checked_in".to_string()));

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    if room_status(&tx, &room_id)? == "occupied" {
        return Err(ApiError::Conflict("room is already occupied".to_string()));
    }
    let occupant_id = new_id();
    insert_row(&tx, "hostel_occupants", &occupant_id, cols)?;
    set_room_status(&tx, &room_id, "occupied")?;
    tx.commit().map_err(ApiError::tx)?;
    tracing::info!(occupant_id = %occupant_id, room_id = %room_id, "hostel check-in");
    Ok(json!({ "occupantId": occupant_id, "roomId": room_id }))
}

fn handle_occupants_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let occupant_id = required_str(req, "occupantId")?;
    let mut cols = read_patch(req, OCCUPANT_PATCH_FIELDS)?;
    let current = occupant_state(conn, &occupant_id)?;
    let next_status = assigned_text(&cols, "status").map(str::to_string);

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    match next_status.as_deref() {
        Some("checked_in") if current.status != "checked_in" => {
            if room_status(&tx, &current.room_id)? == "occupied" {
                return Err(ApiError::Conflict("room is already occupied".to_string()));
            }
            set_assignment(&mut cols, "check_out_date", Value::Null);
            set_room_status(&tx, &current.room_id, "occupied")?;
        }
        Some("checked_out") if current.status != "checked_out" => {
            if assigned_text(&cols, "check_out_date").is_none() {
                set_assignment(&mut cols, "check_out_date", Value::Text(today()));
            }
            set_room_status(&tx, &current.room_id, "available")?;
        }
        _ => {}
    }
    update_row(&tx, "hostel_occupants", &occupant_id, "occupant", cols)?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "occupantId": occupant_id }))
}

fn handle_check_out(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let occupant_id = required_str(req, "occupantId")?;
    let current = occupant_state(conn, &occupant_id)?;
    if current.status == "checked_out" {
        return Err(ApiError::BadTransition {
            from: current.status,
            to: "checked_out".to_string(),
        });
    }
    let check_out_date = today();

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    update_row(
        &tx,
        "hostel_occupants",
        &occupant_id,
        "occupant",
        vec![
            ("status", Value::Text("checked_out".to_string())),
            ("check_out_date", Value::Text(check_out_date.clone())),
        ],
    )?;
    set_room_status(&tx, &current.room_id, "available")?;
    tx.commit().map_err(ApiError::tx)?;
    tracing::info!(occupant_id = %occupant_id, room_id = %current.room_id, "hostel check-out");
    Ok(json!({
        "occupantId": occupant_id,
        "roomId": current.room_id,
        "checkOutDate": check_out_date
    }))
}

fn handle_occupants_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let occupant_id = required_str(req, "occupantId")?;
    let current = occupant_state(conn, &occupant_id)?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    delete_row(&tx, "hostel_occupants", &occupant_id, "occupant")?;
    if current.status == "checked_in" {
        set_room_status(&tx, &current.room_id, "available")?;
    }
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "occupantId": occupant_id }))
}

fn handle_summary(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let total_rooms = count(conn, "SELECT COUNT(*) FROM hostel_rooms", &[])?;
    let occupied = count(
        conn,
        "SELECT COUNT(*) FROM hostel_rooms WHERE status = 'occupied'",
        &[],
    )?;
    let residents = |gender: &str| {
        count(
            conn,
            "SELECT COUNT(*) FROM hostel_occupants WHERE status = 'checked_in' AND gender = ?",
            &[gender],
        )
    };
    Ok(json!({
        "totalRooms": total_rooms,
        "occupied": occupied,
        "available": total_rooms - occupied,
        "maleOccupants": residents("male")?,
        "femaleOccupants": residents("female")?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "hostel.houses.list" => handle_houses_list(state, req),
        "hostel.houses.create" => handle_houses_create(state, req),
        "hostel.houses.delete" => handle_houses_delete(state, req),
        "hostel.rooms.list" => handle_rooms_list(state, req),
        "hostel.rooms.create" => handle_rooms_create(state, req),
        "hostel.occupants.list" => handle_occupants_list(state, req),
        "hostel.checkIn" => handle_check_in(state, req),
        "hostel.occupants.update" => handle_occupants_update(state, req),
        "hostel.checkOut" => handle_check_out(state, req),
        "hostel.occupants.delete" => handle_occupants_delete(state, req),
        "hostel.summary" => handle_summary(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
