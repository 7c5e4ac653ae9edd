use crate::ipc::error::{respond, ApiResult};
use crate::ipc::helpers::{
    db_conn, delete_row, insert_row, new_id, optional_enum, read_create, read_patch, required_str,
    update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub const ROOM_STATES: &[&str] = &["available", "occupied"];

const ROOM_FIELDS: &[Field] = &[
    Field::new("roomName", "room_name", FieldKind::Text),
    Field::new("capacity", "capacity", FieldKind::Int { min: 0 }),
    Field::new("location", "location", FieldKind::Text),
    Field::new("equipment", "equipment", FieldKind::OptText),
    Field::new(
        "status",
        "status",
        FieldKind::Enum {
            allowed: ROOM_STATES,
            default: Some("available"),
        },
    ),
];

fn handle_rooms_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let status = optional_enum(req, "status", ROOM_STATES)?;
    let mut stmt = conn.prepare(
        "SELECT id, room_name, capacity, location, equipment, status
         FROM lecture_rooms
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY room_name",
    )?;
    let rooms = stmt
        .query_map([status], |r| {
            let id: String = r.get(0)?;
            let room_name: String = r.get(1)?;
            let capacity: i64 = r.get(2)?;
            let location: String = r.get(3)?;
            let equipment: Option<String> = r.get(4)?;
            let status: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "roomName": room_name,
                "capacity": capacity,
                "location": location,
                "equipment": equipment,
                "status": status
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "rooms": rooms }))
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, ROOM_FIELDS)?;
    let room_id = new_id();
    insert_row(conn, "lecture_rooms", &room_id, cols)?;
    Ok(json!({ "roomId": room_id }))
}

fn handle_rooms_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let room_id = required_str(req, "roomId")?;
    let cols = read_patch(req, ROOM_FIELDS)?;
    update_row(conn, "lecture_rooms", &room_id, "room", cols)?;
    Ok(json!({ "roomId": room_id }))
}

fn handle_rooms_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let room_id = required_str(req, "roomId")?;
    delete_row(conn, "lecture_rooms", &room_id, "room")?;
    Ok(json!({ "roomId": room_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rooms.list" => handle_rooms_list(state, req),
        "rooms.create" => handle_rooms_create(state, req),
        "rooms.update" => handle_rooms_update(state, req),
        "rooms.delete" => handle_rooms_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
