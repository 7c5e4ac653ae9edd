use crate::ipc::error::{respond, ApiResult};
use crate::ipc::helpers::{
    db_conn, delete_row, insert_row, new_id, read_create, required_str, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const ANNOUNCEMENT_FIELDS: &[Field] = &[
    Field::new("title", "title", FieldKind::Text),
    Field::new("content", "content", FieldKind::Text),
    Field::new("category", "category", FieldKind::Text),
    Field::new("createdBy", "created_by", FieldKind::OptText),
];

fn handle_announcements_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, title, content, category, created_by, created_at
         FROM announcements
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let announcements = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let content: String = r.get(2)?;
            let category: String = r.get(3)?;
            let created_by: Option<String> = r.get(4)?;
            let created_at: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "title": title,
                "content": content,
                "category": category,
                "createdBy": created_by,
                "createdAt": created_at
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "announcements": announcements }))
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, ANNOUNCEMENT_FIELDS)?;
    let announcement_id = new_id();
    insert_row(conn, "announcements", &announcement_id, cols)?;
    Ok(json!({ "announcementId": announcement_id }))
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let announcement_id = required_str(req, "announcementId")?;
    delete_row(conn, "announcements", &announcement_id, "announcement")?;
    Ok(json!({ "announcementId": announcement_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "announcements.list" => handle_announcements_list(state, req),
        "announcements.create" => handle_announcements_create(state, req),
        "announcements.delete" => handle_announcements_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
