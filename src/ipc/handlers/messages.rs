use crate::ipc::error::{respond, ApiResult};
use crate::ipc::helpers::{
    db_conn, delete_row, insert_row, new_id, optional_enum, read_create, required_str,
    update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use serde_json::json;

pub const MESSAGE_STATES: &[&str] = &["pending", "answered"];

const MESSAGE_FIELDS: &[Field] = &[
    Field::new("userName", "user_name", FieldKind::Text),
    Field::new("userEmail", "user_email", FieldKind::OptText),
    Field::new("message", "message", FieldKind::Text),
];

fn handle_messages_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let status = optional_enum(req, "status", MESSAGE_STATES)?;
    let mut stmt = conn.prepare(
        "SELECT id, user_name, user_email, message, response, status, created_at, updated_at
         FROM messages
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let messages = stmt
        .query_map([status], |r| {
            let id: String = r.get(0)?;
            let user_name: String = r.get(1)?;
            let user_email: Option<String> = r.get(2)?;
            let message: String = r.get(3)?;
            let response: Option<String> = r.get(4)?;
            let status: String = r.get(5)?;
            let created_at: String = r.get(6)?;
            let updated_at: String = r.get(7)?;
            Ok(json!({
                "id": id,
                "userName": user_name,
                "userEmail": user_email,
                "message": message,
                "response": response,
                "status": status,
                "createdAt": created_at,
                "updatedAt": updated_at
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "messages": messages }))
}

fn handle_messages_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, MESSAGE_FIELDS)?;
    cols.push(("status", Value::Text("pending".to_string())));
    let message_id = new_id();
    insert_row(conn, "messages", &message_id, cols)?;
    Ok(json!({ "messageId": message_id }))
}

/// Answering again overwrites the previous response.
fn handle_messages_answer(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let message_id = required_str(req, "messageId")?;
    let response = required_str(req, "response")?;
    update_row(
        conn,
        "messages",
        &message_id,
        "message",
        vec![
            ("response", Value::Text(response)),
            ("status", Value::Text("answered".to_string())),
        ],
    )?;
    tracing::info!(message_id = %message_id, "message answered");
    Ok(json!({ "messageId": message_id, "status": "answered" }))
}

fn handle_messages_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let message_id = required_str(req, "messageId")?;
    delete_row(conn, "messages", &message_id, "message")?;
    Ok(json!({ "messageId": message_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "messages.list" => handle_messages_list(state, req),
        "messages.create" => handle_messages_create(state, req),
        "messages.answer" => handle_messages_answer(state, req),
        "messages.delete" => handle_messages_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
