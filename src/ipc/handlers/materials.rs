use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    assigned, db_conn, delete_row, insert_row, new_id, optional_enum, read_create, read_patch,
    required_i64, required_str, set_assignment, update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub const STOCK_STATES: &[&str] = &["available", "low_stock", "out_of_stock"];

const MATERIAL_FIELDS: &[Field] = &[
    Field::new("materialName", "material_name", FieldKind::Text),
    Field::new("category", "category", FieldKind::Text),
    Field::new("quantity", "quantity", FieldKind::Int { min: 0 }),
    Field::new("location", "location", FieldKind::Text),
];

pub fn stock_status(quantity: i64, low_stock_threshold: i64) -> &'static str {
    if quantity <= 0 {
        "out_of_stock"
    } else if quantity < low_stock_threshold {
        "low_stock"
    } else {
        "available"
    }
}

/// Re-derives every material's status, e.g. after the threshold changed.
pub fn refresh_stock_statuses(conn: &Connection) -> Result<usize, ApiError> {
    let threshold = setup::low_stock_threshold(conn)?;
    let changed = conn
        .execute(
            "UPDATE materials
             SET status = CASE
                   WHEN quantity <= 0 THEN 'out_of_stock'
                   WHEN quantity < ?1 THEN 'low_stock'
                   ELSE 'available'
                 END
             WHERE status <> CASE
                   WHEN quantity <= 0 THEN 'out_of_stock'
                   WHEN quantity < ?1 THEN 'low_stock'
                   ELSE 'available'
                 END",
            [threshold],
        )
        .map_err(ApiError::update("materials"))?;
    Ok(changed)
}

fn handle_materials_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let status = optional_enum(req, "status", STOCK_STATES)?;
    let mut stmt = conn.prepare(
        "SELECT id, material_name, category, quantity, location, status
         FROM materials
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY material_name",
    )?;
    let materials = stmt
        .query_map([status], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let category: String = r.get(2)?;
            let quantity: i64 = r.get(3)?;
            let location: String = r.get(4)?;
            let status: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "materialName": name,
                "category": category,
                "quantity": quantity,
                "location": location,
                "status": status
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "materials": materials }))
}

fn handle_materials_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, MATERIAL_FIELDS)?;
    let quantity = match assigned(&cols, "quantity") {
        Some(Value::Integer(q)) => *q,
        _ => 0,
    };
    let status = stock_status(quantity, setup::low_stock_threshold(conn)?);
    set_assignment(&mut cols, "status", Value::Text(status.to_string()));
    let material_id = new_id();
    insert_row(conn, "materials", &material_id, cols)?;
    Ok(json!({ "materialId": material_id, "status": status }))
}

fn handle_materials_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let material_id = required_str(req, "materialId")?;
    let mut cols = read_patch(req, MATERIAL_FIELDS)?;
    let patched_quantity = match assigned(&cols, "quantity") {
        Some(Value::Integer(q)) => Some(*q),
        _ => None,
    };
    if let Some(q) = patched_quantity {
        let status = stock_status(q, setup::low_stock_threshold(conn)?);
        set_assignment(&mut cols, "status", Value::Text(status.to_string()));
    }
    update_row(conn, "materials", &material_id, "material", cols)?;
    Ok(json!({ "materialId": material_id }))
}

fn write_quantity(conn: &Connection, material_id: &str, quantity: i64) -> ApiResult {
    let quantity = quantity.max(0);
    let status = stock_status(quantity, setup::low_stock_threshold(conn)?);
    update_row(
        conn,
        "materials",
        material_id,
        "material",
        vec![
            ("quantity", Value::Integer(quantity)),
            ("status", Value::Text(status.to_string())),
        ],
    )?;
    tracing::debug!(material_id, quantity, status, "stock level written");
    Ok(json!({ "materialId": material_id, "quantity": quantity, "status": status }))
}

fn handle_materials_set_quantity(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let material_id = required_str(req, "materialId")?;
    let quantity = required_i64(req, "quantity")?;
    if quantity < 0 {
        return Err(ApiError::bad_params("quantity must be >= 0"));
    }
    write_quantity(conn, &material_id, quantity)
}

/// Adds `delta` (may be negative); stock never goes below zero.
fn handle_materials_adjust(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let material_id = required_str(req, "materialId")?;
    let delta = required_i64(req, "delta")?;
    let current: i64 = conn
        .query_row(
            "SELECT quantity FROM materials WHERE id = ?",
            [&material_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or(ApiError::NotFound("material"))?;
    write_quantity(conn, &material_id, current.saturating_add(delta))
}

fn handle_materials_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let material_id = required_str(req, "materialId")?;
    delete_row(conn, "materials", &material_id, "material")?;
    Ok(json!({ "materialId": material_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "materials.list" => handle_materials_list(state, req),
        "materials.create" => handle_materials_create(state, req),
        "materials.update" => handle_materials_update(state, req),
        "materials.setQuantity" => handle_materials_set_quantity(state, req),
        "materials.adjust" => handle_materials_adjust(state, req),
        "materials.delete" => handle_materials_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::stock_status;

    #[test]
    fn stock_status_thresholds() {
        assert_eq!(stock_status(0, 10), "out_of_stock");
        assert_eq!(stock_status(1, 10), "low_stock");
        assert_eq!(stock_status(9, 10), "low_stock");
        assert_eq!(stock_status(10, 10), "available");
        assert_eq!(stock_status(3, 1), "available");
    }
}
