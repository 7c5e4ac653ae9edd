use crate::ipc::error::ApiError;
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Map;
use uuid::Uuid;

pub fn db_conn(state: &AppState) -> Result<&Connection, ApiError> {
    state.db.as_ref().ok_or(ApiError::NoWorkspace)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

pub fn required_str(req: &Request, key: &str) -> Result<String, ApiError> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, ApiError> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(ApiError::bad_params(format!("{} must be a string", key))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, ApiError> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, ApiError> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn optional_enum(
    req: &Request,
    key: &str,
    allowed: &[&'static str],
) -> Result<Option<&'static str>, ApiError> {
    let Some(raw) = optional_str(req, key)? else {
        return Ok(None);
    };
    match_enum(key, &raw, allowed).map(Some)
}

pub fn required_enum(
    req: &Request,
    key: &str,
    allowed: &[&'static str],
) -> Result<&'static str, ApiError> {
    let raw = required_str(req, key)?;
    match_enum(key, &raw, allowed)
}

fn match_enum(key: &str, raw: &str, allowed: &[&'static str]) -> Result<&'static str, ApiError> {
    allowed.iter().copied().find(|a| *a == raw).ok_or_else(|| {
        ApiError::bad_params(format!("{} must be one of: {}", key, allowed.join(", ")))
    })
}

/// Case-insensitive substring match against any of the given fields.
pub fn matches_search(needle: Option<&str>, haystacks: &[&str]) -> bool {
    let Some(needle) = needle else {
        return true;
    };
    let needle = needle.to_lowercase();
    haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(&needle))
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, ApiError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

pub fn ensure_exists(
    conn: &Connection,
    table: &str,
    id: &str,
    what: &'static str,
) -> Result<(), ApiError> {
    if row_exists(conn, table, id)? {
        Ok(())
    } else {
        Err(ApiError::NotFound(what))
    }
}

pub fn count(conn: &Connection, sql: &str, params: &[&str]) -> Result<i64, ApiError> {
    Ok(conn.query_row(sql, params_from_iter(params.iter()), |r| r.get(0))?)
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty string.
    Text,
    /// String or null; blank is stored as NULL.
    OptText,
    Int {
        min: i64,
    },
    OptInt,
    Enum {
        allowed: &'static [&'static str],
        default: Option<&'static str>,
    },
}

/// Maps one camelCase request key onto a column.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(key: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { key, column, kind }
    }

    fn convert(&self, raw: &serde_json::Value) -> Result<Value, ApiError> {
        let key = self.key;
        match self.kind {
            FieldKind::Text => raw
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(|| ApiError::bad_params(format!("{} must be a non-empty string", key))),
            FieldKind::OptText => match raw {
                serde_json::Value::Null => Ok(Value::Null),
                serde_json::Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
                serde_json::Value::String(s) => Ok(Value::Text(s.trim().to_string())),
                _ => Err(ApiError::bad_params(format!("{} must be a string or null", key))),
            },
            FieldKind::Int { min } => match raw.as_i64() {
                Some(v) if v >= min => Ok(Value::Integer(v)),
                _ => Err(ApiError::bad_params(format!(
                    "{} must be an integer >= {}",
                    key, min
                ))),
            },
            FieldKind::OptInt => match raw {
                serde_json::Value::Null => Ok(Value::Null),
                v => v
                    .as_i64()
                    .map(Value::Integer)
                    .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer or null", key))),
            },
            FieldKind::Enum { allowed, .. } => {
                let s = raw.as_str().unwrap_or_default();
                match_enum(key, s, allowed).map(|v| Value::Text(v.to_string()))
            }
        }
    }

    fn missing(&self) -> Result<Value, ApiError> {
        match self.kind {
            FieldKind::OptText | FieldKind::OptInt => Ok(Value::Null),
            FieldKind::Enum {
                default: Some(d), ..
            } => Ok(Value::Text(d.to_string())),
            _ => Err(ApiError::bad_params(format!("missing {}", self.key))),
        }
    }
}

pub type Assignments = Vec<(&'static str, Value)>;

/// Reads every field from `params`, filling optional ones with NULL/default.
pub fn read_create(params: &serde_json::Value, fields: &[Field]) -> Result<Assignments, ApiError> {
    let empty = Map::new();
    let obj = params.as_object().unwrap_or(&empty);
    let mut out = Vec::with_capacity(fields.len());
    for f in fields {
        let v = match obj.get(f.key) {
            Some(raw) => f.convert(raw)?,
            None => f.missing()?,
        };
        out.push((f.column, v));
    }
    Ok(out)
}

/// Reads `params.patch`. Unknown keys are rejected so typos don't silently no-op.
pub fn read_patch(req: &Request, fields: &[Field]) -> Result<Assignments, ApiError> {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(ApiError::bad_params("missing patch"));
    };
    if patch.is_empty() {
        return Err(ApiError::bad_params("patch must not be empty"));
    }
    let mut out = Vec::with_capacity(patch.len());
    for (key, raw) in patch {
        let Some(field) = fields.iter().find(|f| f.key == key) else {
            return Err(ApiError::bad_params(format!("unknown patch field: {}", key)));
        };
        out.push((field.column, field.convert(raw)?));
    }
    Ok(out)
}

pub fn assigned<'a>(cols: &'a Assignments, column: &str) -> Option<&'a Value> {
    cols.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
}

pub fn assigned_text<'a>(cols: &'a Assignments, column: &str) -> Option<&'a str> {
    match assigned(cols, column) {
        Some(Value::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

pub fn set_assignment(cols: &mut Assignments, column: &'static str, value: Value) {
    match cols.iter_mut().find(|(c, _)| *c == column) {
        Some(slot) => slot.1 = value,
        None => cols.push((column, value)),
    }
}

pub fn insert_row(
    conn: &Connection,
    table: &'static str,
    id: &str,
    cols: Assignments,
) -> Result<(), ApiError> {
    let ts = now_ts();
    let names = cols.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ");
    let placeholders = std::iter::repeat("?")
        .take(cols.len() + 3)
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {}(id, {}, created_at, updated_at) VALUES({})",
        table, names, placeholders
    );
    let mut values: Vec<Value> = Vec::with_capacity(cols.len() + 3);
    values.push(Value::Text(id.to_string()));
    values.extend(cols.into_iter().map(|(_, v)| v));
    values.push(Value::Text(ts.clone()));
    values.push(Value::Text(ts));
    conn.execute(&sql, params_from_iter(values))
        .map_err(ApiError::insert(table))?;
    Ok(())
}

pub fn update_row(
    conn: &Connection,
    table: &'static str,
    id: &str,
    what: &'static str,
    cols: Assignments,
) -> Result<(), ApiError> {
    let sets = cols
        .iter()
        .map(|(c, _)| format!("{} = ?", c))
        .chain(std::iter::once("updated_at = ?".to_string()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets);
    let mut values: Vec<Value> = cols.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(id.to_string()));
    let changed = conn
        .execute(&sql, params_from_iter(values))
        .map_err(ApiError::update(table))?;
    if changed == 0 {
        return Err(ApiError::NotFound(what));
    }
    Ok(())
}

pub fn delete_row(
    conn: &Connection,
    table: &'static str,
    id: &str,
    what: &'static str,
) -> Result<(), ApiError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    let changed = conn.execute(&sql, [id]).map_err(ApiError::delete(table))?;
    if changed == 0 {
        return Err(ApiError::NotFound(what));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[Field] = &[
        Field::new("name", "name", FieldKind::Text),
        Field::new("note", "note", FieldKind::OptText),
        Field::new("qty", "qty", FieldKind::Int { min: 0 }),
        Field::new(
            "status",
            "status",
            FieldKind::Enum {
                allowed: &["open", "closed"],
                default: Some("open"),
            },
        ),
    ];

    fn req(params: serde_json::Value) -> Request {
        Request {
            id: "t".into(),
            method: "x".into(),
            params,
        }
    }

    #[test]
    fn create_fills_optional_and_default_fields() {
        let cols = read_create(&json!({ "name": " Chalk ", "qty": 3, "note": "  " }), FIELDS)
            .expect("valid create");
        assert_eq!(assigned_text(&cols, "name"), Some("Chalk"));
        assert_eq!(assigned(&cols, "note"), Some(&Value::Null));
        assert_eq!(assigned(&cols, "qty"), Some(&Value::Integer(3)));
        assert_eq!(assigned_text(&cols, "status"), Some("open"));
    }

    #[test]
    fn create_rejects_missing_required_and_bad_values() {
        let e = read_create(&json!({ "qty": 1 }), FIELDS).unwrap_err();
        assert_eq!(e.code(), "bad_params");
        let e = read_create(&json!({ "name": "x", "qty": -1 }), FIELDS).unwrap_err();
        assert_eq!(e.code(), "bad_params");
        let e = read_create(&json!({ "name": "x", "qty": 1, "status": "gone" }), FIELDS)
            .unwrap_err();
        assert!(e.to_string().contains("open, closed"));
    }

    #[test]
    fn patch_rejects_unknown_and_empty() {
        let e = read_patch(&req(json!({ "patch": { "nmae": "x" } })), FIELDS).unwrap_err();
        assert!(e.to_string().contains("nmae"));
        let e = read_patch(&req(json!({ "patch": {} })), FIELDS).unwrap_err();
        assert_eq!(e.code(), "bad_params");
        let cols = read_patch(&req(json!({ "patch": { "note": null } })), FIELDS).expect("patch");
        assert_eq!(cols, vec![("note", Value::Null)]);
    }

    #[test]
    fn search_is_case_insensitive_and_optional() {
        assert!(matches_search(None, &["anything"]));
        assert!(matches_search(Some("ADA"), &["x", "Ada Lovelace"]));
        assert!(!matches_search(Some("zed"), &["Ada Lovelace"]));
    }
}
