use crate::db;
use crate::ipc::handlers::materials;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Materials,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "materials" => Some(Self::Materials),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Materials => "setup.materials",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Materials => json!({
            "lowStockThreshold": 10
        }),
        SetupSection::Reports => json!({
            "weeklyWindowDays": 7
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "setup section must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Materials => match k.as_str() {
                "lowStockThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100_000)?));
                }
                _ => return Err(format!("unknown materials field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "weeklyWindowDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 366)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    let saved = match db::settings_get_json(conn, section.key()) {
        Ok(saved) => saved,
        // Unparseable rows must not block setup or anything reading it.
        Err(e) => {
            tracing::warn!(section = section.key(), error = %e, "ignoring unreadable setup values");
            None
        }
    };
    if let Some(saved) = saved {
        if let Some(saved_obj) = saved.as_object() {
            // Stale or malformed saved values fall back to defaults.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), %msg, "ignoring saved setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

fn section_i64(conn: &rusqlite::Connection, section: SetupSection, key: &str) -> Result<i64, ApiError> {
    let current = load_section(conn, section)?;
    current
        .get(key)
        .and_then(|v| v.as_i64())
        .or_else(|| default_section(section).get(key).and_then(|v| v.as_i64()))
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("setup key {} has no default", key)))
}

/// Quantity below which a material counts as low stock.
pub fn low_stock_threshold(conn: &rusqlite::Connection) -> Result<i64, ApiError> {
    section_i64(conn, SetupSection::Materials, "lowStockThreshold")
}

pub fn weekly_window_days(conn: &rusqlite::Connection) -> Result<i64, ApiError> {
    section_i64(conn, SetupSection::Reports, "weeklyWindowDays")
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    Ok(json!({
        "materials": load_section(conn, SetupSection::Materials)?,
        "reports": load_section(conn, SetupSection::Reports)?,
    }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let section_raw = required_str(req, "section")?;
    let Some(section) = SetupSection::parse(&section_raw) else {
        return Err(ApiError::bad_params("unknown section"));
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(ApiError::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(ApiError::BadParams)?;
    db::settings_set_json(conn, section.key(), &current)?;
    if let SetupSection::Materials = section {
        let restamped = materials::refresh_stock_statuses(conn)?;
        tracing::debug!(restamped, "material statuses refreshed");
    }
    tracing::info!(section = section.key(), "setup updated");
    Ok(json!({ "section": section_raw, "values": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
