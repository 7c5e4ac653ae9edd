use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single request. The code is the stable string the UI
/// switches on; the message is for humans.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    BadParams(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("cannot move from {from} to {to}")]
    BadTransition { from: String, to: String },
    #[error("{source}")]
    Db {
        code: &'static str,
        table: Option<&'static str>,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{0:#}")]
    OpenFailed(anyhow::Error),
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        ApiError::BadParams(message.into())
    }

    fn db(code: &'static str, table: Option<&'static str>, source: rusqlite::Error) -> Self {
        // Unique/foreign-key violations are the caller's fault, not the store's.
        if let rusqlite::Error::SqliteFailure(e, msg) = &source {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return ApiError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()));
            }
        }
        ApiError::Db {
            code,
            table,
            source,
        }
    }

    pub fn insert(table: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| ApiError::db("db_insert_failed", Some(table), source)
    }

    pub fn update(table: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| ApiError::db("db_update_failed", Some(table), source)
    }

    pub fn delete(table: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| ApiError::db("db_delete_failed", Some(table), source)
    }

    pub fn tx(source: rusqlite::Error) -> Self {
        ApiError::db("db_tx_failed", None, source)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoWorkspace => "no_workspace",
            ApiError::BadParams(_) => "bad_params",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::BadTransition { .. } => "bad_transition",
            ApiError::Db { code, .. } => *code,
            ApiError::OpenFailed(_) => "db_open_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Db {
                table: Some(table), ..
            } => Some(json!({ "table": table })),
            ApiError::BadTransition { from, to } => Some(json!({ "from": from, "to": to })),
            _ => None,
        }
    }

    pub fn into_response(self, id: &str) -> serde_json::Value {
        err(id, self.code(), self.to_string(), self.details())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(source: rusqlite::Error) -> Self {
        ApiError::db("db_query_failed", None, source)
    }
}

pub type ApiResult = Result<serde_json::Value, ApiError>;

pub fn respond(req_id: &str, result: ApiResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(req_id, v),
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "request failed");
            e.into_response(req_id)
        }
    }
}
