use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::records::{Role, Viewer};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

/// Reads `params.viewer = { role, userId }`.
pub fn parse_viewer(req: &Request) -> Result<Viewer, serde_json::Value> {
    let Some(obj) = req.params.get("viewer").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing viewer", None));
    };
    let role_raw = obj.get("role").and_then(|v| v.as_str()).unwrap_or("");
    let Some(role) = Role::parse(role_raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            "viewer.role must be one of: admin, teacher, student, parent, alumni",
            Some(json!({ "role": role_raw })),
        ));
    };
    let user_id = obj
        .get("userId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if user_id.is_empty() {
        return Err(err(&req.id, "bad_params", "missing viewer.userId", None));
    }
    Ok(Viewer { role, user_id })
}

/// An optional viewer: absent means the host application itself is asking.
pub fn parse_optional_viewer(req: &Request) -> Result<Option<Viewer>, serde_json::Value> {
    match req.params.get("viewer") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => parse_viewer(req).map(Some),
    }
}

pub fn forbidden(req: &Request) -> serde_json::Value {
    err(
        &req.id,
        "forbidden",
        "viewer may not access this student",
        None,
    )
}
