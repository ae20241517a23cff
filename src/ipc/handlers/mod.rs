pub mod attendance;
pub mod classes;
pub mod core;
pub mod professors;
pub mod students;
pub mod tenants;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Caller, Role};
use chrono::FixedOffset;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

pub const HOD: &[Role] = &[Role::Hod];
pub const PROFESSOR: &[Role] = &[Role::Professor];
pub const ANY_ROLE: &[Role] = &[Role::Hod, Role::Professor];

/// What a tenant-scoped handler gets once the workspace and caller checks pass.
pub struct Ctx<'a> {
    pub conn: &'a Connection,
    pub caller: &'a Caller,
    default_offset_minutes: i32,
}

impl Ctx<'_> {
    pub fn tenant(&self) -> &str {
        &self.caller.tenant_id
    }

    pub fn offset(&self) -> Result<FixedOffset, HandlerErr> {
        Ok(crate::tenants::tenant_offset(
            self.conn,
            self.tenant(),
            self.default_offset_minutes,
        )?)
    }
}

pub type Handler = fn(&Ctx, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

fn context<'a>(
    state: &'a AppState,
    req: &'a Request,
    roles: &[Role],
) -> Result<Ctx<'a>, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(caller) = req.caller.as_ref() else {
        return Err(HandlerErr::bad_params("missing caller"));
    };
    if caller.tenant_id.trim().is_empty() || caller.caller_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("caller needs tenantId and callerId"));
    }
    if !roles.contains(&caller.role) {
        tracing::warn!(method = %req.method, tenant = %caller.tenant_id, role = ?caller.role, "role not allowed");
        return Err(HandlerErr::new(
            "access_denied",
            format!("{} is not available to this role", req.method),
        ));
    }
    Ok(Ctx {
        conn,
        caller,
        default_offset_minutes: state.settings.default_utc_offset_minutes,
    })
}

/// Runs a tenant-scoped handler and wraps its outcome in the response envelope.
pub fn dispatch(state: &AppState, req: &Request, roles: &[Role], handler: Handler) -> serde_json::Value {
    match context(state, req, roles).and_then(|ctx| handler(&ctx, &req.params)) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn parse<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, HandlerErr> {
    let value = if params.is_null() {
        json!({})
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(format!("invalid params: {e}")))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal_error", e.to_string()))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_id_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
        })
        .collect()
}

pub fn get_opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_opt_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}
