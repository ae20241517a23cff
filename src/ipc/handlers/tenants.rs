use super::{dispatch, get_opt_i64, to_json, Ctx, HOD};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::tenants;

fn handle_configure(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(minutes) = get_opt_i64(params, "utcOffsetMinutes")? else {
        return Err(HandlerErr::bad_params("missing utcOffsetMinutes"));
    };
    let minutes = i32::try_from(minutes)
        .map_err(|_| HandlerErr::bad_params("utcOffsetMinutes out of range"))?;
    to_json(&tenants::configure_tenant(ctx.conn, ctx.tenant(), minutes)?)
}

fn handle_purge(ctx: &Ctx, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    to_json(&tenants::purge_tenant(ctx.conn, ctx.tenant())?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: super::Handler = match req.method.as_str() {
        "tenants.configure" => handle_configure,
        "tenants.purge" => handle_purge,
        _ => return None,
    };
    Some(dispatch(state, req, HOD, handler))
}
