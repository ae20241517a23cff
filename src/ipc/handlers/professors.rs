use super::{dispatch, get_id_list, get_required_str, parse, to_json, Ctx, Handler, HOD, PROFESSOR};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, NewProfessor, ProfessorPatch};
use crate::roster;
use serde::Deserialize;
use serde_json::json;

fn handle_professors_create(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input: NewProfessor = parse(params)?;
    to_json(&registry::create_professor(ctx.conn, ctx.tenant(), &input)?)
}

#[derive(Deserialize)]
struct BulkParams {
    #[serde(default)]
    professors: Vec<NewProfessor>,
}

fn handle_professors_bulk_create(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let BulkParams { professors } = parse(params)?;
    to_json(&registry::bulk_create_professors(ctx.conn, ctx.tenant(), &professors)?)
}

fn handle_professors_list(ctx: &Ctx, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let professors = registry::list_professors(ctx.conn, ctx.tenant())?;
    Ok(json!({ "professors": to_json(&professors)? }))
}

fn handle_professors_get(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let professor_id = get_required_str(params, "professorId")?;
    to_json(&registry::find_professor(ctx.conn, ctx.tenant(), &professor_id)?)
}

fn handle_professors_update(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let professor_id = get_required_str(params, "professorId")?;
    let patch: ProfessorPatch = parse(params)?;
    to_json(&registry::update_professor(ctx.conn, ctx.tenant(), &professor_id, &patch)?)
}

fn handle_professors_delete(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let professor_id = get_required_str(params, "professorId")?;
    roster::delete_professor(ctx.conn, ctx.tenant(), &professor_id)?;
    Ok(json!({ "deleted": true }))
}

fn handle_professors_bulk_delete(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ids = get_id_list(params, "professorIds")?;
    to_json(&roster::bulk_delete_professors(ctx.conn, ctx.tenant(), &ids)?)
}

fn handle_my_classes(ctx: &Ctx, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classes = registry::professor_classes(ctx.conn, ctx.tenant(), &ctx.caller.caller_id)?;
    Ok(json!({ "classes": to_json(&classes)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method == "professors.myClasses" {
        return Some(dispatch(state, req, PROFESSOR, handle_my_classes));
    }
    let handler: Handler = match req.method.as_str() {
        "professors.create" => handle_professors_create,
        "professors.bulkCreate" => handle_professors_bulk_create,
        "professors.list" => handle_professors_list,
        "professors.get" => handle_professors_get,
        "professors.update" => handle_professors_update,
        "professors.delete" => handle_professors_delete,
        "professors.bulkDelete" => handle_professors_bulk_delete,
        _ => return None,
    };
    Some(dispatch(state, req, HOD, handler))
}
