use super::{dispatch, get_id_list, get_opt_str, get_required_str, to_json, Ctx, Handler, HOD};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::{registry, roster};
use serde_json::json;

fn handle_classes_create(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_opt_str(params, "className")
        .or_else(|| get_opt_str(params, "name"))
        .unwrap_or_default();
    let division = get_opt_str(params, "division").unwrap_or_default();
    to_json(&registry::create_class(ctx.conn, ctx.tenant(), name, division)?)
}

fn handle_classes_list(ctx: &Ctx, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classes = registry::list_classes(ctx.conn, ctx.tenant())?;
    Ok(json!({ "classes": to_json(&classes)? }))
}

fn handle_classes_get(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    to_json(&registry::get_class(ctx.conn, ctx.tenant(), &class_id)?)
}

fn handle_classes_update(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_opt_str(params, "className").or_else(|| get_opt_str(params, "name"));
    let division = get_opt_str(params, "division");
    to_json(&registry::update_class(ctx.conn, ctx.tenant(), &class_id, name, division)?)
}

fn handle_classes_delete(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    to_json(&roster::delete_class(ctx.conn, ctx.tenant(), &class_id)?)
}

fn handle_assign_students(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let ids = get_id_list(params, "studentIds")?;
    to_json(&roster::assign_students(ctx.conn, ctx.tenant(), &class_id, &ids)?)
}

fn handle_remove_students(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let ids = get_id_list(params, "studentIds")?;
    to_json(&roster::remove_students(ctx.conn, ctx.tenant(), &class_id, &ids)?)
}

fn handle_assign_professors(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let ids = get_id_list(params, "professorIds")?;
    to_json(&roster::assign_professors(ctx.conn, ctx.tenant(), &class_id, &ids)?)
}

fn handle_remove_professors(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let ids = get_id_list(params, "professorIds")?;
    to_json(&roster::remove_professors(ctx.conn, ctx.tenant(), &class_id, &ids)?)
}

fn handle_roster_repair(ctx: &Ctx, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    to_json(&roster::repair_roster(ctx.conn, ctx.tenant())?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "classes.create" => handle_classes_create,
        "classes.list" => handle_classes_list,
        "classes.get" => handle_classes_get,
        "classes.update" => handle_classes_update,
        "classes.delete" => handle_classes_delete,
        "classes.assignStudents" => handle_assign_students,
        "classes.removeStudents" => handle_remove_students,
        "classes.assignProfessors" => handle_assign_professors,
        "classes.removeProfessors" => handle_remove_professors,
        "roster.repair" => handle_roster_repair,
        _ => return None,
    };
    Some(dispatch(state, req, HOD, handler))
}
