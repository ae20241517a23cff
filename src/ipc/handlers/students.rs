use super::{dispatch, get_opt_i64, get_opt_str, get_required_str, parse, to_json, Ctx, Handler, HOD};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, NewStudent, StudentPatch};
use crate::roster;
use serde::Deserialize;
use serde_json::json;

fn handle_students_create(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input: NewStudent = parse(params)?;
    to_json(&registry::create_student(ctx.conn, ctx.tenant(), &input)?)
}

#[derive(Deserialize)]
struct BulkParams {
    #[serde(default)]
    students: Vec<NewStudent>,
}

fn handle_students_bulk_create(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let BulkParams { students } = parse(params)?;
    to_json(&registry::bulk_create_students(ctx.conn, ctx.tenant(), &students)?)
}

fn handle_students_list(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let semester = get_opt_i64(params, "semester")?;
    let class_ref = get_opt_str(params, "classRef").or_else(|| get_opt_str(params, "classId"));
    let students = registry::list_students(ctx.conn, ctx.tenant(), semester, class_ref)?;
    Ok(json!({ "students": to_json(&students)? }))
}

fn handle_students_get(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    to_json(&registry::find_student(ctx.conn, ctx.tenant(), &student_id)?)
}

/// `division: null` clears the division; an absent key leaves it alone.
fn student_patch(params: &serde_json::Value) -> Result<StudentPatch, HandlerErr> {
    let text = |key: &str| get_opt_str(params, key).map(str::to_string);
    let division = match params.get("division") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(v) => match v.as_str() {
            Some(s) => Some(Some(s.to_string())),
            None => return Err(HandlerErr::bad_params("division must be a string or null")),
        },
    };
    Ok(StudentPatch {
        name: text("name"),
        semester: get_opt_i64(params, "semester")?,
        division,
        enrollment_number: text("enrollmentNumber"),
        class_ref: text("classRef").or_else(|| text("classId")),
    })
}

fn handle_students_update(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let patch = student_patch(params)?;
    to_json(&registry::update_student(ctx.conn, ctx.tenant(), &student_id, &patch)?)
}

fn handle_students_delete(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    roster::delete_student(ctx.conn, ctx.tenant(), &student_id)?;
    Ok(json!({ "deleted": true }))
}

fn handle_students_change_class(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_ref = get_required_str(params, "classRef")
        .or_else(|_| get_required_str(params, "classId"))
        .map_err(|_| HandlerErr::bad_params("missing classRef"))?;
    to_json(&roster::change_student_class(ctx.conn, ctx.tenant(), &student_id, &class_ref)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "students.create" => handle_students_create,
        "students.bulkCreate" => handle_students_bulk_create,
        "students.list" => handle_students_list,
        "students.get" => handle_students_get,
        "students.update" => handle_students_update,
        "students.delete" => handle_students_delete,
        "students.changeClass" => handle_students_change_class,
        _ => return None,
    };
    Some(dispatch(state, req, HOD, handler))
}
