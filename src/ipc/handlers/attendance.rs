use super::{dispatch, get_opt_i64, get_opt_str, get_required_str, parse, to_json, Ctx, Handler, ANY_ROLE, PROFESSOR};
use crate::attendance::{mark_bulk, MarkBatch};
use crate::history;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_mark_bulk(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let batch: MarkBatch = parse(params)?;
    let offset = ctx.offset()?;
    to_json(&mark_bulk(ctx.conn, ctx.tenant(), &ctx.caller.caller_id, offset, &batch)?)
}

fn handle_by_date(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let rows = history::by_date_and_slot(
        ctx.conn,
        ctx.tenant(),
        ctx.offset()?,
        &class_id,
        get_opt_i64(params, "dateMs")?,
        get_opt_str(params, "date"),
        get_opt_i64(params, "slotNumber")?,
    )?;
    Ok(json!({ "records": to_json(&rows)? }))
}

fn handle_by_class(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let rows = history::by_class(
        ctx.conn,
        ctx.tenant(),
        ctx.offset()?,
        &class_id,
        get_opt_i64(params, "dateMs")?,
        get_opt_str(params, "date"),
        get_opt_i64(params, "slotNumber")?,
    )?;
    Ok(json!({ "records": to_json(&rows)? }))
}

fn handle_by_student(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let rows = history::by_student_month(
        ctx.conn,
        ctx.tenant(),
        ctx.offset()?,
        &student_id,
        get_opt_i64(params, "month")?,
        get_opt_i64(params, "year")?,
    )?;
    Ok(json!({ "records": to_json(&rows)? }))
}

fn handle_monthly_summary(ctx: &Ctx, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let (Some(month), Some(year)) = (get_opt_i64(params, "month")?, get_opt_i64(params, "year")?) else {
        return Err(HandlerErr::bad_params("month and year are required"));
    };
    to_json(&history::monthly_summary(
        ctx.conn,
        ctx.tenant(),
        ctx.offset()?,
        &class_id,
        month,
        year,
    )?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method == "attendance.markBulk" {
        return Some(dispatch(state, req, PROFESSOR, handle_mark_bulk));
    }
    let handler: Handler = match req.method.as_str() {
        "attendance.byDate" => handle_by_date,
        "attendance.byClass" => handle_by_class,
        "attendance.byStudent" => handle_by_student,
        "attendance.monthlySummary" => handle_monthly_summary,
        _ => return None,
    };
    Some(dispatch(state, req, ANY_ROLE, handler))
}
