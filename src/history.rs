//! Read side of attendance: filtered listings and the monthly summary.
//!
//! Listings keep rows whose student, class or marker was deleted later; the missing
//! display fields come back empty. The summary counts only students that still exist.

use crate::calc::{summarize, StudentTally, SummaryRow};
use crate::dates::{iso_ms, month_range, resolve_date_ms};
use crate::error::{CoreError, CoreResult};
use crate::registry::{find_class, find_student};
use chrono::FixedOffset;
use rusqlite::{params_from_iter, types::Value, Connection, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: String,
    pub date: String,
    pub slot_number: i64,
    pub is_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_number: Option<String>,
    pub class_name: String,
    pub division: String,
    pub marked_by: String,
    pub created_at: String,
    pub updated_at: String,
}

const VIEW_SELECT: &str = "SELECT a.id, a.date_ms, a.slot_number, a.is_present,
        COALESCE(s.name, ''), COALESCE(s.enrollment_number, ''),
        COALESCE(c.name, ''), COALESCE(c.division, ''),
        COALESCE(NULLIF(p.name, ''), p.username, ''),
        a.created_at, a.updated_at
    FROM attendance a
    LEFT JOIN students s ON s.id = a.student_id
    LEFT JOIN classes c ON c.id = a.class_id
    LEFT JOIN professors p ON p.id = a.marked_by";

const VIEW_ORDER: &str = " ORDER BY a.date_ms, a.slot_number, COALESCE(s.enrollment_number, ''), a.id";

fn view_from_row(r: &Row, with_student: bool) -> rusqlite::Result<AttendanceView> {
    let student_name: String = r.get(4)?;
    let enrollment_number: String = r.get(5)?;
    Ok(AttendanceView {
        id: r.get(0)?,
        date: iso_ms(r.get(1)?),
        slot_number: r.get(2)?,
        is_present: r.get::<_, i64>(3)? != 0,
        student_name: with_student.then_some(student_name),
        enrollment_number: with_student.then_some(enrollment_number),
        class_name: r.get(6)?,
        division: r.get(7)?,
        marked_by: r.get(8)?,
        created_at: iso_ms(r.get(9)?),
        updated_at: iso_ms(r.get(10)?),
    })
}

fn query_views(
    conn: &Connection,
    filter: &str,
    bind: Vec<Value>,
    with_student: bool,
) -> CoreResult<Vec<AttendanceView>> {
    let sql = format!("{VIEW_SELECT} WHERE {filter}{VIEW_ORDER}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| view_from_row(r, with_student))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn check_slot(slot_number: Option<i64>) -> CoreResult<Option<i64>> {
    match slot_number {
        Some(n) if n < 0 => Err(CoreError::invalid("slotNumber must be a non-negative integer")),
        other => Ok(other),
    }
}

/// One class on one tenant-local day, optionally narrowed to a slot.
pub fn by_date_and_slot(
    conn: &Connection,
    tenant_id: &str,
    offset: FixedOffset,
    class_id: &str,
    date_ms: Option<i64>,
    date: Option<&str>,
    slot_number: Option<i64>,
) -> CoreResult<Vec<AttendanceView>> {
    let day = resolve_date_ms(date_ms, date, offset)?;
    let slot_number = check_slot(slot_number)?;
    let class = find_class(conn, tenant_id, class_id)?;

    let mut filter = String::from("a.class_id = ? AND a.date_ms = ?");
    let mut bind = vec![Value::Text(class.id), Value::Integer(day)];
    if let Some(slot) = slot_number {
        filter.push_str(" AND a.slot_number = ?");
        bind.push(Value::Integer(slot));
    }
    let rows = query_views(conn, &filter, bind, true)?;
    tracing::debug!(tenant = tenant_id, class = class_id, day, rows = rows.len(), "attendance by date");
    Ok(rows)
}

/// A class's history with optional day and slot filters; no filter returns everything.
pub fn by_class(
    conn: &Connection,
    tenant_id: &str,
    offset: FixedOffset,
    class_id: &str,
    date_ms: Option<i64>,
    date: Option<&str>,
    slot_number: Option<i64>,
) -> CoreResult<Vec<AttendanceView>> {
    let day = if date_ms.is_some() || date.is_some_and(|d| !d.trim().is_empty()) {
        Some(resolve_date_ms(date_ms, date, offset)?)
    } else {
        None
    };
    let slot_number = check_slot(slot_number)?;
    let class = find_class(conn, tenant_id, class_id)?;

    let mut filter = String::from("a.class_id = ?");
    let mut bind = vec![Value::Text(class.id)];
    if let Some(day) = day {
        filter.push_str(" AND a.date_ms = ?");
        bind.push(Value::Integer(day));
    }
    if let Some(slot) = slot_number {
        filter.push_str(" AND a.slot_number = ?");
        bind.push(Value::Integer(slot));
    }
    let rows = query_views(conn, &filter, bind, true)?;
    tracing::debug!(tenant = tenant_id, class = class_id, rows = rows.len(), "attendance by class");
    Ok(rows)
}

/// One student's marks. With both `month` and `year` the result is limited to that
/// tenant-local month; with only one of them no range applies.
pub fn by_student_month(
    conn: &Connection,
    tenant_id: &str,
    offset: FixedOffset,
    student_id: &str,
    month: Option<i64>,
    year: Option<i64>,
) -> CoreResult<Vec<AttendanceView>> {
    let range = match (month, year) {
        (Some(m), Some(y)) => Some(month_range(m, y, offset)?),
        _ => None,
    };
    let student = find_student(conn, tenant_id, student_id)?;

    let mut filter = String::from("a.student_id = ?");
    let mut bind = vec![Value::Text(student.id)];
    if let Some((start, end)) = range {
        filter.push_str(" AND a.date_ms BETWEEN ? AND ?");
        bind.push(Value::Integer(start));
        bind.push(Value::Integer(end));
    }
    let rows = query_views(conn, &filter, bind, false)?;
    tracing::debug!(tenant = tenant_id, student = student_id, rows = rows.len(), "attendance by student");
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub month: i64,
    pub year: i64,
    pub class_id: String,
    pub summary: Vec<SummaryRow>,
}

pub fn monthly_summary(
    conn: &Connection,
    tenant_id: &str,
    offset: FixedOffset,
    class_id: &str,
    month: i64,
    year: i64,
) -> CoreResult<MonthlySummary> {
    let (start, end) = month_range(month, year, offset)?;
    let class = find_class(conn, tenant_id, class_id)?;

    let mut stmt = conn.prepare(
        "SELECT s.enrollment_number, s.name, COUNT(*), SUM(CASE WHEN a.is_present != 0 THEN 1 ELSE 0 END)
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE a.class_id = ? AND a.date_ms BETWEEN ? AND ?
         GROUP BY a.student_id",
    )?;
    let tallies = stmt
        .query_map((&class.id, start, end), |r| {
            Ok(StudentTally {
                enrollment_number: r.get(0)?,
                name: r.get(1)?,
                total: r.get(2)?,
                presents: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let summary = summarize(tallies);
    tracing::debug!(tenant = tenant_id, class = %class.id, month, year, students = summary.len(), "monthly summary");
    Ok(MonthlySummary {
        month,
        year,
        class_id: class.id,
        summary,
    })
}
