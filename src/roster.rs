//! Mirrored class membership.
//!
//! Class↔Student is stored twice: `class_student_refs` (the class's roster set) and
//! `students.class_id` (the student's back-reference). Class↔Professor is stored as
//! `class_professor_refs` and `professor_class_refs`. Every mutation here touches both
//! sides as separate statements, ordered so an interruption leaves a student
//! temporarily unlinked rather than linked to two classes, and referrers are repaired
//! before a referent disappears. Set-add and set-remove are idempotent.

use crate::dates::now_ms;
use crate::error::{CoreError, CoreResult};
use crate::model::{is_valid_id, unique_ids};
use crate::registry::{find_class, find_professor, find_student, resolve_class_ref};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn require_ids(ids: &[String], what: &str) -> CoreResult<Vec<String>> {
    let ids = unique_ids(ids);
    if ids.is_empty() {
        return Err(CoreError::invalid(format!("provide an array of {} ids", what)));
    }
    Ok(ids)
}

/// Tenant-owned students among `ids`, with their current class back-reference.
fn load_students(
    conn: &Connection,
    tenant_id: &str,
    ids: &[String],
) -> rusqlite::Result<HashMap<String, Option<String>>> {
    let sql = format!(
        "SELECT id, class_id FROM students WHERE tenant_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let bind = std::iter::once(tenant_id).chain(ids.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

fn load_professor_ids(
    conn: &Connection,
    tenant_id: &str,
    ids: &[String],
) -> rusqlite::Result<HashSet<String>> {
    let sql = format!(
        "SELECT id FROM professors WHERE tenant_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let bind = std::iter::once(tenant_id).chain(ids.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(bind), |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(rows)
}

fn missing_ids(wanted: &[String], found: impl Fn(&str) -> bool) -> Vec<String> {
    wanted
        .iter()
        .filter(|id| !found(id.as_str()))
        .cloned()
        .collect()
}

fn add_student_ref(conn: &Connection, class_id: &str, student_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO class_student_refs(class_id, student_id) VALUES(?, ?)",
        (class_id, student_id),
    )?;
    Ok(())
}

fn pull_student_ref(conn: &Connection, class_id: &str, student_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM class_student_refs WHERE class_id = ? AND student_id = ?",
        (class_id, student_id),
    )?;
    Ok(())
}

/// Moves a student's membership from `from` to `to`. Returns false when the student
/// is already in `to`.
///
/// Order: pull from the old roster, add to the new roster, then point the student
/// at the new class. A crash after the first step leaves an orphan, never a double link.
pub(crate) fn move_student(
    conn: &Connection,
    student_id: &str,
    from: Option<&str>,
    to: &str,
) -> CoreResult<bool> {
    if from == Some(to) {
        return Ok(false);
    }
    if let Some(old) = from {
        pull_student_ref(conn, old, student_id)?;
    }
    add_student_ref(conn, to, student_id)?;
    conn.execute(
        "UPDATE students SET class_id = ?, updated_at = ? WHERE id = ?",
        (to, now_ms(), student_id),
    )?;
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOutcome {
    pub assigned: usize,
    /// Students that were taken out of a different class on the way in.
    pub moved: usize,
}

pub fn assign_students(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    student_ids: &[String],
) -> CoreResult<AssignOutcome> {
    let ids = require_ids(student_ids, "student")?;
    let class = find_class(conn, tenant_id, class_id)?;

    let current = load_students(conn, tenant_id, &ids)?;
    let missing = missing_ids(&ids, |id| current.contains_key(id));
    if !missing.is_empty() {
        tracing::warn!(tenant = tenant_id, class = class_id, missing = missing.len(), "assign rejected");
        return Err(CoreError::not_found_ids("one or more students not found", missing));
    }

    let mut moved = 0;
    for id in &ids {
        let from = current.get(id).and_then(|c| c.as_deref());
        if from == Some(class.id.as_str()) {
            // Already linked; re-assert the roster side in case it was lost.
            add_student_ref(conn, &class.id, id)?;
            continue;
        }
        if from.is_some() {
            moved += 1;
        }
        move_student(conn, id, from, &class.id)?;
    }

    tracing::info!(tenant = tenant_id, class = %class.id, assigned = ids.len(), moved, "students assigned");
    Ok(AssignOutcome {
        assigned: ids.len(),
        moved,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    /// Entries pulled from the class roster.
    pub removed: usize,
    /// Members whose back-reference was cleared.
    pub unlinked: usize,
}

/// Only back-references still pointing at this class are cleared, so a student that
/// has meanwhile been assigned elsewhere keeps its newer membership.
pub fn remove_students(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    student_ids: &[String],
) -> CoreResult<RemoveOutcome> {
    let ids = require_ids(student_ids, "student")?;
    let class = find_class(conn, tenant_id, class_id)?;
    let marks = placeholders(ids.len());

    let mut bind: Vec<Value> = vec![
        Value::Integer(now_ms()),
        Value::Text(tenant_id.to_string()),
        Value::Text(class.id.clone()),
    ];
    bind.extend(ids.iter().cloned().map(Value::Text));
    let unlinked = conn.execute(
        &format!(
            "UPDATE students SET class_id = NULL, updated_at = ?
             WHERE tenant_id = ? AND class_id = ? AND id IN ({marks})"
        ),
        params_from_iter(bind),
    )?;
    let removed = conn.execute(
        &format!("DELETE FROM class_student_refs WHERE class_id = ? AND student_id IN ({marks})"),
        params_from_iter(std::iter::once(class.id.as_str()).chain(ids.iter().map(String::as_str))),
    )?;

    tracing::info!(tenant = tenant_id, class = %class.id, removed, unlinked, "students removed");
    Ok(RemoveOutcome { removed, unlinked })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassChange {
    pub changed: bool,
    pub class_id: String,
}

/// Re-homes one student. `new_class_ref` may be a class id or a class code.
pub fn change_student_class(
    conn: &Connection,
    tenant_id: &str,
    student_id: &str,
    new_class_ref: &str,
) -> CoreResult<ClassChange> {
    let student = find_student(conn, tenant_id, student_id)?;
    let class = resolve_class_ref(conn, tenant_id, new_class_ref)?
        .ok_or_else(|| CoreError::not_found("class not found"))?;
    let changed = move_student(conn, &student.id, student.class_id.as_deref(), &class.id)?;
    if changed {
        tracing::info!(tenant = tenant_id, student = student_id, class = %class.id, "student moved");
    }
    Ok(ClassChange {
        changed,
        class_id: class.id,
    })
}

pub fn assign_professors(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    professor_ids: &[String],
) -> CoreResult<AssignOutcome> {
    let ids = require_ids(professor_ids, "professor")?;
    let class = find_class(conn, tenant_id, class_id)?;

    let found = load_professor_ids(conn, tenant_id, &ids)?;
    let missing = missing_ids(&ids, |id| found.contains(id));
    if !missing.is_empty() {
        tracing::warn!(tenant = tenant_id, class = class_id, missing = missing.len(), "assign rejected");
        return Err(CoreError::not_found_ids("one or more professors not found", missing));
    }

    for id in &ids {
        conn.execute(
            "INSERT OR IGNORE INTO class_professor_refs(class_id, professor_id) VALUES(?, ?)",
            (&class.id, id),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO professor_class_refs(professor_id, class_id) VALUES(?, ?)",
            (id, &class.id),
        )?;
    }

    tracing::info!(tenant = tenant_id, class = %class.id, assigned = ids.len(), "professors assigned");
    Ok(AssignOutcome {
        assigned: ids.len(),
        moved: 0,
    })
}

/// Pulls only this class from each professor's set; other memberships are untouched.
pub fn remove_professors(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    professor_ids: &[String],
) -> CoreResult<RemoveOutcome> {
    let ids = require_ids(professor_ids, "professor")?;
    let class = find_class(conn, tenant_id, class_id)?;
    let marks = placeholders(ids.len());
    let bind = || std::iter::once(class.id.as_str()).chain(ids.iter().map(String::as_str));

    let unlinked = conn.execute(
        &format!("DELETE FROM professor_class_refs WHERE class_id = ? AND professor_id IN ({marks})"),
        params_from_iter(bind()),
    )?;
    let removed = conn.execute(
        &format!("DELETE FROM class_professor_refs WHERE class_id = ? AND professor_id IN ({marks})"),
        params_from_iter(bind()),
    )?;

    tracing::info!(tenant = tenant_id, class = %class.id, removed, unlinked, "professors removed");
    Ok(RemoveOutcome { removed, unlinked })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteClassOutcome {
    pub students_unlinked: usize,
    pub professors_unlinked: usize,
}

/// Referrers first: students and professors outlive the class, so their references
/// are cleared before the class row goes. Attendance rows are kept.
pub fn delete_class(conn: &Connection, tenant_id: &str, class_id: &str) -> CoreResult<DeleteClassOutcome> {
    let class = find_class(conn, tenant_id, class_id)?;

    let students_unlinked = conn.execute(
        "UPDATE students SET class_id = NULL, updated_at = ? WHERE class_id = ? AND tenant_id = ?",
        (now_ms(), &class.id, tenant_id),
    )?;
    let professors_unlinked = conn.execute(
        "DELETE FROM professor_class_refs WHERE class_id = ?",
        [&class.id],
    )?;
    conn.execute("DELETE FROM class_student_refs WHERE class_id = ?", [&class.id])?;
    conn.execute("DELETE FROM class_professor_refs WHERE class_id = ?", [&class.id])?;
    conn.execute(
        "DELETE FROM classes WHERE id = ? AND tenant_id = ?",
        (&class.id, tenant_id),
    )?;

    tracing::info!(
        tenant = tenant_id,
        class = %class.id,
        students_unlinked,
        professors_unlinked,
        "class deleted"
    );
    Ok(DeleteClassOutcome {
        students_unlinked,
        professors_unlinked,
    })
}

pub fn delete_student(conn: &Connection, tenant_id: &str, student_id: &str) -> CoreResult<()> {
    let student = find_student(conn, tenant_id, student_id)?;
    conn.execute(
        "DELETE FROM class_student_refs WHERE student_id = ?",
        [&student.id],
    )?;
    conn.execute(
        "DELETE FROM students WHERE id = ? AND tenant_id = ?",
        (&student.id, tenant_id),
    )?;
    tracing::info!(tenant = tenant_id, student = student_id, "student deleted");
    Ok(())
}

pub fn delete_professor(conn: &Connection, tenant_id: &str, professor_id: &str) -> CoreResult<()> {
    let prof = find_professor(conn, tenant_id, professor_id)?;
    conn.execute(
        "DELETE FROM class_professor_refs WHERE professor_id = ?",
        [&prof.id],
    )?;
    conn.execute(
        "DELETE FROM professor_class_refs WHERE professor_id = ?",
        [&prof.id],
    )?;
    conn.execute(
        "DELETE FROM professors WHERE id = ? AND tenant_id = ?",
        (&prof.id, tenant_id),
    )?;
    tracing::info!(tenant = tenant_id, professor = professor_id, "professor deleted");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteOutcome {
    pub total_deleted: usize,
    pub total_requested: usize,
    pub not_deleted: Vec<String>,
}

/// Removes many professors and every class reference to them in one transaction.
pub fn bulk_delete_professors(
    conn: &Connection,
    tenant_id: &str,
    professor_ids: &[String],
) -> CoreResult<BulkDeleteOutcome> {
    let ids = require_ids(professor_ids, "professor")?;
    let valid: Vec<String> = ids.into_iter().filter(|id| is_valid_id(id)).collect();
    if valid.is_empty() {
        return Err(CoreError::invalid("no valid professor ids provided"));
    }
    let found = load_professor_ids(conn, tenant_id, &valid)?;
    if found.is_empty() {
        return Err(CoreError::not_found("no professors found for deletion"));
    }
    let doomed: Vec<&str> = valid
        .iter()
        .map(String::as_str)
        .filter(|id| found.contains(*id))
        .collect();
    let marks = placeholders(doomed.len());

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        &format!("DELETE FROM class_professor_refs WHERE professor_id IN ({marks})"),
        params_from_iter(doomed.iter()),
    )?;
    tx.execute(
        &format!("DELETE FROM professor_class_refs WHERE professor_id IN ({marks})"),
        params_from_iter(doomed.iter()),
    )?;
    let total_deleted = tx.execute(
        &format!("DELETE FROM professors WHERE tenant_id = ? AND id IN ({marks})"),
        params_from_iter(std::iter::once(&tenant_id).chain(doomed.iter())),
    )?;
    tx.commit()?;

    let not_deleted = missing_ids(&valid, |id| found.contains(id));
    tracing::info!(
        tenant = tenant_id,
        total_deleted,
        not_deleted = not_deleted.len(),
        "professors bulk deleted"
    );
    Ok(BulkDeleteOutcome {
        total_deleted,
        total_requested: valid.len(),
        not_deleted,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub cleared_dangling_class_refs: usize,
    pub dropped_stale_student_refs: usize,
    pub restored_student_refs: usize,
    pub dropped_dangling_professor_refs: usize,
    pub restored_professor_refs: usize,
}

/// Heals one-sided or dangling references left behind by interrupted mutations.
/// The student's `class_id` is authoritative for student membership; for professors
/// either side is enough to restore the pair.
pub fn repair_roster(conn: &Connection, tenant_id: &str) -> CoreResult<RepairReport> {
    let tx = conn.unchecked_transaction()?;
    let mut report = RepairReport::default();

    report.cleared_dangling_class_refs = tx.execute(
        "UPDATE students SET class_id = NULL
         WHERE tenant_id = ?1 AND class_id IS NOT NULL
           AND class_id NOT IN (SELECT id FROM classes WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.dropped_stale_student_refs = tx.execute(
        "DELETE FROM class_student_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)
           AND NOT EXISTS (
             SELECT 1 FROM students s
             WHERE s.id = class_student_refs.student_id
               AND s.class_id = class_student_refs.class_id
           )",
        [tenant_id],
    )?;
    report.restored_student_refs = tx.execute(
        "INSERT OR IGNORE INTO class_student_refs(class_id, student_id)
         SELECT class_id, id FROM students WHERE tenant_id = ?1 AND class_id IS NOT NULL",
        [tenant_id],
    )?;

    report.dropped_dangling_professor_refs = tx.execute(
        "DELETE FROM class_professor_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)
           AND professor_id NOT IN (SELECT id FROM professors WHERE tenant_id = ?1)",
        [tenant_id],
    )? + tx.execute(
        "DELETE FROM professor_class_refs
         WHERE professor_id IN (SELECT id FROM professors WHERE tenant_id = ?1)
           AND class_id NOT IN (SELECT id FROM classes WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.restored_professor_refs = tx.execute(
        "INSERT OR IGNORE INTO professor_class_refs(professor_id, class_id)
         SELECT professor_id, class_id FROM class_professor_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)",
        [tenant_id],
    )? + tx.execute(
        "INSERT OR IGNORE INTO class_professor_refs(class_id, professor_id)
         SELECT class_id, professor_id FROM professor_class_refs
         WHERE professor_id IN (SELECT id FROM professors WHERE tenant_id = ?1)",
        [tenant_id],
    )?;

    tx.commit()?;
    tracing::info!(tenant = tenant_id, ?report, "roster repaired");
    Ok(report)
}
