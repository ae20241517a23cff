//! Tenant-scoped records for classes, students and professors.
//!
//! Every lookup filters on `tenant_id`; an entity owned by another tenant is
//! indistinguishable from one that does not exist.

use crate::dates::now_ms;
use crate::error::{CoreError, CoreResult};
use crate::model::{is_valid_id, new_id, ClassRow, ProfessorRow, StudentRow};
use crate::roster;
use rusqlite::{params_from_iter, types::Value, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const CLASS_COLS: &str = "id, code, name, division";
const STUDENT_COLS: &str = "id, enrollment_number, name, semester, division, class_id";

fn class_from_row(r: &Row) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        division: r.get(3)?,
    })
}

fn student_from_row(r: &Row) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        enrollment_number: r.get(1)?,
        name: r.get(2)?,
        semester: r.get(3)?,
        division: r.get(4)?,
        class_id: r.get(5)?,
    })
}

/// Maps a UNIQUE/CHECK violation raised by a racing writer to `Conflict`.
fn conflict_or_storage(e: rusqlite::Error, message: &str) -> CoreError {
    if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        CoreError::conflict(message)
    } else {
        CoreError::Storage(e)
    }
}

fn required_text(value: &str, field: &str) -> CoreResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(CoreError::invalid(format!("{} is required", field)));
    }
    Ok(t.to_string())
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub enrollment_number: String,
    pub name: String,
    pub semester: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterProfessor {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    #[serde(flatten)]
    pub class: ClassRow,
    pub students: Vec<RosterStudent>,
    pub professors: Vec<RosterProfessor>,
}

pub fn find_class(conn: &Connection, tenant_id: &str, class_id: &str) -> CoreResult<ClassRow> {
    conn.query_row(
        &format!("SELECT {CLASS_COLS} FROM classes WHERE id = ? AND tenant_id = ?"),
        (class_id, tenant_id),
        class_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("class not found"))
}

/// Resolves a class reference given either as an id or as the human class code.
pub fn resolve_class_ref(
    conn: &Connection,
    tenant_id: &str,
    raw: &str,
) -> CoreResult<Option<ClassRow>> {
    let t = raw.trim();
    if is_valid_id(t) {
        return match find_class(conn, tenant_id, t) {
            Ok(c) => Ok(Some(c)),
            Err(CoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let Ok(code) = t.parse::<i64>() else {
        return Ok(None);
    };
    Ok(conn
        .query_row(
            &format!("SELECT {CLASS_COLS} FROM classes WHERE code = ? AND tenant_id = ?"),
            (code, tenant_id),
            class_from_row,
        )
        .optional()?)
}

/// Atomically bumps and returns the tenant's class-code sequence. Never derived
/// from a row count, so concurrent creators cannot collide.
pub fn next_class_code(conn: &Connection, tenant_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO tenant_counters(tenant_id, seq) VALUES(?, 1)
         ON CONFLICT(tenant_id) DO UPDATE SET seq = seq + 1
         RETURNING seq",
        [tenant_id],
        |r| r.get(0),
    )
}

pub fn create_class(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    division: &str,
) -> CoreResult<ClassRow> {
    let name = required_text(name, "className")?;
    let division = required_text(division, "division")?;

    let code = next_class_code(conn, tenant_id)?;
    let id = new_id();
    let now = now_ms();
    conn.execute(
        "INSERT INTO classes(id, tenant_id, code, name, division, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, tenant_id, code, &name, &division, now, now),
    )
    .map_err(|e| conflict_or_storage(e, "duplicate class code generated, retry"))?;
    tracing::info!(tenant = tenant_id, class = %id, code, "class created");
    Ok(ClassRow {
        id,
        code,
        name,
        division,
    })
}

pub fn update_class(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    name: Option<&str>,
    division: Option<&str>,
) -> CoreResult<ClassRow> {
    let mut class = find_class(conn, tenant_id, class_id)?;
    if let Some(n) = name.map(str::trim).filter(|s| !s.is_empty()) {
        class.name = n.to_string();
    }
    if let Some(d) = division.map(str::trim).filter(|s| !s.is_empty()) {
        class.division = d.to_string();
    }
    conn.execute(
        "UPDATE classes SET name = ?, division = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        (&class.name, &class.division, now_ms(), class_id, tenant_id),
    )?;
    Ok(class)
}

fn class_students(conn: &Connection, class_id: &str) -> CoreResult<Vec<RosterStudent>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.enrollment_number, s.name, s.semester
         FROM class_student_refs r
         JOIN students s ON s.id = r.student_id
         WHERE r.class_id = ?
         ORDER BY s.enrollment_number",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                enrollment_number: r.get(1)?,
                name: r.get(2)?,
                semester: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn class_professors(conn: &Connection, class_id: &str) -> CoreResult<Vec<RosterProfessor>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.username
         FROM class_professor_refs r
         JOIN professors p ON p.id = r.professor_id
         WHERE r.class_id = ?
         ORDER BY p.name, p.username",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(RosterProfessor {
                id: r.get(0)?,
                name: r.get(1)?,
                username: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_class(conn: &Connection, tenant_id: &str, class_id: &str) -> CoreResult<ClassDetail> {
    let class = find_class(conn, tenant_id, class_id)?;
    let students = class_students(conn, &class.id)?;
    let professors = class_professors(conn, &class.id)?;
    Ok(ClassDetail {
        class,
        students,
        professors,
    })
}

pub fn list_classes(conn: &Connection, tenant_id: &str) -> CoreResult<Vec<ClassDetail>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLASS_COLS} FROM classes WHERE tenant_id = ? ORDER BY name, division, code"
    ))?;
    let classes = stmt
        .query_map([tenant_id], class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    classes
        .into_iter()
        .map(|class| {
            let students = class_students(conn, &class.id)?;
            let professors = class_professors(conn, &class.id)?;
            Ok(ClassDetail {
                class,
                students,
                professors,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    #[serde(default)]
    pub enrollment_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub semester: i64,
    #[serde(default)]
    pub division: Option<String>,
}

impl NewStudent {
    fn validated(&self) -> CoreResult<NewStudent> {
        let enrollment_number = required_text(&self.enrollment_number, "enrollmentNumber")?;
        let name = required_text(&self.name, "name")?;
        if self.semester < 1 {
            return Err(CoreError::invalid("semester must be at least 1"));
        }
        Ok(NewStudent {
            enrollment_number,
            name,
            semester: self.semester,
            division: self
                .division
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

pub fn find_student(conn: &Connection, tenant_id: &str, student_id: &str) -> CoreResult<StudentRow> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ? AND tenant_id = ?"),
        (student_id, tenant_id),
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("student not found"))
}

fn enrollment_taken(
    conn: &Connection,
    enrollment_number: &str,
    except_id: Option<&str>,
) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE enrollment_number = ?",
            [enrollment_number],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match (found, except_id) {
        (Some(id), Some(except)) => id != except,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

fn insert_student(conn: &Connection, tenant_id: &str, s: &NewStudent) -> rusqlite::Result<String> {
    let id = new_id();
    let now = now_ms();
    conn.execute(
        "INSERT INTO students(id, tenant_id, enrollment_number, name, semester, division, class_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        (
            &id,
            tenant_id,
            &s.enrollment_number,
            &s.name,
            s.semester,
            s.division.as_deref(),
            now,
            now,
        ),
    )?;
    Ok(id)
}

pub fn create_student(conn: &Connection, tenant_id: &str, input: &NewStudent) -> CoreResult<StudentRow> {
    let s = input.validated()?;
    // Enrollment numbers are unique across all tenants.
    if enrollment_taken(conn, &s.enrollment_number, None)? {
        return Err(CoreError::conflict("enrollment number already exists"));
    }
    let id = insert_student(conn, tenant_id, &s)
        .map_err(|e| conflict_or_storage(e, "enrollment number already exists"))?;
    tracing::info!(tenant = tenant_id, student = %id, "student created");
    find_student(conn, tenant_id, &id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStudentOutcome {
    pub total_uploaded: usize,
    pub total_skipped: usize,
    pub skipped_enrollment_numbers: Vec<String>,
}

/// Inserts already-parsed rows. Any row missing a required field rejects the whole
/// batch; rows whose enrollment number already exists (or repeats earlier in the
/// batch) are skipped.
pub fn bulk_create_students(
    conn: &Connection,
    tenant_id: &str,
    rows: &[NewStudent],
) -> CoreResult<BulkStudentOutcome> {
    if rows.is_empty() {
        return Err(CoreError::invalid("no student rows supplied"));
    }
    let validated = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.validated().map_err(|e| {
                CoreError::invalid(format!("row {}: {}", i + 1, e))
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut fresh = Vec::new();
    let mut skipped = Vec::new();
    for s in validated {
        if !seen.insert(s.enrollment_number.clone())
            || enrollment_taken(conn, &s.enrollment_number, None)?
        {
            skipped.push(s.enrollment_number);
            continue;
        }
        fresh.push(s);
    }
    if fresh.is_empty() {
        return Err(CoreError::conflict("all students in the batch already exist"));
    }

    let tx = conn.unchecked_transaction()?;
    for s in &fresh {
        insert_student(&tx, tenant_id, s)
            .map_err(|e| conflict_or_storage(e, "enrollment number already exists"))?;
    }
    tx.commit()?;

    tracing::info!(
        tenant = tenant_id,
        inserted = fresh.len(),
        skipped = skipped.len(),
        "bulk student insert"
    );
    Ok(BulkStudentOutcome {
        total_uploaded: fresh.len(),
        total_skipped: skipped.len(),
        skipped_enrollment_numbers: skipped,
    })
}

pub fn list_students(
    conn: &Connection,
    tenant_id: &str,
    semester: Option<i64>,
    class_ref: Option<&str>,
) -> CoreResult<Vec<StudentRow>> {
    let mut sql = format!("SELECT {STUDENT_COLS} FROM students WHERE tenant_id = ?");
    let mut bind: Vec<Value> = vec![Value::Text(tenant_id.to_string())];
    if let Some(sem) = semester {
        sql.push_str(" AND semester = ?");
        bind.push(Value::Integer(sem));
    }
    if let Some(raw) = class_ref.filter(|s| !s.trim().is_empty()) {
        let Some(class) = resolve_class_ref(conn, tenant_id, raw)? else {
            return Ok(Vec::new());
        };
        sql.push_str(" AND class_id = ?");
        bind.push(Value::Text(class.id));
    }
    sql.push_str(" ORDER BY enrollment_number");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub semester: Option<i64>,
    /// `Some(None)` clears the division.
    pub division: Option<Option<String>>,
    pub enrollment_number: Option<String>,
    pub class_ref: Option<String>,
}

pub fn update_student(
    conn: &Connection,
    tenant_id: &str,
    student_id: &str,
    patch: &StudentPatch,
) -> CoreResult<StudentRow> {
    let mut student = find_student(conn, tenant_id, student_id)?;

    // Validate everything before the first write.
    if let Some(sem) = patch.semester {
        if sem < 1 {
            return Err(CoreError::invalid("semester must be at least 1"));
        }
        student.semester = sem;
    }
    if let Some(n) = patch.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        student.name = n.to_string();
    }
    if let Some(d) = &patch.division {
        student.division = d
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    if let Some(en) = patch
        .enrollment_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if en != student.enrollment_number {
            if enrollment_taken(conn, en, Some(student_id))? {
                return Err(CoreError::conflict("enrollment number already exists"));
            }
            student.enrollment_number = en.to_string();
        }
    }
    let target_class = match patch.class_ref.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(
            resolve_class_ref(conn, tenant_id, raw)?
                .ok_or_else(|| CoreError::not_found("class not found"))?,
        ),
        None => None,
    };

    // Field update and class move land together or not at all.
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE students
         SET name = ?, semester = ?, division = ?, enrollment_number = ?, updated_at = ?
         WHERE id = ? AND tenant_id = ?",
        (
            &student.name,
            student.semester,
            student.division.as_deref(),
            &student.enrollment_number,
            now_ms(),
            student_id,
            tenant_id,
        ),
    )
    .map_err(|e| conflict_or_storage(e, "enrollment number already exists"))?;
    if let Some(class) = &target_class {
        roster::move_student(&tx, student_id, student.class_id.as_deref(), &class.id)?;
    }
    tx.commit()?;
    find_student(conn, tenant_id, student_id)
}

// ---------------------------------------------------------------------------
// Professors
// ---------------------------------------------------------------------------

pub const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfessor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    /// Already hashed by the caller; stored and never returned.
    #[serde(default)]
    pub password_hash: String,
}

fn check_username(username: &str) -> CoreResult<()> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(CoreError::invalid(format!(
            "username must be at least {} characters long",
            MIN_USERNAME_LEN
        )));
    }
    Ok(())
}

fn username_taken(
    conn: &Connection,
    tenant_id: &str,
    username: &str,
    except_id: Option<&str>,
) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM professors WHERE tenant_id = ? AND username = ?",
            (tenant_id, username),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some_and(|id| Some(id.as_str()) != except_id))
}

fn professor_class_ids(conn: &Connection, professor_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT class_id FROM professor_class_refs WHERE professor_id = ? ORDER BY class_id",
    )?;
    let ids = stmt
        .query_map([professor_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

pub fn find_professor(
    conn: &Connection,
    tenant_id: &str,
    professor_id: &str,
) -> CoreResult<ProfessorRow> {
    let row = conn
        .query_row(
            "SELECT id, name, username FROM professors WHERE id = ? AND tenant_id = ?",
            (professor_id, tenant_id),
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
        )
        .optional()?;
    let Some((id, name, username)) = row else {
        return Err(CoreError::not_found("professor not found"));
    };
    let class_ids = professor_class_ids(conn, &id)?;
    Ok(ProfessorRow {
        id,
        name,
        username,
        class_ids,
    })
}

pub fn create_professor(
    conn: &Connection,
    tenant_id: &str,
    input: &NewProfessor,
) -> CoreResult<ProfessorRow> {
    let name = required_text(&input.name, "name")?;
    let username = required_text(&input.username, "username")?;
    let password_hash = required_text(&input.password_hash, "passwordHash")?;
    check_username(&username)?;
    if username_taken(conn, tenant_id, &username, None)? {
        return Err(CoreError::conflict("username already taken"));
    }

    let id = new_id();
    let now = now_ms();
    conn.execute(
        "INSERT INTO professors(id, tenant_id, name, username, password_hash, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, tenant_id, &name, &username, &password_hash, now, now),
    )
    .map_err(|e| conflict_or_storage(e, "username already taken"))?;
    tracing::info!(tenant = tenant_id, professor = %id, "professor created");
    Ok(ProfessorRow {
        id,
        name,
        username,
        class_ids: Vec::new(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfessorSkipReason {
    /// Name, username or password hash missing, or username too short.
    InvalidRow,
    AlreadyExists,
    DuplicateInBatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedProfessor {
    /// 1-based position in the submitted rows.
    pub row: usize,
    pub username: String,
    pub reason: ProfessorSkipReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkProfessorOutcome {
    pub total_processed: usize,
    pub inserted: usize,
    pub inserted_details: Vec<ProfessorRow>,
    pub skipped: usize,
    pub skipped_details: Vec<SkippedProfessor>,
}

fn tenant_usernames_lower(conn: &Connection, tenant_id: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT username FROM professors WHERE tenant_id = ?")?;
    let names = stmt
        .query_map([tenant_id], |r| r.get::<_, String>(0))?
        .map(|u| u.map(|u| u.to_lowercase()))
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

/// Inserts already-parsed professor rows. Usernames are compared case-insensitively
/// against the tenant's professors and against earlier rows of the same batch; clashes
/// and incomplete rows are skipped and reported, everything else is inserted in one
/// transaction.
pub fn bulk_create_professors(
    conn: &Connection,
    tenant_id: &str,
    rows: &[NewProfessor],
) -> CoreResult<BulkProfessorOutcome> {
    if rows.is_empty() {
        return Err(CoreError::invalid("no professor rows supplied"));
    }

    let existing = tenant_usernames_lower(conn, tenant_id)?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = Vec::new();
    let mut fresh = Vec::new();
    for (i, r) in rows.iter().enumerate() {
        let username = r.username.trim().to_string();
        let skip = |reason| SkippedProfessor {
            row: i + 1,
            username: username.clone(),
            reason,
        };
        let name = r.name.trim();
        let password_hash = r.password_hash.trim();
        if name.is_empty() || password_hash.is_empty() || check_username(&username).is_err() {
            skipped.push(skip(ProfessorSkipReason::InvalidRow));
            continue;
        }
        let lower = username.to_lowercase();
        if existing.contains(&lower) {
            skipped.push(skip(ProfessorSkipReason::AlreadyExists));
            continue;
        }
        if !seen.insert(lower) {
            skipped.push(skip(ProfessorSkipReason::DuplicateInBatch));
            continue;
        }
        fresh.push((i + 1, name.to_string(), username, password_hash.to_string()));
    }

    let mut inserted = Vec::with_capacity(fresh.len());
    if !fresh.is_empty() {
        let now = now_ms();
        let tx = conn.unchecked_transaction()?;
        for (row, name, username, password_hash) in fresh {
            let id = new_id();
            let res = tx.execute(
                "INSERT INTO professors(id, tenant_id, name, username, password_hash, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (&id, tenant_id, &name, &username, &password_hash, now, now),
            );
            match res.map_err(|e| conflict_or_storage(e, "username already taken")) {
                Ok(_) => inserted.push(ProfessorRow {
                    id,
                    name,
                    username,
                    class_ids: Vec::new(),
                }),
                // Another writer took the username after the read above.
                Err(CoreError::Conflict(_)) => skipped.push(SkippedProfessor {
                    row,
                    username,
                    reason: ProfessorSkipReason::AlreadyExists,
                }),
                Err(e) => return Err(e),
            }
        }
        tx.commit()?;
    }
    skipped.sort_by_key(|s| s.row);

    tracing::info!(
        tenant = tenant_id,
        inserted = inserted.len(),
        skipped = skipped.len(),
        "bulk professor insert"
    );
    Ok(BulkProfessorOutcome {
        total_processed: rows.len(),
        inserted: inserted.len(),
        inserted_details: inserted,
        skipped: skipped.len(),
        skipped_details: skipped,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

pub fn update_professor(
    conn: &Connection,
    tenant_id: &str,
    professor_id: &str,
    patch: &ProfessorPatch,
) -> CoreResult<ProfessorRow> {
    let mut prof = find_professor(conn, tenant_id, professor_id)?;
    if let Some(u) = patch.username.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if u != prof.username {
            check_username(u)?;
            if username_taken(conn, tenant_id, u, Some(professor_id))? {
                return Err(CoreError::conflict("username already taken"));
            }
            prof.username = u.to_string();
        }
    }
    if let Some(n) = patch.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        prof.name = n.to_string();
    }
    let now = now_ms();
    conn.execute(
        "UPDATE professors SET name = ?, username = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        (&prof.name, &prof.username, now, professor_id, tenant_id),
    )
    .map_err(|e| conflict_or_storage(e, "username already taken"))?;
    if let Some(h) = patch.password_hash.as_deref().filter(|s| !s.trim().is_empty()) {
        conn.execute(
            "UPDATE professors SET password_hash = ? WHERE id = ? AND tenant_id = ?",
            (h, professor_id, tenant_id),
        )?;
    }
    Ok(prof)
}

/// Newest first.
pub fn list_professors(conn: &Connection, tenant_id: &str) -> CoreResult<Vec<ProfessorRow>> {
    let mut refs: HashMap<String, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT r.professor_id, r.class_id
             FROM professor_class_refs r
             JOIN professors p ON p.id = r.professor_id
             WHERE p.tenant_id = ?
             ORDER BY r.class_id",
        )?;
        let pairs = stmt
            .query_map([tenant_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (pid, cid) in pairs {
            refs.entry(pid).or_default().push(cid);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, username FROM professors WHERE tenant_id = ?
         ORDER BY created_at DESC, username",
    )?;
    let rows = stmt
        .query_map([tenant_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, name, username)| {
            let class_ids = refs.remove(&id).unwrap_or_default();
            ProfessorRow {
                id,
                name,
                username,
                class_ids,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorClass {
    #[serde(flatten)]
    pub class: ClassRow,
    pub students: Vec<RosterStudent>,
}

/// Classes whose professor roster lists `professor_id`, with their students.
pub fn professor_classes(
    conn: &Connection,
    tenant_id: &str,
    professor_id: &str,
) -> CoreResult<Vec<ProfessorClass>> {
    find_professor(conn, tenant_id, professor_id)?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.code, c.name, c.division
         FROM class_professor_refs r
         JOIN classes c ON c.id = r.class_id
         WHERE r.professor_id = ? AND c.tenant_id = ?
         ORDER BY c.name, c.division, c.code",
    )?;
    let classes = stmt
        .query_map((professor_id, tenant_id), class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    classes
        .into_iter()
        .map(|class| {
            let students = class_students(conn, &class.id)?;
            Ok(ProfessorClass { class, students })
        })
        .collect()
}
