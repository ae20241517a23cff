//! Bulk attendance ingestion.
//!
//! A batch marks one class, one tenant-local day and one slot. Entries are deduplicated
//! in input order (last one wins), unknown students are dropped, and the survivors are
//! upserted on `(student_id, class_id, date_ms, slot_number)` inside one transaction, so
//! resubmitting the same batch changes nothing but `updated_at`.

use crate::dates::{now_ms, resolve_date_ms};
use crate::error::{CoreError, CoreResult};
use crate::model::{is_valid_id, new_id};
use crate::registry::find_class;
use chrono::FixedOffset;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    /// Left untyped so a null or non-string id skips the entry instead of failing the batch.
    #[serde(default)]
    pub student_id: serde_json::Value,
    #[serde(default)]
    pub is_present: bool,
}

impl MarkRecord {
    fn raw_id(&self) -> String {
        match &self.student_id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkBatch {
    #[serde(default)]
    pub class_id: String,
    pub slot_number: Option<i64>,
    pub date_ms: Option<i64>,
    pub date: Option<String>,
    pub records: Option<Vec<MarkRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidId,
    Duplicate,
    UnknownStudent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skipped {
    pub student_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
    pub saved_count: usize,
    pub skipped_count: usize,
    pub skipped_student_ids: Vec<String>,
    pub skipped: Vec<Skipped>,
}

/// Survivors keep the position of their first occurrence and the value of their last.
fn dedup_records(records: &[MarkRecord]) -> (Vec<(String, bool)>, Vec<Skipped>) {
    let mut kept: Vec<(String, bool)> = Vec::new();
    let mut slot_of: HashMap<&str, usize> = HashMap::new();
    let mut skipped = Vec::new();

    for rec in records {
        let Some(id) = rec
            .student_id
            .as_str()
            .map(str::trim)
            .filter(|id| is_valid_id(id))
        else {
            skipped.push(Skipped {
                student_id: rec.raw_id(),
                reason: SkipReason::InvalidId,
            });
            continue;
        };
        match slot_of.get(id) {
            Some(&i) => {
                skipped.push(Skipped {
                    student_id: id.to_string(),
                    reason: SkipReason::Duplicate,
                });
                kept[i].1 = rec.is_present;
            }
            None => {
                slot_of.insert(id, kept.len());
                kept.push((id.to_string(), rec.is_present));
            }
        }
    }
    (kept, skipped)
}

fn tenant_student_ids(
    conn: &Connection,
    tenant_id: &str,
    ids: &[&str],
) -> rusqlite::Result<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let sql = format!(
        "SELECT id FROM students WHERE tenant_id = ? AND id IN ({})",
        vec!["?"; ids.len()].join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params_from_iter(std::iter::once(tenant_id).chain(ids.iter().copied())),
            |r| r.get::<_, String>(0),
        )?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(rows)
}

/// The caller must be a professor of the tenant and, when the class has a professor
/// roster, be on it. An empty roster admits any professor of the tenant.
fn check_marking_access(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    caller_id: &str,
) -> CoreResult<()> {
    let is_professor = conn
        .query_row(
            "SELECT 1 FROM professors WHERE id = ? AND tenant_id = ?",
            (caller_id, tenant_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !is_professor {
        tracing::warn!(tenant = tenant_id, caller = caller_id, "marking denied: not a professor");
        return Err(CoreError::denied("only professors of this institution can mark attendance"));
    }

    let mut stmt = conn.prepare("SELECT professor_id FROM class_professor_refs WHERE class_id = ?")?;
    let roster = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if !roster.is_empty() && !roster.iter().any(|p| p == caller_id) {
        tracing::warn!(tenant = tenant_id, class = class_id, caller = caller_id, "marking denied: not on roster");
        return Err(CoreError::denied("you are not assigned to this class"));
    }
    Ok(())
}

pub fn mark_bulk(
    conn: &Connection,
    tenant_id: &str,
    caller_id: &str,
    offset: FixedOffset,
    batch: &MarkBatch,
) -> CoreResult<MarkOutcome> {
    let class_id = batch.class_id.trim();
    if class_id.is_empty() {
        return Err(CoreError::invalid("classId is required"));
    }
    let slot_number = match batch.slot_number {
        Some(n) if n >= 0 => n,
        Some(_) => return Err(CoreError::invalid("slotNumber must be a non-negative integer")),
        None => return Err(CoreError::invalid("slotNumber is required")),
    };
    let records = match &batch.records {
        Some(r) if !r.is_empty() => r,
        _ => return Err(CoreError::invalid("records must be a non-empty array")),
    };
    let date_ms = resolve_date_ms(batch.date_ms, batch.date.as_deref(), offset)?;

    let class = find_class(conn, tenant_id, class_id)?;
    check_marking_access(conn, tenant_id, &class.id, caller_id)?;

    let (candidates, mut skipped) = dedup_records(records);
    let candidate_ids: Vec<&str> = candidates.iter().map(|(id, _)| id.as_str()).collect();
    let known = tenant_student_ids(conn, tenant_id, &candidate_ids)?;
    let mut survivors = Vec::with_capacity(candidates.len());
    for (id, present) in candidates {
        if known.contains(&id) {
            survivors.push((id, present));
        } else {
            skipped.push(Skipped {
                student_id: id,
                reason: SkipReason::UnknownStudent,
            });
        }
    }

    if !survivors.is_empty() {
        let now = now_ms();
        let tx = conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO attendance(
                    id, tenant_id, student_id, class_id, date_ms, slot_number,
                    is_present, marked_by, created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, class_id, date_ms, slot_number) DO UPDATE SET
                    is_present = excluded.is_present,
                    marked_by = excluded.marked_by,
                    updated_at = excluded.updated_at",
            )?;
            for (student_id, present) in &survivors {
                upsert.execute((
                    new_id(),
                    tenant_id,
                    student_id,
                    &class.id,
                    date_ms,
                    slot_number,
                    *present as i64,
                    caller_id,
                    now,
                    now,
                ))?;
            }
        }
        tx.commit()?;
    }

    if !skipped.is_empty() {
        tracing::warn!(tenant = tenant_id, class = %class.id, skipped = skipped.len(), "attendance entries skipped");
    }
    tracing::info!(
        tenant = tenant_id,
        class = %class.id,
        date_ms,
        slot_number,
        saved = survivors.len(),
        "attendance marked"
    );

    Ok(MarkOutcome {
        saved_count: survivors.len(),
        skipped_count: skipped.len(),
        skipped_student_ids: skipped.iter().map(|s| s.student_id.clone()).collect(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::offset_from_minutes;
    use crate::db::open_in_memory;
    use crate::registry::{create_class, create_professor, create_student, NewProfessor, NewStudent};
    use crate::roster::assign_professors;

    const T1: &str = "tenant-1";
    const T2: &str = "tenant-2";
    const MARCH_1_2024_UTC: i64 = 1_709_251_200_000;

    struct Fixture {
        conn: Connection,
        class_id: String,
        prof: String,
        students: Vec<String>,
    }

    fn utc() -> FixedOffset {
        offset_from_minutes(0).unwrap()
    }

    fn professor(conn: &Connection, tenant: &str, username: &str) -> String {
        create_professor(
            conn,
            tenant,
            &NewProfessor {
                name: format!("Prof {username}"),
                username: username.into(),
                password_hash: "hash".into(),
            },
        )
        .unwrap()
        .id
    }

    fn fixture() -> Fixture {
        let conn = open_in_memory();
        let class_id = create_class(&conn, T1, "Physics", "A").unwrap().id;
        let prof = professor(&conn, T1, "kumar");
        let students = (1..=3)
            .map(|i| {
                create_student(
                    &conn,
                    T1,
                    &NewStudent {
                        enrollment_number: format!("EN{i}"),
                        name: format!("Student {i}"),
                        semester: 1,
                        division: None,
                    },
                )
                .unwrap()
                .id
            })
            .collect();
        Fixture {
            conn,
            class_id,
            prof,
            students,
        }
    }

    fn rec(id: &str, present: bool) -> MarkRecord {
        MarkRecord {
            student_id: id.into(),
            is_present: present,
        }
    }

    fn batch(class_id: &str, slot: i64, records: Vec<MarkRecord>) -> MarkBatch {
        MarkBatch {
            class_id: class_id.into(),
            slot_number: Some(slot),
            date_ms: None,
            date: Some("2024-03-01".into()),
            records: Some(records),
        }
    }

    fn stored(conn: &Connection) -> Vec<(String, i64, i64, bool)> {
        let mut stmt = conn
            .prepare(
                "SELECT student_id, date_ms, slot_number, is_present FROM attendance
                 ORDER BY student_id, slot_number",
            )
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get::<_, i64>(3)? != 0)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn resubmitting_a_batch_is_idempotent() {
        let f = fixture();
        let b = batch(
            &f.class_id,
            1,
            vec![rec(&f.students[0], true), rec(&f.students[1], false)],
        );
        let first = mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap();
        assert_eq!(first.saved_count, 2);
        let before = stored(&f.conn);

        let second = mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap();
        assert_eq!(second.saved_count, 2);
        assert_eq!(stored(&f.conn), before);
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|(_, d, _, _)| *d == MARCH_1_2024_UTC));
    }

    #[test]
    fn later_mark_overwrites_earlier_for_same_key() {
        let f = fixture();
        let s = &f.students[0];
        mark_bulk(&f.conn, T1, &f.prof, utc(), &batch(&f.class_id, 2, vec![rec(s, true)])).unwrap();
        mark_bulk(&f.conn, T1, &f.prof, utc(), &batch(&f.class_id, 2, vec![rec(s, false)])).unwrap();
        let rows = stored(&f.conn);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].3);
    }

    #[test]
    fn duplicate_and_invalid_entries_are_reported() {
        let f = fixture();
        let a = &f.students[0];
        let b = &f.students[1];
        let out = mark_bulk(
            &f.conn,
            T1,
            &f.prof,
            utc(),
            &batch(
                &f.class_id,
                1,
                vec![rec(a, true), rec(b, true), rec(a, false), rec("bogus", true)],
            ),
        )
        .unwrap();

        assert_eq!(out.saved_count, 2);
        assert_eq!(out.skipped_count, 2);
        assert_eq!(out.skipped_student_ids, vec![a.clone(), "bogus".to_string()]);
        assert_eq!(
            out.skipped,
            vec![
                Skipped {
                    student_id: a.clone(),
                    reason: SkipReason::Duplicate
                },
                Skipped {
                    student_id: "bogus".into(),
                    reason: SkipReason::InvalidId
                },
            ]
        );
        let rows = stored(&f.conn);
        let a_row = rows.iter().find(|r| &r.0 == a).unwrap();
        assert!(!a_row.3, "last entry wins");
    }

    #[test]
    fn unknown_and_foreign_students_are_skipped() {
        let f = fixture();
        let foreign = create_student(
            &f.conn,
            T2,
            &NewStudent {
                enrollment_number: "X1".into(),
                name: "Elsewhere".into(),
                semester: 1,
                division: None,
            },
        )
        .unwrap()
        .id;
        let ghost = new_id();
        let out = mark_bulk(
            &f.conn,
            T1,
            &f.prof,
            utc(),
            &batch(
                &f.class_id,
                1,
                vec![rec(&foreign, true), rec(&f.students[0], true), rec(&ghost, true)],
            ),
        )
        .unwrap();
        assert_eq!(out.saved_count, 1);
        assert_eq!(out.skipped_student_ids, vec![foreign, ghost]);
        assert!(out.skipped.iter().all(|s| s.reason == SkipReason::UnknownStudent));
    }

    #[test]
    fn slot_zero_and_epoch_zero_are_real_values() {
        let f = fixture();
        let mut b = batch(&f.class_id, 0, vec![rec(&f.students[0], true)]);
        b.date = None;
        b.date_ms = Some(0);
        let out = mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap();
        assert_eq!(out.saved_count, 1);
        assert_eq!(stored(&f.conn)[0].1, 0);
        assert_eq!(stored(&f.conn)[0].2, 0);
    }

    #[test]
    fn invalid_batches_touch_nothing() {
        let f = fixture();
        let good = vec![rec(&f.students[0], true)];

        let mut no_class = batch("", 1, good.clone());
        no_class.class_id = "  ".into();
        let mut no_slot = batch(&f.class_id, 1, good.clone());
        no_slot.slot_number = None;
        let negative_slot = batch(&f.class_id, -1, good.clone());
        let empty = batch(&f.class_id, 1, vec![]);
        let mut missing_records = batch(&f.class_id, 1, good.clone());
        missing_records.records = None;
        let mut no_date = batch(&f.class_id, 1, good.clone());
        no_date.date = None;

        for b in [no_class, no_slot, negative_slot, empty, missing_records, no_date] {
            let err = mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)), "{b:?} gave {err:?}");
        }
        assert!(stored(&f.conn).is_empty());
    }

    #[test]
    fn empty_professor_roster_admits_any_tenant_professor() {
        let f = fixture();
        let other = professor(&f.conn, T1, "iyer");
        let out = mark_bulk(
            &f.conn,
            T1,
            &other,
            utc(),
            &batch(&f.class_id, 1, vec![rec(&f.students[0], true)]),
        )
        .unwrap();
        assert_eq!(out.saved_count, 1);
    }

    #[test]
    fn non_member_is_denied_once_roster_is_set() {
        let f = fixture();
        let other = professor(&f.conn, T1, "iyer");
        assign_professors(&f.conn, T1, &f.class_id, &[f.prof.clone()]).unwrap();

        let b = batch(&f.class_id, 1, vec![rec(&f.students[0], true)]);
        let err = mark_bulk(&f.conn, T1, &other, utc(), &b).unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));
        assert!(stored(&f.conn).is_empty());

        assert_eq!(mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap().saved_count, 1);
    }

    #[test]
    fn callers_outside_the_tenant_cannot_mark() {
        let f = fixture();
        let foreign_prof = professor(&f.conn, T2, "rao");
        let b = batch(&f.class_id, 1, vec![rec(&f.students[0], true)]);

        // Another tenant's professor naming this tenant's class sees nothing.
        assert!(matches!(
            mark_bulk(&f.conn, T2, &foreign_prof, utc(), &b),
            Err(CoreError::NotFound { .. })
        ));
        // Claiming this tenant with a foreign professor id is refused.
        assert!(matches!(
            mark_bulk(&f.conn, T1, &foreign_prof, utc(), &b),
            Err(CoreError::AccessDenied(_))
        ));
    }

    #[test]
    fn malformed_entries_are_skipped_and_the_rest_saved() {
        let f = fixture();
        let b: MarkBatch = serde_json::from_value(serde_json::json!({
            "classId": f.class_id,
            "slotNumber": 1,
            "date": "2024-03-01",
            "records": [
                { "studentId": f.students[0], "isPresent": true },
                { "studentId": null, "isPresent": true },
                { "studentId": 42, "isPresent": false },
                { "isPresent": true },
                { "studentId": f.students[1] }
            ]
        }))
        .unwrap();

        let out = mark_bulk(&f.conn, T1, &f.prof, utc(), &b).unwrap();
        assert_eq!(out.saved_count, 2);
        assert_eq!(out.skipped_student_ids, vec!["", "42", ""]);
        assert!(out.skipped.iter().all(|s| s.reason == SkipReason::InvalidId));

        let rows = stored(&f.conn);
        assert_eq!(rows.len(), 2);
        let missing_flag = rows.iter().find(|r| r.0 == f.students[1]).unwrap();
        assert!(!missing_flag.3, "absent isPresent counts as absent");
    }

    #[test]
    fn dedup_keeps_first_position_and_last_value() {
        let a = new_id();
        let b = new_id();
        let (kept, skipped) = dedup_records(&[
            rec(&a, true),
            rec(&b, true),
            rec(&a, false),
            rec(&a, true),
        ]);
        assert_eq!(kept, vec![(a.clone(), true), (b, true)]);
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|s| s.student_id == a && s.reason == SkipReason::Duplicate));
    }
}
