//! Per-tenant settings and the tenant purge cascade.

use crate::dates::{now_ms, offset_from_minutes};
use crate::error::CoreResult;
use chrono::FixedOffset;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettings {
    pub tenant_id: String,
    pub utc_offset_minutes: i32,
}

/// The tenant's stored UTC offset, or `default_minutes` when it never configured one.
pub fn tenant_offset_minutes(conn: &Connection, tenant_id: &str, default_minutes: i32) -> CoreResult<i32> {
    let stored = conn
        .query_row(
            "SELECT utc_offset_minutes FROM tenants WHERE id = ?",
            [tenant_id],
            |r| r.get::<_, i32>(0),
        )
        .optional()?;
    Ok(stored.unwrap_or(default_minutes))
}

pub fn tenant_offset(conn: &Connection, tenant_id: &str, default_minutes: i32) -> CoreResult<FixedOffset> {
    offset_from_minutes(tenant_offset_minutes(conn, tenant_id, default_minutes)?)
}

pub fn configure_tenant(
    conn: &Connection,
    tenant_id: &str,
    utc_offset_minutes: i32,
) -> CoreResult<TenantSettings> {
    offset_from_minutes(utc_offset_minutes)?;
    conn.execute(
        "INSERT INTO tenants(id, utc_offset_minutes, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            utc_offset_minutes = excluded.utc_offset_minutes,
            updated_at = excluded.updated_at",
        (tenant_id, utc_offset_minutes, now_ms()),
    )?;
    tracing::info!(tenant = tenant_id, utc_offset_minutes, "tenant configured");
    Ok(TenantSettings {
        tenant_id: tenant_id.to_string(),
        utc_offset_minutes,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub attendance: usize,
    pub class_student_refs: usize,
    pub class_professor_refs: usize,
    pub professor_class_refs: usize,
    pub students: usize,
    pub professors: usize,
    pub classes: usize,
}

/// Deletes everything the tenant owns, children before parents, in one transaction.
pub fn purge_tenant(conn: &Connection, tenant_id: &str) -> CoreResult<PurgeReport> {
    let tx = conn.unchecked_transaction()?;
    let mut report = PurgeReport::default();

    // Legacy attendance rows may carry an empty tenant; reach them through the class.
    report.attendance = tx.execute(
        "DELETE FROM attendance
         WHERE tenant_id = ?1
            OR class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.class_student_refs = tx.execute(
        "DELETE FROM class_student_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)
            OR student_id IN (SELECT id FROM students WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.class_professor_refs = tx.execute(
        "DELETE FROM class_professor_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)
            OR professor_id IN (SELECT id FROM professors WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.professor_class_refs = tx.execute(
        "DELETE FROM professor_class_refs
         WHERE class_id IN (SELECT id FROM classes WHERE tenant_id = ?1)
            OR professor_id IN (SELECT id FROM professors WHERE tenant_id = ?1)",
        [tenant_id],
    )?;
    report.students = tx.execute("DELETE FROM students WHERE tenant_id = ?", [tenant_id])?;
    report.professors = tx.execute("DELETE FROM professors WHERE tenant_id = ?", [tenant_id])?;
    report.classes = tx.execute("DELETE FROM classes WHERE tenant_id = ?", [tenant_id])?;
    tx.execute("DELETE FROM tenant_counters WHERE tenant_id = ?", [tenant_id])?;
    tx.execute("DELETE FROM tenants WHERE id = ?", [tenant_id])?;
    tx.commit()?;

    tracing::info!(tenant = tenant_id, ?report, "tenant purged");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{mark_bulk, MarkBatch, MarkRecord};
    use crate::db::open_in_memory;
    use crate::error::CoreError;
    use crate::registry::{
        create_class, create_professor, create_student, list_classes, list_students, NewProfessor,
        NewStudent,
    };
    use crate::roster::{assign_professors, assign_students};

    const T1: &str = "tenant-1";
    const T2: &str = "tenant-2";

    fn populate(conn: &Connection, tenant: &str) -> String {
        let class_id = create_class(conn, tenant, "Physics", "A").unwrap().id;
        let prof = create_professor(
            conn,
            tenant,
            &NewProfessor {
                name: "Prof".into(),
                username: "prof".into(),
                password_hash: "hash".into(),
            },
        )
        .unwrap()
        .id;
        let student = create_student(
            conn,
            tenant,
            &NewStudent {
                enrollment_number: format!("{tenant}-EN1"),
                name: "Asha".into(),
                semester: 1,
                division: None,
            },
        )
        .unwrap()
        .id;
        assign_students(conn, tenant, &class_id, &[student.clone()]).unwrap();
        assign_professors(conn, tenant, &class_id, &[prof.clone()]).unwrap();
        mark_bulk(
            conn,
            tenant,
            &prof,
            offset_from_minutes(0).unwrap(),
            &MarkBatch {
                class_id: class_id.clone(),
                slot_number: Some(1),
                date_ms: None,
                date: Some("2024-03-01".into()),
                records: Some(vec![MarkRecord {
                    student_id: serde_json::Value::String(student),
                    is_present: true,
                }]),
            },
        )
        .unwrap();
        class_id
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn offset_falls_back_until_configured() {
        let conn = open_in_memory();
        assert_eq!(tenant_offset_minutes(&conn, T1, 60).unwrap(), 60);
        configure_tenant(&conn, T1, 330).unwrap();
        configure_tenant(&conn, T1, 345).unwrap();
        assert_eq!(tenant_offset_minutes(&conn, T1, 60).unwrap(), 345);
        assert_eq!(tenant_offset_minutes(&conn, T2, 60).unwrap(), 60);
        assert_eq!(
            tenant_offset(&conn, T1, 0).unwrap().local_minus_utc(),
            345 * 60
        );
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let conn = open_in_memory();
        assert!(matches!(
            configure_tenant(&conn, T1, 900),
            Err(CoreError::InvalidInput(_))
        ));
        assert_eq!(count(&conn, "tenants"), 0);
    }

    #[test]
    fn purge_removes_only_the_named_tenant() {
        let conn = open_in_memory();
        populate(&conn, T1);
        let keep = populate(&conn, T2);
        configure_tenant(&conn, T1, 330).unwrap();

        let report = purge_tenant(&conn, T1).unwrap();
        assert_eq!(report.attendance, 1);
        assert_eq!(report.students, 1);
        assert_eq!(report.professors, 1);
        assert_eq!(report.classes, 1);
        assert_eq!(report.class_student_refs, 1);
        assert_eq!(report.class_professor_refs, 1);
        assert_eq!(report.professor_class_refs, 1);

        assert!(list_classes(&conn, T1).unwrap().is_empty());
        assert!(list_students(&conn, T1, None, None).unwrap().is_empty());
        assert_eq!(list_classes(&conn, T2).unwrap()[0].class.id, keep);
        assert_eq!(count(&conn, "attendance"), 1);
        assert_eq!(count(&conn, "tenants"), 0);

        // Codes restart for a purged tenant.
        assert_eq!(create_class(&conn, T1, "Maths", "A").unwrap().code, 1);
    }
}
