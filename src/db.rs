use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "rosterd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Several sidecars may share one workspace; let writers queue instead of failing fast.
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(path = %db_path.display(), mode = %mode, "WAL journal mode unavailable");
    }
    init_schema(&conn)?;
    tracing::info!(path = %db_path.display(), "workspace database opened");
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tenants(
            id TEXT PRIMARY KEY,
            utc_offset_minutes INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tenant_counters(
            tenant_id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            code INTEGER NOT NULL,
            name TEXT NOT NULL,
            division TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant_id, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_tenant ON classes(tenant_id)",
        [],
    )?;

    // class_id is the student's side of the mirrored class membership. It is
    // deliberately not a foreign key: the roster module keeps both sides in step.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            enrollment_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            semester INTEGER NOT NULL CHECK(semester >= 1),
            division TEXT,
            class_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_tenant ON students(tenant_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS professors(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant_id, username)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_student_refs(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_student_refs_student ON class_student_refs(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_professor_refs(
            class_id TEXT NOT NULL,
            professor_id TEXT NOT NULL,
            PRIMARY KEY(class_id, professor_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_professor_refs_professor ON class_professor_refs(professor_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS professor_class_refs(
            professor_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            PRIMARY KEY(professor_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_professor_class_refs_class ON professor_class_refs(class_id)",
        [],
    )?;

    // The (student_id, class_id, date_ms, slot_number) tuple is the durable
    // uniqueness key for a mark and must survive storage migrations unchanged.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date_ms INTEGER NOT NULL,
            slot_number INTEGER NOT NULL CHECK(slot_number >= 0),
            is_present INTEGER NOT NULL,
            marked_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(student_id, class_id, date_ms, slot_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_id, date_ms)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_date ON attendance(student_id, date_ms)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_tenant ON attendance(tenant_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table)).unwrap();
        stmt.query_map([], |r| r.get::<_, String>(1))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn schema_init_is_idempotent() {
        let conn = open_in_memory();
        init_schema(&conn).expect("second init");
        let cols = columns(&conn, "attendance");
        assert!(cols.iter().any(|c| c == "tenant_id"));
        assert!(cols.iter().any(|c| c == "slot_number"));
    }

    #[test]
    fn attendance_key_is_unique() {
        let conn = open_in_memory();
        let insert = "INSERT INTO attendance(
                id, tenant_id, student_id, class_id, date_ms, slot_number,
                is_present, marked_by, created_at, updated_at
             ) VALUES(?, 't1', 's1', 'c1', 0, 0, 1, 'p1', 0, 0)";
        conn.execute(insert, ["a1"]).unwrap();
        assert!(conn.execute(insert, ["a2"]).is_err());
    }

    #[test]
    fn workspace_database_uses_wal() {
        let dir = std::env::temp_dir().join(format!("rosterd-db-{}", crate::model::new_id()));
        let conn = open_db(&dir).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
