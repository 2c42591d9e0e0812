use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("lessond.sqlite3");
    let conn = Connection::open(db_path)?;
    // The sidecar and external tooling may hold the file at the same time.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Directory rows are provisioned by the surrounding system; the engine only reads them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parents(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            family_id TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            family_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parents_family ON parents(tenant_id, family_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_family ON students(tenant_id, family_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_tenant ON terms(tenant_id, start_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            room_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL CHECK(day_of_week BETWEEN 0 AND 6),
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            category TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id),
            FOREIGN KEY(term_id) REFERENCES terms(id)
        )",
        [],
    )?;
    // Workspaces created before lesson edits were tracked lack updated_at.
    ensure_lessons_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_teacher_day ON lessons(tenant_id, teacher_id, day_of_week, active)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_room_day ON lessons(tenant_id, room_id, day_of_week, active)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_term ON lessons(tenant_id, term_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            enrolled_at TEXT NOT NULL,
            removed_at TEXT,
            FOREIGN KEY(lesson_id) REFERENCES lessons(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_active_pair
         ON enrollments(lesson_id, student_id) WHERE active = 1",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(tenant_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS hybrid_patterns(
            lesson_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            group_weeks_json TEXT NOT NULL,
            individual_weeks_json TEXT NOT NULL,
            slot_duration_minutes INTEGER NOT NULL,
            booking_deadline_hours INTEGER NOT NULL,
            booking_open INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(lesson_id) REFERENCES lessons(id),
            FOREIGN KEY(term_id) REFERENCES terms(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS individual_bookings(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            week_number INTEGER NOT NULL,
            scheduled_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL,
            cancellation_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(lesson_id) REFERENCES lessons(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_bookings_updated_at(conn)?;
    // These two partial indexes are what makes concurrent booking safe: whichever
    // writer commits second violates one of them.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_student_week
         ON individual_bookings(lesson_id, student_id, week_number) WHERE status <> 'CANCELLED'",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_slot
         ON individual_bookings(lesson_id, week_number, start_time) WHERE status <> 'CANCELLED'",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_date ON individual_bookings(tenant_id, scheduled_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_parent ON individual_bookings(tenant_id, parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_outbox(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            delivered_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outbox_pending ON notification_outbox(tenant_id, delivered_at)",
        [],
    )?;

    Ok(())
}

fn ensure_lessons_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "lessons", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE lessons ADD COLUMN updated_at TEXT", [])?;
    conn.execute(
        "UPDATE lessons SET updated_at = created_at WHERE updated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn ensure_bookings_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "individual_bookings", "updated_at")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE individual_bookings ADD COLUMN updated_at TEXT",
        [],
    )?;
    conn.execute(
        "UPDATE individual_bookings SET updated_at = created_at WHERE updated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
