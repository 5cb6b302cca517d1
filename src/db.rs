use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates the ledger schema on a fresh connection. Safe to call on an
/// existing database; every statement is IF NOT EXISTS.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // courseId/formId allocation. Values only move forward, and the bump
    // happens inside the same transaction as the row it identifies, so a
    // rollback never leaves a reusable id behind.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS counters(
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO counters(name, value) VALUES('course_id', 0)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO counters(name, value) VALUES('form_id', 0)",
        [],
    )?;

    // One logical row per canonical address. Re-registration flips active
    // and refreshes registered_at; rows are never deleted.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            address TEXT PRIMARY KEY,
            registered_at INTEGER NOT NULL,
            active INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            teacher TEXT NOT NULL,
            active INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS forms(
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            teacher TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            present_count INTEGER NOT NULL,
            opened_at INTEGER NOT NULL,
            closed_at INTEGER,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_forms_course ON forms(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_forms_teacher ON forms(teacher)",
        [],
    )?;

    // Roster is fixed at creation; sort_order preserves the order given by
    // the creating request.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS form_students(
            form_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(form_id, address),
            FOREIGN KEY(form_id) REFERENCES forms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_form_students_address ON form_students(address)",
        [],
    )?;

    // Append-only: insert-once, no update, no delete.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            form_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            attended INTEGER NOT NULL,
            submitted_at INTEGER NOT NULL,
            PRIMARY KEY(form_id, address),
            FOREIGN KEY(form_id) REFERENCES forms(id)
        )",
        [],
    )?;

    // Ordered notification log consumed by external dashboards. Rows commit
    // in the same transaction as the mutation they describe.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            at INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
