use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "guidance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            name TEXT NOT NULL,
            avg_minutes INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_subject_sort ON topics(subject_id, sort_order)",
        [],
    )?;

    // Student ids are owned by the records service; they are opaque here.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS weekly_slots(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            start_minute INTEGER NOT NULL,
            end_minute INTEGER NOT NULL,
            subject_id TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    ensure_weekly_slots_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_weekly_slots_student_day ON weekly_slots(student_id, day)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topic_progress(
            student_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            completed_minutes INTEGER NOT NULL,
            remaining_minutes INTEGER NOT NULL,
            completed INTEGER NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, topic_id),
            FOREIGN KEY(topic_id) REFERENCES topics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topic_progress_topic ON topic_progress(topic_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS plan_commits(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            week_start TEXT NOT NULL,
            total_minutes INTEGER NOT NULL,
            entry_count INTEGER NOT NULL,
            committed_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plan_commits_student_week ON plan_commits(student_id, week_start)",
        [],
    )?;

    Ok(conn)
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
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

// Workspaces created before slot edits were stamped lack updated_at.
fn ensure_weekly_slots_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "weekly_slots", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE weekly_slots ADD COLUMN updated_at TEXT", [])?;
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

pub fn now_ts() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
