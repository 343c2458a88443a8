use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "contentd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS problems(
            id TEXT PRIMARY KEY,
            location TEXT NOT NULL UNIQUE,
            definition TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // problem_location is not a foreign key: a test outlives its problem when
    // the problem is deleted or the test is moved to another location.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS content_tests(
            id TEXT PRIMARY KEY,
            problem_location TEXT NOT NULL,
            should_be TEXT NOT NULL,
            verdict TEXT NOT NULL,
            answers TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_content_tests_location ON content_tests(problem_location)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_responses(
            id TEXT PRIMARY KEY,
            content_test_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            string_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            FOREIGN KEY(content_test_id) REFERENCES content_tests(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_responses_test ON test_responses(content_test_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_inputs(
            id TEXT PRIMARY KEY,
            response_id TEXT NOT NULL,
            content_test_id TEXT NOT NULL,
            string_id TEXT NOT NULL,
            response_index INTEGER NOT NULL,
            input_index INTEGER NOT NULL,
            answer TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(response_id) REFERENCES test_responses(id) ON DELETE CASCADE,
            FOREIGN KEY(content_test_id) REFERENCES content_tests(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_inputs_response ON test_inputs(response_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_inputs_test ON test_inputs(content_test_id)",
        [],
    )?;

    // Every token ever issued stays resolvable, so a repeated unsubscribe
    // still finds its user after the preference is gone.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_tokens(
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            issued_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_tokens_user ON notification_tokens(username)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_prefs(
            username TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            enabled_at TEXT,
            FOREIGN KEY(token) REFERENCES notification_tokens(token)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
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
