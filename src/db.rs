use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE: &str = "participation.sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

/// Opens the database under `data_dir`, creating the directory and schema as needed.
pub fn open_db(data_dir: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(data_dir)?;
    let conn = Connection::open(db_path(data_dir))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Per-request connection against an already initialized database file.
/// Never creates the file.
pub fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Per-request connection that recovers from a store that was not ready at startup:
/// when the file cannot be opened, the directory and schema are created again.
pub fn connect_or_init(data_dir: &Path) -> anyhow::Result<Connection> {
    match connect(&db_path(data_dir)) {
        Ok(conn) => Ok(conn),
        Err(_) => open_db(data_dir),
    }
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // Single row: which lecture students currently see.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_state(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            current_lecture TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS active_questions(
            lecture_id TEXT PRIMARY KEY,
            question_id TEXT,
            results_visible INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            lecture_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            course TEXT NOT NULL,
            question_type TEXT NOT NULL,
            question_prompt TEXT NOT NULL,
            answer TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            PRIMARY KEY(lecture_id, question_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_lecture_time ON responses(lecture_id, submitted_at)",
        [],
    )?;
    Ok(())
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---- course state ----

pub fn current_lecture(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT current_lecture FROM course_state WHERE id = 1",
        [],
        |r| r.get(0),
    )
    .optional()
}

pub fn set_current_lecture(conn: &Connection, lecture_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO course_state(id, current_lecture, updated_at) VALUES(1, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           current_lecture = excluded.current_lecture,
           updated_at = excluded.updated_at",
        (lecture_id, now_timestamp()),
    )?;
    Ok(())
}

// ---- active question pointer ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivePointer {
    pub question_id: Option<String>,
    pub results_visible: bool,
}

/// Missing rows read as idle with results hidden.
pub fn active_pointer(conn: &Connection, lecture_id: &str) -> rusqlite::Result<ActivePointer> {
    let row = conn
        .query_row(
            "SELECT question_id, results_visible FROM active_questions WHERE lecture_id = ?",
            [lecture_id],
            |r| {
                Ok(ActivePointer {
                    question_id: r.get(0)?,
                    results_visible: r.get::<_, i64>(1)? != 0,
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_default())
}

pub fn set_active_question(
    conn: &Connection,
    lecture_id: &str,
    question_id: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO active_questions(lecture_id, question_id, results_visible, updated_at)
         VALUES(?, ?, 0, ?)
         ON CONFLICT(lecture_id) DO UPDATE SET
           question_id = excluded.question_id,
           updated_at = excluded.updated_at",
        (lecture_id, question_id, now_timestamp()),
    )?;
    Ok(())
}

pub fn set_results_visible(
    conn: &Connection,
    lecture_id: &str,
    visible: bool,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO active_questions(lecture_id, question_id, results_visible, updated_at)
         VALUES(?, NULL, ?, ?)
         ON CONFLICT(lecture_id) DO UPDATE SET
           results_visible = excluded.results_visible,
           updated_at = excluded.updated_at",
        (lecture_id, visible as i64, now_timestamp()),
    )?;
    Ok(())
}

pub fn reset_pointer(conn: &Connection, lecture_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO active_questions(lecture_id, question_id, results_visible, updated_at)
         VALUES(?, NULL, 0, ?)
         ON CONFLICT(lecture_id) DO UPDATE SET
           question_id = NULL,
           results_visible = 0,
           updated_at = excluded.updated_at",
        (lecture_id, now_timestamp()),
    )?;
    Ok(())
}

// ---- responses ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRow {
    pub lecture_id: String,
    pub question_id: String,
    pub student_id: String,
    pub course: String,
    pub question_type: String,
    pub question_prompt: String,
    pub answer: String,
    pub submitted_at: String,
}

pub fn has_response(
    conn: &Connection,
    lecture_id: &str,
    question_id: &str,
    student_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM responses WHERE lecture_id = ? AND question_id = ? AND student_id = ?",
        (lecture_id, question_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

/// Create-if-absent on (lecture, question, student). Returns false when a row already existed.
pub fn insert_response_if_absent(conn: &Connection, row: &ResponseRow) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT INTO responses(
            lecture_id, question_id, student_id, course,
            question_type, question_prompt, answer, submitted_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(lecture_id, question_id, student_id) DO NOTHING",
        (
            &row.lecture_id,
            &row.question_id,
            &row.student_id,
            &row.course,
            &row.question_type,
            &row.question_prompt,
            &row.answer,
            &row.submitted_at,
        ),
    )?;
    Ok(changed == 1)
}

const RESPONSE_COLUMNS: &str = "lecture_id, question_id, student_id, course,
    question_type, question_prompt, answer, submitted_at";

fn map_response(r: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseRow> {
    Ok(ResponseRow {
        lecture_id: r.get(0)?,
        question_id: r.get(1)?,
        student_id: r.get(2)?,
        course: r.get(3)?,
        question_type: r.get(4)?,
        question_prompt: r.get(5)?,
        answer: r.get(6)?,
        submitted_at: r.get(7)?,
    })
}

/// Oldest first; ties keep insertion order.
pub fn responses_for_question(
    conn: &Connection,
    lecture_id: &str,
    question_id: &str,
) -> rusqlite::Result<Vec<ResponseRow>> {
    let sql = format!(
        "SELECT {RESPONSE_COLUMNS} FROM responses
         WHERE lecture_id = ? AND question_id = ?
         ORDER BY submitted_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map((lecture_id, question_id), map_response)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

pub fn responses_for_lecture(
    conn: &Connection,
    lecture_id: &str,
) -> rusqlite::Result<Vec<ResponseRow>> {
    let sql = format!(
        "SELECT {RESPONSE_COLUMNS} FROM responses
         WHERE lecture_id = ?
         ORDER BY submitted_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map([lecture_id], map_response)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

pub fn count_responses_for_lecture(conn: &Connection, lecture_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE lecture_id = ?",
        [lecture_id],
        |r| r.get(0),
    )
}

#[cfg(test)]
pub(crate) fn memory_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("schema");
    conn
}
