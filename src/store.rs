use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::TestMode;

pub type UserId = i64;
pub type ResultId = i64;
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("store connection lock was poisoned")]
    Poisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    /// Already hashed, never plaintext
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: ResultId,
    pub user_id: UserId,
    pub wpm: u32,
    pub accuracy: f64,
    pub correct_chars: u32,
    pub incorrect_chars: u32,
    pub mode: TestMode,
    pub limit: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTestResult {
    pub user_id: UserId,
    pub wpm: u32,
    pub accuracy: f64,
    pub correct_chars: u32,
    pub incorrect_chars: u32,
    pub mode: TestMode,
    pub limit: u32,
    pub completed_at: DateTime<Utc>,
}

/// Persistence boundary for users and test results.
///
/// Queries return plain rows; grouping and reductions happen in
/// [`crate::stats`] and [`crate::leaderboard`].
pub trait ResultStore: Send + Sync {
    fn create_user(&self, new_user: NewUser) -> Result<User>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn user_by_id(&self, id: UserId) -> Result<Option<User>>;
    fn users(&self) -> Result<Vec<User>>;
    fn insert_result(&self, result: NewTestResult) -> Result<TestResult>;
    fn results_for_user(&self, user_id: UserId) -> Result<Vec<TestResult>>;
    fn results_for_mode(&self, mode: TestMode) -> Result<Vec<TestResult>>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS test_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        wpm INTEGER NOT NULL,
        accuracy REAL NOT NULL,
        correct_chars INTEGER NOT NULL,
        incorrect_chars INTEGER NOT NULL,
        mode TEXT NOT NULL,
        test_limit INTEGER NOT NULL,
        completed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_test_results_user ON test_results(user_id);
    CREATE INDEX IF NOT EXISTS idx_test_results_mode ON test_results(mode);
"#;

const RESULT_COLUMNS: &str =
    "id, user_id, wpm, accuracy, correct_chars, incorrect_chars, mode, test_limit, completed_at";
const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at";

/// SQLite-backed store
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and its tables
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!("opening store at {}", path.as_ref().display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

fn row_to_result(row: &Row) -> rusqlite::Result<TestResult> {
    let mode: String = row.get(6)?;
    let mode = mode.parse::<TestMode>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(TestResult {
        id: row.get(0)?,
        user_id: row.get(1)?,
        wpm: row.get(2)?,
        accuracy: row.get(3)?,
        correct_chars: row.get(4)?,
        incorrect_chars: row.get(5)?,
        mode,
        limit: row.get(7)?,
        completed_at: parse_timestamp(row, 8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl ResultStore for SqliteStore {
    fn create_user(&self, new_user: NewUser) -> Result<User> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_user.name,
                new_user.email,
                new_user.password_hash,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict {
                    resource: "user",
                    field: "email",
                    value: new_user.email.clone(),
                }
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn insert_result(&self, result: NewTestResult) -> Result<TestResult> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO test_results
            (user_id, wpm, accuracy, correct_chars, incorrect_chars, mode, test_limit, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                result.user_id,
                result.wpm,
                result.accuracy,
                result.correct_chars,
                result.incorrect_chars,
                result.mode.to_string(),
                result.limit,
                result.completed_at.to_rfc3339(),
            ],
        )?;

        Ok(TestResult {
            id: conn.last_insert_rowid(),
            user_id: result.user_id,
            wpm: result.wpm,
            accuracy: result.accuracy,
            correct_chars: result.correct_chars,
            incorrect_chars: result.incorrect_chars,
            mode: result.mode,
            limit: result.limit,
            completed_at: result.completed_at,
        })
    }

    fn results_for_user(&self, user_id: UserId) -> Result<Vec<TestResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM test_results WHERE user_id = ?1 ORDER BY id"
        ))?;
        let results = stmt
            .query_map([user_id], row_to_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }

    fn results_for_mode(&self, mode: TestMode) -> Result<Vec<TestResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM test_results WHERE mode = ?1 ORDER BY id"
        ))?;
        let results = stmt
            .query_map([mode.to_string()], row_to_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }
}
