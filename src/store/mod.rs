//! Relational persistence for log records, check results and feedback.
//!
//! Two interchangeable backends sit behind [`LogStore`]: an embedded SQLite
//! file and a Postgres server. [`open`] picks one from the connection
//! string's scheme; callers only see the trait.

pub mod pg;
pub mod sqlite;

use crate::model::{
    CheckResult, Feedback, LogFilter, LogRecord, LogSummary, StoredCheck, StoredFeedback,
    StoredLog,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://monitoring.db";

/// Cost columns added by forward migration when missing.
pub(crate) const COST_COLUMNS: [&str; 3] = ["input_cost", "output_cost", "total_cost"];

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Postgres(postgres::Error),
    /// The connection string names no known backend.
    UnsupportedUrl(String),
    /// A stored value could not be mapped back into the model.
    Decode(String),
    /// No record with this id.
    NotFound(i64),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StoreError::Postgres(e) => write!(f, "postgres error: {e}"),
            StoreError::UnsupportedUrl(url) => {
                write!(f, "unsupported database url scheme: {url}")
            }
            StoreError::Decode(msg) => write!(f, "failed to decode stored value: {msg}"),
            StoreError::NotFound(id) => write!(f, "no log record with id {id}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::Postgres(e)
    }
}

/// Backend-agnostic CRUD over the three monitoring tables.
///
/// Timestamps are assigned by the database at insert time. Booleans and the
/// tri-state check outcome are normalized here, so callers never see the
/// backend's native representation.
pub trait LogStore {
    /// `"sqlite"` or `"postgres"`.
    fn driver_name(&self) -> &'static str;

    /// Create tables and indexes if absent and add any missing cost columns.
    /// Safe to call on every startup; never drops or renames a column.
    fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Insert a record and return its id. `total_cost` is written as
    /// `input_cost + output_cost` whenever both are present.
    fn insert_log(&mut self, record: &LogRecord) -> Result<i64, StoreError>;

    /// Insert all checks for one record in a single transaction. No-op on
    /// empty input.
    fn insert_checks(&mut self, log_id: i64, checks: &[CheckResult]) -> Result<(), StoreError>;

    fn insert_feedback(&mut self, feedback: &Feedback) -> Result<i64, StoreError>;

    /// Newest-first page of record summaries.
    fn list_logs(
        &mut self,
        limit: u32,
        offset: u32,
        filter: &LogFilter,
    ) -> Result<Vec<LogSummary>, StoreError>;

    fn get_log(&mut self, id: i64) -> Result<Option<StoredLog>, StoreError>;

    /// Checks for a record in insertion order.
    fn get_checks(&mut self, log_id: i64) -> Result<Vec<StoredCheck>, StoreError>;

    /// Feedback for a record, newest first.
    fn get_feedback(&mut self, log_id: i64) -> Result<Vec<StoredFeedback>, StoreError>;

    /// Delete a record together with its checks and feedback. Returns
    /// whether a record was removed.
    fn delete_log(&mut self, id: i64) -> Result<bool, StoreError>;

    /// Overwrite `created_at` on a record and all of its children. Used when
    /// seeding synthetic history.
    fn backdate(&mut self, log_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    SqliteFile(PathBuf),
    SqliteMemory,
    Postgres(String),
}

impl FromStr for DatabaseUrl {
    type Err = StoreError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(DatabaseUrl::Postgres(url.to_string()));
        }
        if url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return Ok(DatabaseUrl::SqliteMemory);
        }
        if let Some(rest) = url.strip_prefix("sqlite://") {
            // sqlite:///rel.db and sqlite://rel.db are relative to the working
            // directory; sqlite:////abs/path is absolute.
            let path = rest.strip_prefix('/').unwrap_or(rest);
            if path.is_empty() {
                return Err(StoreError::UnsupportedUrl(url.to_string()));
            }
            return Ok(DatabaseUrl::SqliteFile(PathBuf::from(path)));
        }
        if let Some(rest) = url.strip_prefix("sqlite:") {
            if !rest.is_empty() {
                return Ok(DatabaseUrl::SqliteFile(PathBuf::from(rest)));
            }
        }
        let is_sqlite_path = [".db", ".sqlite", ".sqlite3"]
            .iter()
            .any(|ext| url.ends_with(ext));
        if is_sqlite_path && !url.contains("://") {
            return Ok(DatabaseUrl::SqliteFile(PathBuf::from(url)));
        }
        Err(StoreError::UnsupportedUrl(url.to_string()))
    }
}

/// Connect to the backend named by `url`. Does not create the schema.
pub fn open(url: &str) -> Result<Box<dyn LogStore>, StoreError> {
    match url.parse::<DatabaseUrl>()? {
        DatabaseUrl::SqliteFile(path) => Ok(Box::new(sqlite::SqliteStore::open(&path)?)),
        DatabaseUrl::SqliteMemory => Ok(Box::new(sqlite::SqliteStore::memory()?)),
        DatabaseUrl::Postgres(url) => Ok(Box::new(pg::PostgresStore::connect(&url)?)),
    }
}

/// Token counts are stored as signed 64-bit integers.
pub(crate) fn tokens_to_sql(tokens: Option<u64>) -> Option<i64> {
    tokens.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

pub(crate) fn tokens_from_sql(tokens: Option<i64>) -> Option<u64> {
    tokens.and_then(|n| u64::try_from(n).ok())
}
