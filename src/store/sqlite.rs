//! Embedded SQLite backend.
//!
//! Costs are stored as decimal TEXT so they never round-trip through a
//! float. Booleans are 0/1 integers; an unknown check outcome is NULL.

use super::{tokens_from_sql, tokens_to_sql, LogStore, StoreError, COST_COLUMNS};
use crate::model::{
    CheckResult, Feedback, LogFilter, LogRecord, LogSummary, Outcome, StoredCheck,
    StoredFeedback, StoredLog,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS llm_logs (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    filepath            TEXT NOT NULL,
    agent_name          TEXT,
    provider            TEXT,
    model               TEXT,
    user_prompt         TEXT,
    instructions        TEXT,
    total_input_tokens  INTEGER,
    total_output_tokens INTEGER,
    assistant_answer    TEXT,
    raw_json            TEXT,
    input_cost          TEXT,
    output_cost         TEXT,
    total_cost          TEXT,
    created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS eval_checks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    log_id     INTEGER NOT NULL REFERENCES llm_logs(id) ON DELETE CASCADE,
    check_name TEXT NOT NULL,
    passed     INTEGER,
    score      REAL,
    details    TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS feedback (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    log_id           INTEGER NOT NULL REFERENCES llm_logs(id) ON DELETE CASCADE,
    is_good          INTEGER NOT NULL,
    comments         TEXT,
    reference_answer TEXT,
    created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_llm_logs_provider_model ON llm_logs(provider, model);
CREATE INDEX IF NOT EXISTS idx_eval_checks_log_id ON eval_checks(log_id);
CREATE INDEX IF NOT EXISTS idx_feedback_log_id ON feedback(log_id);
";

const LOG_COLUMNS: &str = "id, created_at, filepath, agent_name, provider, model, user_prompt, \
     instructions, total_input_tokens, total_output_tokens, assistant_answer, \
     input_cost, output_cost, total_cost";

const SUMMARY_COLUMNS: &str = "id, created_at, filepath, agent_name, provider, model, user_prompt, \
     total_input_tokens, total_output_tokens, total_cost";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        // WAL for better concurrent read performance from the dashboard
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::configure(conn)
    }

    pub fn memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        // Cascading deletes depend on this per-connection pragma.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn get_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

fn add_missing_cost_columns(conn: &Connection) -> rusqlite::Result<()> {
    let existing = get_columns(conn, "llm_logs")?;
    for column in COST_COLUMNS {
        if !existing.contains(column) {
            tracing::info!(column, "adding missing column to llm_logs");
            conn.execute_batch(&format!("ALTER TABLE llm_logs ADD COLUMN {column} TEXT"))?;
        }
    }
    Ok(())
}

fn decimal_to_sql(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

/// Cost column reader. Legacy tables declared NUMERIC may hold REAL or
/// INTEGER values, which are accepted as well as exact text.
fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let conversion_error = |msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    };
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(Decimal::from(i))),
        ValueRef::Real(f) => Decimal::try_from(f)
            .map(Some)
            .map_err(|e| conversion_error(e.to_string())),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map(Some)
                .map_err(|e| conversion_error(format!("{text:?}: {e}")))
        }
        ValueRef::Blob(_) => Err(conversion_error("blob in cost column".to_string())),
    }
}

/// Accepts both the RFC 3339 default written by this schema and SQLite's
/// `CURRENT_TIMESTAMP` format used by older tables.
fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized timestamp {text:?}").into(),
        )
    })
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn map_summary(row: &Row) -> rusqlite::Result<LogSummary> {
    Ok(LogSummary {
        id: row.get(0)?,
        created_at: timestamp_column(row, 1)?,
        filepath: row.get(2)?,
        agent_name: row.get(3)?,
        provider: row.get(4)?,
        model: row.get(5)?,
        user_prompt: row.get(6)?,
        total_input_tokens: tokens_from_sql(row.get(7)?),
        total_output_tokens: tokens_from_sql(row.get(8)?),
        total_cost: decimal_column(row, 9)?,
    })
}

fn map_log(row: &Row) -> rusqlite::Result<StoredLog> {
    Ok(StoredLog {
        id: row.get(0)?,
        created_at: timestamp_column(row, 1)?,
        filepath: row.get(2)?,
        agent_name: row.get(3)?,
        provider: row.get(4)?,
        model: row.get(5)?,
        user_prompt: row.get(6)?,
        instructions: row.get(7)?,
        total_input_tokens: tokens_from_sql(row.get(8)?),
        total_output_tokens: tokens_from_sql(row.get(9)?),
        assistant_answer: row.get(10)?,
        input_cost: decimal_column(row, 11)?,
        output_cost: decimal_column(row, 12)?,
        total_cost: decimal_column(row, 13)?,
    })
}

impl LogStore for SqliteStore {
    fn driver_name(&self) -> &'static str {
        "sqlite"
    }

    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(DDL)?;
        add_missing_cost_columns(&self.conn)?;
        Ok(())
    }

    fn insert_log(&mut self, record: &LogRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO llm_logs (filepath, agent_name, provider, model, user_prompt, instructions,
                 total_input_tokens, total_output_tokens, assistant_answer, raw_json,
                 input_cost, output_cost, total_cost)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.filepath,
                record.agent_name,
                record.provider,
                record.model,
                record.user_prompt,
                record.instructions,
                tokens_to_sql(record.total_input_tokens),
                tokens_to_sql(record.total_output_tokens),
                record.assistant_answer,
                record.raw_json,
                decimal_to_sql(record.input_cost),
                decimal_to_sql(record.output_cost),
                decimal_to_sql(record.effective_total_cost()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_checks(&mut self, log_id: i64, checks: &[CheckResult]) -> Result<(), StoreError> {
        if checks.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO eval_checks (log_id, check_name, passed, score, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for check in checks {
                stmt.execute(params![
                    log_id,
                    check.kind.as_str(),
                    check.outcome.as_passed(),
                    check.score,
                    check.details,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_feedback(&mut self, feedback: &Feedback) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO feedback (log_id, is_good, comments, reference_answer)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                feedback.log_id,
                feedback.is_good,
                feedback.comments,
                feedback.reference_answer,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_logs(
        &mut self,
        limit: u32,
        offset: u32,
        filter: &LogFilter,
    ) -> Result<Vec<LogSummary>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(provider) = filter.provider() {
            values.push(SqlValue::Text(provider.to_string()));
            conditions.push(format!("provider = ?{}", values.len()));
        }
        if let Some(model) = filter.model() {
            values.push(SqlValue::Text(model.to_string()));
            conditions.push(format!("model = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM llm_logs");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        values.push(SqlValue::Integer(i64::from(limit)));
        values.push(SqlValue::Integer(i64::from(offset)));
        sql.push_str(&format!(
            " ORDER BY id DESC LIMIT ?{} OFFSET ?{}",
            values.len() - 1,
            values.len()
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), map_summary)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_log(&mut self, id: i64) -> Result<Option<StoredLog>, StoreError> {
        let log = self
            .conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM llm_logs WHERE id = ?1"),
                params![id],
                map_log,
            )
            .optional()?;
        Ok(log)
    }

    fn get_checks(&mut self, log_id: i64) -> Result<Vec<StoredCheck>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT check_name, passed, score, details, created_at
             FROM eval_checks WHERE log_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![log_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<bool>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<String>>(3)?,
                timestamp_column(row, 4)?,
            ))
        })?;

        let mut checks = Vec::new();
        for row in rows {
            let (name, passed, score, details, created_at) = row?;
            checks.push(StoredCheck {
                kind: name.parse().map_err(StoreError::Decode)?,
                outcome: Outcome::from_passed(passed),
                score,
                details,
                created_at,
            });
        }
        Ok(checks)
    }

    fn get_feedback(&mut self, log_id: i64) -> Result<Vec<StoredFeedback>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, is_good, comments, reference_answer, created_at
             FROM feedback WHERE log_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![log_id], |row| {
            Ok(StoredFeedback {
                id: row.get(0)?,
                is_good: row.get(1)?,
                comments: row.get(2)?,
                reference_answer: row.get(3)?,
                created_at: timestamp_column(row, 4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_log(&mut self, id: i64) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM llm_logs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn backdate(&mut self, log_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let ts = format_timestamp(at);
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE llm_logs SET created_at = ?1 WHERE id = ?2",
            params![ts, log_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(log_id));
        }
        tx.execute(
            "UPDATE eval_checks SET created_at = ?1 WHERE log_id = ?2",
            params![ts, log_id],
        )?;
        tx.execute(
            "UPDATE feedback SET created_at = ?1 WHERE log_id = ?2",
            params![ts, log_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckKind, Costs};
    use tempfile::TempDir;

    fn test_db() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitoring.db");
        let mut store = SqliteStore::open(&path).unwrap();
        store.ensure_schema().unwrap();
        (dir, store)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample(provider: &str, model: &str) -> LogRecord {
        LogRecord {
            filepath: format!("logs/{provider}-{model}.json"),
            agent_name: Some("search_agent".into()),
            provider: Some(provider.into()),
            model: Some(model.into()),
            user_prompt: Some("capybara habitat".into()),
            instructions: Some("Cite references.".into()),
            total_input_tokens: Some(1000),
            total_output_tokens: Some(200),
            assistant_answer: Some("Near rivers.".into()),
            raw_json: Some("{}".into()),
            ..Default::default()
        }
    }

    fn check(kind: CheckKind, outcome: Outcome) -> CheckResult {
        CheckResult {
            kind,
            outcome,
            score: None,
            details: Some(format!("{kind}")),
        }
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitoring.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.ensure_schema().unwrap();
            store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        }
        let mut store = SqliteStore::open(&path).unwrap();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(count(&store, "llm_logs"), 1);
    }

    #[test]
    fn insert_and_get_log_roundtrips_fields() {
        let (_dir, mut store) = test_db();
        let rec = sample("openai", "gpt-4o-mini").with_costs(crate::model::Costs {
            input: dec("0.00015"),
            output: dec("0.00012"),
        });
        let id = store.insert_log(&rec).unwrap();

        let got = store.get_log(id).unwrap().unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.filepath, rec.filepath);
        assert_eq!(got.provider.as_deref(), Some("openai"));
        assert_eq!(got.total_input_tokens, Some(1000));
        assert_eq!(got.total_output_tokens, Some(200));
        assert_eq!(got.input_cost, Some(dec("0.00015")));
        assert_eq!(got.output_cost, Some(dec("0.00012")));
        assert_eq!(got.total_cost, Some(dec("0.00027")));
        assert!(store.get_log(id + 100).unwrap().is_none());
    }

    #[test]
    fn costs_stored_as_exact_text() {
        let (_dir, mut store) = test_db();
        let rec = sample("openai", "gpt-4o").with_costs(crate::model::Costs {
            input: dec("0.1"),
            output: dec("0.2"),
        });
        let id = store.insert_log(&rec).unwrap();
        let (kind, text): (String, String) = store
            .connection()
            .query_row(
                "SELECT typeof(total_cost), total_cost FROM llm_logs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(text, "0.3");
    }

    #[test]
    fn total_cost_recomputed_from_parts() {
        let (_dir, mut store) = test_db();
        let mut rec = sample("openai", "gpt-4o");
        rec.input_cost = Some(dec("0.000001"));
        rec.output_cost = Some(dec("0.000002"));
        rec.total_cost = Some(dec("5"));
        let id = store.insert_log(&rec).unwrap();
        let got = store.get_log(id).unwrap().unwrap();
        assert_eq!(got.total_cost, Some(dec("0.000003")));
    }

    #[test]
    fn null_tokens_and_costs_stay_null() {
        let (_dir, mut store) = test_db();
        let rec = LogRecord {
            filepath: "bare.json".into(),
            ..Default::default()
        };
        let id = store.insert_log(&rec).unwrap();
        let got = store.get_log(id).unwrap().unwrap();
        assert_eq!(got.total_input_tokens, None);
        assert_eq!(got.total_cost, None);
    }

    #[test]
    fn checks_roundtrip_tri_state_in_insertion_order() {
        let (_dir, mut store) = test_db();
        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        let mut scored = check(CheckKind::AnswerMatch, Outcome::Pass);
        scored.score = Some(0.25);
        store
            .insert_checks(
                id,
                &[
                    check(CheckKind::InstructionsFollow, Outcome::NotApplicable),
                    check(CheckKind::AnswerClear, Outcome::Fail),
                    scored,
                ],
            )
            .unwrap();

        let checks = store.get_checks(id).unwrap();
        let got: Vec<(CheckKind, Outcome)> = checks.iter().map(|c| (c.kind, c.outcome)).collect();
        assert_eq!(
            got,
            vec![
                (CheckKind::InstructionsFollow, Outcome::NotApplicable),
                (CheckKind::AnswerClear, Outcome::Fail),
                (CheckKind::AnswerMatch, Outcome::Pass),
            ]
        );
        assert_eq!(checks[2].score, Some(0.25));
    }

    #[test]
    fn empty_checks_is_noop() {
        let (_dir, mut store) = test_db();
        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        store.insert_checks(id, &[]).unwrap();
        assert_eq!(count(&store, "eval_checks"), 0);
    }

    #[test]
    fn checks_for_missing_log_roll_back() {
        let (_dir, mut store) = test_db();
        let result = store.insert_checks(
            999,
            &[
                check(CheckKind::AnswerClear, Outcome::Pass),
                check(CheckKind::Completeness, Outcome::Pass),
            ],
        );
        assert!(result.is_err());
        assert_eq!(count(&store, "eval_checks"), 0);
    }

    #[test]
    fn feedback_newest_first() {
        let (_dir, mut store) = test_db();
        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        let first = store
            .insert_feedback(&Feedback {
                log_id: id,
                is_good: true,
                comments: Some("Looks fine".into()),
                reference_answer: None,
            })
            .unwrap();
        let second = store
            .insert_feedback(&Feedback {
                log_id: id,
                is_good: false,
                comments: None,
                reference_answer: Some("Rivers and lakes".into()),
            })
            .unwrap();

        let fb = store.get_feedback(id).unwrap();
        assert_eq!(fb.len(), 2);
        assert_eq!(fb[0].id, second);
        assert!(!fb[0].is_good);
        assert_eq!(fb[0].reference_answer.as_deref(), Some("Rivers and lakes"));
        assert_eq!(fb[1].id, first);
        assert!(fb[1].is_good);
        assert!(fb[0].created_at >= fb[1].created_at);
    }

    #[test]
    fn feedback_for_unknown_log_rejected() {
        let (_dir, mut store) = test_db();
        let result = store.insert_feedback(&Feedback {
            log_id: 42,
            is_good: true,
            comments: None,
            reference_answer: None,
        });
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn delete_cascades_to_children() {
        let (_dir, mut store) = test_db();
        let keep = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        let id = store.insert_log(&sample("openai", "gpt-4o-mini")).unwrap();
        for log_id in [keep, id] {
            store
                .insert_checks(log_id, &[check(CheckKind::AnswerClear, Outcome::Pass)])
                .unwrap();
            store
                .insert_feedback(&Feedback {
                    log_id,
                    is_good: true,
                    comments: None,
                    reference_answer: None,
                })
                .unwrap();
        }

        assert!(store.delete_log(id).unwrap());
        assert!(!store.delete_log(id).unwrap());
        assert!(store.get_checks(id).unwrap().is_empty());
        assert!(store.get_feedback(id).unwrap().is_empty());
        assert_eq!(count(&store, "eval_checks"), 1);
        assert_eq!(count(&store, "feedback"), 1);
    }

    #[test]
    fn list_logs_filters_and_pages_newest_first() {
        let (_dir, mut store) = test_db();
        let a = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        let b = store.insert_log(&sample("openai", "gpt-4o-mini")).unwrap();
        let c = store.insert_log(&sample("google", "gemini-1.5-pro")).unwrap();
        let d = store.insert_log(&sample("openai", "gpt-4o")).unwrap();

        let all = store.list_logs(10, 0, &LogFilter::default()).unwrap();
        let ids: Vec<i64> = all.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![d, c, b, a]);

        let openai = LogFilter {
            provider: Some("openai".into()),
            model: None,
        };
        let ids: Vec<i64> = store
            .list_logs(10, 0, &openai)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![d, b, a]);

        let both = LogFilter {
            provider: Some("openai".into()),
            model: Some("gpt-4o".into()),
        };
        let ids: Vec<i64> = store
            .list_logs(1, 1, &both)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a]);

        let model_only = LogFilter {
            provider: None,
            model: Some("gemini-1.5-pro".into()),
        };
        assert_eq!(store.list_logs(10, 0, &model_only).unwrap().len(), 1);
    }

    #[test]
    fn blank_filter_values_match_everything() {
        let (_dir, mut store) = test_db();
        store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        store.insert_log(&sample("google", "gemini-1.5-pro")).unwrap();

        let blank = LogFilter {
            provider: Some(String::new()),
            model: Some("   ".into()),
        };
        assert_eq!(store.list_logs(10, 0, &blank).unwrap().len(), 2);
    }

    #[test]
    fn migrates_legacy_table_without_cost_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE llm_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    filepath TEXT NOT NULL,
                    agent_name TEXT,
                    provider TEXT,
                    model TEXT,
                    user_prompt TEXT,
                    instructions TEXT,
                    total_input_tokens INTEGER,
                    total_output_tokens INTEGER,
                    assistant_answer TEXT,
                    raw_json TEXT,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );
                INSERT INTO llm_logs (filepath, provider) VALUES ('old.json', 'openai');",
            )
            .unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        store.ensure_schema().unwrap();

        let columns = get_columns(store.connection(), "llm_logs").unwrap();
        for column in COST_COLUMNS {
            assert!(columns.contains(column), "missing {column}");
        }

        // Existing row survives and reads back with the legacy timestamp format.
        let logs = store.list_logs(10, 0, &LogFilter::default()).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].filepath, "old.json");
        assert_eq!(logs[0].total_cost, None);

        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        assert!(store.get_log(id).unwrap().is_some());
    }

    #[test]
    fn numeric_cost_columns_decode_real_and_integer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numeric.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE llm_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    filepath TEXT NOT NULL,
                    agent_name TEXT,
                    provider TEXT,
                    model TEXT,
                    user_prompt TEXT,
                    instructions TEXT,
                    total_input_tokens INTEGER,
                    total_output_tokens INTEGER,
                    assistant_answer TEXT,
                    raw_json TEXT,
                    input_cost NUMERIC,
                    output_cost NUMERIC,
                    total_cost NUMERIC,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );",
            )
            .unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        store.ensure_schema().unwrap();

        let priced = sample("openai", "gpt-4o-mini").with_costs(Costs {
            input: dec("0.00015"),
            output: dec("0.00012"),
        });
        let whole = sample("openai", "gpt-4o").with_costs(Costs {
            input: dec("2"),
            output: dec("0.5"),
        });
        let priced_id = store.insert_log(&priced).unwrap();
        let whole_id = store.insert_log(&whole).unwrap();

        // NUMERIC affinity converts the written text into REAL or INTEGER.
        let types: (String, String, String) = store
            .connection()
            .query_row(
                "SELECT typeof(input_cost), typeof(output_cost), typeof(total_cost)
                 FROM llm_logs WHERE id = ?1",
                params![whole_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(types, ("integer".into(), "real".into(), "real".into()));
        let total_type: String = store
            .connection()
            .query_row(
                "SELECT typeof(total_cost) FROM llm_logs WHERE id = ?1",
                params![priced_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total_type, "real");

        let got = store.get_log(priced_id).unwrap().unwrap();
        assert_eq!(got.input_cost, Some(dec("0.00015")));
        assert_eq!(got.output_cost, Some(dec("0.00012")));
        assert_eq!(got.total_cost, Some(dec("0.00027")));
        assert_eq!(
            got.input_cost.unwrap() + got.output_cost.unwrap(),
            got.total_cost.unwrap()
        );

        let got = store.get_log(whole_id).unwrap().unwrap();
        assert_eq!(got.input_cost, Some(dec("2")));
        assert_eq!(got.output_cost, Some(dec("0.5")));
        assert_eq!(got.total_cost, Some(dec("2.5")));

        let summaries = store.list_logs(10, 0, &LogFilter::default()).unwrap();
        assert_eq!(summaries[0].total_cost, Some(dec("2.5")));
    }

    #[test]
    fn blank_text_cost_reads_as_null() {
        let (_dir, mut store) = test_db();
        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        store
            .connection()
            .execute(
                "UPDATE llm_logs SET total_cost = '  ' WHERE id = ?1",
                params![id],
            )
            .unwrap();
        assert_eq!(store.get_log(id).unwrap().unwrap().total_cost, None);
    }

    #[test]
    fn backdate_rewrites_timestamps() {
        let (_dir, mut store) = test_db();
        let id = store.insert_log(&sample("openai", "gpt-4o")).unwrap();
        store
            .insert_checks(id, &[check(CheckKind::AnswerClear, Outcome::Pass)])
            .unwrap();
        let at = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store.backdate(id, at).unwrap();

        assert_eq!(store.get_log(id).unwrap().unwrap().created_at, at);
        assert_eq!(store.get_checks(id).unwrap()[0].created_at, at);
        assert!(matches!(
            store.backdate(id + 1, at),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-02T03:04:05.678Z").is_some());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
