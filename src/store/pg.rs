//! Postgres backend.
//!
//! Costs use NUMERIC, outcomes a nullable BOOLEAN. Tables created by older
//! deployments may use SERIAL ids and TIMESTAMP columns, so ids are cast to
//! BIGINT and timestamps to TIMESTAMPTZ at the query boundary.

use super::{tokens_from_sql, tokens_to_sql, LogStore, StoreError, COST_COLUMNS};
use crate::model::{
    CheckResult, Feedback, LogFilter, LogRecord, LogSummary, Outcome, StoredCheck,
    StoredFeedback, StoredLog,
};
use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use std::collections::HashMap;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS llm_logs (
    id                  BIGSERIAL PRIMARY KEY,
    filepath            TEXT NOT NULL,
    agent_name          TEXT,
    provider            TEXT,
    model               TEXT,
    user_prompt         TEXT,
    instructions        TEXT,
    total_input_tokens  BIGINT,
    total_output_tokens BIGINT,
    assistant_answer    TEXT,
    raw_json            TEXT,
    input_cost          NUMERIC,
    output_cost         NUMERIC,
    total_cost          NUMERIC,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS eval_checks (
    id         BIGSERIAL PRIMARY KEY,
    log_id     BIGINT NOT NULL REFERENCES llm_logs(id) ON DELETE CASCADE,
    check_name TEXT NOT NULL,
    passed     BOOLEAN,
    score      DOUBLE PRECISION,
    details    TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS feedback (
    id               BIGSERIAL PRIMARY KEY,
    log_id           BIGINT NOT NULL REFERENCES llm_logs(id) ON DELETE CASCADE,
    is_good          BOOLEAN NOT NULL,
    comments         TEXT,
    reference_answer TEXT,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_llm_logs_provider_model ON llm_logs(provider, model);
CREATE INDEX IF NOT EXISTS idx_eval_checks_log_id ON eval_checks(log_id);
CREATE INDEX IF NOT EXISTS idx_feedback_log_id ON feedback(log_id);
";

const LOG_COLUMNS: &str = "id::BIGINT, created_at::TIMESTAMPTZ, filepath, agent_name, provider, \
     model, user_prompt, instructions, total_input_tokens::BIGINT, total_output_tokens::BIGINT, \
     assistant_answer, input_cost, output_cost, total_cost";

const SUMMARY_COLUMNS: &str = "id::BIGINT, created_at::TIMESTAMPTZ, filepath, agent_name, provider, \
     model, user_prompt, total_input_tokens::BIGINT, total_output_tokens::BIGINT, total_cost";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(url, NoTls)?;
        Ok(Self { client })
    }

    /// Column name -> data type for `llm_logs` in the current schema.
    fn log_columns(&mut self) -> Result<HashMap<String, String>, StoreError> {
        let rows = self.client.query(
            "SELECT column_name::TEXT, data_type::TEXT FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = 'llm_logs'",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    /// Add missing cost columns and convert legacy text cost columns to
    /// NUMERIC in place.
    fn migrate_cost_columns(&mut self) -> Result<(), StoreError> {
        let existing = self.log_columns()?;
        for column in COST_COLUMNS {
            match existing.get(column).map(|t| t.to_lowercase()) {
                None => {
                    tracing::info!(column, "adding missing column to llm_logs");
                    self.client.batch_execute(&format!(
                        "ALTER TABLE llm_logs ADD COLUMN {column} NUMERIC"
                    ))?;
                }
                Some(data_type) if data_type != "numeric" => {
                    tracing::info!(column, %data_type, "converting cost column to NUMERIC");
                    self.client.batch_execute(&format!(
                        "ALTER TABLE llm_logs ALTER COLUMN {column} TYPE NUMERIC \
                         USING NULLIF({column}::TEXT, '')::NUMERIC"
                    ))?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn map_summary(row: &Row) -> Result<LogSummary, postgres::Error> {
    Ok(LogSummary {
        id: row.try_get(0)?,
        created_at: row.try_get(1)?,
        filepath: row.try_get(2)?,
        agent_name: row.try_get(3)?,
        provider: row.try_get(4)?,
        model: row.try_get(5)?,
        user_prompt: row.try_get(6)?,
        total_input_tokens: tokens_from_sql(row.try_get(7)?),
        total_output_tokens: tokens_from_sql(row.try_get(8)?),
        total_cost: row.try_get(9)?,
    })
}

fn map_log(row: &Row) -> Result<StoredLog, postgres::Error> {
    Ok(StoredLog {
        id: row.try_get(0)?,
        created_at: row.try_get(1)?,
        filepath: row.try_get(2)?,
        agent_name: row.try_get(3)?,
        provider: row.try_get(4)?,
        model: row.try_get(5)?,
        user_prompt: row.try_get(6)?,
        instructions: row.try_get(7)?,
        total_input_tokens: tokens_from_sql(row.try_get(8)?),
        total_output_tokens: tokens_from_sql(row.try_get(9)?),
        assistant_answer: row.try_get(10)?,
        input_cost: row.try_get(11)?,
        output_cost: row.try_get(12)?,
        total_cost: row.try_get(13)?,
    })
}

impl LogStore for PostgresStore {
    fn driver_name(&self) -> &'static str {
        "postgres"
    }

    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.client.batch_execute(DDL)?;
        self.migrate_cost_columns()
    }

    fn insert_log(&mut self, record: &LogRecord) -> Result<i64, StoreError> {
        let total_cost = record.effective_total_cost();
        let row = self.client.query_one(
            "INSERT INTO llm_logs (filepath, agent_name, provider, model, user_prompt, instructions,
                 total_input_tokens, total_output_tokens, assistant_answer, raw_json,
                 input_cost, output_cost, total_cost)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id::BIGINT",
            &[
                &record.filepath,
                &record.agent_name,
                &record.provider,
                &record.model,
                &record.user_prompt,
                &record.instructions,
                &tokens_to_sql(record.total_input_tokens),
                &tokens_to_sql(record.total_output_tokens),
                &record.assistant_answer,
                &record.raw_json,
                &record.input_cost,
                &record.output_cost,
                &total_cost,
            ],
        )?;
        Ok(row.try_get(0)?)
    }

    fn insert_checks(&mut self, log_id: i64, checks: &[CheckResult]) -> Result<(), StoreError> {
        if checks.is_empty() {
            return Ok(());
        }
        let mut tx = self.client.transaction()?;
        let stmt = tx.prepare(
            "INSERT INTO eval_checks (log_id, check_name, passed, score, details)
             VALUES ($1::BIGINT, $2, $3, $4, $5)",
        )?;
        for check in checks {
            tx.execute(
                &stmt,
                &[
                    &log_id,
                    &check.kind.as_str(),
                    &check.outcome.as_passed(),
                    &check.score,
                    &check.details,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_feedback(&mut self, feedback: &Feedback) -> Result<i64, StoreError> {
        let row = self.client.query_one(
            "INSERT INTO feedback (log_id, is_good, comments, reference_answer)
             VALUES ($1::BIGINT, $2, $3, $4)
             RETURNING id::BIGINT",
            &[
                &feedback.log_id,
                &feedback.is_good,
                &feedback.comments,
                &feedback.reference_answer,
            ],
        )?;
        Ok(row.try_get(0)?)
    }

    fn list_logs(
        &mut self,
        limit: u32,
        offset: u32,
        filter: &LogFilter,
    ) -> Result<Vec<LogSummary>, StoreError> {
        let limit = i64::from(limit);
        let offset = i64::from(offset);
        let provider = filter.provider();
        let model = filter.model();
        let mut conditions = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(provider) = &provider {
            params.push(provider);
            conditions.push(format!("provider = ${}", params.len()));
        }
        if let Some(model) = &model {
            params.push(model);
            conditions.push(format!("model = ${}", params.len()));
        }

        let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM llm_logs");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        params.push(&limit);
        params.push(&offset);
        sql.push_str(&format!(
            " ORDER BY id DESC LIMIT ${} OFFSET ${}",
            params.len() - 1,
            params.len()
        ));

        let rows = self.client.query(sql.as_str(), &params)?;
        Ok(rows
            .iter()
            .map(map_summary)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn get_log(&mut self, id: i64) -> Result<Option<StoredLog>, StoreError> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM llm_logs WHERE id = $1::BIGINT");
        let row = self.client.query_opt(sql.as_str(), &[&id])?;
        Ok(row.as_ref().map(map_log).transpose()?)
    }

    fn get_checks(&mut self, log_id: i64) -> Result<Vec<StoredCheck>, StoreError> {
        let rows = self.client.query(
            "SELECT check_name, passed, score, details, created_at::TIMESTAMPTZ
             FROM eval_checks WHERE log_id = $1::BIGINT ORDER BY id ASC",
            &[&log_id],
        )?;
        let mut checks = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get(0)?;
            checks.push(StoredCheck {
                kind: name.parse().map_err(StoreError::Decode)?,
                outcome: Outcome::from_passed(row.try_get(1)?),
                score: row.try_get(2)?,
                details: row.try_get(3)?,
                created_at: row.try_get(4)?,
            });
        }
        Ok(checks)
    }

    fn get_feedback(&mut self, log_id: i64) -> Result<Vec<StoredFeedback>, StoreError> {
        let rows = self.client.query(
            "SELECT id::BIGINT, is_good, comments, reference_answer, created_at::TIMESTAMPTZ
             FROM feedback WHERE log_id = $1::BIGINT ORDER BY id DESC",
            &[&log_id],
        )?;
        let mut feedback = Vec::with_capacity(rows.len());
        for row in &rows {
            feedback.push(StoredFeedback {
                id: row.try_get(0)?,
                is_good: row.try_get(1)?,
                comments: row.try_get(2)?,
                reference_answer: row.try_get(3)?,
                created_at: row.try_get(4)?,
            });
        }
        Ok(feedback)
    }

    fn delete_log(&mut self, id: i64) -> Result<bool, StoreError> {
        let deleted = self
            .client
            .execute("DELETE FROM llm_logs WHERE id = $1::BIGINT", &[&id])?;
        Ok(deleted > 0)
    }

    fn backdate(&mut self, log_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.client.transaction()?;
        let updated = tx.execute(
            "UPDATE llm_logs SET created_at = $1::TIMESTAMPTZ WHERE id = $2::BIGINT",
            &[&at, &log_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(log_id));
        }
        tx.execute(
            "UPDATE eval_checks SET created_at = $1::TIMESTAMPTZ WHERE log_id = $2::BIGINT",
            &[&at, &log_id],
        )?;
        tx.execute(
            "UPDATE feedback SET created_at = $1::TIMESTAMPTZ WHERE log_id = $2::BIGINT",
            &[&at, &log_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
