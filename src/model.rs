/// Normalized record shapes shared by the parser, evaluator, store and runner.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One ingested agent run, as produced by the parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub filepath: String,
    pub agent_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub user_prompt: Option<String>,
    pub instructions: Option<String>,
    /// `None` means usage was not reported, which is not the same as zero.
    pub total_input_tokens: Option<u64>,
    pub total_output_tokens: Option<u64>,
    pub assistant_answer: Option<String>,
    /// The document exactly as read from disk.
    pub raw_json: Option<String>,
    pub input_cost: Option<Decimal>,
    pub output_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
}

impl LogRecord {
    /// Attach costs. The total is always recomputed from its parts.
    pub fn with_costs(mut self, costs: Costs) -> Self {
        self.input_cost = Some(costs.input);
        self.output_cost = Some(costs.output);
        self.total_cost = Some(costs.total());
        self
    }

    /// The total cost to persist: the sum of both parts when both are known,
    /// otherwise whatever total was attached.
    pub fn effective_total_cost(&self) -> Option<Decimal> {
        match (self.input_cost, self.output_cost) {
            (Some(i), Some(o)) => Some(i + o),
            _ => self.total_cost,
        }
    }
}

/// Input/output cost pair computed by a pricer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Costs {
    pub input: Decimal,
    pub output: Decimal,
}

impl Costs {
    pub fn total(&self) -> Decimal {
        self.input + self.output
    }
}

/// The fixed set of heuristic checks, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    InstructionsFollow,
    InstructionsAvoid,
    AnswerClear,
    AnswerMatch,
    AnswerCitations,
    Completeness,
    ToolCallSearch,
}

impl CheckKind {
    pub const ALL: [CheckKind; 7] = [
        CheckKind::InstructionsFollow,
        CheckKind::InstructionsAvoid,
        CheckKind::AnswerClear,
        CheckKind::AnswerMatch,
        CheckKind::AnswerCitations,
        CheckKind::Completeness,
        CheckKind::ToolCallSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::InstructionsFollow => "instructions_follow",
            CheckKind::InstructionsAvoid => "instructions_avoid",
            CheckKind::AnswerClear => "answer_clear",
            CheckKind::AnswerMatch => "answer_match",
            CheckKind::AnswerCitations => "answer_citations",
            CheckKind::Completeness => "completeness",
            CheckKind::ToolCallSearch => "tool_call_search",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown check name: {s}"))
    }
}

/// Tri-state verdict. `NotApplicable` is distinct from `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    NotApplicable,
}

impl Outcome {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    /// Storage representation: a nullable boolean.
    pub fn as_passed(&self) -> Option<bool> {
        match self {
            Outcome::Pass => Some(true),
            Outcome::Fail => Some(false),
            Outcome::NotApplicable => None,
        }
    }

    pub fn from_passed(passed: Option<bool>) -> Self {
        match passed {
            Some(true) => Outcome::Pass,
            Some(false) => Outcome::Fail,
            None => Outcome::NotApplicable,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => f.write_str("pass"),
            Outcome::Fail => f.write_str("fail"),
            Outcome::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// One evaluator verdict, not yet bound to a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub outcome: Outcome,
    /// In `[0, 1]` when present.
    pub score: Option<f64>,
    pub details: Option<String>,
}

/// A human judgment on a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub log_id: i64,
    pub is_good: bool,
    pub comments: Option<String>,
    pub reference_answer: Option<String>,
}

/// Row returned by paged listing.
#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub filepath: String,
    pub agent_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub user_prompt: Option<String>,
    pub total_input_tokens: Option<u64>,
    pub total_output_tokens: Option<u64>,
    pub total_cost: Option<Decimal>,
}

/// Full stored record.
#[derive(Debug, Clone, Serialize)]
pub struct StoredLog {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub filepath: String,
    pub agent_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub user_prompt: Option<String>,
    pub instructions: Option<String>,
    pub total_input_tokens: Option<u64>,
    pub total_output_tokens: Option<u64>,
    pub assistant_answer: Option<String>,
    pub input_cost: Option<Decimal>,
    pub output_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredCheck {
    pub kind: CheckKind,
    pub outcome: Outcome,
    pub score: Option<f64>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFeedback {
    pub id: i64,
    pub is_good: bool,
    pub comments: Option<String>,
    pub reference_answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional equality filters for `list_logs`.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl LogFilter {
    /// Provider to match. Blank values mean no filter.
    pub fn provider(&self) -> Option<&str> {
        non_blank(self.provider.as_deref())
    }

    /// Model to match. Blank values mean no filter.
    pub fn model(&self) -> Option<&str> {
        non_blank(self.model.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
