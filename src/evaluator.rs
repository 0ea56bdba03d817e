/// Rule-based quality checks over a normalized record.
///
/// Each check yields pass, fail, or not-applicable with a short evidence
/// string. The evaluator reads only the record; it performs no I/O.
use crate::model::{CheckKind, CheckResult, LogRecord, Outcome};
use crate::parser;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

const MIN_CLEAR_TOKENS: usize = 40;
const MAX_AVG_SENTENCE_LEN: f64 = 35.0;
const MIN_JACCARD: f64 = 0.08;
const MIN_COMPLETE_TOKENS: usize = 120;
const SEARCH_BOUNDS: (usize, usize) = (3, 6);
const SEARCH_TOOL: &str = "search";

/// Produces one result per check kind for a record.
pub trait Evaluator {
    fn evaluate(&self, record: &LogRecord) -> Vec<CheckResult>;
}

/// The heuristic evaluator. Always returns exactly seven results in
/// `CheckKind::ALL` order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedEvaluator;

impl Evaluator for RuleBasedEvaluator {
    fn evaluate(&self, record: &LogRecord) -> Vec<CheckResult> {
        let prompt = record.user_prompt.as_deref().unwrap_or("");
        let answer = record.assistant_answer.as_deref().unwrap_or("");
        let instructions = record.instructions.as_deref().unwrap_or("");
        let search_calls = count_search_calls(record.raw_json.as_deref());
        let answer_tokens = tokenize(answer);

        vec![
            instructions_follow(instructions, answer),
            instructions_avoid(instructions, search_calls),
            answer_clear(answer, &answer_tokens),
            answer_match(prompt, answer, &answer_tokens),
            answer_citations(answer),
            completeness(answer, &answer_tokens),
            tool_call_search(search_calls),
        ]
    }
}

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9_]+").unwrap());

static SENTENCE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// A bulleted (`-`, `*`) or numbered (`1.`) list item at the start of a line.
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\n)\s*(?:[-*]|\d+\.)\s+").unwrap());

/// Case-folded runs of ASCII alphanumerics and underscores.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn sentence_count(text: &str) -> usize {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        0
    } else {
        SENTENCE_BREAK_RE.split(trimmed).count()
    }
}

fn has_url(text: &str) -> bool {
    text.contains("http://") || text.contains("https://")
}

fn mentions_references(text: &str) -> bool {
    text.to_lowercase().contains("references")
}

/// Number of message parts whose `tool_name` is the search tool. Missing or
/// malformed JSON counts as zero.
pub fn count_search_calls(raw_json: Option<&str>) -> usize {
    let Some(doc) = raw_json.and_then(|raw| serde_json::from_str::<Value>(raw).ok()) else {
        return 0;
    };
    parser::messages(&doc)
        .iter()
        .flat_map(parser::parts)
        .filter(|part| part.get("tool_name").and_then(Value::as_str) == Some(SEARCH_TOOL))
        .count()
}

fn result(kind: CheckKind, outcome: Outcome, details: String) -> CheckResult {
    CheckResult {
        kind,
        outcome,
        score: None,
        details: Some(details),
    }
}

fn instructions_follow(instructions: &str, answer: &str) -> CheckResult {
    if !mentions_references(instructions) {
        return result(
            CheckKind::InstructionsFollow,
            Outcome::NotApplicable,
            "No explicit reference requirement detected.".to_string(),
        );
    }
    let has_refs = mentions_references(answer) || has_url(answer);
    let details = if has_refs {
        "Instructions mention references; answer contains references."
    } else {
        "Instructions mention references; answer missing references."
    };
    result(
        CheckKind::InstructionsFollow,
        Outcome::from_bool(has_refs),
        details.to_string(),
    )
}

fn instructions_avoid(instructions: &str, search_calls: usize) -> CheckResult {
    let lowered = instructions.to_lowercase();
    if !(lowered.contains("at most 6") && lowered.contains("at least 3")) {
        return result(
            CheckKind::InstructionsAvoid,
            Outcome::NotApplicable,
            "No explicit search bounds requirement detected.".to_string(),
        );
    }
    let (lo, hi) = SEARCH_BOUNDS;
    result(
        CheckKind::InstructionsAvoid,
        Outcome::from_bool((lo..=hi).contains(&search_calls)),
        format!("search_calls={search_calls} within [{lo},{hi}]"),
    )
}

fn answer_clear(answer: &str, tokens: &[String]) -> CheckResult {
    let sentences = sentence_count(answer);
    let avg = if sentences == 0 {
        0.0
    } else {
        tokens.len() as f64 / sentences as f64
    };
    let details = format!(
        "words={}, sentences={sentences}, avg_sentence_len={avg:.1}",
        tokens.len()
    );
    if answer.is_empty() {
        return result(CheckKind::AnswerClear, Outcome::NotApplicable, details);
    }
    let passed = tokens.len() >= MIN_CLEAR_TOKENS && avg <= MAX_AVG_SENTENCE_LEN;
    result(CheckKind::AnswerClear, Outcome::from_bool(passed), details)
}

fn answer_match(prompt: &str, answer: &str, answer_tokens: &[String]) -> CheckResult {
    if prompt.is_empty() || answer.is_empty() {
        return result(
            CheckKind::AnswerMatch,
            Outcome::NotApplicable,
            "Prompt or answer missing.".to_string(),
        );
    }
    let prompt_set: HashSet<String> = tokenize(prompt).into_iter().collect();
    let answer_set: HashSet<&String> = answer_tokens.iter().collect();
    let overlap = prompt_set.iter().filter(|t| answer_set.contains(t)).count();
    let union = prompt_set.len() + answer_set.len() - overlap;
    let jaccard = overlap as f64 / union.max(1) as f64;

    CheckResult {
        kind: CheckKind::AnswerMatch,
        outcome: Outcome::from_bool(jaccard >= MIN_JACCARD),
        score: Some(jaccard),
        details: Some(format!("token_overlap={overlap}, jaccard={jaccard:.3}")),
    }
}

fn answer_citations(answer: &str) -> CheckResult {
    if answer.is_empty() {
        return result(
            CheckKind::AnswerCitations,
            Outcome::NotApplicable,
            "No answer text".to_string(),
        );
    }
    let passed = has_url(answer) || mentions_references(answer);
    result(
        CheckKind::AnswerCitations,
        Outcome::from_bool(passed),
        "Contains URLs or a references section".to_string(),
    )
}

fn completeness(answer: &str, tokens: &[String]) -> CheckResult {
    let has_list = LIST_ITEM_RE.is_match(answer);
    let details = format!("len(words)={}, bullets={has_list}", tokens.len());
    if answer.is_empty() {
        return result(CheckKind::Completeness, Outcome::NotApplicable, details);
    }
    let passed = tokens.len() >= MIN_COMPLETE_TOKENS || has_list;
    result(CheckKind::Completeness, Outcome::from_bool(passed), details)
}

fn tool_call_search(search_calls: usize) -> CheckResult {
    result(
        CheckKind::ToolCallSearch,
        Outcome::from_bool(search_calls > 0),
        format!("search_calls={search_calls}"),
    )
}
