/// Agent-run trace parsing: turn one loosely structured JSON document into a
/// normalized `LogRecord`.
///
/// Every field is extracted independently by a chain of lookups over the
/// untyped document. The first lookup that yields a value wins; when none
/// do, the field is left empty. Missing fields never fail a parse.
use crate::model::LogRecord;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ParseError {
    /// The file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The contents are not valid JSON.
    Json { source: serde_json::Error },
    /// Valid JSON, but the top level is not an object.
    NotAnObject,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            ParseError::Json { source } => write!(f, "invalid JSON: {source}"),
            ParseError::NotAnObject => write!(f, "top-level JSON value is not an object"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io { source, .. } => Some(source),
            ParseError::Json { source } => Some(source),
            ParseError::NotAnObject => None,
        }
    }
}

type Lookup = fn(&Value) -> Option<String>;

/// Read and parse a log file.
pub fn parse_log_file(path: &Path) -> Result<LogRecord, ParseError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_log_str(&path.to_string_lossy(), &raw)
}

/// Parse raw JSON text. `filepath` is recorded as-is.
pub fn parse_log_str(filepath: &str, raw: &str) -> Result<LogRecord, ParseError> {
    let doc: Value = serde_json::from_str(raw).map_err(|e| ParseError::Json { source: e })?;
    if !doc.is_object() {
        return Err(ParseError::NotAnObject);
    }

    let (total_input_tokens, total_output_tokens) = usage(&doc);

    Ok(LogRecord {
        filepath: filepath.to_string(),
        agent_name: scalar_string(doc.get("agent_name")),
        provider: first_match(&doc, &[provider_field, provider_name_field]),
        model: first_match(&doc, &[model_field, last_message_model_name]),
        user_prompt: first_match(&doc, &[tagged_user_prompt, any_string_part]),
        instructions: first_match(
            &doc,
            &[first_message_instructions, system_prompt_list, system_prompt_string],
        ),
        total_input_tokens,
        total_output_tokens,
        assistant_answer: first_match(&doc, &[structured_output, last_message_text]),
        raw_json: Some(raw.to_string()),
        input_cost: None,
        output_cost: None,
        total_cost: None,
    })
}

fn first_match(doc: &Value, lookups: &[Lookup]) -> Option<String> {
    lookups.iter().find_map(|lookup| lookup(doc))
}

/// Message list, or empty when absent or not an array.
pub(crate) fn messages(doc: &Value) -> &[Value] {
    doc.get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn parts(message: &Value) -> &[Value] {
    message
        .get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Strings as-is, numbers and booleans stringified, anything else absent.
/// Empty strings count as absent.
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// --- provider ---

fn provider_field(doc: &Value) -> Option<String> {
    scalar_string(doc.get("provider"))
}

fn provider_name_field(doc: &Value) -> Option<String> {
    scalar_string(doc.get("provider_name"))
}

// --- model ---

fn model_field(doc: &Value) -> Option<String> {
    scalar_string(doc.get("model"))
}

fn last_message_model_name(doc: &Value) -> Option<String> {
    messages(doc)
        .iter()
        .rev()
        .find_map(|msg| scalar_string(msg.get("model_name")))
}

// --- user prompt ---

fn tagged_user_prompt(doc: &Value) -> Option<String> {
    messages(doc).iter().flat_map(parts).find_map(|part| {
        if part.get("part_kind").and_then(Value::as_str) == Some("user-prompt") {
            scalar_string(part.get("content"))
        } else {
            None
        }
    })
}

fn any_string_part(doc: &Value) -> Option<String> {
    messages(doc)
        .iter()
        .flat_map(parts)
        .find_map(|part| part.get("content").and_then(Value::as_str).map(str::to_string))
}

// --- instructions ---

fn first_message_instructions(doc: &Value) -> Option<String> {
    messages(doc)
        .first()
        .and_then(|msg| scalar_string(msg.get("instructions")))
}

fn system_prompt_list(doc: &Value) -> Option<String> {
    let list = doc.get("system_prompt")?.as_array()?;
    let lines: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
    Some(lines.join("\n"))
}

fn system_prompt_string(doc: &Value) -> Option<String> {
    doc.get("system_prompt")
        .and_then(Value::as_str)
        .map(str::to_string)
}

// --- answer ---

/// `output.title` then each section's `heading` and `content`, blank-line
/// joined in document order.
fn structured_output(doc: &Value) -> Option<String> {
    let output = doc.get("output")?.as_object()?;
    let mut chunks: Vec<&str> = Vec::new();

    if let Some(title) = output.get("title").and_then(Value::as_str) {
        chunks.push(title);
    }
    if let Some(sections) = output.get("sections").and_then(Value::as_array) {
        for section in sections {
            if let Some(heading) = section.get("heading").and_then(Value::as_str) {
                chunks.push(heading);
            }
            if let Some(content) = section.get("content").and_then(Value::as_str) {
                chunks.push(content);
            }
        }
    }

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n\n"))
    }
}

/// Last message's last string-valued content part.
fn last_message_text(doc: &Value) -> Option<String> {
    messages(doc).iter().rev().find_map(|msg| {
        parts(msg)
            .iter()
            .rev()
            .find_map(|part| non_empty_str(part.get("content")))
    })
}

// --- usage ---

fn usage(doc: &Value) -> (Option<u64>, Option<u64>) {
    let Some(usage) = doc.get("usage").filter(|u| u.is_object()) else {
        return (None, None);
    };
    (
        usage.get("input_tokens").and_then(Value::as_u64),
        usage.get("output_tokens").and_then(Value::as_u64),
    )
}
