//! Synthetic history for exercising dashboards: records spread over a time
//! window with priced usage, randomized check outcomes and optional feedback.

use crate::feedback::save_feedback;
use crate::model::{CheckKind, CheckResult, LogRecord, Outcome};
use crate::pricing::{PriceTable, Pricer};
use crate::store::{LogStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const COST_DP: u32 = 6;
const INSTRUCTIONS: &str =
    "You are a search assistant. Provide references and keep the answer clear.";
const WORDS: &[&str] = &[
    "monitor", "evaluate", "drift", "tokens", "cost", "pipeline", "dashboard", "check",
    "quality", "feedback", "reference", "citations", "search", "tool", "answer", "instructions",
];
const AGENTS: &[&str] = &["search", "answer", "support"];
const VERBS: &[&str] = &["monitor", "audit", "evaluate", "tune"];
const TOPICS: &[&str] = &["data drift", "LLM costs", "tool usage", "feedback"];
const COMMENTS: &[&str] = &[
    "Looks fine",
    "Missed references",
    "Great explanation",
    "Too verbose",
    "Off-topic",
];

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub count: usize,
    pub hours: u32,
    /// Probability that a record gets feedback.
    pub feedback_rate: f64,
    /// Among feedback, probability that it is positive.
    pub good_ratio: f64,
    /// Fixed RNG seed for reproducible output.
    pub seed: Option<u64>,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            count: 200,
            hours: 24,
            feedback_rate: 0.5,
            good_ratio: 0.65,
            seed: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub logs: usize,
    pub feedback: usize,
}

/// Clamp into `[0, 1]`; NaN and infinities count as zero.
fn probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `count` timestamps evenly spaced from `hours` ago up to `now`.
fn spread_times(now: DateTime<Utc>, count: usize, hours: u32) -> Vec<DateTime<Utc>> {
    if count <= 1 {
        return vec![now; count];
    }
    let span_ms = i64::from(hours) * 3_600_000;
    let start = now - Duration::milliseconds(span_ms);
    let steps = (count - 1) as i64;
    (0..count as i64)
        .map(|i| start + Duration::milliseconds(span_ms * i / steps))
        .collect()
}

fn rand_text(rng: &mut StdRng, words: usize) -> String {
    let mut text = (0..words)
        .filter_map(|_| WORDS.choose(&mut *rng).copied())
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(first) = text.get(..1).map(str::to_uppercase) {
        text.replace_range(..1, &first);
    }
    text.push('.');
    text
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

/// Seven checks in evaluation order. Smaller runs pass slightly more often.
fn random_checks(rng: &mut StdRng, input_tokens: u64) -> Vec<CheckResult> {
    let base = if input_tokens < 5000 { 0.6 } else { 0.4 };
    CheckKind::ALL
        .iter()
        .map(|&kind| {
            let pass_chance = match kind {
                CheckKind::InstructionsFollow | CheckKind::Completeness => base + 0.1,
                CheckKind::AnswerClear => base + 0.15,
                CheckKind::AnswerMatch => base + 0.05,
                CheckKind::ToolCallSearch => 0.8,
                CheckKind::InstructionsAvoid | CheckKind::AnswerCitations => base,
            };
            let score = (kind == CheckKind::AnswerMatch).then(|| rng.gen::<f64>());
            CheckResult {
                kind,
                outcome: Outcome::from_bool(rng.gen_bool(pass_chance)),
                score,
                details: None,
            }
        })
        .collect()
}

/// Insert `opts.count` synthetic records into `store`, backdated across the
/// last `opts.hours` hours. The schema must already exist.
pub fn generate(store: &mut dyn LogStore, opts: &SeedOptions) -> Result<SeedReport, StoreError> {
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let feedback_rate = probability(opts.feedback_rate);
    let good_ratio = probability(opts.good_ratio);

    let table = PriceTable::builtin();
    let models = table.models();
    let times = spread_times(Utc::now(), opts.count, opts.hours);
    let mut report = SeedReport::default();

    for (i, at) in times.into_iter().enumerate() {
        let Some((provider, model)) = models.choose(&mut rng).cloned() else {
            break;
        };
        let input_tokens: u64 = rng.gen_range(500..=22_000);
        let output_tokens: u64 = rng.gen_range(100..=4_000);
        let prompt = format!(
            "How do I {} {}?",
            pick(&mut rng, VERBS),
            pick(&mut rng, TOPICS)
        );
        let answer_words = rng.gen_range(40..=120);

        let mut record = LogRecord {
            filepath: format!("logs/fake_{i:04}.json"),
            agent_name: Some(pick(&mut rng, AGENTS).to_string()),
            provider: Some(provider.clone()),
            model: Some(model.clone()),
            user_prompt: Some(prompt),
            instructions: Some(INSTRUCTIONS.to_string()),
            total_input_tokens: Some(input_tokens),
            total_output_tokens: Some(output_tokens),
            assistant_answer: Some(rand_text(&mut rng, answer_words)),
            ..Default::default()
        };
        if let Ok(mut costs) = table.price(
            Some(&provider),
            Some(&model),
            Some(input_tokens),
            Some(output_tokens),
        ) {
            costs.input = costs.input.round_dp(COST_DP);
            costs.output = costs.output.round_dp(COST_DP);
            record = record.with_costs(costs);
        }

        let log_id = store.insert_log(&record)?;
        let checks = random_checks(&mut rng, input_tokens);
        store.insert_checks(log_id, &checks)?;

        if rng.gen_bool(feedback_rate) {
            let is_good = rng.gen_bool(good_ratio);
            let comment = pick(&mut rng, COMMENTS);
            save_feedback(store, log_id, is_good, Some(comment), None)?;
            report.feedback += 1;
        }

        store.backdate(log_id, at)?;
        report.logs += 1;
    }

    tracing::info!(
        logs = report.logs,
        feedback = report.feedback,
        hours = opts.hours,
        "seeded synthetic history"
    );
    Ok(report)
}
