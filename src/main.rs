mod config;
mod evaluator;
mod feedback;
mod model;
mod parser;
mod pricing;
mod runner;
mod seed;
mod source;
mod store;

use clap::{ArgGroup, Parser, Subcommand};
use config::MonitorConfig;
use evaluator::RuleBasedEvaluator;
use model::LogFilter;
use pricing::PriceTable;
use runner::Runner;
use source::LocalDirectorySource;
use std::path::PathBuf;
use std::time::Duration;
use store::{LogStore, StoreError};

/// Watches a directory of LLM agent run logs: parses each run, prices its
/// token usage, scores it with heuristic checks and stores the result.
#[derive(Parser, Debug)]
#[command(name = "llm-monitor", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "monitor.toml")]
    config: PathBuf,

    /// Database connection string (overrides config and DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest pending log files
    Run {
        /// Keep polling for new files instead of draining once
        #[arg(long)]
        watch: bool,

        /// Debug logging
        #[arg(long)]
        debug: bool,
    },
    /// List stored records, newest first
    List {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Print one record with its checks and feedback as JSON
    Show { id: i64 },
    /// Attach a good/bad verdict to a record
    #[command(group(ArgGroup::new("verdict").required(true).args(["good", "bad"])))]
    Feedback {
        id: i64,
        #[arg(long)]
        good: bool,
        #[arg(long)]
        bad: bool,
        #[arg(long)]
        comments: Option<String>,
        /// Reference answer to compare against
        #[arg(long)]
        reference: Option<String>,
    },
    /// Delete a record with its checks and feedback
    Delete { id: i64 },
    /// Insert synthetic records for dashboards
    Seed {
        #[arg(long, default_value_t = 200)]
        count: usize,
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 0.5, value_parser = parse_probability)]
        feedback_rate: f64,
        #[arg(long, default_value_t = 0.65, value_parser = parse_probability)]
        good_ratio: f64,
        /// RNG seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = MonitorConfig::load(&cli.config).map(|mut cfg| {
        cfg.apply_env();
        if let Some(url) = &cli.database_url {
            cfg.store.database_url = url.clone();
        }
        if let Command::Run { debug: true, .. } = cli.command {
            cfg.runner.debug = true;
        }
        cfg
    });

    let debug = config.as_ref().map(|c| c.runner.debug).unwrap_or(false);
    let default_filter = if debug {
        "llm_monitor=debug"
    } else {
        "llm_monitor=info"
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::debug!(
        command = ?cli.command,
        source_dir = %config.source.dir.display(),
        "resolved settings"
    );

    if let Err(e) = execute(cli.command, &config) {
        tracing::error!(error = %e, "llm-monitor failed");
        std::process::exit(1);
    }
}

fn open_store(config: &MonitorConfig) -> Result<Box<dyn LogStore>, StoreError> {
    let mut store = store::open(&config.store.database_url)?;
    store.ensure_schema()?;
    tracing::info!(driver = store.driver_name(), "store ready");
    Ok(store)
}

fn execute(command: Command, config: &MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Run { watch, .. } => {
            let source = LocalDirectorySource::new(
                &config.source.dir,
                &config.source.glob,
                config.source.processed_prefix.as_str(),
            )?;
            let mut runner = Runner::new(
                source,
                open_store(config)?,
                Box::new(PriceTable::with_entries(&config.pricing.models)),
                Box::new(RuleBasedEvaluator),
            );
            if watch {
                let poll = Duration::from_secs(config.runner.poll_seconds);
                runner.run_watch(poll, |report| {
                    if report.processed > 0 {
                        println!("Processed {} file(s)", report.processed);
                    }
                    true
                });
            } else {
                let report = runner.run_once();
                println!("Processed {} file(s)", report.processed);
            }
        }
        Command::List {
            provider,
            model,
            limit,
            offset,
        } => {
            let mut store = open_store(config)?;
            let filter = LogFilter { provider, model };
            for log in store.list_logs(limit, offset, &filter)? {
                println!(
                    "{:>6}  {}  {:<10} {:<20} in={:<7} out={:<6} cost={:<10} {}",
                    log.id,
                    log.created_at.format("%Y-%m-%d %H:%M:%S"),
                    log.provider.as_deref().unwrap_or("-"),
                    log.model.as_deref().unwrap_or("-"),
                    opt(log.total_input_tokens),
                    opt(log.total_output_tokens),
                    opt(log.total_cost),
                    log.filepath,
                );
            }
        }
        Command::Show { id } => {
            let mut store = open_store(config)?;
            let log = store.get_log(id)?.ok_or(StoreError::NotFound(id))?;
            let view = serde_json::json!({
                "log": log,
                "checks": store.get_checks(id)?,
                "feedback": store.get_feedback(id)?,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Feedback {
            id,
            good,
            comments,
            reference,
            ..
        } => {
            let mut store = open_store(config)?;
            let feedback_id = feedback::save_feedback(
                store.as_mut(),
                id,
                good,
                comments.as_deref(),
                reference.as_deref(),
            )?;
            println!("Saved feedback {feedback_id} for log {id}");
        }
        Command::Delete { id } => {
            let mut store = open_store(config)?;
            if !store.delete_log(id)? {
                return Err(StoreError::NotFound(id).into());
            }
            println!("Deleted log {id}");
        }
        Command::Seed {
            count,
            hours,
            feedback_rate,
            good_ratio,
            seed,
        } => {
            let mut store = open_store(config)?;
            let opts = seed::SeedOptions {
                count,
                hours,
                feedback_rate,
                good_ratio,
                seed,
            };
            let report = seed::generate(store.as_mut(), &opts)?;
            println!(
                "Inserted {} synthetic log(s) with {} feedback entries over the last {hours} hours",
                report.logs, report.feedback
            );
        }
    }
    Ok(())
}

/// A finite probability in `[0, 1]`.
fn parse_probability(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{raw} is not a probability between 0 and 1"))
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
