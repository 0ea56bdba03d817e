/// Ingestion pipeline: drain pending files from the source through the
/// parser, pricer and evaluator into the store, then mark each one processed.
///
/// A file is marked only after its record and checks are stored, so any
/// failure before that point leaves it pending for the next drain.
use crate::evaluator::Evaluator;
use crate::parser::{self, ParseError};
use crate::pricing::Pricer;
use crate::source::{LocalDirectorySource, SourceError};
use crate::store::{LogStore, StoreError};
use std::path::Path;
use std::time::Duration;

/// Outcome counts for one drain of the pending list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Files stored and marked processed.
    pub processed: usize,
    pub failed: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.processed += other.processed;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
pub enum IngestError {
    Parse(ParseError),
    Store(StoreError),
    /// The record was stored but the file could not be renamed. It will be
    /// ingested again on the next drain.
    Mark { log_id: i64, source: SourceError },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Parse(e) => write!(f, "parse failed: {e}"),
            IngestError::Store(e) => write!(f, "store failed: {e}"),
            IngestError::Mark { log_id, source } => {
                write!(f, "stored as log {log_id} but not marked processed: {source}")
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Parse(e) => Some(e),
            IngestError::Store(e) => Some(e),
            IngestError::Mark { source, .. } => Some(source),
        }
    }
}

impl From<ParseError> for IngestError {
    fn from(e: ParseError) -> Self {
        IngestError::Parse(e)
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        IngestError::Store(e)
    }
}

/// Owns the store connection and the pipeline stages for its lifetime.
pub struct Runner {
    source: LocalDirectorySource,
    store: Box<dyn LogStore>,
    pricer: Box<dyn Pricer>,
    evaluator: Box<dyn Evaluator>,
}

impl Runner {
    pub fn new(
        source: LocalDirectorySource,
        store: Box<dyn LogStore>,
        pricer: Box<dyn Pricer>,
        evaluator: Box<dyn Evaluator>,
    ) -> Self {
        Self {
            source,
            store,
            pricer,
            evaluator,
        }
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut dyn LogStore {
        self.store.as_mut()
    }

    /// Ingest one file end to end and return the new record id.
    pub fn process_file(&mut self, path: &Path) -> Result<i64, IngestError> {
        let mut record = parser::parse_log_file(path)?;

        match self.pricer.price(
            record.provider.as_deref(),
            record.model.as_deref(),
            record.total_input_tokens,
            record.total_output_tokens,
        ) {
            Ok(costs) => record = record.with_costs(costs),
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "costs left empty");
            }
        }

        let log_id = self.store.insert_log(&record)?;
        let checks = self.evaluator.evaluate(&record);
        self.store.insert_checks(log_id, &checks)?;

        self.source
            .mark_processed(path)
            .map_err(|source| IngestError::Mark { log_id, source })?;

        Ok(log_id)
    }

    /// Drain the current pending list once. Per-file failures are logged and
    /// counted; they never abort the drain.
    pub fn run_once(&mut self) -> DrainReport {
        let pending = match self.source.list_pending() {
            Ok(pending) => pending,
            Err(SourceError::Missing { dir }) => {
                tracing::warn!(dir = %dir.display(), "log directory does not exist");
                return DrainReport::default();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to list pending files");
                return DrainReport::default();
            }
        };

        let mut report = DrainReport::default();
        for path in pending {
            match self.process_file(&path) {
                Ok(log_id) => {
                    report.processed += 1;
                    tracing::info!(file = %path.display(), log_id, "ingested");
                }
                Err(e @ IngestError::Mark { .. }) => {
                    report.failed += 1;
                    tracing::warn!(file = %path.display(), error = %e, "ingested but not marked");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(file = %path.display(), error = %e, "failed to ingest");
                }
            }
        }
        report
    }

    /// Drain repeatedly, sleeping `poll` after any drain that processed
    /// nothing. Stops when `keep_going` returns false and returns the totals.
    pub fn run_watch(
        &mut self,
        poll: Duration,
        mut keep_going: impl FnMut(&DrainReport) -> bool,
    ) -> DrainReport {
        tracing::info!(dir = %self.source.dir().display(), poll_secs = poll.as_secs(), "watching");
        let mut total = DrainReport::default();
        loop {
            let report = self.run_once();
            total.absorb(report);
            if !keep_going(&report) {
                return total;
            }
            if report.processed == 0 {
                std::thread::sleep(poll);
            }
        }
    }
}
