/// Directory log source: lists unprocessed files and marks them processed by
/// renaming with a filename prefix.
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Upper bound on marker repetitions tried before giving up on a rename.
const MAX_MARK_ATTEMPTS: usize = 64;

#[derive(Debug)]
pub enum SourceError {
    /// The watched directory does not exist.
    Missing { dir: PathBuf },
    /// The watched directory could not be listed.
    ReadDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    /// The configured glob is not a valid pattern.
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    /// Renaming a file to its processed name failed.
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    /// Every candidate processed name was already taken.
    Exhausted { path: PathBuf },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Missing { dir } => {
                write!(f, "log directory {} does not exist", dir.display())
            }
            SourceError::ReadDir { dir, source } => {
                write!(f, "failed to read log directory {}: {source}", dir.display())
            }
            SourceError::Pattern { pattern, source } => {
                write!(f, "invalid file pattern {pattern:?}: {source}")
            }
            SourceError::Rename { from, to, source } => write!(
                f,
                "failed to rename {} to {}: {source}",
                from.display(),
                to.display()
            ),
            SourceError::Exhausted { path } => write!(
                f,
                "no free processed name for {} after {MAX_MARK_ATTEMPTS} attempts",
                path.display()
            ),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::ReadDir { source, .. } => Some(source),
            SourceError::Pattern { source, .. } => Some(source),
            SourceError::Rename { source, .. } => Some(source),
            SourceError::Missing { .. } | SourceError::Exhausted { .. } => None,
        }
    }
}

/// A watched local directory.
#[derive(Debug, Clone)]
pub struct LocalDirectorySource {
    dir: PathBuf,
    pattern: Pattern,
    processed_prefix: String,
}

impl LocalDirectorySource {
    pub fn new(
        dir: impl Into<PathBuf>,
        pattern: &str,
        processed_prefix: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let compiled = Pattern::new(pattern).map_err(|e| SourceError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            dir: dir.into(),
            pattern: compiled,
            processed_prefix: processed_prefix.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files matching the pattern that do not carry the processed prefix,
    /// sorted by path.
    pub fn list_pending(&self) -> Result<Vec<PathBuf>, SourceError> {
        if !self.dir.exists() {
            return Err(SourceError::Missing {
                dir: self.dir.clone(),
            });
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| SourceError::ReadDir {
            dir: self.dir.clone(),
            source: e,
        })?;

        let mut pending = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.processed_prefix.is_empty() && name.starts_with(&self.processed_prefix) {
                continue;
            }
            if self.pattern.matches(name) {
                pending.push(path);
            }
        }

        pending.sort();
        Ok(pending)
    }

    /// Rename `path` to its processed name, prepending the marker again
    /// until an unused name is found. Returns the new path.
    pub fn mark_processed(&self, path: &Path) -> Result<PathBuf, SourceError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut candidate_name = format!("{}{}", self.processed_prefix, name);
        for _ in 0..MAX_MARK_ATTEMPTS {
            let target = path.with_file_name(&candidate_name);
            if !target.exists() {
                std::fs::rename(path, &target).map_err(|e| SourceError::Rename {
                    from: path.to_path_buf(),
                    to: target.clone(),
                    source: e,
                })?;
                tracing::debug!(
                    from = %path.display(),
                    to = %target.display(),
                    "marked file processed"
                );
                return Ok(target);
            }
            candidate_name = format!("{}{}", self.processed_prefix, candidate_name);
        }

        Err(SourceError::Exhausted {
            path: path.to_path_buf(),
        })
    }
}
