//! Engine and output-line errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`EngineError`], used in summaries and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The engine (or java) could not be started at all.
    Unavailable,
    /// The engine ran and exited unsuccessfully without usable output.
    ProcessFailure,
    /// The engine did not finish within the configured bound.
    Timeout,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Unavailable => "unavailable",
            FailureReason::ProcessFailure => "process_failure",
            FailureReason::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "Panako jar not found in {}; build it with `./gradlew shadowJar` or point PANAKO_DIR at your checkout",
        .dir.display()
    )]
    JarNotFound { dir: PathBuf },

    #[error("engine `{op}` failed ({status}){}", stderr_suffix(.stderr))]
    ProcessFailure {
        op: String,
        status: String,
        stderr: String,
    },

    #[error("engine `{op}` did not finish within {seconds}s and was terminated")]
    Timeout { op: String, seconds: u64 },

    #[error("engine i/o error: {0}")]
    Io(#[from] io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        // The last line is usually the exception message; earlier lines are the stack.
        let last = trimmed.lines().last().unwrap_or(trimmed);
        format!(": {}", last.trim())
    }
}

impl EngineError {
    pub fn reason(&self) -> FailureReason {
        match self {
            EngineError::Spawn { .. } | EngineError::JarNotFound { .. } => {
                FailureReason::Unavailable
            }
            EngineError::Timeout { .. } => FailureReason::Timeout,
            EngineError::ProcessFailure { .. } | EngineError::Io(_) => {
                FailureReason::ProcessFailure
            }
        }
    }
}

/// Why a single engine output line could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field `{field}` is not a number: {value:?}")]
    Number { field: &'static str, value: String },

    #[error("{field} range is empty or reversed: {start} .. {end}")]
    Range {
        field: &'static str,
        start: f64,
        end: f64,
    },

    #[error("{field} must be positive, got {value}")]
    Factor { field: &'static str, value: f64 },
}
