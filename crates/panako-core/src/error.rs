//! Error types for the orchestration layer

use panako_engine::{EngineError, FailureReason};
use panako_manifest::ManifestError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid parameters or paths; nothing has been sent to the engine yet.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "{} is too short to fingerprint ({duration:.1}s, need at least {minimum:.0}s)",
        .path.display()
    )]
    TooShort {
        path: PathBuf,
        duration: f64,
        minimum: f64,
    },

    #[error("cannot read audio from {}: {message}", .path.display())]
    Media { path: PathBuf, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }

    pub fn media(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        CoreError::Media {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that must stop a whole batch rather than just the current item:
    /// bad configuration, or an engine that cannot be started at all.
    pub fn is_fatal_for_batch(&self) -> bool {
        match self {
            CoreError::Configuration(_) => true,
            CoreError::Engine(e) => e.reason() == FailureReason::Unavailable,
            _ => false,
        }
    }

    /// Process exit status for a command that failed with this error:
    /// 2 for configuration, 3 for a missing engine or runtime, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Configuration(_) => 2,
            CoreError::Engine(e) if e.reason() == FailureReason::Unavailable => 3,
            _ => 1,
        }
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
