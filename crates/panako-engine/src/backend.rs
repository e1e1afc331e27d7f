//! Capability interface for running the engine
//!
//! The core never talks to a process directly: it hands an [`EngineRequest`] to
//! an [`EngineBackend`] and gets text back. [`crate::ProcessBackend`] is the
//! real implementation; tests substitute scripted backends.

use crate::error::EngineError;
use crate::operation::EngineOp;
use std::path::PathBuf;
use std::time::Duration;

/// One engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub op: EngineOp,
    /// Rendered `KEY=VALUE` overrides
    pub overrides: Vec<String>,
    pub target: Option<PathBuf>,
}

impl EngineRequest {
    pub fn new(op: EngineOp) -> Self {
        Self {
            op,
            overrides: Vec::new(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Vec<String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Arguments following the engine launcher: op, overrides, target.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec![self.op.as_str().to_string()];
        args.extend(self.overrides.iter().cloned());
        if let Some(target) = &self.target {
            args.push(target.display().to_string());
        }
        args
    }
}

/// Captured output of a finished engine process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// Human readable exit status, e.g. `exit status: 1`
    pub status: String,
}

/// Result of polling a streaming invocation
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPoll {
    Line(String),
    /// Nothing arrived within the wait interval
    Idle,
    /// Output is exhausted
    Closed,
}

/// Incremental output of a long-running engine invocation
pub trait LineStream: Send {
    /// Wait up to `wait` for the next output line.
    fn poll_line(&mut self, wait: Duration) -> StreamPoll;

    /// Stop the underlying process. Safe to call more than once.
    fn terminate(&mut self) -> Result<(), EngineError>;

    /// Wait for the process to exit after the stream closed; `stdout` is empty.
    fn finish(&mut self) -> Result<RawOutput, EngineError>;
}

pub trait EngineBackend {
    /// Run a blocking invocation to completion, killing it after `timeout`.
    fn execute(
        &self,
        request: &EngineRequest,
        timeout: Option<Duration>,
    ) -> Result<RawOutput, EngineError>;

    /// Start a streaming invocation.
    fn stream(&self, request: &EngineRequest) -> Result<Box<dyn LineStream>, EngineError>;
}

impl<B: EngineBackend + ?Sized> EngineBackend for &B {
    fn execute(
        &self,
        request: &EngineRequest,
        timeout: Option<Duration>,
    ) -> Result<RawOutput, EngineError> {
        (**self).execute(request, timeout)
    }

    fn stream(&self, request: &EngineRequest) -> Result<Box<dyn LineStream>, EngineError> {
        (**self).stream(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_arguments_order() {
        let request = EngineRequest::new(EngineOp::Query)
            .with_overrides(vec!["OLAF_MIN_HITS_FILTERED=3".to_string()])
            .with_target("/tmp/seg_0001.wav");
        assert_eq!(
            request.arguments(),
            vec!["query", "OLAF_MIN_HITS_FILTERED=3", "/tmp/seg_0001.wav"]
        );
    }
}
