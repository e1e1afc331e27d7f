//! Engine invoker
//!
//! Turns engine output into [`MatchRecord`]s with a lenient policy: a malformed
//! line costs a warning, never the rest of the output.

use crate::backend::{EngineBackend, EngineRequest, LineStream, RawOutput};
use crate::error::EngineError;
use crate::operation::{EngineOp, EngineOptions};
use crate::record::{parse_line, LineKind, MatchRecord};
use std::path::Path;
use std::time::Duration;

/// Engine setting the `threshold` option is mapped to by default
pub const DEFAULT_THRESHOLD_KEY: &str = "OLAF_MIN_HITS_FILTERED";

/// Records recovered from a block of engine output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<MatchRecord>,
    /// Candidate data lines that could not be parsed
    pub malformed: usize,
    /// Self matches that were dropped
    pub self_matches: usize,
}

/// Parse every line of `stdout`, skipping malformed lines with a warning.
pub fn parse_output(stdout: &str) -> RecordBatch {
    let mut batch = RecordBatch::default();
    for (line_no, line) in stdout.lines().enumerate() {
        match parse_line(line) {
            Ok(LineKind::Record(record)) => {
                if record.is_self_match() {
                    log::trace!("Dropping self match {}", record.matched_path);
                    batch.self_matches += 1;
                } else {
                    batch.records.push(record);
                }
            }
            Ok(LineKind::NoMatch) => log::trace!("Line {}: no match", line_no + 1),
            Ok(LineKind::Informational) => {}
            Err(e) => {
                log::warn!("Skipping engine output line {}: {} ({:?})", line_no + 1, e, line);
                batch.malformed += 1;
            }
        }
    }
    batch
}

/// Issues engine invocations through a backend
pub struct EngineInvoker<B> {
    backend: B,
    timeout: Option<Duration>,
    threshold_key: String,
}

impl<B: EngineBackend> EngineInvoker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            timeout: None,
            threshold_key: DEFAULT_THRESHOLD_KEY.to_string(),
        }
    }

    /// Bound for blocking operations; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_threshold_key(mut self, key: impl Into<String>) -> Self {
        self.threshold_key = key.into();
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn timeout_for(&self, op: EngineOp) -> Option<Duration> {
        if op.is_blocking() {
            self.timeout
        } else {
            None
        }
    }

    fn request(&self, op: EngineOp, target: Option<&Path>, options: &EngineOptions) -> EngineRequest {
        let request = EngineRequest::new(op).with_overrides(options.render(&self.threshold_key));
        match target {
            Some(path) => request.with_target(path),
            None => request,
        }
    }

    /// Run `op` on one file and return the match records it printed.
    ///
    /// A non-zero exit is an error only when no record could be recovered.
    pub fn invoke(
        &self,
        op: EngineOp,
        file_path: &Path,
        options: &EngineOptions,
    ) -> Result<Vec<MatchRecord>, EngineError> {
        let request = self.request(op, Some(file_path), options);
        let output = self.backend.execute(&request, self.timeout_for(op))?;
        let batch = parse_output(&output.stdout);

        if !output.success {
            if batch.records.is_empty() {
                return Err(failure(op, &output));
            }
            log::warn!(
                "Engine `{}` on {} exited with {} after {} record(s); keeping partial output",
                op,
                file_path.display(),
                output.status,
                batch.records.len()
            );
        }

        log::debug!(
            "Engine `{}` on {}: {} record(s), {} malformed line(s), {} self match(es) dropped",
            op,
            file_path.display(),
            batch.records.len(),
            batch.malformed,
            batch.self_matches
        );
        Ok(batch.records)
    }

    /// Run an operation whose output is not match records (stats, clear, delete).
    pub fn run(
        &self,
        op: EngineOp,
        target: Option<&Path>,
        options: &EngineOptions,
    ) -> Result<RawOutput, EngineError> {
        let request = self.request(op, target, options);
        let output = self.backend.execute(&request, self.timeout_for(op))?;
        if output.success {
            Ok(output)
        } else {
            Err(failure(op, &output))
        }
    }

    /// Start a streaming invocation on one file.
    pub fn open_stream(
        &self,
        op: EngineOp,
        file_path: &Path,
        options: &EngineOptions,
    ) -> Result<Box<dyn LineStream>, EngineError> {
        let request = self.request(op, Some(file_path), options);
        self.backend.stream(&request)
    }
}

fn failure(op: EngineOp, output: &RawOutput) -> EngineError {
    EngineError::ProcessFailure {
        op: op.to_string(),
        status: output.status.clone(),
        stderr: output.stderr.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StreamPoll;
    use std::cell::RefCell;

    struct Canned {
        output: RawOutput,
        seen: RefCell<Vec<EngineRequest>>,
        timeouts: RefCell<Vec<Option<Duration>>>,
    }

    impl Canned {
        fn new(stdout: &str, success: bool) -> Self {
            Self {
                output: RawOutput {
                    stdout: stdout.to_string(),
                    stderr: "boom".to_string(),
                    success,
                    status: if success { "exit status: 0" } else { "exit status: 1" }.to_string(),
                },
                seen: RefCell::new(Vec::new()),
                timeouts: RefCell::new(Vec::new()),
            }
        }
    }

    impl EngineBackend for Canned {
        fn execute(
            &self,
            request: &EngineRequest,
            timeout: Option<Duration>,
        ) -> Result<RawOutput, EngineError> {
            self.seen.borrow_mut().push(request.clone());
            self.timeouts.borrow_mut().push(timeout);
            Ok(self.output.clone())
        }

        fn stream(&self, _request: &EngineRequest) -> Result<Box<dyn LineStream>, EngineError> {
            struct Empty;
            impl LineStream for Empty {
                fn poll_line(&mut self, _wait: Duration) -> StreamPoll {
                    StreamPoll::Closed
                }
                fn terminate(&mut self) -> Result<(), EngineError> {
                    Ok(())
                }
                fn finish(&mut self) -> Result<RawOutput, EngineError> {
                    Ok(RawOutput::default())
                }
            }
            Ok(Box::new(Empty))
        }
    }

    const OUTPUT: &str = "Panako 2.1\n\
        0;2;/q.wav;0.5;9.5;/db/a.wav;11;30.0;39.0;40;100;100;0.9\n\
        1;2;/q.wav;0.5;9.5;/db/b.wav;12;1.0\n\
        2;2;/q.wav;1.0;8.0;/q.wav;13;1.0;8.0;99;100;100;1.0\n";

    #[test]
    fn test_parse_output_skips_malformed_and_self_matches() {
        let batch = parse_output(OUTPUT);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].matched_path, "/db/a.wav");
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.self_matches, 1);
    }

    #[test]
    fn test_timeout_applies_to_blocking_operations_only() {
        let invoker = EngineInvoker::new(Canned::new("", true))
            .with_timeout(Some(Duration::from_secs(30)));
        let options = EngineOptions::default();
        invoker.invoke(EngineOp::Query, Path::new("/q.wav"), &options).unwrap();
        invoker.invoke(EngineOp::Monitor, Path::new("/q.wav"), &options).unwrap();
        invoker.run(EngineOp::Stats, None, &options).unwrap();

        let timeouts = invoker.backend().timeouts.borrow();
        assert_eq!(
            *timeouts,
            vec![Some(Duration::from_secs(30)), None, Some(Duration::from_secs(30))]
        );
    }

    #[test]
    fn test_invoke_passes_threshold_and_target() {
        let invoker = EngineInvoker::new(Canned::new(OUTPUT, true)).with_threshold_key("MIN_HITS");
        let options = EngineOptions::default().with_threshold(Some(7));
        let records = invoker
            .invoke(EngineOp::Query, Path::new("/q.wav"), &options)
            .unwrap();
        assert_eq!(records.len(), 1);

        let seen = invoker.backend().seen.borrow();
        assert_eq!(seen[0].arguments(), vec!["query", "MIN_HITS=7", "/q.wav"]);
    }

    #[test]
    fn test_failed_exit_without_records_is_error() {
        let invoker = EngineInvoker::new(Canned::new("Exception in thread main\n", false));
        let err = invoker
            .invoke(EngineOp::Query, Path::new("/q.wav"), &EngineOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::ProcessFailure { .. }));
    }

    #[test]
    fn test_failed_exit_with_records_keeps_them() {
        let invoker = EngineInvoker::new(Canned::new(OUTPUT, false));
        let records = invoker
            .invoke(EngineOp::Query, Path::new("/q.wav"), &EngineOptions::default())
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_run_fails_on_bad_exit() {
        let invoker = EngineInvoker::new(Canned::new("", false));
        assert!(invoker
            .run(EngineOp::Clear, None, &EngineOptions::default())
            .is_err());
    }
}
