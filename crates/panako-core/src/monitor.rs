//! Live matching over one long file
//!
//! The engine's monitor mode chunks the file itself and prints results as each
//! chunk is matched. Lines are parsed and dispatched the moment they arrive;
//! the cancel token is checked between reads and before every callback.

use panako_engine::{
    parse_line, EngineBackend, EngineError, EngineInvoker, EngineOp, EngineOptions, LineKind,
    MatchRecord, StreamPoll,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative stop request shared between the monitor and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Engine chunk length in seconds
    pub chunk_length: u32,
    /// Overlap between engine chunks in seconds
    pub chunk_overlap: u32,
    /// How long to wait for a line before re-checking the cancel token
    pub poll_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            chunk_length: 25,
            chunk_overlap: 5,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl MonitorOptions {
    fn step(&self) -> f64 {
        f64::from(self.chunk_length.saturating_sub(self.chunk_overlap).max(1))
    }

    /// Chunk a query time falls in, with that chunk's bounds
    pub fn chunk_for(&self, query_start: f64) -> (usize, f64, f64) {
        let step = self.step();
        let index = (query_start.max(0.0) / step).floor() as usize;
        let start = index as f64 * step;
        (index, start, start + f64::from(self.chunk_length))
    }
}

/// A record reported by the monitor, with the engine chunk it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMatch {
    pub record: MatchRecord,
    pub chunk_index: usize,
    pub chunk_start: f64,
    pub chunk_end: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    /// Records handed to the callback
    pub records: usize,
    /// Candidate lines that failed to parse
    pub skipped_lines: usize,
    pub cancelled: bool,
}

pub struct StreamMonitor<'a, B> {
    invoker: &'a EngineInvoker<B>,
    options: MonitorOptions,
    engine_options: EngineOptions,
}

impl<'a, B: EngineBackend> StreamMonitor<'a, B> {
    pub fn new(invoker: &'a EngineInvoker<B>, options: MonitorOptions) -> Self {
        Self {
            invoker,
            options,
            engine_options: EngineOptions::default(),
        }
    }

    pub fn with_engine_options(mut self, engine_options: EngineOptions) -> Self {
        self.engine_options = engine_options;
        self
    }

    /// Monitor `path`, calling `on_match` for each record in engine order.
    pub fn run<F>(
        &self,
        path: &Path,
        cancel: &CancelToken,
        mut on_match: F,
    ) -> Result<MonitorSummary, EngineError>
    where
        F: FnMut(&StreamMatch),
    {
        let engine_options = self
            .engine_options
            .clone()
            .with_override("MONITOR_STEP_SIZE", self.options.chunk_length)
            .with_override("MONITOR_OVERLAP", self.options.chunk_overlap);

        log::info!(
            "Monitoring {} ({}s chunks, {}s overlap)",
            path.display(),
            self.options.chunk_length,
            self.options.chunk_overlap
        );
        let mut stream = self
            .invoker
            .open_stream(EngineOp::Monitor, path, &engine_options)?;
        let mut summary = MonitorSummary::default();

        loop {
            if cancel.is_cancelled() {
                stream.terminate()?;
                summary.cancelled = true;
                log::info!("Monitor stopped after {} record(s)", summary.records);
                return Ok(summary);
            }

            let line = match stream.poll_line(self.options.poll_interval) {
                StreamPoll::Line(line) => line,
                StreamPoll::Idle => continue,
                StreamPoll::Closed => break,
            };

            let record = match parse_line(&line) {
                Ok(LineKind::Record(record)) => record,
                Ok(LineKind::NoMatch) | Ok(LineKind::Informational) => continue,
                Err(e) => {
                    log::warn!("Skipping monitor output line: {} ({:?})", e, line);
                    summary.skipped_lines += 1;
                    continue;
                }
            };
            if record.is_self_match() {
                continue;
            }

            // A stop requested while parsing wins over this record.
            if cancel.is_cancelled() {
                continue;
            }
            let (chunk_index, chunk_start, chunk_end) = self.options.chunk_for(record.query_start);
            on_match(&StreamMatch {
                record,
                chunk_index,
                chunk_start,
                chunk_end,
            });
            summary.records += 1;
        }

        let output = stream.finish()?;
        if !output.success {
            if summary.records == 0 {
                return Err(EngineError::ProcessFailure {
                    op: EngineOp::Monitor.to_string(),
                    status: output.status,
                    stderr: output.stderr,
                });
            }
            log::warn!(
                "Monitor exited with {} after {} record(s)",
                output.status,
                summary.records
            );
        }
        Ok(summary)
    }
}
