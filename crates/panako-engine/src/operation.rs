//! Engine operations and per-call options

use std::fmt;

/// Subcommands understood by the Panako engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Store,
    Query,
    Monitor,
    Delete,
    Clear,
    Stats,
}

impl EngineOp {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineOp::Store => "store",
            EngineOp::Query => "query",
            EngineOp::Monitor => "monitor",
            EngineOp::Delete => "delete",
            EngineOp::Clear => "clear",
            EngineOp::Stats => "stats",
        }
    }

    /// Blocking operations are bounded by the invoker timeout; monitor runs
    /// until the stream ends or the caller stops it.
    pub fn is_blocking(self) -> bool {
        !matches!(self, EngineOp::Monitor)
    }
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration overrides passed to the engine as `KEY=VALUE` arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    /// Match threshold; lower is more permissive
    pub threshold: Option<u32>,
    pub overrides: Vec<(String, String)>,
}

impl EngineOptions {
    pub fn with_threshold(mut self, threshold: Option<u32>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.overrides.push((key.into(), value.to_string()));
        self
    }

    /// Render as engine arguments. `threshold_key` names the engine setting the
    /// threshold maps onto.
    pub fn render(&self, threshold_key: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .threshold
            .map(|t| format!("{}={}", threshold_key, t))
            .into_iter()
            .collect();
        args.extend(
            self.overrides
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        args
    }
}
