//! Panako engine bindings
//!
//! The fingerprinting itself happens in the external Panako engine. This crate
//! only knows how to launch it, how to read what it prints, and how to turn
//! process failures into typed errors.

pub mod backend;
pub mod command;
pub mod error;
pub mod invoker;
pub mod operation;
pub mod process;
pub mod record;

pub use backend::{EngineBackend, EngineRequest, LineStream, RawOutput, StreamPoll};
pub use command::EngineCommand;
pub use error::{EngineError, FailureReason, ParseError};
pub use invoker::{parse_output, EngineInvoker, RecordBatch, DEFAULT_THRESHOLD_KEY};
pub use operation::{EngineOp, EngineOptions};
pub use process::ProcessBackend;
pub use record::{parse_line, LineKind, MatchRecord, MIN_FIELDS};
