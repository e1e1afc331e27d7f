//! Panako Core - orchestration around the Panako fingerprinting engine
//!
//! The engine does the fingerprinting. This crate decides what to send it:
//! which files still need indexing, how a long query is cut into segments,
//! how per-segment and per-seed hits are consolidated into ranked results,
//! and how a live monitor run is streamed and stopped.

pub mod consolidation;
pub mod deep_query;
pub mod error;
pub mod expansion;
pub mod library;
pub mod media;
pub mod monitor;
pub mod segmentation;
pub mod settings;

pub use consolidation::{
    consolidate, merge_time_ranges, ConsolidatedMatch, ConsolidationOptions, Consolidator,
    SegmentHit, TimeRange,
};
pub use deep_query::{DeepQuery, DeepQueryReport};
pub use error::CoreError;
pub use expansion::{
    collect_seeds, discover, expand, ExpansionOptions, ExpansionOutcome, ExpansionReport,
    ExpansionResult, SeedFailure, SeedSet,
};
pub use library::{BatchQueryReport, BatchSummary, Library, SkipReason, SkippedItem};
pub use monitor::{CancelToken, MonitorOptions, MonitorSummary, StreamMatch, StreamMonitor};
pub use segmentation::{segment, Segment, SegmentationConfig, MIN_FINGERPRINT_SECONDS};
pub use settings::Settings;
