//! Splitting a long query into overlapping windows
//!
//! Windows start every `segment_length - overlap` seconds. The last window is
//! clipped to the end of the file, and generation stops as soon as a window
//! reaches the end so no window is contained in its predecessor.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shortest input the engine can fingerprint, in seconds
pub const MIN_FINGERPRINT_SECONDS: f64 = 3.0;

/// Configuration for query segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    /// Window length in seconds
    pub segment_length: f64,
    /// Overlap between consecutive windows in seconds
    pub overlap: f64,
    /// Inputs shorter than this are rejected; shorter trailing windows are pulled back
    pub min_duration: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            segment_length: 15.0,
            overlap: 2.0,
            min_duration: MIN_FINGERPRINT_SECONDS,
        }
    }
}

impl SegmentationConfig {
    pub fn new(segment_length: f64, overlap: f64) -> Self {
        Self {
            segment_length,
            overlap,
            ..Self::default()
        }
    }

    pub fn step(&self) -> f64 {
        self.segment_length - self.overlap
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.segment_length > 0.0) {
            return Err(CoreError::configuration(format!(
                "segment length must be positive, got {}",
                self.segment_length
            )));
        }
        if self.overlap < 0.0 {
            return Err(CoreError::configuration(format!(
                "overlap must not be negative, got {}",
                self.overlap
            )));
        }
        if self.overlap >= self.segment_length {
            return Err(CoreError::configuration(format!(
                "overlap ({}s) must be shorter than the segment length ({}s)",
                self.overlap, self.segment_length
            )));
        }
        Ok(())
    }

    /// Reject inputs shorter than the fingerprintable minimum.
    pub fn check_duration(&self, path: &Path, duration: f64) -> Result<()> {
        if duration < self.min_duration {
            return Err(CoreError::TooShort {
                path: path.to_path_buf(),
                duration,
                minimum: self.min_duration,
            });
        }
        Ok(())
    }
}

/// A time window of a query file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    /// Start in seconds
    pub start: f64,
    /// End in seconds, exclusive
    pub end: f64,
    /// The whole file fit in one window
    pub is_final: bool,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Split `duration` seconds into windows described by `config`.
pub fn segment(duration: f64, config: &SegmentationConfig) -> Result<Vec<Segment>> {
    config.validate()?;
    if !(duration > 0.0) {
        return Err(CoreError::configuration(format!(
            "duration must be positive, got {}",
            duration
        )));
    }

    if duration <= config.segment_length {
        return Ok(vec![Segment {
            index: 0,
            start: 0.0,
            end: duration,
            is_final: true,
        }]);
    }

    let step = config.step();
    let mut segments = Vec::new();
    loop {
        let index = segments.len();
        // Multiply rather than accumulate to keep boundaries exact.
        let mut start = index as f64 * step;
        let end = (start + config.segment_length).min(duration);

        // The last window always ends at `duration`; one too short to
        // fingerprint is pulled back to full length instead.
        if end - start < config.min_duration && index > 0 {
            log::debug!(
                "Trailing {:.2}s window at {:.2}s is below the {:.0}s minimum, starting it at {:.2}s",
                end - start,
                start,
                config.min_duration,
                duration - config.segment_length
            );
            start = duration - config.segment_length;
        }

        segments.push(Segment {
            index,
            start,
            end,
            is_final: false,
        });
        if end >= duration {
            break;
        }
    }

    Ok(segments)
}
