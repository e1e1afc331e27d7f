//! Per-segment hit consolidation
//!
//! Raw engine records are grouped by matched file. Each group reports how many
//! distinct segments hit it, the summed score and the reference time ranges it
//! covers, merged when they overlap or sit within the gap tolerance.

use crate::segmentation::Segment;
use panako_engine::MatchRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[cfg(test)]
mod tests;

/// Default gap (seconds) within which reference ranges are merged
pub const DEFAULT_GAP_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidationOptions {
    /// Minimum number of distinct segments that must hit a file
    pub min_segments: usize,
    /// Ranges separated by at most this many seconds are merged
    pub gap_tolerance: f64,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            min_segments: 1,
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
        }
    }
}

/// A span of matched-file time, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Aggregated result for one matched file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMatch {
    pub matched_path: String,
    /// Segments with at least one record for this file
    pub segment_count: usize,
    pub total_segments: usize,
    pub total_score: u64,
    /// Sorted, non-overlapping
    pub time_ranges: Vec<TimeRange>,
    /// Indices of the contributing segments, ascending
    pub segments: Vec<usize>,
}

impl ConsolidatedMatch {
    /// Share of segments that hit this file, in `0.0..=1.0`
    pub fn confidence(&self) -> f64 {
        if self.total_segments == 0 {
            0.0
        } else {
            self.segment_count as f64 / self.total_segments as f64
        }
    }
}

/// Records returned for one segment, kept for detailed reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentHit {
    pub segment: Segment,
    pub records: Vec<MatchRecord>,
}

/// Merge ranges that overlap or are separated by at most `gap` seconds.
pub fn merge_time_ranges(mut ranges: Vec<TimeRange>, gap: f64) -> Vec<TimeRange> {
    ranges.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(Ordering::Equal)
            .then(a.end.partial_cmp(&b.end).unwrap_or(Ordering::Equal))
    });

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + gap => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[derive(Debug, Default)]
struct Group {
    segments: BTreeSet<usize>,
    total_score: u64,
    ranges: Vec<TimeRange>,
}

/// Incremental consolidator: feed it one segment at a time, then `finish`.
#[derive(Debug)]
pub struct Consolidator {
    total_segments: usize,
    groups: HashMap<String, Group>,
}

impl Consolidator {
    pub fn new(total_segments: usize) -> Self {
        Self {
            total_segments,
            groups: HashMap::new(),
        }
    }

    /// Attribute every record to `segment`.
    pub fn add(&mut self, segment: &Segment, records: &[MatchRecord]) {
        for record in records {
            let group = self.groups.entry(record.matched_path.clone()).or_default();
            group.segments.insert(segment.index);
            group.total_score += u64::from(record.score);
            group.ranges.push(TimeRange::new(record.ref_start, record.ref_end));
        }
    }

    /// Ranked matches, filtered by `min_segments`.
    pub fn matches(&self, options: &ConsolidationOptions) -> Vec<ConsolidatedMatch> {
        let mut matches: Vec<ConsolidatedMatch> = self
            .groups
            .iter()
            .filter(|(_, group)| group.segments.len() >= options.min_segments)
            .map(|(path, group)| ConsolidatedMatch {
                matched_path: path.clone(),
                segment_count: group.segments.len(),
                total_segments: self.total_segments.max(group.segments.len()),
                total_score: group.total_score,
                time_ranges: merge_time_ranges(group.ranges.clone(), options.gap_tolerance),
                segments: group.segments.iter().copied().collect(),
            })
            .collect();

        matches.sort_by(rank);
        matches
    }
}

/// Highest segment count first, then highest score, then path.
fn rank(a: &ConsolidatedMatch, b: &ConsolidatedMatch) -> Ordering {
    b.segment_count
        .cmp(&a.segment_count)
        .then(b.total_score.cmp(&a.total_score))
        .then_with(|| a.matched_path.cmp(&b.matched_path))
}

/// Query every segment in index order and consolidate the results.
///
/// The first failing query aborts the run.
pub fn consolidate<F, E>(
    segments: &[Segment],
    mut query_fn: F,
    options: &ConsolidationOptions,
) -> Result<Vec<ConsolidatedMatch>, E>
where
    F: FnMut(&Segment) -> Result<Vec<MatchRecord>, E>,
{
    let mut consolidator = Consolidator::new(segments.len());
    for segment in segments {
        let records = query_fn(segment)?;
        log::debug!(
            "Segment {} ({:.1}s-{:.1}s): {} record(s)",
            segment.index,
            segment.start,
            segment.end,
            records.len()
        );
        consolidator.add(segment, &records);
    }
    Ok(consolidator.matches(options))
}
