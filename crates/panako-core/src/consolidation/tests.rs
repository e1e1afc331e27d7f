//! Tests for consolidation

use super::*;
use approx::assert_relative_eq;
use std::convert::Infallible;

fn segments(count: usize) -> Vec<Segment> {
    (0..count)
        .map(|index| Segment {
            index,
            start: index as f64 * 13.0,
            end: index as f64 * 13.0 + 15.0,
            is_final: false,
        })
        .collect()
}

fn record(path: &str, score: u32, ref_start: f64, ref_end: f64) -> MatchRecord {
    MatchRecord {
        query_path: "/tmp/panako_deep_x/segment_0000.wav".to_string(),
        matched_path: path.to_string(),
        score,
        query_start: 0.0,
        query_end: ref_end - ref_start,
        ref_start,
        ref_end,
        time_factor: 1.0,
        frequency_factor: 1.0,
    }
}

#[test]
fn test_min_segments_filter() {
    let segs = segments(3);
    let results = consolidate(
        &segs,
        |segment| {
            Ok::<_, Infallible>(match segment.index {
                0 => vec![record("/db/F.wav", 10, 0.0, 15.0)],
                1 => vec![record("/db/F.wav", 12, 13.0, 28.0)],
                _ => vec![record("/db/G.wav", 30, 5.0, 20.0)],
            })
        },
        &ConsolidationOptions {
            min_segments: 2,
            ..ConsolidationOptions::default()
        },
    )
    .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].matched_path, "/db/F.wav");
    assert_eq!(results[0].segment_count, 2);
    assert_eq!(results[0].total_segments, 3);
    assert_eq!(results[0].total_score, 22);
    assert_eq!(results[0].time_ranges, vec![TimeRange::new(0.0, 28.0)]);
    assert_eq!(results[0].segments, vec![0, 1]);
}

#[test]
fn test_multiple_records_in_one_segment_count_once() {
    let segs = segments(2);
    let results = consolidate(
        &segs,
        |segment| {
            Ok::<_, Infallible>(if segment.index == 0 {
                vec![
                    record("/db/A.wav", 5, 0.0, 4.0),
                    record("/db/A.wav", 7, 40.0, 44.0),
                    record("/db/B.wav", 3, 1.0, 5.0),
                ]
            } else {
                Vec::new()
            })
        },
        &ConsolidationOptions::default(),
    )
    .unwrap();

    assert_eq!(results[0].matched_path, "/db/A.wav");
    assert_eq!(results[0].segment_count, 1);
    assert_eq!(results[0].total_score, 12);
    assert_eq!(results[0].time_ranges.len(), 2);
    assert_relative_eq!(results[0].confidence(), 0.5);
}

#[test]
fn test_ranking_and_tie_break() {
    let segs = segments(2);
    let results = consolidate(
        &segs,
        |_| {
            Ok::<_, Infallible>(vec![
                record("/db/b.wav", 4, 0.0, 5.0),
                record("/db/a.wav", 4, 0.0, 5.0),
                record("/db/c.wav", 9, 0.0, 5.0),
            ])
        },
        &ConsolidationOptions::default(),
    )
    .unwrap();

    let order: Vec<&str> = results.iter().map(|m| m.matched_path.as_str()).collect();
    assert_eq!(order, vec!["/db/c.wav", "/db/a.wav", "/db/b.wav"]);
}

#[test]
fn test_segment_count_beats_score() {
    let mut consolidator = Consolidator::new(3);
    let segs = segments(3);
    consolidator.add(&segs[0], &[record("/db/loud.wav", 500, 0.0, 5.0)]);
    consolidator.add(&segs[1], &[record("/db/steady.wav", 5, 0.0, 5.0)]);
    consolidator.add(&segs[2], &[record("/db/steady.wav", 5, 6.0, 9.0)]);

    let results = consolidator.matches(&ConsolidationOptions::default());
    assert_eq!(results[0].matched_path, "/db/steady.wav");
    assert_eq!(results[1].matched_path, "/db/loud.wav");
}

#[test]
fn test_query_failure_aborts() {
    let segs = segments(3);
    let mut calls = 0;
    let result = consolidate(
        &segs,
        |segment| {
            calls += 1;
            if segment.index == 1 {
                Err("engine died")
            } else {
                Ok(vec![record("/db/A.wav", 1, 0.0, 5.0)])
            }
        },
        &ConsolidationOptions::default(),
    );
    assert_eq!(result, Err("engine died"));
    assert_eq!(calls, 2);
}

#[test]
fn test_overlapping_ranges_merge() {
    let merged = merge_time_ranges(
        vec![TimeRange::new(19.0, 30.0), TimeRange::new(10.0, 20.0)],
        1.0,
    );
    assert_eq!(merged, vec![TimeRange::new(10.0, 30.0)]);
}

#[test]
fn test_distant_ranges_stay_separate() {
    let merged = merge_time_ranges(
        vec![TimeRange::new(10.0, 20.0), TimeRange::new(25.0, 30.0)],
        1.0,
    );
    assert_eq!(
        merged,
        vec![TimeRange::new(10.0, 20.0), TimeRange::new(25.0, 30.0)]
    );
}

#[test]
fn test_gap_within_tolerance_merges() {
    let ranges = vec![TimeRange::new(10.0, 20.0), TimeRange::new(21.0, 30.0)];
    assert_eq!(
        merge_time_ranges(ranges.clone(), 1.0),
        vec![TimeRange::new(10.0, 30.0)]
    );
    assert_eq!(merge_time_ranges(ranges, 0.5).len(), 2);
}

#[test]
fn test_contained_range_does_not_shrink() {
    let merged = merge_time_ranges(
        vec![TimeRange::new(0.0, 50.0), TimeRange::new(10.0, 20.0)],
        1.0,
    );
    assert_eq!(merged, vec![TimeRange::new(0.0, 50.0)]);
}
