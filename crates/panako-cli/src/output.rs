//! Human readable and JSON output

use panako_core::{
    BatchSummary, ConsolidatedMatch, DeepQueryReport, ExpansionResult, SeedFailure, StreamMatch,
    TimeRange,
};
use panako_engine::MatchRecord;
use serde::Serialize;
use std::path::Path;

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// One compact JSON object per line, for streamed results
pub fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// `mm:ss`, or `h:mm:ss` past the hour
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

pub fn format_ranges(ranges: &[TimeRange]) -> String {
    ranges
        .iter()
        .map(|r| format!("{}-{}", format_time(r.start), format_time(r.end)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_record(record: &MatchRecord) -> String {
    format!(
        "{} (score {}, query {}-{}, ref {}-{}, time x{:.3}, freq x{:.3})",
        record.matched_path,
        record.score,
        format_time(record.query_start),
        format_time(record.query_end),
        format_time(record.ref_start),
        format_time(record.ref_end),
        record.time_factor,
        record.frequency_factor
    )
}

pub fn format_match(rank: usize, m: &ConsolidatedMatch) -> String {
    format!(
        "{:>3}. {} [{}/{} segments, {:.0}%, score {}] at {}",
        rank,
        m.matched_path,
        m.segment_count,
        m.total_segments,
        m.confidence() * 100.0,
        m.total_score,
        format_ranges(&m.time_ranges)
    )
}

pub fn format_expansion_result(rank: usize, r: &ExpansionResult) -> String {
    format!(
        "{:>3}. {} [{}/{} seeds, {:.0}%, score {}]",
        rank,
        r.matched_path,
        r.seed_count,
        r.seed_total,
        r.confidence() * 100.0,
        r.total_score
    )
}

pub fn print_records(path: &Path, records: &[MatchRecord]) {
    if records.is_empty() {
        println!("{}: no match", path.display());
        return;
    }
    println!("{}: {} match(es)", path.display(), records.len());
    for record in records {
        println!("  {}", format_record(record));
    }
}

pub fn print_deep_query(report: &DeepQueryReport, details: bool) {
    println!(
        "{} ({}, {} segment(s))",
        report.source.display(),
        format_time(report.duration),
        report.segments.len()
    );

    if details {
        for hit in &report.hits {
            println!(
                "  segment {} [{}-{}]: {} record(s)",
                hit.segment.index + 1,
                format_time(hit.segment.start),
                format_time(hit.segment.end),
                hit.records.len()
            );
            for record in &hit.records {
                println!("    {}", format_record(record));
            }
        }
    }

    if report.matches.is_empty() {
        println!("No consolidated matches");
        return;
    }
    for (i, m) in report.matches.iter().enumerate() {
        println!("{}", format_match(i + 1, m));
    }
}

pub fn print_expansion(stem: &str, results: &[ExpansionResult], failures: &[SeedFailure]) {
    if results.is_empty() {
        println!("{}: nothing new found", stem);
    } else {
        println!("{}: {} new candidate(s)", stem, results.len());
        for (i, r) in results.iter().enumerate() {
            println!("{}", format_expansion_result(i + 1, r));
        }
    }
    for failure in failures {
        println!("  seed failed: {} ({})", failure.seed, failure.error);
    }
}

/// Totals followed by every skipped item and its reason
pub fn print_summary(action: &str, summary: &BatchSummary) {
    println!(
        "{}: {} processed, {} skipped",
        action,
        summary.processed.len(),
        summary.skipped.len()
    );
    for item in &summary.skipped {
        println!("  skipped {}: {}", item.path.display(), item.reason);
    }
}

pub fn print_stream_match(m: &StreamMatch) {
    println!(
        "[chunk {} {}-{}] {}",
        m.chunk_index,
        format_time(m.chunk_start),
        format_time(m.chunk_end),
        format_record(&m.record)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(75.4), "01:15");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(-3.0), "00:00");
    }

    #[test]
    fn test_format_match_line() {
        let m = ConsolidatedMatch {
            matched_path: "/music/a.flac".to_string(),
            segment_count: 3,
            total_segments: 4,
            total_score: 120,
            time_ranges: vec![
                TimeRange { start: 10.0, end: 40.0 },
                TimeRange { start: 65.0, end: 80.0 },
            ],
            segments: vec![0, 1, 3],
        };
        assert_eq!(
            format_match(1, &m),
            "  1. /music/a.flac [3/4 segments, 75%, score 120] at 00:10-00:40, 01:05-01:20"
        );
    }

    #[test]
    fn test_format_expansion_result() {
        let r = ExpansionResult {
            matched_path: "/music/x.mp3".to_string(),
            seed_count: 2,
            seed_total: 3,
            total_score: 90,
            seeds: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            format_expansion_result(2, &r),
            "  2. /music/x.mp3 [2/3 seeds, 67%, score 90]"
        );
    }
}
