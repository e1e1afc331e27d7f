//! Match records printed by the engine
//!
//! One result per line, semicolon separated:
//!
//! ```text
//! index;total;query path;query start;query stop;match path;match id;match start;match stop;score;time factor;frequency factor;match %
//! ```
//!
//! Fields past the frequency factor are ignored so newer engine builds can
//! append columns without breaking the parser.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};

/// Minimum number of fields a data line must carry (through the frequency factor).
pub const MIN_FIELDS: usize = 12;

const FIELD_QUERY_PATH: usize = 2;
const FIELD_QUERY_START: usize = 3;
const FIELD_QUERY_STOP: usize = 4;
const FIELD_MATCH_PATH: usize = 5;
const FIELD_MATCH_START: usize = 7;
const FIELD_MATCH_STOP: usize = 8;
const FIELD_SCORE: usize = 9;
const FIELD_TIME_FACTOR: usize = 10;
const FIELD_FREQ_FACTOR: usize = 11;

/// A single hit reported by one engine invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Path the engine was queried with
    pub query_path: String,
    /// Reference file that matched
    pub matched_path: String,
    /// Number of aligned fingerprint hits
    pub score: u32,
    /// Start of match in query (seconds)
    pub query_start: f64,
    /// End of match in query (seconds)
    pub query_end: f64,
    /// Start of match in reference (seconds)
    pub ref_start: f64,
    /// End of match in reference (seconds)
    pub ref_end: f64,
    /// Tempo ratio, 1.0 = unchanged
    pub time_factor: f64,
    /// Pitch ratio, 1.0 = unchanged
    pub frequency_factor: f64,
}

impl MatchRecord {
    pub fn is_self_match(&self) -> bool {
        self.query_path == self.matched_path
    }
}

/// What a line of engine output turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Record(MatchRecord),
    /// A result row the engine prints when a query found nothing
    NoMatch,
    /// Banners, headers, progress and blank lines
    Informational,
}

/// Parse one line of engine output.
///
/// Only lines starting with a digit are candidate data rows; everything else is
/// informational. Candidate rows that cannot be decoded return a [`ParseError`].
pub fn parse_line(line: &str) -> Result<LineKind, ParseError> {
    let line = line.trim();
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(LineKind::Informational);
    }

    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(ParseError::FieldCount {
            expected: MIN_FIELDS,
            found: fields.len(),
        });
    }

    let matched_path = fields[FIELD_MATCH_PATH];
    let score: i64 = parse_number(&fields, FIELD_SCORE, "score")?;
    if matched_path.is_empty() || score < 0 {
        return Ok(LineKind::NoMatch);
    }

    let query_start = parse_number(&fields, FIELD_QUERY_START, "query start")?;
    let query_end = parse_number(&fields, FIELD_QUERY_STOP, "query stop")?;
    let ref_start = parse_number(&fields, FIELD_MATCH_START, "match start")?;
    let ref_end = parse_number(&fields, FIELD_MATCH_STOP, "match stop")?;
    check_range("query", query_start, query_end)?;
    check_range("reference", ref_start, ref_end)?;

    let time_factor = parse_factor(&fields, FIELD_TIME_FACTOR, "time factor")?;
    let frequency_factor = parse_factor(&fields, FIELD_FREQ_FACTOR, "frequency factor")?;

    Ok(LineKind::Record(MatchRecord {
        query_path: fields[FIELD_QUERY_PATH].to_string(),
        matched_path: matched_path.to_string(),
        score: u32::try_from(score).unwrap_or(u32::MAX),
        query_start,
        query_end,
        ref_start,
        ref_end,
        time_factor,
        frequency_factor,
    }))
}

fn parse_number<T: std::str::FromStr>(
    fields: &[&str],
    index: usize,
    name: &'static str,
) -> Result<T, ParseError> {
    fields[index].parse::<T>().map_err(|_| ParseError::Number {
        field: name,
        value: fields[index].to_string(),
    })
}

fn check_range(field: &'static str, start: f64, end: f64) -> Result<(), ParseError> {
    if end > start && start >= 0.0 {
        Ok(())
    } else {
        Err(ParseError::Range { field, start, end })
    }
}

/// Factors are printed either as ratios (1.0) or as percentages (100.0).
fn parse_factor(fields: &[&str], index: usize, name: &'static str) -> Result<f64, ParseError> {
    let raw: f64 = parse_number(fields, index, name)?;
    if !raw.is_finite() || raw <= 0.0 {
        return Err(ParseError::Factor {
            field: name,
            value: raw,
        });
    }
    Ok(if raw > 10.0 { raw / 100.0 } else { raw })
}
