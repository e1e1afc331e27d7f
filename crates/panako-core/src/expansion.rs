//! Iterative discovery from a group of seed recordings
//!
//! Every seed is consolidated against the whole database. Matches that are
//! neither seeds nor already known are ranked by how many seeds agree on them.

use crate::consolidation::ConsolidatedMatch;
use crate::deep_query::DeepQuery;
use crate::error::{CoreError, Result};
use crate::media::is_audio_file;
use chrono::{DateTime, Local};
use panako_engine::EngineBackend;
use panako_manifest::ManifestStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A newly discovered file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResult {
    pub matched_path: String,
    /// Distinct seeds whose consolidation included this file
    pub seed_count: usize,
    /// Seeds attempted, failed ones included
    pub seed_total: usize,
    pub total_score: u64,
    /// Seeds that found it, in seed order
    pub seeds: Vec<String>,
}

impl ExpansionResult {
    pub fn confidence(&self) -> f64 {
        if self.seed_total == 0 {
            0.0
        } else {
            self.seed_count as f64 / self.seed_total as f64
        }
    }
}

/// A seed whose consolidation failed outright
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionOutcome {
    pub results: Vec<ExpansionResult>,
    pub failures: Vec<SeedFailure>,
}

#[derive(Default)]
struct Tally {
    seeds: Vec<String>,
    total_score: u64,
}

/// Consolidate each seed with `query_fn` and aggregate cross-seed agreement.
///
/// Paths in `seeds` or `known` are never reported. A seed that fails is
/// recorded and skipped; a configuration error aborts the run.
pub fn expand<F>(seeds: &[PathBuf], known: &HashSet<String>, mut query_fn: F) -> Result<ExpansionOutcome>
where
    F: FnMut(&Path) -> Result<Vec<ConsolidatedMatch>>,
{
    let seed_paths: HashSet<String> = seeds.iter().map(|p| p.display().to_string()).collect();
    let mut tallies: HashMap<String, Tally> = HashMap::new();
    let mut failures = Vec::new();

    for (i, seed) in seeds.iter().enumerate() {
        let seed_name = seed.display().to_string();
        log::info!("Seed {}/{}: {}", i + 1, seeds.len(), seed_name);

        let matches = match query_fn(seed) {
            Ok(matches) => matches,
            Err(e) if e.is_fatal_for_batch() => return Err(e),
            Err(e) => {
                log::warn!("Seed {} failed: {}", seed_name, e);
                failures.push(SeedFailure {
                    seed: seed_name,
                    error: e.to_string(),
                });
                continue;
            }
        };

        for m in matches {
            if seed_paths.contains(&m.matched_path) || known.contains(&m.matched_path) {
                continue;
            }
            let tally = tallies.entry(m.matched_path).or_default();
            // A consolidation lists each path once, but guard against repeats.
            if tally.seeds.last() != Some(&seed_name) {
                tally.seeds.push(seed_name.clone());
            }
            tally.total_score += m.total_score;
        }
    }

    let mut results: Vec<ExpansionResult> = tallies
        .into_iter()
        .map(|(matched_path, tally)| ExpansionResult {
            matched_path,
            seed_count: tally.seeds.len(),
            seed_total: seeds.len(),
            total_score: tally.total_score,
            seeds: tally.seeds,
        })
        .collect();
    results.sort_by(rank);

    Ok(ExpansionOutcome { results, failures })
}

fn rank(a: &ExpansionResult, b: &ExpansionResult) -> Ordering {
    b.seed_count
        .cmp(&a.seed_count)
        .then(b.total_score.cmp(&a.total_score))
        .then_with(|| a.matched_path.cmp(&b.matched_path))
}

/// Audio files of a seed directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedSet {
    /// One file per distinct stem, queried during expansion
    pub seeds: Vec<PathBuf>,
    /// Every audio file found, stem duplicates included
    pub members: Vec<PathBuf>,
}

impl SeedSet {
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

/// Audio files directly or recursively under `dir`, one seed per distinct stem.
///
/// Stems compare case-insensitively; the first path in sorted order wins.
/// Files dropped as duplicates stay in [`SeedSet::members`] so they are
/// never reported as discoveries.
pub fn collect_seeds(dir: &Path) -> Result<SeedSet> {
    if !dir.is_dir() {
        return Err(CoreError::configuration(format!(
            "seed directory not found: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut by_stem: BTreeMap<String, PathBuf> = BTreeMap::new();
    for file in &files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if let Some(existing) = by_stem.get(&stem) {
            log::debug!("Skipping {} (same stem as {})", file.display(), existing.display());
            continue;
        }
        by_stem.insert(stem, file.clone());
    }

    let mut seeds: Vec<PathBuf> = by_stem.into_values().map(canonical).collect();
    seeds.sort();
    let members = files.into_iter().map(canonical).collect();
    Ok(SeedSet { seeds, members })
}

fn canonical(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Name of the recording a seed directory represents
pub fn seed_stem(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "seeds".to_string())
}

/// Driver options for [`discover`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionOptions {
    /// Results found by fewer seeds are dropped
    pub min_seeds: usize,
    /// Append reported paths to the known-paths manifest
    pub record: bool,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            min_seeds: 1,
            record: true,
        }
    }
}

/// `<known_dir>/<stem>.txt`
pub fn known_manifest_path(known_dir: &Path, stem: &str) -> PathBuf {
    known_dir.join(format!("{}.txt", stem))
}

/// Deep-query every seed and report files nobody has seen yet.
///
/// `known` holds paths found by earlier runs for the same stem; with
/// `options.record` the new results are added to it, so the next run only
/// surfaces further discoveries. Members of the seed directory are never
/// reported.
pub fn discover<B: EngineBackend>(
    deep: &DeepQuery<'_, B>,
    seeds: &SeedSet,
    known: &mut ManifestStore,
    options: &ExpansionOptions,
) -> Result<ExpansionOutcome> {
    log::info!(
        "Expanding from {} seed(s), {} path(s) already known",
        seeds.len(),
        known.len()
    );
    let excluded: HashSet<String> = known
        .iter()
        .map(str::to_string)
        .chain(seeds.members.iter().map(|p| p.display().to_string()))
        .collect();

    let mut outcome = expand(&seeds.seeds, &excluded, |seed| Ok(deep.run(seed)?.matches))?;
    outcome.results.retain(|r| r.seed_count >= options.min_seeds);

    if options.record && !outcome.results.is_empty() {
        match known.add_many(outcome.results.iter().map(|r| r.matched_path.as_str())) {
            Ok(added) => log::info!("Recorded {} new path(s) in {}", added, known.path().display()),
            Err(e) => log::warn!("{}; discoveries were not recorded", e),
        }
    }
    Ok(outcome)
}

/// Options recorded alongside an expansion report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionParameters {
    pub threshold: Option<u32>,
    pub segment_length: f64,
    pub overlap: f64,
    pub min_segments: usize,
    pub min_seeds: usize,
}

/// JSON document written by `expand --report`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub stem: String,
    pub generated_at: DateTime<Local>,
    pub seed_dir: String,
    pub seeds: Vec<String>,
    pub parameters: ExpansionParameters,
    pub results: Vec<ExpansionResult>,
    pub failures: Vec<SeedFailure>,
}

impl ExpansionReport {
    pub fn new(
        stem: String,
        seed_dir: &Path,
        seeds: &[PathBuf],
        parameters: ExpansionParameters,
        outcome: ExpansionOutcome,
    ) -> Self {
        let results = outcome
            .results
            .into_iter()
            .filter(|r| r.seed_count >= parameters.min_seeds)
            .collect();
        Self {
            stem,
            generated_at: Local::now(),
            seed_dir: seed_dir.display().to_string(),
            seeds: seeds.iter().map(|p| p.display().to_string()).collect(),
            parameters,
            results,
            failures: outcome.failures,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| CoreError::io(path, e))?;
        log::info!("Wrote expansion report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panako_engine::EngineError;

    fn hit(path: &str, score: u64) -> ConsolidatedMatch {
        ConsolidatedMatch {
            matched_path: path.to_string(),
            segment_count: 1,
            total_segments: 4,
            total_score: score,
            time_ranges: Vec::new(),
            segments: vec![0],
        }
    }

    fn seeds() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/seeds/take1.wav"),
            PathBuf::from("/seeds/take2.wav"),
            PathBuf::from("/seeds/take3.wav"),
        ]
    }

    #[test]
    fn test_cross_seed_agreement() {
        let seeds = seeds();
        let outcome = expand(&seeds, &HashSet::new(), |seed| {
            Ok(match seed.to_str().unwrap() {
                "/seeds/take1.wav" => vec![hit("/db/X.wav", 10), hit("/db/Y.wav", 50)],
                "/seeds/take2.wav" => vec![hit("/db/X.wav", 12)],
                _ => Vec::new(),
            })
        })
        .unwrap();

        assert_eq!(outcome.results.len(), 2);
        let x = &outcome.results[0];
        assert_eq!(x.matched_path, "/db/X.wav");
        assert_eq!(x.seed_count, 2);
        assert_eq!(x.seed_total, 3);
        assert_eq!(x.total_score, 22);
        assert_eq!(outcome.results[1].matched_path, "/db/Y.wav");
    }

    #[test]
    fn test_seed_and_known_paths_are_excluded() {
        let seeds = seeds();
        let known: HashSet<String> = ["/db/old.wav".to_string()].into_iter().collect();
        let outcome = expand(&seeds, &known, |_| {
            Ok(vec![
                hit("/seeds/take2.wav", 99),
                hit("/db/old.wav", 40),
                hit("/db/new.wav", 5),
            ])
        })
        .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].matched_path, "/db/new.wav");
        assert_eq!(outcome.results[0].seed_count, 3);
    }

    #[test]
    fn test_failed_seed_is_recorded_and_skipped() {
        let seeds = seeds();
        let outcome = expand(&seeds, &HashSet::new(), |seed| {
            if seed.ends_with("take2.wav") {
                Err(CoreError::Engine(EngineError::Timeout {
                    op: "query".to_string(),
                    seconds: 30,
                }))
            } else {
                Ok(vec![hit("/db/X.wav", 3)])
            }
        })
        .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].seed, "/seeds/take2.wav");
        assert_eq!(outcome.results[0].seed_count, 2);
        assert_eq!(outcome.results[0].seed_total, 3);
    }

    #[test]
    fn test_configuration_error_aborts() {
        let seeds = seeds();
        let mut calls = 0;
        let result = expand(&seeds, &HashSet::new(), |_| {
            calls += 1;
            Err(CoreError::configuration("overlap too large"))
        });
        assert!(matches!(result, Err(CoreError::Configuration(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_missing_engine_aborts() {
        let seeds = seeds();
        let mut calls = 0;
        let result = expand(&seeds, &HashSet::new(), |_| {
            calls += 1;
            Err(CoreError::Engine(EngineError::JarNotFound {
                dir: PathBuf::from("/opt/panako"),
            }))
        });
        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_collect_seeds_dedups_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Take1.wav", "take1.mp3", "take2.flac", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let set = collect_seeds(dir.path()).unwrap();
        assert_eq!(set.members.len(), 3);
        let names: Vec<String> = set
            .seeds
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Take1.wav", "take2.flac"]);
    }

    #[test]
    fn test_report_applies_min_seeds() {
        let outcome = ExpansionOutcome {
            results: vec![
                ExpansionResult {
                    matched_path: "/db/a.wav".to_string(),
                    seed_count: 3,
                    seed_total: 3,
                    total_score: 30,
                    seeds: Vec::new(),
                },
                ExpansionResult {
                    matched_path: "/db/b.wav".to_string(),
                    seed_count: 1,
                    seed_total: 3,
                    total_score: 80,
                    seeds: Vec::new(),
                },
            ],
            failures: Vec::new(),
        };
        let parameters = ExpansionParameters {
            threshold: Some(4),
            segment_length: 15.0,
            overlap: 2.0,
            min_segments: 1,
            min_seeds: 2,
        };
        let report = ExpansionReport::new(
            "song".to_string(),
            Path::new("/seeds"),
            &seeds(),
            parameters,
            outcome,
        );
        assert_eq!(report.results.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("song.json");
        report.write_json(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["stem"], "song");
        assert_eq!(json["results"][0]["matched_path"], "/db/a.wav");
    }
}
