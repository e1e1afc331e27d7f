//! Indexing and querying whole files or directories
//!
//! One file at a time, in sorted order. A single-file target surfaces its
//! first error; a directory target records per-file failures in a
//! [`BatchSummary`] and keeps going.

use crate::error::{CoreError, Result};
use crate::media::{probe_duration, scan_audio_files};
use crate::segmentation::MIN_FINGERPRINT_SECONDS;
use panako_engine::{EngineBackend, EngineInvoker, EngineOp, EngineOptions, MatchRecord};
use panako_manifest::ManifestStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Why an item of a batch was not processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyIndexed,
    TooShort { duration: f64 },
    EngineFailure { reason: String, message: String },
    Unreadable { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyIndexed => write!(f, "already indexed"),
            SkipReason::TooShort { duration } => write!(
                f,
                "too short ({:.1}s < {:.0}s)",
                duration, MIN_FINGERPRINT_SECONDS
            ),
            SkipReason::EngineFailure { reason, message } => {
                write!(f, "engine {}: {}", reason, message)
            }
            SkipReason::Unreadable { message } => write!(f, "unreadable: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of an operation over one or more files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub skipped: Vec<SkippedItem>,
}

impl BatchSummary {
    pub fn skip(&mut self, path: &Path, reason: SkipReason) {
        log::warn!("Skipping {}: {}", path.display(), reason);
        self.skipped.push(SkippedItem {
            path: path.to_path_buf(),
            reason,
        });
    }

    pub fn skipped_because(&self, matches: impl Fn(&SkipReason) -> bool) -> usize {
        self.skipped.iter().filter(|s| matches(&s.reason)).count()
    }

    /// Items the engine failed on or that could not be read. Already indexed
    /// and too-short files are expected skips.
    pub fn failures(&self) -> usize {
        self.skipped_because(|r| {
            matches!(r, SkipReason::EngineFailure { .. } | SkipReason::Unreadable { .. })
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }
}

/// Per-file results of a batch query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMatches {
    pub path: PathBuf,
    pub records: Vec<MatchRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchQueryReport {
    pub results: Vec<FileMatches>,
    pub summary: BatchSummary,
}

/// How an item error is handled
enum Scope {
    Single,
    Batch,
}

impl Scope {
    fn of(target: &Path) -> Self {
        if target.is_dir() {
            Scope::Batch
        } else {
            Scope::Single
        }
    }
}

fn reason_for(error: &CoreError) -> SkipReason {
    match error {
        CoreError::TooShort { duration, .. } => SkipReason::TooShort {
            duration: *duration,
        },
        CoreError::Engine(e) => SkipReason::EngineFailure {
            reason: e.reason().as_str().to_string(),
            message: e.to_string(),
        },
        other => SkipReason::Unreadable {
            message: other.to_string(),
        },
    }
}

/// The engine's database plus the manifest that mirrors it
pub struct Library<B> {
    invoker: EngineInvoker<B>,
    manifest: ManifestStore,
    options: EngineOptions,
    min_duration: f64,
}

impl<B: EngineBackend> Library<B> {
    pub fn new(invoker: EngineInvoker<B>, manifest: ManifestStore) -> Self {
        Self {
            invoker,
            manifest,
            options: EngineOptions::default(),
            min_duration: MIN_FINGERPRINT_SECONDS,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    pub fn invoker(&self) -> &EngineInvoker<B> {
        &self.invoker
    }

    /// Index `target`, skipping files already in the manifest unless `force`.
    pub fn store(&mut self, target: &Path, force: bool) -> Result<BatchSummary> {
        let files = scan_audio_files(target)?;
        let scope = Scope::of(target);
        let mut summary = BatchSummary::default();

        for (i, file) in files.iter().enumerate() {
            let key = file.display().to_string();
            if !force && self.manifest.contains(&key) {
                log::debug!("Already indexed: {}", key);
                summary.skipped.push(SkippedItem {
                    path: file.clone(),
                    reason: SkipReason::AlreadyIndexed,
                });
                continue;
            }

            log::info!("[{}/{}] Storing {}", i + 1, files.len(), key);
            match self.store_one(file) {
                Ok(()) => {
                    // Record immediately so an interrupted run resumes here.
                    if let Err(e) = self.manifest.add(&key) {
                        log::warn!("{}; {} will be re-indexed next time", e, key);
                    }
                    summary.processed.push(file.clone());
                }
                Err(e) => match scope {
                    Scope::Single => return Err(e),
                    Scope::Batch if e.is_fatal_for_batch() => return Err(e),
                    Scope::Batch => summary.skip(file, reason_for(&e)),
                },
            }
        }

        log::info!(
            "Stored {} file(s), skipped {}",
            summary.processed.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn store_one(&self, file: &Path) -> Result<()> {
        self.check_duration(file)?;
        self.invoker
            .run(EngineOp::Store, Some(file), &self.options)?;
        Ok(())
    }

    /// Too-short files are rejected; files whose length cannot be read are
    /// left for the engine to judge.
    fn check_duration(&self, file: &Path) -> Result<()> {
        match probe_duration(file) {
            Ok(duration) if duration < self.min_duration => Err(CoreError::TooShort {
                path: file.to_path_buf(),
                duration,
                minimum: self.min_duration,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                log::debug!("Could not probe {}: {}", file.display(), e);
                Ok(())
            }
        }
    }

    /// Mark files as indexed without running the engine.
    ///
    /// Returns `(added, already_present)`.
    pub fn init_manifest(&mut self, target: &Path) -> Result<(usize, usize)> {
        let files = scan_audio_files(target)?;
        let (added, present) = self
            .manifest
            .rebuild_from(files.iter().map(|f| f.display().to_string()))?;
        log::info!("Manifest: {} added, {} already present", added, present);
        Ok((added, present))
    }

    /// Remove `target` from the engine database and the manifest.
    pub fn delete(&mut self, target: &Path) -> Result<BatchSummary> {
        let files = match scan_audio_files(target) {
            Ok(files) => files,
            // Deleting a file that no longer exists on disk is still meaningful.
            Err(CoreError::Configuration(_)) if !target.exists() => vec![target.to_path_buf()],
            Err(e) => return Err(e),
        };
        let scope = Scope::of(target);
        let mut summary = BatchSummary::default();

        for file in &files {
            log::info!("Deleting {}", file.display());
            match self.invoker.run(EngineOp::Delete, Some(file), &self.options) {
                Ok(_) => {
                    if let Err(e) = self.manifest.remove(&file.display().to_string()) {
                        log::warn!("{}", e);
                    }
                    summary.processed.push(file.clone());
                }
                Err(e) => {
                    let e = CoreError::from(e);
                    match scope {
                        Scope::Batch if !e.is_fatal_for_batch() => summary.skip(file, reason_for(&e)),
                        _ => return Err(e),
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Empty the engine database and delete the manifest.
    pub fn clear(&mut self) -> Result<()> {
        self.invoker.run(EngineOp::Clear, None, &self.options)?;
        self.manifest.clear()?;
        log::info!("Database and manifest cleared");
        Ok(())
    }

    /// Query one file.
    pub fn query(&self, file: &Path) -> Result<Vec<MatchRecord>> {
        if !file.is_file() {
            return Err(CoreError::configuration(format!(
                "file not found: {}",
                file.display()
            )));
        }
        self.check_duration(file)?;
        Ok(self.invoker.invoke(EngineOp::Query, file, &self.options)?)
    }

    /// Query every audio file under `dir`, isolating per-file failures.
    pub fn batch_query(&self, dir: &Path) -> Result<BatchQueryReport> {
        let files = scan_audio_files(dir)?;
        let mut report = BatchQueryReport::default();

        for (i, file) in files.iter().enumerate() {
            log::info!("[{}/{}] Querying {}", i + 1, files.len(), file.display());
            match self.query(file) {
                Ok(records) => {
                    report.summary.processed.push(file.clone());
                    report.results.push(FileMatches {
                        path: file.clone(),
                        records,
                    });
                }
                Err(e) if e.is_fatal_for_batch() => return Err(e),
                Err(e) => report.summary.skip(file, reason_for(&e)),
            }
        }
        Ok(report)
    }

    /// Raw statistics printed by the engine
    pub fn stats(&self) -> Result<String> {
        Ok(self.invoker.run(EngineOp::Stats, None, &self.options)?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panako_engine::{EngineError, EngineRequest, LineStream, RawOutput};
    use std::cell::RefCell;
    use std::time::Duration;

    /// Fails any request whose target file name contains "broken"
    #[derive(Default)]
    struct FakeEngine {
        calls: RefCell<Vec<String>>,
    }

    impl EngineBackend for FakeEngine {
        fn execute(
            &self,
            request: &EngineRequest,
            _timeout: Option<Duration>,
        ) -> std::result::Result<RawOutput, EngineError> {
            let target = request
                .target
                .as_ref()
                .map(|t| t.display().to_string())
                .unwrap_or_default();
            self.calls
                .borrow_mut()
                .push(format!("{} {}", request.op, target).trim().to_string());
            let broken = target.contains("broken");
            Ok(RawOutput {
                stdout: if request.op == EngineOp::Stats {
                    "Fingerprints: 42".to_string()
                } else {
                    String::new()
                },
                stderr: if broken { "boom".to_string() } else { String::new() },
                success: !broken,
                status: if broken { "exit status: 1" } else { "exit status: 0" }.to_string(),
            })
        }

        fn stream(
            &self,
            _request: &EngineRequest,
        ) -> std::result::Result<Box<dyn LineStream>, EngineError> {
            unreachable!()
        }
    }

    fn write_wav(path: &Path, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(8000 * seconds) {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn library(dir: &Path) -> Library<FakeEngine> {
        let manifest = ManifestStore::load(dir.join("state/indexed_files.txt")).unwrap();
        Library::new(EngineInvoker::new(FakeEngine::default()), manifest)
    }

    #[test]
    fn test_directory_store_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        write_wav(&music.join("a.wav"), 4);
        write_wav(&music.join("broken.wav"), 4);
        write_wav(&music.join("blip.wav"), 1);

        let mut lib = library(dir.path());
        let summary = lib.store(&music, false).unwrap();

        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(
            summary.skipped_because(|r| matches!(r, SkipReason::TooShort { .. })),
            1
        );
        assert_eq!(
            summary.skipped_because(|r| matches!(r, SkipReason::EngineFailure { .. })),
            1
        );
        assert_eq!(lib.manifest().len(), 1);
        assert!(summary.has_failures());
        assert_eq!(summary.failures(), 1);
    }

    #[test]
    fn test_single_file_store_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.wav");
        write_wav(&file, 4);

        let mut lib = library(dir.path());
        let err = lib.store(&file, false).unwrap_err();
        assert!(matches!(err, CoreError::Engine(_)));
        assert!(lib.manifest().is_empty());
    }

    #[test]
    fn test_force_restores_indexed_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.wav");
        write_wav(&file, 4);

        let mut lib = library(dir.path());
        lib.store(&file, false).unwrap();
        assert_eq!(lib.store(&file, false).unwrap().processed.len(), 0);
        assert_eq!(lib.store(&file, true).unwrap().processed.len(), 1);
        assert_eq!(lib.invoker().backend().calls.borrow().len(), 2);
    }

    #[test]
    fn test_init_manifest_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        write_wav(&music.join("a.wav"), 4);
        write_wav(&music.join("b.wav"), 4);

        let mut lib = library(dir.path());
        assert_eq!(lib.init_manifest(&music).unwrap(), (2, 0));
        assert_eq!(lib.init_manifest(&music).unwrap(), (0, 2));
        assert!(lib.invoker().backend().calls.borrow().is_empty());

        let a = music.join("a.wav").canonicalize().unwrap();
        lib.delete(&a).unwrap();
        assert_eq!(lib.manifest().len(), 1);
        assert!(!lib.manifest().contains(&a.display().to_string()));
    }

    #[test]
    fn test_clear_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.wav");
        write_wav(&file, 4);

        let mut lib = library(dir.path());
        lib.store(&file, false).unwrap();
        assert_eq!(lib.stats().unwrap(), "Fingerprints: 42");

        lib.clear().unwrap();
        assert!(lib.manifest().is_empty());
        assert!(!lib.manifest().path().exists());
        assert_eq!(
            lib.invoker().backend().calls.borrow().last().unwrap(),
            "clear"
        );
    }

    #[test]
    fn test_batch_query_reports_short_files() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("ok.wav"), 5);
        write_wav(&dir.path().join("short.wav"), 2);

        let lib = library(dir.path());
        let report = lib.batch_query(dir.path()).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.summary.skipped.len(), 1);
        assert!(report.summary.skipped[0].path.ends_with("short.wav"));
        assert!(!report.summary.has_failures());
    }

    #[test]
    fn test_missing_engine_stops_directory_runs() {
        use panako_engine::{EngineCommand, ProcessBackend};

        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        write_wav(&music.join("a.wav"), 5);
        write_wav(&music.join("b.wav"), 5);

        let backend = ProcessBackend::new(EngineCommand::new("/nonexistent/java"));
        let manifest = ManifestStore::load(dir.path().join("state/indexed_files.txt")).unwrap();
        let mut lib = Library::new(EngineInvoker::new(backend), manifest);

        let err = lib.store(&music, false).unwrap_err();
        assert!(err.is_fatal_for_batch());
        assert_eq!(err.exit_code(), 3);
        assert!(lib.manifest().is_empty());

        let err = lib.batch_query(&music).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let err = lib.delete(&music).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
