//! panako - index, query and explore an audio collection with the Panako engine
//!
//! Usage:
//!   panako store [--force] <path>
//!   panako query <file>
//!   panako deep-query [--segment N] [--overlap N] [--min-segments N] [--details] <file>
//!   panako expand [--threshold N] [--min-seeds N] [--report FILE] <seed_dir>
//!   panako monitor <file>
//!   panako verify

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use panako_cli::output::{
    print_deep_query, print_expansion, print_json, print_json_line, print_records,
    print_stream_match, print_summary,
};
use panako_core::expansion::{known_manifest_path, seed_stem, ExpansionParameters};
use panako_core::{
    collect_seeds, discover, BatchSummary, CancelToken, CoreError, DeepQuery, ExpansionOptions,
    ExpansionReport, Library, Settings, StreamMonitor,
};
use panako_engine::command::find_jar;
use panako_engine::{EngineError, EngineInvoker, EngineOptions, FailureReason, ProcessBackend};
use panako_manifest::ManifestStore;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser, Debug)]
#[command(name = "panako")]
#[command(about = "Audio fingerprinting front end for the Panako engine", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults to ~/.panako/config.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Panako checkout (overrides PANAKO_DIR and the config file)
    #[arg(long, global = true)]
    panako_dir: Option<PathBuf>,

    /// Manifest of indexed files
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Engine match threshold; lower is more permissive
    #[arg(long, global = true)]
    threshold: Option<u32>,

    /// Machine readable output
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Index a file or every audio file under a directory
    Store {
        path: PathBuf,
        /// Re-index files already in the manifest
        #[arg(long)]
        force: bool,
    },
    /// Query one file
    Query { path: PathBuf },
    /// Query every audio file under a directory
    Batch { dir: PathBuf },
    /// Query a long recording in overlapping segments
    DeepQuery {
        path: PathBuf,
        #[command(flatten)]
        segments: SegmentArgs,
        /// Print the records of every segment
        #[arg(long)]
        details: bool,
    },
    /// Stream matches from a long recording until it ends or Ctrl-C
    Monitor { path: PathBuf },
    /// Find further versions of a song from a directory of seed recordings
    Expand {
        seed_dir: PathBuf,
        #[command(flatten)]
        segments: SegmentArgs,
        /// Only report files found by at least this many seeds
        #[arg(long)]
        min_seeds: Option<usize>,
        /// Write a JSON report
        #[arg(long)]
        report: Option<PathBuf>,
        /// Known-paths manifest (default: <known_dir>/<seed dir name>.txt)
        #[arg(long)]
        known: Option<PathBuf>,
        /// Do not add the results to the known-paths manifest
        #[arg(long)]
        no_record: bool,
    },
    /// Mark files as indexed without running the engine
    InitManifest { dir: PathBuf },
    /// Engine statistics and manifest size
    Stats,
    /// Database files and manifest size
    List,
    /// Remove a file or directory from the database
    Delete { path: PathBuf },
    /// Empty the database and the manifest
    Clear {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Check java, the Panako jar, LMDB and writable state directories
    Verify,
}

#[derive(clap::Args, Debug)]
struct SegmentArgs {
    /// Segment length in seconds
    #[arg(long = "segment")]
    segment_length: Option<f64>,
    /// Overlap between consecutive segments in seconds
    #[arg(long)]
    overlap: Option<f64>,
    /// Minimum number of segments a match must appear in
    #[arg(long)]
    min_segments: Option<usize>,
}

impl SegmentArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        if let Some(length) = self.segment_length {
            settings.deep_query.segment_length = length;
        }
        if let Some(overlap) = self.overlap {
            settings.deep_query.overlap = overlap;
        }
        if let Some(min) = self.min_segments {
            settings.deep_query.min_segments = min;
        }
        settings.validate()
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CoreError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<EngineError>() {
            return match e.reason() {
                FailureReason::Unavailable => 3,
                _ => 1,
            };
        }
    }
    1
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::resolve(cli.config.as_deref())?;
    if let Some(dir) = &cli.panako_dir {
        settings.engine.panako_dir = dir.display().to_string();
    }
    if let Some(path) = &cli.manifest {
        settings.manifest.path = path.display().to_string();
    }
    let engine_options = EngineOptions::default().with_threshold(cli.threshold);
    let json = cli.json;

    match cli.command {
        Cmd::Store { path, force } => {
            let mut library = open_library(&settings, &engine_options)?;
            let summary = library.store(&path, force)?;
            if json {
                print_json(&summary);
            } else {
                print_summary("Store", &summary);
            }
            ensure_no_failures("store", &summary)?;
        }
        Cmd::Query { path } => {
            let library = open_library(&settings, &engine_options)?;
            let records = library.query(&path)?;
            if json {
                print_json(&records);
            } else {
                print_records(&path, &records);
            }
        }
        Cmd::Batch { dir } => {
            let library = open_library(&settings, &engine_options)?;
            let report = library.batch_query(&dir)?;
            if json {
                print_json(&report);
            } else {
                for file in &report.results {
                    print_records(&file.path, &file.records);
                }
                print_summary("Batch query", &report.summary);
            }
            ensure_no_failures("batch", &report.summary)?;
        }
        Cmd::DeepQuery {
            path,
            segments,
            details,
        } => {
            segments.apply(&mut settings)?;
            let invoker = engine_invoker(&settings)?;
            let report = DeepQuery::new(&invoker)
                .with_segmentation(settings.segmentation())
                .with_consolidation(settings.consolidation())
                .with_options(engine_options)
                .run(&path)?;
            if json {
                print_json(&report);
            } else {
                print_deep_query(&report, details);
            }
        }
        Cmd::Monitor { path } => run_monitor(&settings, engine_options, path, json).await?,
        Cmd::Expand {
            seed_dir,
            segments,
            min_seeds,
            report,
            known,
            no_record,
        } => {
            segments.apply(&mut settings)?;
            if let Some(min) = min_seeds {
                settings.expand.min_seeds = min;
            }
            run_expand(
                &settings,
                engine_options,
                &seed_dir,
                report.as_deref(),
                known,
                !no_record,
                json,
            )?;
        }
        Cmd::InitManifest { dir } => {
            let mut library = open_library(&settings, &engine_options)?;
            let (added, present) = library.init_manifest(&dir)?;
            if json {
                print_json(&serde_json::json!({ "added": added, "already_present": present }));
            } else {
                println!("Manifest: {} added, {} already present", added, present);
            }
        }
        Cmd::Stats => {
            let library = open_library(&settings, &engine_options)?;
            let stats = library.stats()?;
            if json {
                print_json(&serde_json::json!({
                    "engine": stats,
                    "manifest_entries": library.manifest().len(),
                }));
            } else {
                print!("{}", stats);
                println!("Manifest entries: {}", library.manifest().len());
            }
        }
        Cmd::List => list_databases(&settings, json)?,
        Cmd::Delete { path } => {
            let mut library = open_library(&settings, &engine_options)?;
            let summary = library.delete(&path)?;
            if json {
                print_json(&summary);
            } else {
                print_summary("Delete", &summary);
            }
            ensure_no_failures("delete", &summary)?;
        }
        Cmd::Clear { yes } => {
            let prompt = "This removes every fingerprint and the manifest. Type 'yes' to continue: ";
            if !yes && !confirm(prompt)? {
                println!("Aborted");
                return Ok(());
            }
            let mut library = open_library(&settings, &engine_options)?;
            library.clear()?;
            println!("Database and manifest cleared");
        }
        Cmd::Verify => verify(&settings, json)?,
    }

    Ok(())
}

/// Partial failures still exit non-zero once the summary is printed.
fn ensure_no_failures(action: &str, summary: &BatchSummary) -> Result<()> {
    if summary.has_failures() {
        bail!("{}: {} item(s) failed", action, summary.failures());
    }
    Ok(())
}

fn engine_invoker(settings: &Settings) -> Result<EngineInvoker<ProcessBackend>> {
    let command = settings.engine_command()?;
    Ok(EngineInvoker::new(ProcessBackend::new(command))
        .with_timeout(settings.timeout())
        .with_threshold_key(settings.engine.threshold_key.clone()))
}

fn open_library(
    settings: &Settings,
    options: &EngineOptions,
) -> Result<Library<ProcessBackend>> {
    let manifest = ManifestStore::load_or_empty(settings.manifest_path());
    log::debug!(
        "Manifest {} has {} entries",
        manifest.path().display(),
        manifest.len()
    );
    Ok(Library::new(engine_invoker(settings)?, manifest).with_options(options.clone()))
}

async fn run_monitor(
    settings: &Settings,
    engine_options: EngineOptions,
    path: PathBuf,
    json: bool,
) -> Result<()> {
    if !path.is_file() {
        return Err(CoreError::configuration(format!("file not found: {}", path.display())).into());
    }
    let invoker = engine_invoker(settings)?;
    let options = settings.monitor_options();
    let cancel = CancelToken::new();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, stopping monitor");
                cancel.cancel();
            }
        })
    };

    let summary = tokio::task::spawn_blocking(move || {
        StreamMonitor::new(&invoker, options)
            .with_engine_options(engine_options)
            .run(&path, &cancel, |m| {
                if json {
                    print_json_line(m);
                } else {
                    print_stream_match(m);
                }
            })
    })
    .await
    .context("monitor task failed")??;
    interrupt.abort();

    if !json {
        println!(
            "{} record(s), {} unparseable line(s){}",
            summary.records,
            summary.skipped_lines,
            if summary.cancelled { ", stopped early" } else { "" }
        );
    }
    Ok(())
}

fn run_expand(
    settings: &Settings,
    engine_options: EngineOptions,
    seed_dir: &Path,
    report_path: Option<&Path>,
    known: Option<PathBuf>,
    record: bool,
    json: bool,
) -> Result<()> {
    let seeds = collect_seeds(seed_dir)?;
    if seeds.is_empty() {
        return Err(CoreError::configuration(format!(
            "no audio files in {}",
            seed_dir.display()
        ))
        .into());
    }

    let stem = seed_stem(seed_dir);
    let known_path = known.unwrap_or_else(|| known_manifest_path(&settings.known_dir(), &stem));
    let mut known_store = ManifestStore::load_or_empty(known_path);

    let parameters = ExpansionParameters {
        threshold: engine_options.threshold,
        segment_length: settings.deep_query.segment_length,
        overlap: settings.deep_query.overlap,
        min_segments: settings.deep_query.min_segments,
        min_seeds: settings.expand.min_seeds,
    };
    let invoker = engine_invoker(settings)?;
    let deep = DeepQuery::new(&invoker)
        .with_segmentation(settings.segmentation())
        .with_consolidation(settings.consolidation())
        .with_options(engine_options);
    let options = ExpansionOptions {
        min_seeds: settings.expand.min_seeds,
        record,
    };

    let outcome = discover(&deep, &seeds, &mut known_store, &options)?;
    let all_failed = outcome.failures.len() == seeds.len();
    let report = ExpansionReport::new(stem, seed_dir, &seeds.seeds, parameters, outcome);

    if let Some(path) = report_path {
        report.write_json(path)?;
    }
    if json {
        print_json(&report);
    } else {
        print_expansion(&report.stem, &report.results, &report.failures);
    }

    if all_failed {
        bail!("every seed failed to query");
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[derive(Serialize)]
struct DatabaseFile {
    name: String,
    size_bytes: u64,
    modified: Option<chrono::DateTime<chrono::Local>>,
}

fn list_databases(settings: &Settings, json: bool) -> Result<()> {
    let cache = settings.db_dir().join("olaf_cache");
    let mut files = Vec::new();
    if cache.is_dir() {
        for entry in std::fs::read_dir(&cache)
            .with_context(|| format!("Failed to read {}", cache.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tdb") {
                continue;
            }
            let metadata = std::fs::metadata(&path)?;
            files.push(DatabaseFile {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(chrono::DateTime::from),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    let manifest = ManifestStore::load_or_empty(settings.manifest_path());

    if json {
        print_json(&serde_json::json!({
            "database_dir": cache.display().to_string(),
            "files": files,
            "manifest_entries": manifest.len(),
        }));
        return Ok(());
    }

    if files.is_empty() {
        println!("No database files in {}", cache.display());
    } else {
        println!("{}:", cache.display());
        for file in &files {
            let modified = file
                .modified
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<32} {:>12} bytes  {}", file.name, file.size_bytes, modified);
        }
    }
    println!(
        "Manifest {}: {} indexed file(s)",
        manifest.path().display(),
        manifest.len()
    );
    Ok(())
}

#[derive(Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    required: bool,
    detail: String,
}

impl Check {
    fn new(name: &'static str, required: bool, result: Result<String, String>) -> Self {
        let (ok, detail) = match result {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        Self {
            name,
            ok,
            required,
            detail,
        }
    }
}

fn verify(settings: &Settings, json: bool) -> Result<()> {
    let checks = vec![
        Check::new("java", true, program_version(&settings.engine.java, "-version")),
        Check::new(
            "panako jar",
            true,
            find_jar(&settings.panako_dir())
                .map(|jar| jar.display().to_string())
                .ok_or_else(|| {
                    format!(
                        "no panako-*-all.jar in {}",
                        settings.panako_dir().join("build").join("libs").display()
                    )
                }),
        ),
        Check::new("lmdb", true, find_lmdb(&settings.engine.library_paths)),
        Check::new("ffmpeg", false, program_version("ffmpeg", "-version")),
        Check::new("database dir", true, check_writable(&settings.db_dir())),
        Check::new(
            "manifest",
            true,
            ManifestStore::load(settings.manifest_path())
                .map(|m| format!("{} ({} entries)", m.path().display(), m.len()))
                .map_err(|e| e.to_string()),
        ),
    ];

    if json {
        print_json(&checks);
    } else {
        for check in &checks {
            let mark = match (check.ok, check.required) {
                (true, _) => "ok",
                (false, true) => "FAIL",
                (false, false) => "warn",
            };
            println!("[{:>4}] {:<13} {}", mark, check.name, check.detail);
        }
    }

    let failed: Vec<&str> = checks
        .iter()
        .filter(|c| c.required && !c.ok)
        .map(|c| c.name)
        .collect();
    if !failed.is_empty() {
        bail!("verification failed: {}", failed.join(", "));
    }
    Ok(())
}

/// First line of `<program> <flag>`; java prints its version on stderr.
fn program_version(program: &str, flag: &str) -> Result<String, String> {
    let output = Command::new(program)
        .arg(flag)
        .output()
        .map_err(|e| format!("{} not runnable: {}", program, e))?;
    if !output.status.success() {
        return Err(format!("{} {} exited with {}", program, flag, output.status));
    }
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

fn find_lmdb(candidates: &[String]) -> Result<String, String> {
    for dir in candidates.iter().map(|d| panako_core::settings::expand_tilde(d)) {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with("liblmdb") {
                return Ok(entry.path().display().to_string());
            }
        }
    }
    Err(format!("liblmdb not found in {}", candidates.join(", ")))
}

fn check_writable(dir: &Path) -> Result<String, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    tempfile::NamedTempFile::new_in(dir)
        .map(|_| dir.display().to_string())
        .map_err(|e| format!("{} is not writable: {}", dir.display(), e))
}
