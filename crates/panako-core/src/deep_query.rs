//! Segmented query of a long recording
//!
//! The source is decoded once, cut into overlapping windows, and each window
//! is written to a scratch WAV and queried on its own. Hits are consolidated
//! per matched file.

use crate::consolidation::{consolidate, ConsolidatedMatch, ConsolidationOptions, SegmentHit};
use crate::error::{CoreError, Result};
use crate::media::{is_scratch_path, SegmentWriter};
use crate::segmentation::{segment, Segment, SegmentationConfig};
use panako_engine::{EngineBackend, EngineInvoker, EngineOp, EngineOptions, MatchRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepQueryReport {
    pub source: PathBuf,
    /// Decoded length in seconds
    pub duration: f64,
    pub segments: Vec<Segment>,
    pub matches: Vec<ConsolidatedMatch>,
    /// Raw records per segment, in segment order
    pub hits: Vec<SegmentHit>,
}

pub struct DeepQuery<'a, B> {
    invoker: &'a EngineInvoker<B>,
    segmentation: SegmentationConfig,
    consolidation: ConsolidationOptions,
    options: EngineOptions,
}

impl<'a, B: EngineBackend> DeepQuery<'a, B> {
    pub fn new(invoker: &'a EngineInvoker<B>) -> Self {
        Self {
            invoker,
            segmentation: SegmentationConfig::default(),
            consolidation: ConsolidationOptions::default(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.segmentation = segmentation;
        self
    }

    pub fn with_consolidation(mut self, consolidation: ConsolidationOptions) -> Self {
        self.consolidation = consolidation;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn segmentation(&self) -> &SegmentationConfig {
        &self.segmentation
    }

    pub fn consolidation(&self) -> &ConsolidationOptions {
        &self.consolidation
    }

    /// Query `path` segment by segment. The first failing segment aborts.
    pub fn run(&self, path: &Path) -> Result<DeepQueryReport> {
        self.segmentation.validate()?;
        if self.consolidation.min_segments == 0 {
            return Err(CoreError::configuration("min_segments must be at least 1"));
        }
        if !path.is_file() {
            return Err(CoreError::configuration(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let source = path.canonicalize().map_err(|e| CoreError::io(path, e))?;
        let source_key = source.display().to_string();

        let writer = SegmentWriter::new(&source)?;
        let duration = writer.duration();
        self.segmentation.check_duration(&source, duration)?;
        let segments = segment(duration, &self.segmentation)?;
        log::info!(
            "{}: {:.1}s in {} segment(s) of {}s, {}s overlap",
            source.display(),
            duration,
            segments.len(),
            self.segmentation.segment_length,
            self.segmentation.overlap
        );
        log::debug!("Segment scratch directory: {}", writer.scratch_dir().display());

        let mut hits = Vec::with_capacity(segments.len());
        let matches = consolidate(
            &segments,
            |seg: &Segment| -> Result<Vec<MatchRecord>> {
                log::info!(
                    "Segment {}/{} ({:.1}s-{:.1}s)",
                    seg.index + 1,
                    segments.len(),
                    seg.start,
                    seg.end
                );
                let seg_path = writer.write(seg)?;
                let records: Vec<_> = self
                    .invoker
                    .invoke(EngineOp::Query, &seg_path, &self.options)?
                    .into_iter()
                    .filter(|r| r.matched_path != source_key && !is_scratch_path(&r.matched_path))
                    .collect();
                if let Err(e) = std::fs::remove_file(&seg_path) {
                    log::debug!("Could not remove {}: {}", seg_path.display(), e);
                }
                hits.push(SegmentHit {
                    segment: *seg,
                    records: records.clone(),
                });
                Ok(records)
            },
            &self.consolidation,
        )?;

        Ok(DeepQueryReport {
            source,
            duration,
            segments,
            matches,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panako_engine::{EngineError, EngineRequest, LineStream, RawOutput};
    use std::cell::RefCell;
    use std::time::Duration;

    /// Answers each segment query from a per-segment script.
    struct SegmentEngine {
        source: RefCell<String>,
        calls: RefCell<usize>,
        fail_at: Option<usize>,
    }

    impl EngineBackend for SegmentEngine {
        fn execute(
            &self,
            request: &EngineRequest,
            _timeout: Option<Duration>,
        ) -> std::result::Result<RawOutput, EngineError> {
            let index = *self.calls.borrow();
            *self.calls.borrow_mut() += 1;
            if self.fail_at == Some(index) {
                return Ok(RawOutput {
                    success: false,
                    status: "exit status: 1".to_string(),
                    ..RawOutput::default()
                });
            }

            let query = request
                .target
                .as_ref()
                .map(|t| t.display().to_string())
                .unwrap_or_default();
            let source = self.source.borrow().clone();
            let mut stdout = String::from("Panako query results\n");
            // Every segment hits the source itself and the scratch file.
            stdout += &format!("0;3;{q};0;10;{s};1;0;10;99;100;100\n", q = query, s = source);
            stdout += &format!("1;3;{q};0;10;/tmp/panako_deep_zz/segment_0000.wav;2;0;10;99;100;100\n", q = query);
            match index {
                0 | 1 => {
                    let start = index as f64 * 13.0;
                    stdout += &format!(
                        "2;3;{q};0;10;/db/cover.wav;3;{a};{b};20;100;100\n",
                        q = query,
                        a = start,
                        b = start + 15.0
                    );
                }
                _ => {
                    stdout += &format!("2;3;{q};0;10;/db/other.wav;4;5;9;40;100;100\n", q = query);
                }
            }
            Ok(RawOutput {
                stdout,
                success: true,
                status: "exit status: 0".to_string(),
                ..RawOutput::default()
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
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(16_000 * seconds) {
            writer.write_sample(((i * 7) % 3000) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn engine(fail_at: Option<usize>) -> SegmentEngine {
        SegmentEngine {
            source: RefCell::new(String::new()),
            calls: RefCell::new(0),
            fail_at,
        }
    }

    #[test]
    fn test_deep_query_consolidates_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 40);

        let backend = engine(None);
        *backend.source.borrow_mut() = path.canonicalize().unwrap().display().to_string();
        let invoker = EngineInvoker::new(&backend);
        let report = DeepQuery::new(&invoker).run(&path).unwrap();

        // 0-15, 13-28, 26-40
        assert_eq!(report.segments.len(), 3);
        assert_eq!(report.hits.len(), 3);
        assert_eq!(report.matches.len(), 2);

        let cover = &report.matches[0];
        assert_eq!(cover.matched_path, "/db/cover.wav");
        assert_eq!(cover.segment_count, 2);
        assert_eq!(cover.total_segments, 3);
        assert_eq!(cover.time_ranges.len(), 1);
        assert_eq!(report.matches[1].matched_path, "/db/other.wav");
        assert!(report.hits.iter().all(|h| h.records.len() == 1));
    }

    #[test]
    fn test_min_segments_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 40);

        let backend = engine(None);
        let invoker = EngineInvoker::new(&backend);
        let report = DeepQuery::new(&invoker)
            .with_consolidation(ConsolidationOptions {
                min_segments: 2,
                ..ConsolidationOptions::default()
            })
            .run(&path)
            .unwrap();
        assert!(report
            .matches
            .iter()
            .all(|m| m.matched_path != "/db/other.wav"));
    }

    #[test]
    fn test_failing_segment_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 40);

        let backend = engine(Some(1));
        let invoker = EngineInvoker::new(&backend);
        let err = DeepQuery::new(&invoker).run(&path).unwrap_err();
        assert!(matches!(err, CoreError::Engine(EngineError::ProcessFailure { .. })));
        assert_eq!(*backend.calls.borrow(), 2);
    }

    #[test]
    fn test_short_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blip.wav");
        write_wav(&path, 2);

        let backend = engine(None);
        let invoker = EngineInvoker::new(&backend);
        let err = DeepQuery::new(&invoker).run(&path).unwrap_err();
        assert!(matches!(err, CoreError::TooShort { .. }));
        assert_eq!(*backend.calls.borrow(), 0);
    }

    #[test]
    fn test_bad_overlap_is_rejected_before_decoding() {
        let backend = engine(None);
        let invoker = EngineInvoker::new(&backend);
        let err = DeepQuery::new(&invoker)
            .with_segmentation(SegmentationConfig::new(10.0, 10.0))
            .run(Path::new("/nonexistent.wav"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
