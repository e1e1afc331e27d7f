//! Temporary per-segment WAV files for deep queries

use super::{decode_audio, AudioData, TARGET_SAMPLE_RATE};
use crate::error::{CoreError, Result};
use crate::segmentation::Segment;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of scratch directories holding segment files
pub const SCRATCH_PREFIX: &str = "panako_deep_";
const SEGMENT_PREFIX: &str = "segment_";

/// Whether an engine-reported path lies in one of our scratch directories
pub fn is_scratch_path(path: &str) -> bool {
    path.contains(&format!("/{}", SCRATCH_PREFIX))
}

/// Decodes a source file once and writes segments of it on demand.
///
/// The scratch directory and everything in it is removed on drop.
pub struct SegmentWriter {
    audio: AudioData,
    dir: TempDir,
}

impl SegmentWriter {
    pub fn new(source: &Path) -> Result<Self> {
        let audio = decode_audio(source)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(|e| CoreError::io(std::env::temp_dir(), e))?;

        Ok(Self { audio, dir })
    }

    /// Length of the decoded source in seconds
    pub fn duration(&self) -> f64 {
        self.audio.duration()
    }

    pub fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write `segment` as a 16 kHz mono 16-bit WAV and return its path.
    pub fn write(&self, segment: &Segment) -> Result<PathBuf> {
        let rate = f64::from(TARGET_SAMPLE_RATE);
        let total = self.audio.samples.len();
        let start = ((segment.start * rate) as usize).min(total);
        let end = ((segment.end * rate).ceil() as usize).clamp(start, total);

        let path = self
            .dir
            .path()
            .join(format!("{}{:04}.wav", SEGMENT_PREFIX, segment.index));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let write = || -> std::result::Result<(), hound::Error> {
            let mut writer = hound::WavWriter::create(&path, spec)?;
            for &sample in &self.audio.samples[start..end] {
                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                writer.write_sample(value)?;
            }
            writer.finalize()
        };
        write().map_err(|e| CoreError::media(&path, e))?;

        Ok(path)
    }
}
