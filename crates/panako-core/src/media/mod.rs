//! Audio probing, decoding and segment extraction
//!
//! Native decoders handle WAV, MP3, FLAC and Ogg Vorbis; Symphonia covers
//! MP4/AAC containers and anything else it can probe. Everything is mixed to
//! mono and resampled to the engine's 16 kHz before segments are written out.

mod container;
mod decoder;
mod resample;
mod scan;
mod writer;

pub use decoder::{decode_audio, probe_duration, AudioData};
pub use resample::resample_to_target;
pub use scan::scan_audio_files;
pub use writer::{is_scratch_path, SegmentWriter, SCRATCH_PREFIX};

use std::path::Path;

/// Sample rate the engine fingerprints at
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Extensions treated as audio when scanning directories
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac", "wma"];

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    // Decoded through Symphonia
    M4a,
    Aac,
    Wma,

    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,
            Some("m4a") | Some("mp4") => AudioFormat::M4a,
            Some("aac") => AudioFormat::Aac,
            Some("wma") => AudioFormat::Wma,
            _ => AudioFormat::Unknown,
        }
    }
}

/// Whether `path` has one of the [`AUDIO_EXTENSIONS`]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
