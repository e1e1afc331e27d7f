//! Decoding to 16 kHz mono

use super::container::{decode_container, probe_container_duration};
use super::{resample_to_target, AudioFormat, TARGET_SAMPLE_RATE};
use crate::error::{CoreError, Result};
use std::path::Path;

/// Decoded audio data
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples in `-1.0..=1.0`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(usize::from(self.channels))
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// Decode `path` to mono at [`TARGET_SAMPLE_RATE`].
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    if !path.is_file() {
        return Err(CoreError::media(path, "file not found"));
    }

    let format = AudioFormat::from_path(path);
    let audio = match format {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        // Let Symphonia sniff anything else
        _ => decode_container(path)?,
    };

    if audio.sample_rate == 0 || audio.samples.is_empty() {
        return Err(CoreError::media(path, "no audio samples decoded"));
    }

    let mono = audio.to_mono();
    let samples = resample_to_target(&mono, audio.sample_rate, TARGET_SAMPLE_RATE)
        .map_err(|e| CoreError::media(path, e))?;

    log::debug!(
        "Decoded {} ({:?}, {} Hz, {} ch) to {} samples",
        path.display(),
        format,
        audio.sample_rate,
        audio.channels,
        samples.len()
    );

    Ok(AudioData {
        samples,
        sample_rate: TARGET_SAMPLE_RATE,
        channels: 1,
    })
}

/// Duration of `path` in seconds, read from headers where possible.
pub fn probe_duration(path: &Path) -> Result<f64> {
    if !path.is_file() {
        return Err(CoreError::media(path, "file not found"));
    }

    let from_header = match AudioFormat::from_path(path) {
        AudioFormat::Wav => hound::WavReader::open(path)
            .ok()
            .map(|reader| f64::from(reader.duration()) / f64::from(reader.spec().sample_rate)),
        AudioFormat::Flac => claxon::FlacReader::open(path).ok().and_then(|reader| {
            let info = reader.streaminfo();
            info.samples
                .map(|frames| frames as f64 / f64::from(info.sample_rate))
        }),
        _ => probe_container_duration(path),
    };

    match from_header {
        Some(duration) if duration > 0.0 => Ok(duration),
        _ => {
            log::debug!("No duration in header of {}, decoding", path.display());
            Ok(decode_audio(path)?.duration())
        }
    }
}

fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path).map_err(|e| CoreError::media(path, e))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| CoreError::media(path, e))?;

    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_mp3(path: &Path) -> Result<AudioData> {
    let data = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            // Junk between frames is common in tagged files
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(CoreError::media(path, format!("MP3 decode error: {}", e))),
        }
    }

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

fn decode_flac(path: &Path) -> Result<AudioData> {
    let mut reader = claxon::FlacReader::open(path).map_err(|e| CoreError::media(path, e))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;
    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CoreError::media(path, e))?;

    Ok(AudioData {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

fn decode_ogg(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mut reader =
        lewton::inside_ogg::OggStreamReader::new(file).map_err(|e| CoreError::media(path, e))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = u16::from(reader.ident_hdr.audio_channels);

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| CoreError::media(path, e))?
    {
        samples.extend(packet.iter().map(|&s| f32::from(s) / 32768.0));
    }

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}
