//! Symphonia-backed decoding for formats without a native decoder

use super::AudioData;
use crate::error::{CoreError, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

fn open(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| CoreError::media(path, format!("unrecognised format: {}", e)))?;
    Ok(probed.format)
}

/// Duration from the first audio track's frame count, if the container has one.
pub(super) fn probe_container_duration(path: &Path) -> Option<f64> {
    let format = open(path).ok()?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)?;
    let frames = track.codec_params.n_frames?;
    let rate = track.codec_params.sample_rate?;
    Some(frames as f64 / f64::from(rate))
}

/// Decode the first audio track to interleaved f32.
pub(super) fn decode_container(path: &Path) -> Result<AudioData> {
    let mut format = open(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CoreError::media(path, "no audio track"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CoreError::media(path, format!("no decoder: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(CoreError::media(path, format!("error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(CoreError::media(path, e)),
        };

        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        if channels == 0 {
            channels = decoded.spec().channels.count() as u16;
        }
        append_interleaved(&decoded, &mut samples)
            .ok_or_else(|| CoreError::media(path, "unsupported sample format"))?;
    }

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

fn append_interleaved(decoded: &AudioBufferRef<'_>, out: &mut Vec<f32>) -> Option<()> {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let buf = $buf;
            let count = buf.spec().channels.count();
            for frame in 0..buf.frames() {
                for ch in 0..count {
                    out.push($convert(buf.chan(ch)[frame]));
                }
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| f32::from(s) / i16::MAX as f32),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (f32::from(s) - 128.0) / 128.0),
        _ => return None,
    }
    Some(())
}
