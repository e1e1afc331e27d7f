//! Sample-rate conversion with rubato

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Resample mono `samples` from `from_rate` to `to_rate`.
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, samples.len(), 1)
            .map_err(|e| format!("failed to create resampler: {}", e))?;

    let waves_in = vec![samples.to_vec()];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| format!("resampling failed: {}", e))?;

    log::trace!(
        "Resampled {} samples at {} Hz to {} at {} Hz",
        samples.len(),
        from_rate,
        waves_out.first().map(Vec::len).unwrap_or(0),
        to_rate
    );
    Ok(waves_out.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_passthrough() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_to_target(&input, 16_000, 16_000).unwrap(), input);
    }

    #[test]
    fn test_downsample_length() {
        let input = vec![0.0f32; 44_100];
        let output = resample_to_target(&input, 44_100, 16_000).unwrap();
        // One second in, roughly one second out.
        assert!((output.len() as i64 - 16_000).abs() < 200, "got {}", output.len());
    }
}
