//! Sample-rate conversion helpers.
//!
//! The Capture Stage favors a cheap linear interpolation to stay inside the
//! real-time callback budget; the Worker Stage favors `rubato`'s
//! higher-quality sinc resampler when decoding TTS output to the playback
//! rate, since it is off the real-time path and can afford the cost.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

/// Cheap linear-interpolation resample, suitable for the capture callback.
pub fn linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = input.get(idx).copied().unwrap_or(0.0);
        let b = input.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Higher-quality sinc resample for decoded synthesis output.
pub fn sinc(input: &[f32], from_rate: u32, to_rate: u32) -> anyhow::Result<Vec<f32>> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        input.len(),
        1,
    )?;
    let waves_in = vec![input.to_vec()];
    let waves_out = resampler.process(&waves_in, None)?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_identity_when_rates_match() {
        let input = vec![1.0, 2.0, 3.0];
        assert_eq!(linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn linear_upsamples_to_expected_length() {
        let input = vec![0.0; 1000];
        let out = linear(&input, 16_000, 44_100);
        let expected = (1000.0 * 44_100.0 / 16_000.0).round() as usize;
        assert_eq!(out.len(), expected);
    }
}
