//! Waveform pitch shifting and time stretching.
//!
//! Time stretching is a windowed overlap-add (OLA) that changes duration and
//! keeps pitch. Pitch shifting stretches by `2^(n/12)` and resamples back to
//! the original length with rubato, which keeps duration and moves pitch.

use std::f32::consts::PI;

use ndarray::{Array1, Array2, ArrayD, Axis};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{DatasetError, ErrorCode, Result};
use crate::loader::Augment;

/// OLA analysis/synthesis frame length in samples.
pub const FRAME_LEN: usize = 1024;

/// OLA synthesis hop in samples (75% overlap).
pub const SYNTHESIS_HOP: usize = 256;

/// Applies `augment` to a waveform of shape `[samples]` or `[samples, channels]`.
///
/// Pitch is shifted first, then duration is stretched by the time factor.
pub fn augment_wave(wave: &ArrayD<f32>, augment: Augment) -> Result<ArrayD<f32>> {
    if augment.is_identity() {
        return Ok(wave.clone());
    }

    let apply = |channel: Vec<f32>| -> Result<Vec<f32>> {
        let shifted = pitch_shift(&channel, augment.pitch_shift)?;
        Ok(time_stretch(&shifted, augment.time_factor))
    };

    match wave.ndim() {
        0 => Ok(wave.clone()),
        1 => Ok(Array1::from_vec(apply(wave.iter().copied().collect())?).into_dyn()),
        _ => {
            let channels = wave
                .axis_iter(Axis(1))
                .map(|c| apply(c.iter().copied().collect()))
                .collect::<Result<Vec<_>>>()?;
            let frames = channels.first().map_or(0, Vec::len);
            let out = Array2::from_shape_fn((frames, channels.len()), |(i, c)| channels[c][i]);
            Ok(out.into_dyn())
        }
    }
}

/// Shifts pitch by `semitones` while keeping the number of samples.
pub fn pitch_shift(samples: &[f32], semitones: i32) -> Result<Vec<f32>> {
    if semitones == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let ratio = 2f64.powf(semitones as f64 / 12.0);
    let stretched = time_stretch(samples, ratio);
    resample_to(&stretched, samples.len())
}

/// Scales duration by `factor` (1.1 is 10% longer) keeping pitch.
pub fn time_stretch(samples: &[f32], factor: f64) -> Vec<f32> {
    let out_len = (samples.len() as f64 * factor).round() as usize;
    if (factor - 1.0).abs() < f64::EPSILON || samples.is_empty() {
        return samples.to_vec();
    }
    if samples.len() < FRAME_LEN {
        return fit_length(linear_resize(samples, out_len), out_len);
    }

    let window = hann(FRAME_LEN);
    let analysis_hop = SYNTHESIS_HOP as f64 / factor;
    let mut out = vec![0f32; out_len + FRAME_LEN];
    let mut norm = vec![0f32; out_len + FRAME_LEN];

    let mut frame = 0usize;
    loop {
        let out_pos = frame * SYNTHESIS_HOP;
        if out_pos >= out_len {
            break;
        }
        let in_pos = (frame as f64 * analysis_hop).round() as usize;
        for (i, w) in window.iter().enumerate() {
            let s = samples.get(in_pos + i).copied().unwrap_or(0.0);
            out[out_pos + i] += s * w;
            norm[out_pos + i] += w;
        }
        frame += 1;
    }

    for (o, n) in out.iter_mut().zip(&norm) {
        if *n > 1e-3 {
            *o /= n;
        }
    }
    out.truncate(out_len);
    out
}

/// Resamples to exactly `target` samples with a sinc resampler.
fn resample_to(samples: &[f32], target: usize) -> Result<Vec<f32>> {
    if target == samples.len() {
        return Ok(samples.to_vec());
    }
    if samples.len() < 2 || target < 2 {
        return Ok(fit_length(samples.to_vec(), target));
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        target as f64 / samples.len() as f64,
        1.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| DatasetError::with_source(ErrorCode::DecodeFailed, "resampler setup failed", e))?;
    let delay = resampler.output_delay();

    let waves_in = vec![samples.to_vec()];
    let mut out = resampler
        .process(&waves_in, None)
        .map_err(|e| DatasetError::with_source(ErrorCode::DecodeFailed, "resampling failed", e))?
        .into_iter()
        .next()
        .unwrap_or_default();
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| DatasetError::with_source(ErrorCode::DecodeFailed, "resampling failed", e))?;
    out.extend(tail.into_iter().next().unwrap_or_default());

    let out: Vec<f32> = out.into_iter().skip(delay).collect();
    Ok(fit_length(out, target))
}

/// Linear interpolation to `target` samples, for signals shorter than a frame.
fn linear_resize(samples: &[f32], target: usize) -> Vec<f32> {
    if samples.len() < 2 || target < 2 {
        return fit_length(samples.to_vec(), target);
    }
    let scale = (samples.len() - 1) as f64 / (target - 1) as f64;
    (0..target)
        .map(|i| {
            let pos = i as f64 * scale;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(samples.len() - 1);
            let frac = (pos - lo as f64) as f32;
            samples[lo] * (1.0 - frac) + samples[hi] * frac
        })
        .collect()
}

fn fit_length(mut samples: Vec<f32>, target: usize) -> Vec<f32> {
    samples.resize(target, 0.0);
    samples
}

fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}
