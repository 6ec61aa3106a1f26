//! WAV file I/O for the sound loader.
//!
//! Reads audio with the hound crate and normalizes integer PCM to [-1, 1].

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::{Array1, Array2, ArrayD};

use crate::error::{DatasetError, Result};

/// Reads a WAV file into a waveform and its sampling rate.
///
/// Mono files become a 1-D array of samples; multichannel files become a
/// `[samples, channels]` array.
pub fn read_wav(path: &Path) -> Result<(ArrayD<f32>, u32)> {
    let reader = WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => DatasetError::io(path.display(), io),
        other => DatasetError::decode_failed(format!("{}: {}", path.display(), other)),
    })?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let wave = if channels <= 1 {
        Array1::from_vec(samples).into_dyn()
    } else {
        let frames = samples.len() / channels;
        Array2::from_shape_vec((frames, channels), samples)
            .map_err(|e| DatasetError::decode_failed(format!("{}: {}", path.display(), e)))?
            .into_dyn()
    };

    Ok((wave, spec.sample_rate))
}

/// Writes interleaved f32 samples as a 32-bit float WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(())
}
