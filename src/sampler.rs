//! Augmentation parameter sampling.
//!
//! In training mode every record access draws one pitch shift and one time
//! factor, shared by all augmentation-sensitive modalities of that record.
//! Other modes always use the identity.

use rand::Rng;

use crate::config::{DatasetConfig, PitchMeanTarget};
use crate::error::{DatasetError, Result};
use crate::loader::Augment;

/// Draws [`Augment`] parameters from the configured ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentSampler {
    training: bool,
    pitch_min: i32,
    pitch_max: i32,
    pitch_mean: PitchMeanTarget,
    /// Inclusive bounds of the time factor in hundredths.
    time_min: i64,
    time_max: i64,
}

impl AugmentSampler {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            training: config.mode.is_training(),
            pitch_min: config.pitch_aug_min,
            pitch_max: config.pitch_aug_max,
            pitch_mean: config.pitch_mean.clone(),
            time_min: (config.time_aug_min * 100.0).round() as i64,
            time_max: (config.time_aug_max * 100.0).round() as i64,
        }
    }

    /// Whether draws happen at all.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Whether [`sample`](Self::sample) needs the utterance's mean note value.
    pub fn needs_note_mean(&self) -> bool {
        self.training && self.pitch_mean.is_enabled()
    }

    /// Draws the augmentation of one record.
    ///
    /// `note_mean` is the mean of the utterance's note sequence at identity
    /// augmentation; it is only read when a pitch-mean target is configured.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        id: &str,
        note_mean: Option<f64>,
        rng: &mut R,
    ) -> Result<Augment> {
        if !self.training {
            return Ok(Augment::IDENTITY);
        }
        let pitch_shift = self.sample_pitch(id, note_mean, rng)?;
        let time_factor = self.sample_time(rng);
        Ok(Augment::new(pitch_shift, time_factor))
    }

    fn sample_pitch<R: Rng + ?Sized>(
        &self,
        id: &str,
        note_mean: Option<f64>,
        rng: &mut R,
    ) -> Result<i32> {
        match self.pitch_mean.target_for(id)? {
            None => Ok(rng.gen_range(self.pitch_min..=self.pitch_max)),
            Some(target) => {
                let mean = note_mean.ok_or_else(|| {
                    DatasetError::invalid_config("pitch_mean requires a midi modality")
                })?;
                let gap = (target - mean).trunc() as i32;
                Ok(if gap < 0 {
                    rng.gen_range(gap..=0)
                } else {
                    rng.gen_range(0..=gap)
                })
            }
        }
    }

    /// Uniform choice from `{min, min + 0.01, ..., max}`.
    fn sample_time<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.time_min..=self.time_max) as f64 / 100.0
    }
}
