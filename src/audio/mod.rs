//! Audio module.
//!
//! Provides WAV decoding for the sound loader and waveform augmentation.

pub mod augment;
pub mod wav;

// Re-export commonly used items
pub use augment::{augment_wave, pitch_shift, time_stretch};
pub use wav::{read_wav, write_wav};
