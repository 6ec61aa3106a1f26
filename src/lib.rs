//! svs-dataset: multi-modal dataset engine for singing voice synthesis.
//!
//! Loads per-utterance audio, MIDI, phone labels, features and text from
//! two-column index files, applies one consistent pitch/time augmentation per
//! record, aligns every modality to a common length and optionally caches the
//! assembled records.
//!
//! # Modules
//!
//! - [`loader`]: Format loaders and the loader-type registry
//! - [`adapter`]: Normalization of loader payloads into values
//! - [`sampler`]: Augmentation parameter sampling
//! - [`dataset`]: Record assembly (SvsDataset)
//! - [`cache`]: Bounded record caches (SizedCache, SharedCache)
//! - [`config`]: Dataset configuration (DatasetConfig)
//! - [`error`]: Error types and codes (DatasetError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use svs_dataset::{DatasetConfig, ModalitySpec, SvsDataset};
//!
//! let config = DatasetConfig {
//!     max_cache_size: svs_dataset::config::parse_size("1GB").unwrap_or(0),
//!     ..Default::default()
//! };
//! let dataset = SvsDataset::new(
//!     vec![
//!         ModalitySpec::new("dump/wav.scp", "input", "sound"),
//!         ModalitySpec::new("dump/label", "output", "duration"),
//!     ],
//!     None,
//!     &config,
//! )?;
//! let (id, record) = dataset.get_record(0usize)?;
//! ```

pub mod adapter;
pub mod audio;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod sampler;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use cache::{RecordCache, SharedCache, SizedCache};
pub use config::{CacheMode, DatasetConfig, Mode, PitchMeanTarget};
pub use dataset::{ModalitySpec, Preprocessor, RecordKey, SvsDataset};
pub use error::{DatasetError, ErrorCode, Result};
pub use loader::Augment;
pub use types::{Array, Field, FieldMap, Record};
