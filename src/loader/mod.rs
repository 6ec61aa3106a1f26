//! Native format loaders.
//!
//! A loader is a read-only, key-addressable view over one on-disk index.
//! Each storage format has its own loader returning a format-specific
//! [`Payload`]; the [`registry`] resolves a loader-type tag to the right one.

pub mod fd_cache;
pub mod index;
pub mod kaldi;
pub mod label;
pub mod midi;
pub mod npy;
pub mod random;
pub mod registry;
pub mod sound;
pub mod text;

use crate::error::Result;
use crate::types::Payload;

pub use index::Index;
pub use registry::{build_adapter, describe_loader_types, resolve, BuildContext, LoaderKind};

/// Pitch and time augmentation requested for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augment {
    /// Shift in semitones.
    pub pitch_shift: i32,
    /// Duration multiplier; 1.0 keeps the original length.
    pub time_factor: f64,
}

impl Augment {
    pub const IDENTITY: Augment = Augment {
        pitch_shift: 0,
        time_factor: 1.0,
    };

    pub fn new(pitch_shift: i32, time_factor: f64) -> Self {
        Self {
            pitch_shift,
            time_factor,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.pitch_shift == 0 && (self.time_factor - 1.0).abs() < f64::EPSILON
    }
}

impl Default for Augment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A lookup: utterance id plus optional augmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Query<'a> {
    pub id: &'a str,
    pub augment: Option<Augment>,
}

impl<'a> Query<'a> {
    pub fn plain(id: &'a str) -> Self {
        Self { id, augment: None }
    }

    pub fn augmented(id: &'a str, augment: Augment) -> Self {
        Self {
            id,
            augment: Some(augment),
        }
    }

    /// Requested augmentation, identity when none was given.
    pub fn augment_or_identity(&self) -> Augment {
        self.augment.unwrap_or(Augment::IDENTITY)
    }
}

/// Read-only, key-addressable storage of one modality.
pub trait Loader: Send + Sync {
    /// Loads the native payload of one utterance.
    fn get(&self, query: &Query<'_>) -> Result<Payload>;

    /// Utterance ids in index order.
    fn keys(&self) -> &[String];

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}
