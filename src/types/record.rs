//! Record type: one fully assembled utterance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::array::Array;
use super::value::Field;

/// Record key holding the realized pitch shift as a one-element int array.
pub const PITCH_AUG_KEY: &str = "pitch_aug";

/// Record key holding the realized time factor as a one-element float array.
pub const TIME_AUG_KEY: &str = "time_aug";

/// Modality name → field, as handed to and returned by preprocessing.
pub type FieldMap = BTreeMap<String, Field>;

/// A per-utterance record: every modality plus the augmentation scalars.
///
/// Records are immutable once returned by the dataset and are shared through
/// the cache behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: FieldMap,
}

impl Record {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Borrows a plain array field.
    pub fn array(&self, name: &str) -> Option<&Array> {
        self.get(name).and_then(Field::as_array)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Realized pitch shift, read back from the `pitch_aug` field.
    pub fn pitch_aug(&self) -> Option<i64> {
        let a = self.array(PITCH_AUG_KEY)?;
        a.mean().map(|m| m.round() as i64)
    }

    /// Realized time factor, read back from the `time_aug` field.
    pub fn time_aug(&self) -> Option<f64> {
        self.array(TIME_AUG_KEY)?.mean()
    }

    /// Estimated memory footprint, used for cache accounting.
    pub fn nbytes(&self) -> usize {
        self.fields
            .iter()
            .map(|(k, v)| k.len() + v.nbytes())
            .sum()
    }

    pub fn into_fields(self) -> FieldMap {
        self.fields
    }
}
