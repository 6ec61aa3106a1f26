//! Values flowing from loaders through adapters into records.
//!
//! A native loader returns a [`Payload`], whose shape depends on the storage
//! format (a `(rate, wave)` tuple for audio, interval lists for labels, ...).
//! Adapters normalize payloads into a [`Value`], and the dataset turns values
//! into record [`Field`]s.

use std::ops::Range;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::array::{Array, FloatPrecision, IntPrecision};
use crate::error::{DatasetError, Result};

/// One phone interval from a label index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f32,
    pub end: f32,
    pub phone: String,
}

/// Native, format-specific return value of a loader.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Number(f64),
    Int(i64),
    Array(Array),
    Text(String),
    Intervals(Vec<Interval>),
    Tuple(Vec<Payload>),
}

impl Payload {
    /// Short name of the payload kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Number(_) => "number",
            Payload::Int(_) => "int",
            Payload::Array(_) => "array",
            Payload::Text(_) => "text",
            Payload::Intervals(_) => "intervals",
            Payload::Tuple(_) => "tuple",
        }
    }
}

/// Normalized adapter output, the uniform value contract of every modality.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(Array),
    /// Two arrays sharing a time axis, e.g. MIDI notes and tempo.
    Pair(Array, Array),
    /// Phone intervals as a float32 `[n, 2]` array plus `n` phone symbols.
    Labels { intervals: Array, phones: Vec<String> },
    Text(String),
    Number(f64),
}

impl Value {
    /// Converts interval triples into the `Labels` form.
    pub fn from_intervals(intervals: &[Interval]) -> Self {
        let mut times = Array2::<f32>::zeros((intervals.len(), 2));
        let mut phones = Vec::with_capacity(intervals.len());
        for (i, interval) in intervals.iter().enumerate() {
            times[[i, 0]] = interval.start;
            times[[i, 1]] = interval.end;
            phones.push(interval.phone.clone());
        }
        Value::Labels {
            intervals: Array::F32(times.into_dyn()),
            phones,
        }
    }
}

impl From<Value> for Field {
    /// Numbers become one-element arrays; everything else maps one to one.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(a) => Field::Array(a),
            Value::Pair(a, b) => Field::Pair(a, b),
            Value::Labels { intervals, phones } => Field::Labels { intervals, phones },
            Value::Text(t) => Field::Text(t),
            Value::Number(n) => Field::Array(Array::from_f64(vec![n])),
        }
    }
}

/// One modality's entry in a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Field {
    Array(Array),
    Pair(Array, Array),
    Labels { intervals: Array, phones: Vec<String> },
    Text(String),
}

impl Field {
    /// Leading (time) length. For text this is the number of characters.
    pub fn len(&self) -> usize {
        match self {
            Field::Array(a) | Field::Pair(a, _) => a.len(),
            Field::Labels { intervals, .. } => intervals.len(),
            Field::Text(t) => t.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns rows `range` of every member.
    pub fn slice_rows(&self, range: Range<usize>) -> Field {
        match self {
            Field::Array(a) => Field::Array(a.slice_rows(clamp(range, a.len()))),
            Field::Pair(a, b) => Field::Pair(
                a.slice_rows(clamp(range.clone(), a.len())),
                b.slice_rows(clamp(range, b.len())),
            ),
            Field::Labels { intervals, phones } => {
                let range = clamp(range, phones.len().min(intervals.len()));
                Field::Labels {
                    intervals: intervals.slice_rows(range.clone()),
                    phones: phones[range].to_vec(),
                }
            }
            Field::Text(t) => Field::Text(t.chars().skip(range.start).take(range.len()).collect()),
        }
    }

    /// Keeps only the first `len` rows of every member.
    pub fn truncate(&self, len: usize) -> Field {
        self.slice_rows(0..len.min(self.len()))
    }

    /// Zeroes rows `range` of every numeric member. Phone symbols and text are
    /// left untouched.
    pub fn zero_rows(&mut self, range: Range<usize>) {
        match self {
            Field::Array(a) => a.zero_rows(clamp(range, a.len())),
            Field::Pair(a, b) => {
                a.zero_rows(clamp(range.clone(), a.len()));
                b.zero_rows(clamp(range, b.len()));
            }
            Field::Labels { intervals, .. } => {
                let len = intervals.len();
                intervals.zero_rows(clamp(range, len))
            }
            Field::Text(_) => {}
        }
    }

    /// Casts every array member to the target precisions. Text cannot be
    /// cast and must have been encoded by preprocessing.
    pub fn cast(&self, name: &str, float: FloatPrecision, int: IntPrecision) -> Result<Field> {
        Ok(match self {
            Field::Array(a) => Field::Array(a.cast(name, float, int)?),
            Field::Pair(a, b) => Field::Pair(a.cast(name, float, int)?, b.cast(name, float, int)?),
            Field::Labels { intervals, phones } => Field::Labels {
                intervals: intervals.cast(name, float, int)?,
                phones: phones.clone(),
            },
            Field::Text(_) => {
                return Err(DatasetError::unexpected_value(format!(
                    "All values must be converted to arrays by preprocessing, but \"{}\" is still text",
                    name
                )))
            }
        })
    }

    /// Estimated memory footprint in bytes.
    pub fn nbytes(&self) -> usize {
        match self {
            Field::Array(a) => a.nbytes(),
            Field::Pair(a, b) => a.nbytes() + b.nbytes(),
            Field::Labels { intervals, phones } => {
                intervals.nbytes() + phones.iter().map(String::len).sum::<usize>()
            }
            Field::Text(t) => t.len(),
        }
    }

    /// Borrows the array if this is a plain array field.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Field::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Short description such as `float32[120, 80]`, used by the inspector.
    pub fn describe(&self) -> String {
        fn one(a: &Array) -> String {
            format!("{}{:?}", a.dtype(), a.shape())
        }
        match self {
            Field::Array(a) => one(a),
            Field::Pair(a, b) => format!("({}, {})", one(a), one(b)),
            Field::Labels { intervals, phones } => {
                format!("labels {} x {} phones", one(intervals), phones.len())
            }
            Field::Text(t) => format!("text({} chars)", t.chars().count()),
        }
    }
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    range.start.min(len)..range.end.min(len)
}
