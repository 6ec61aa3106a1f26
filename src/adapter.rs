//! Adapters normalizing native loader payloads into [`Value`]s.
//!
//! Every modality of a dataset is an [`Adapter`]: the dataset never sees the
//! format-specific tuple shapes returned by loaders.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{DatasetError, Result};
use crate::loader::{Loader, Query};
use crate::types::{Array, FloatPrecision, Payload, Value};

/// Key-addressable source of normalized per-utterance values.
pub trait Adapter: Send + Sync {
    fn get(&self, query: &Query<'_>) -> Result<Value>;

    /// Utterance ids in index order.
    fn keys(&self) -> &[String];

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Whether queries should carry the sampled pitch/time augmentation.
    fn is_augmentable(&self) -> bool {
        false
    }
}

/// Audio adapter: keeps the wave of a `(rate, wave)` payload.
///
/// The rate may come first or last. The first rate seen is remembered and
/// every later payload must report the same one.
pub struct SoundAdapter {
    loader: Box<dyn Loader>,
    dtype: Option<FloatPrecision>,
    augmentable: bool,
    /// 0 until the first payload.
    rate: AtomicU32,
}

impl SoundAdapter {
    /// Wraps an audio loader; queries carry augmentation.
    pub fn new(loader: Box<dyn Loader>, dtype: Option<FloatPrecision>) -> Self {
        Self {
            loader,
            dtype,
            augmentable: true,
            rate: AtomicU32::new(0),
        }
    }

    /// Wraps a feature loader returning bare arrays; queries are plain.
    pub fn features(loader: Box<dyn Loader>, dtype: Option<FloatPrecision>) -> Self {
        Self {
            augmentable: false,
            ..Self::new(loader, dtype)
        }
    }

    /// Sampling rate seen so far, if any.
    pub fn rate(&self) -> Option<u32> {
        match self.rate.load(Ordering::Acquire) {
            0 => None,
            rate => Some(rate),
        }
    }

    fn check_rate(&self, rate: i64) -> Result<()> {
        let rate = u32::try_from(rate)
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| DatasetError::unexpected_value(format!("invalid sampling rate {}", rate)))?;
        match self
            .rate
            .compare_exchange(0, rate, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(seen) if seen == rate => Ok(()),
            Err(seen) => Err(DatasetError::sample_rate_mismatch(seen, rate)),
        }
    }

    fn cast(&self, array: Array) -> Array {
        match self.dtype {
            Some(precision) => array.to_float(precision),
            None => array,
        }
    }
}

impl Adapter for SoundAdapter {
    fn get(&self, query: &Query<'_>) -> Result<Value> {
        let wave = match self.loader.get(query)? {
            Payload::Tuple(items) => match <[Payload; 2]>::try_from(items) {
                Ok([Payload::Int(rate), Payload::Array(wave)])
                | Ok([Payload::Array(wave), Payload::Int(rate)]) => {
                    self.check_rate(rate)?;
                    wave
                }
                Ok([a, b]) => {
                    return Err(DatasetError::unexpected_value(format!(
                        "Unexpected type: ({}, {})",
                        a.kind(),
                        b.kind()
                    )))
                }
                Err(items) => {
                    return Err(DatasetError::unexpected_value(format!(
                        "expected a (rate, wave) pair, got {} elements",
                        items.len()
                    )))
                }
            },
            Payload::Array(array) => array,
            other => {
                return Err(DatasetError::unexpected_value(format!(
                    "expected audio or feature array, got {}",
                    other.kind()
                )))
            }
        };
        Ok(Value::Array(self.cast(wave)))
    }

    fn keys(&self) -> &[String] {
        self.loader.keys()
    }

    fn is_augmentable(&self) -> bool {
        self.augmentable
    }
}

/// MIDI adapter: requires exactly a `(note_seq, tempo_seq)` array pair.
pub struct MidiAdapter {
    loader: Box<dyn Loader>,
}

impl MidiAdapter {
    pub fn new(loader: Box<dyn Loader>) -> Self {
        Self { loader }
    }
}

impl Adapter for MidiAdapter {
    fn get(&self, query: &Query<'_>) -> Result<Value> {
        match self.loader.get(query)? {
            Payload::Tuple(items) => match <[Payload; 2]>::try_from(items) {
                Ok([Payload::Array(notes), Payload::Array(tempo)]) => Ok(Value::Pair(notes, tempo)),
                Ok([a, b]) => Err(DatasetError::unexpected_value(format!(
                    "Unexpected type: ({}, {})",
                    a.kind(),
                    b.kind()
                ))),
                Err(items) => Err(DatasetError::unexpected_value(format!(
                    "expected (note_seq, tempo_seq), got {} elements",
                    items.len()
                ))),
            },
            other => Err(DatasetError::unexpected_value(format!(
                "expected (note_seq, tempo_seq), got {}",
                other.kind()
            ))),
        }
    }

    fn keys(&self) -> &[String] {
        self.loader.keys()
    }

    fn is_augmentable(&self) -> bool {
        true
    }
}

/// Label adapter: phone intervals become a float32 `[n, 2]` array plus `n` phones.
pub struct LabelAdapter {
    loader: Box<dyn Loader>,
}

impl LabelAdapter {
    pub fn new(loader: Box<dyn Loader>) -> Self {
        Self { loader }
    }
}

impl Adapter for LabelAdapter {
    fn get(&self, query: &Query<'_>) -> Result<Value> {
        match self.loader.get(query)? {
            Payload::Intervals(intervals) => Ok(Value::from_intervals(&intervals)),
            other => Err(DatasetError::unexpected_value(format!(
                "expected phone intervals, got {}",
                other.kind()
            ))),
        }
    }

    fn keys(&self) -> &[String] {
        self.loader.keys()
    }
}

/// Pass-through adapter for arrays, text and numbers.
pub struct PlainAdapter {
    loader: Box<dyn Loader>,
    dtype: Option<FloatPrecision>,
}

impl PlainAdapter {
    pub fn new(loader: Box<dyn Loader>) -> Self {
        Self { loader, dtype: None }
    }

    /// Casts float arrays to `dtype` on the way out.
    pub fn with_dtype(loader: Box<dyn Loader>, dtype: FloatPrecision) -> Self {
        Self {
            loader,
            dtype: Some(dtype),
        }
    }
}

impl Adapter for PlainAdapter {
    fn get(&self, query: &Query<'_>) -> Result<Value> {
        match self.loader.get(query)? {
            Payload::Array(array) => Ok(Value::Array(match self.dtype {
                Some(precision) => array.to_float(precision),
                None => array,
            })),
            Payload::Text(text) => Ok(Value::Text(text)),
            Payload::Number(n) => Ok(Value::Number(n)),
            Payload::Int(n) => Ok(Value::Array(Array::from_i64(vec![n]))),
            Payload::Intervals(intervals) => Ok(Value::from_intervals(&intervals)),
            Payload::Tuple(items) => Err(DatasetError::unexpected_value(format!(
                "Must be an array, text or number: got a tuple of {}",
                items.len()
            ))),
        }
    }

    fn keys(&self) -> &[String] {
        self.loader.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::Interval;
    use std::collections::HashMap;

    /// In-memory loader returning canned payloads.
    struct Canned {
        keys: Vec<String>,
        payloads: HashMap<String, Payload>,
    }

    impl Canned {
        fn new(entries: Vec<(&str, Payload)>) -> Box<dyn Loader> {
            Box::new(Self {
                keys: entries.iter().map(|(k, _)| k.to_string()).collect(),
                payloads: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            })
        }
    }

    impl Loader for Canned {
        fn get(&self, query: &Query<'_>) -> Result<Payload> {
            self.payloads
                .get(query.id)
                .cloned()
                .ok_or_else(|| DatasetError::key_not_found(query.id, "canned"))
        }

        fn keys(&self) -> &[String] {
            &self.keys
        }
    }

    fn wave(rate: i64, rate_first: bool) -> Payload {
        let wave = Payload::Array(Array::from_f64(vec![0.1, 0.2]));
        if rate_first {
            Payload::Tuple(vec![Payload::Int(rate), wave])
        } else {
            Payload::Tuple(vec![wave, Payload::Int(rate)])
        }
    }

    #[test]
    fn sound_accepts_either_order_and_casts() {
        let adapter = SoundAdapter::new(
            Canned::new(vec![("a", wave(16000, true)), ("b", wave(16000, false))]),
            Some(FloatPrecision::Float32),
        );
        for id in ["a", "b"] {
            match adapter.get(&Query::plain(id)).unwrap() {
                Value::Array(a) => assert_eq!(a, Array::from_f32(vec![0.1, 0.2])),
                other => panic!("unexpected value {:?}", other),
            }
        }
        assert_eq!(adapter.rate(), Some(16000));
        assert!(adapter.is_augmentable());
    }

    #[test]
    fn sound_rate_mismatch_is_fatal() {
        let adapter = SoundAdapter::new(
            Canned::new(vec![("a", wave(16000, true)), ("b", wave(22050, true))]),
            None,
        );
        adapter.get(&Query::plain("a")).unwrap();
        let err = adapter.get(&Query::plain("b")).unwrap_err();
        assert_eq!(err.code, ErrorCode::SampleRateMismatch);
    }

    #[test]
    fn sound_rejects_odd_tuples() {
        let adapter = SoundAdapter::new(
            Canned::new(vec![(
                "a",
                Payload::Tuple(vec![Payload::Text("x".into()), Payload::Int(1)]),
            )]),
            None,
        );
        let err = adapter.get(&Query::plain("a")).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedValueType);
    }

    #[test]
    fn midi_requires_array_pair() {
        let good = Payload::Tuple(vec![
            Payload::Array(Array::from_i32(vec![60])),
            Payload::Array(Array::from_i32(vec![120])),
        ]);
        let bad = Payload::Tuple(vec![Payload::Array(Array::from_i32(vec![60]))]);
        let adapter = MidiAdapter::new(Canned::new(vec![("a", good), ("b", bad)]));
        assert!(matches!(adapter.get(&Query::plain("a")).unwrap(), Value::Pair(..)));
        assert_eq!(
            adapter.get(&Query::plain("b")).unwrap_err().code,
            ErrorCode::UnexpectedValueType
        );
    }

    #[test]
    fn label_converts_intervals() {
        let adapter = LabelAdapter::new(Canned::new(vec![(
            "a",
            Payload::Intervals(vec![Interval {
                start: 0.0,
                end: 0.3,
                phone: "a".into(),
            }]),
        )]));
        match adapter.get(&Query::plain("a")).unwrap() {
            Value::Labels { intervals, phones } => {
                assert_eq!(intervals.shape(), &[1, 2]);
                assert_eq!(phones, vec!["a"]);
            }
            other => panic!("unexpected value {:?}", other),
        }
        assert!(!adapter.is_augmentable());
    }

    #[test]
    fn plain_rejects_tuples() {
        let adapter = PlainAdapter::new(Canned::new(vec![("a", Payload::Tuple(vec![]))]));
        assert_eq!(
            adapter.get(&Query::plain("a")).unwrap_err().code,
            ErrorCode::UnexpectedValueType
        );
    }
}
