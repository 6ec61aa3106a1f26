//! Core data types for svs-dataset.
//!
//! - [`Array`]: element-typed n-dimensional arrays and precision tags
//! - [`Payload`] / [`Value`] / [`Field`]: what loaders, adapters and records hold
//! - [`Record`]: one assembled utterance

mod array;
mod record;
mod value;

pub use array::{Array, DType, DTypeKind, FloatPrecision, IntPrecision};
pub use record::{FieldMap, Record, PITCH_AUG_KEY, TIME_AUG_KEY};
pub use value::{Field, Interval, Payload, Value};
