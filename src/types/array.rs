//! Element-typed n-dimensional arrays.
//!
//! Loaders produce arrays of whatever element type the file holds; the
//! dataset later casts every float array to the configured float precision
//! and every integer array to the configured integer precision.

use std::ops::Range;

use half::f16;
use ndarray::{Array1, ArrayD, Axis, Slice};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
    I32,
    I64,
    U8,
    Bool,
}

/// Broad element kind, matching numpy's `dtype.kind` letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Float,
    Int,
    Other,
}

impl DType {
    /// Returns the numpy-style name of the element type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::Bool => "bool",
        }
    }

    pub fn kind(&self) -> DTypeKind {
        match self {
            DType::F16 | DType::F32 | DType::F64 => DTypeKind::Float,
            DType::I32 | DType::I64 => DTypeKind::Int,
            DType::U8 | DType::Bool => DTypeKind::Other,
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 | DType::Bool => 1,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target precision for float arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FloatPrecision {
    Float16,
    #[default]
    Float32,
    Float64,
}

impl FloatPrecision {
    /// Parses a precision tag such as `float32`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "float16" | "half" => Some(FloatPrecision::Float16),
            "float32" | "float" => Some(FloatPrecision::Float32),
            "float64" | "double" => Some(FloatPrecision::Float64),
            _ => None,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            FloatPrecision::Float16 => DType::F16,
            FloatPrecision::Float32 => DType::F32,
            FloatPrecision::Float64 => DType::F64,
        }
    }
}

/// Target precision for integer arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntPrecision {
    Int32,
    /// `long` and `int` are accepted as aliases.
    #[default]
    #[serde(alias = "long", alias = "int")]
    Int64,
}

impl IntPrecision {
    /// Parses a precision tag such as `int64` or `long`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "int32" => Some(IntPrecision::Int32),
            "int64" | "long" | "int" => Some(IntPrecision::Int64),
            _ => None,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            IntPrecision::Int32 => DType::I32,
            IntPrecision::Int64 => DType::I64,
        }
    }
}

/// An n-dimensional array tagged with its element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "data", rename_all = "lowercase")]
pub enum Array {
    F16(ArrayD<f16>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    Bool(ArrayD<bool>),
}

/// Applies `$body` to the inner ndarray whatever its element type.
macro_rules! each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Array::F16($inner) => $body,
            Array::F32($inner) => $body,
            Array::F64($inner) => $body,
            Array::I32($inner) => $body,
            Array::I64($inner) => $body,
            Array::U8($inner) => $body,
            Array::Bool($inner) => $body,
        }
    };
}

/// Like `each_variant!` but rebuilds an `Array` of the same variant.
macro_rules! map_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Array::F16($inner) => Array::F16($body),
            Array::F32($inner) => Array::F32($body),
            Array::F64($inner) => Array::F64($body),
            Array::I32($inner) => Array::I32($body),
            Array::I64($inner) => Array::I64($body),
            Array::U8($inner) => Array::U8($body),
            Array::Bool($inner) => Array::Bool($body),
        }
    };
}

impl Array {
    /// One-dimensional float32 array.
    pub fn from_f32(values: Vec<f32>) -> Self {
        Array::F32(Array1::from_vec(values).into_dyn())
    }

    /// One-dimensional float64 array.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Array::F64(Array1::from_vec(values).into_dyn())
    }

    /// One-dimensional int32 array.
    pub fn from_i32(values: Vec<i32>) -> Self {
        Array::I32(Array1::from_vec(values).into_dyn())
    }

    /// One-dimensional int64 array.
    pub fn from_i64(values: Vec<i64>) -> Self {
        Array::I64(Array1::from_vec(values).into_dyn())
    }

    pub fn dtype(&self) -> DType {
        match self {
            Array::F16(_) => DType::F16,
            Array::F32(_) => DType::F32,
            Array::F64(_) => DType::F64,
            Array::I32(_) => DType::I32,
            Array::I64(_) => DType::I64,
            Array::U8(_) => DType::U8,
            Array::Bool(_) => DType::Bool,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each_variant!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Length of the leading (time) dimension. Zero-dimensional arrays count as one.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated memory footprint of the elements.
    pub fn nbytes(&self) -> usize {
        each_variant!(self, a => a.len()) * self.dtype().size()
    }

    /// Returns rows `range` of the leading dimension as a new array.
    pub fn slice_rows(&self, range: Range<usize>) -> Array {
        if self.ndim() == 0 {
            return self.clone();
        }
        map_variant!(self, a => a.slice_axis(Axis(0), Slice::from(range.clone())).to_owned())
    }

    /// Keeps only the first `len` rows.
    pub fn truncate(&self, len: usize) -> Array {
        self.slice_rows(0..len.min(self.len()))
    }

    /// Zeroes rows `range` of the leading dimension in place.
    pub fn zero_rows(&mut self, range: Range<usize>) {
        if self.ndim() == 0 || range.is_empty() {
            return;
        }
        let slice = Slice::from(range);
        match self {
            Array::F16(a) => a.slice_axis_mut(Axis(0), slice).fill(f16::ZERO),
            Array::F32(a) => a.slice_axis_mut(Axis(0), slice).fill(0.0),
            Array::F64(a) => a.slice_axis_mut(Axis(0), slice).fill(0.0),
            Array::I32(a) => a.slice_axis_mut(Axis(0), slice).fill(0),
            Array::I64(a) => a.slice_axis_mut(Axis(0), slice).fill(0),
            Array::U8(a) => a.slice_axis_mut(Axis(0), slice).fill(0),
            Array::Bool(a) => a.slice_axis_mut(Axis(0), slice).fill(false),
        }
    }

    /// Converts a float array to the requested precision. Non-float arrays are
    /// returned unchanged.
    pub fn to_float(&self, precision: FloatPrecision) -> Array {
        if self.dtype() == precision.dtype() {
            return self.clone();
        }
        let wide = match self {
            Array::F16(a) => a.mapv(|x| x.to_f64()),
            Array::F32(a) => convert::<f32, f64>(a),
            Array::F64(a) => a.clone(),
            _ => return self.clone(),
        };
        match precision {
            FloatPrecision::Float16 => Array::F16(wide.mapv(f16::from_f64)),
            FloatPrecision::Float32 => Array::F32(convert::<f64, f32>(&wide)),
            FloatPrecision::Float64 => Array::F64(wide),
        }
    }

    /// Converts an integer array to the requested precision. Non-integer
    /// arrays are returned unchanged.
    pub fn to_int(&self, precision: IntPrecision) -> Array {
        match (self, precision) {
            (Array::I32(a), IntPrecision::Int64) => Array::I64(convert::<i32, i64>(a)),
            (Array::I64(a), IntPrecision::Int32) => Array::I32(convert::<i64, i32>(a)),
            _ => self.clone(),
        }
    }

    /// Casts floats to `float` and integers to `int`; any other element kind
    /// is an UNSUPPORTED_DTYPE error naming the field.
    pub fn cast(&self, name: &str, float: FloatPrecision, int: IntPrecision) -> Result<Array> {
        match self.dtype().kind() {
            DTypeKind::Float => Ok(self.to_float(float)),
            DTypeKind::Int => Ok(self.to_int(int)),
            DTypeKind::Other => Err(DatasetError::unsupported_dtype(name, self.dtype().as_str())),
        }
    }

    /// Mean of all elements as f64, `None` for empty or non-numeric arrays.
    pub fn mean(&self) -> Option<f64> {
        let (sum, count) = match self {
            Array::F16(a) => (a.iter().map(|x| x.to_f64()).sum::<f64>(), a.len()),
            Array::F32(a) => (a.iter().map(|&x| x as f64).sum(), a.len()),
            Array::F64(a) => (a.iter().sum(), a.len()),
            Array::I32(a) => (a.iter().map(|&x| x as f64).sum(), a.len()),
            Array::I64(a) => (a.iter().map(|&x| x as f64).sum(), a.len()),
            Array::U8(_) | Array::Bool(_) => return None,
        };
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Borrows the data as float32, if that is the element type.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Array::F32(a) => Some(a),
            _ => None,
        }
    }

    /// Borrows the data as int32, if that is the element type.
    pub fn as_i32(&self) -> Option<&ArrayD<i32>> {
        match self {
            Array::I32(a) => Some(a),
            _ => None,
        }
    }

    /// Borrows the data as int64, if that is the element type.
    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Array::I64(a) => Some(a),
            _ => None,
        }
    }
}

fn convert<A, B>(a: &ArrayD<A>) -> ArrayD<B>
where
    A: AsPrimitive<B>,
    B: Copy + 'static,
{
    a.mapv(|x| x.as_())
}
