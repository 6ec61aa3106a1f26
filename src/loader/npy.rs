//! `.npy` array file loader.

use std::path::Path;

use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement};

use crate::error::{DatasetError, Result};
use crate::types::{Array, Payload};

use super::{Index, Loader, Query};

/// Loads one array per utterance from an index of `.npy` paths:
///
/// ```text
/// utterance_id_A /some/where/a.npy
/// utterance_id_B /some/where/b.npy
/// ```
pub struct NpyLoader {
    index: Index,
}

impl NpyLoader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            index: Index::read(path)?,
        })
    }
}

impl Loader for NpyLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        let npy_path = self.index.get(query.id)?;
        let bytes = std::fs::read(npy_path).map_err(|e| DatasetError::io(npy_path, e))?;
        read_any(&bytes)
            .map(Payload::Array)
            .map_err(|e| DatasetError::decode_failed(format!("{}: {}", npy_path, e.message)))
    }

    fn keys(&self) -> &[String] {
        self.index.keys()
    }
}

/// Decodes an npy buffer, probing the supported element types in turn.
pub fn read_any(bytes: &[u8]) -> Result<Array> {
    macro_rules! probe {
        ($($t:ty => $variant:ident),+) => {
            $(
                if let Some(a) = try_read::<$t>(bytes)? {
                    return Ok(Array::$variant(a));
                }
            )+
        };
    }

    probe!(f32 => F32, f64 => F64, i32 => I32, i64 => I64, u8 => U8, bool => Bool);

    Err(DatasetError::decode_failed(
        "unsupported npy element type (expected f32, f64, i32, i64, u8 or bool)",
    ))
}

/// `Ok(None)` when the file holds a different element type.
fn try_read<T: ReadableElement>(bytes: &[u8]) -> Result<Option<ArrayD<T>>> {
    match ArrayD::<T>::read_npy(bytes) {
        Ok(array) => Ok(Some(array)),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(e) => Err(DatasetError::decode_failed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::write_npy;
    use tempfile::tempdir;

    #[test]
    fn reads_float_and_int_files() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("f.npy");
        let i = dir.path().join("i.npy");
        write_npy(&f, &array![[0.5f32, 1.5], [2.5, 3.5]]).unwrap();
        write_npy(&i, &array![1i64, 2, 3]).unwrap();
        let scp = dir.path().join("feats.scp");
        std::fs::write(&scp, format!("a {}\nb {}\n", f.display(), i.display())).unwrap();

        let loader = NpyLoader::open(&scp).unwrap();
        match loader.get(&Query::plain("a")).unwrap() {
            Payload::Array(a) => {
                assert_eq!(a.dtype(), crate::types::DType::F32);
                assert_eq!(a.shape(), &[2, 2]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        match loader.get(&Query::plain("b")).unwrap() {
            Payload::Array(a) => assert_eq!(a, Array::from_i64(vec![1, 2, 3])),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn garbage_is_decode_error() {
        let err = read_any(b"definitely not npy").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DecodeFailed);
    }
}
