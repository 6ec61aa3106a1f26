//! Random array generators.
//!
//! The index gives a shape per utterance; every query draws a fresh array:
//!
//! ```text
//! utterance_id_A 3,4
//! utterance_id_B 10,4
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{DatasetError, ErrorCode, Result};
use crate::types::{Array, Payload};

use super::{Index, Loader, Query};

/// Value range of generated elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandomKind {
    /// float32 in `[0, 1)`.
    Float,
    /// int64 in `[low, high)`.
    Int { low: i64, high: i64 },
}

pub struct RandomLoader {
    path: PathBuf,
    keys: Vec<String>,
    shapes: HashMap<String, Vec<usize>>,
    kind: RandomKind,
    rng: Mutex<ChaCha8Rng>,
}

impl RandomLoader {
    /// Reads the shape index. With `seed` set the draws are reproducible.
    pub fn open(path: &Path, kind: RandomKind, seed: Option<u64>) -> Result<Self> {
        let index = Index::read(path)?;
        let mut shapes = HashMap::with_capacity(index.len());
        for (id, value) in index.iter() {
            let shape = parse_shape(value).map_err(|reason| {
                DatasetError::decode_failed(format!("{} ({}): {}", path.display(), id, reason))
            })?;
            shapes.insert(id.to_string(), shape);
        }

        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            keys: index.keys().to_vec(),
            shapes,
            kind,
            rng: Mutex::new(rng),
        })
    }
}

impl Loader for RandomLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        let shape = self
            .shapes
            .get(query.id)
            .ok_or_else(|| DatasetError::key_not_found(query.id, self.path.display()))?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| DatasetError::new(ErrorCode::IoFailed, "random generator lock poisoned"))?;

        let dim = IxDyn(shape);
        let array = match self.kind {
            RandomKind::Float => Array::F32(ArrayD::from_shape_simple_fn(dim, || rng.gen::<f32>())),
            RandomKind::Int { low, high } => {
                Array::I64(ArrayD::from_shape_simple_fn(dim, || rng.gen_range(low..high)))
            }
        };
        Ok(Payload::Array(array))
    }

    fn keys(&self) -> &[String] {
        &self.keys
    }
}

fn parse_shape(value: &str) -> std::result::Result<Vec<usize>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().map_err(|e| format!("{:?}: {}", t, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn floats_follow_shape() {
        let file = write("u1 3,4\nu2 10\n");
        let loader = RandomLoader::open(file.path(), RandomKind::Float, Some(1)).unwrap();
        let Payload::Array(a) = loader.get(&Query::plain("u1")).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(a.shape(), &[3, 4]);
        let values = a.as_f32().unwrap();
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn ints_stay_in_half_open_range() {
        let file = write("u1 1000\n");
        let loader =
            RandomLoader::open(file.path(), RandomKind::Int { low: 3, high: 6 }, Some(7)).unwrap();
        let Payload::Array(a) = loader.get(&Query::plain("u1")).unwrap() else {
            panic!("expected array");
        };
        let values = a.as_i64().unwrap();
        assert!(values.iter().all(|v| (3..6).contains(v)));
        assert!(values.iter().any(|&v| v == 5));
    }

    #[test]
    fn seeded_loaders_agree() {
        let file = write("u1 8\n");
        let a = RandomLoader::open(file.path(), RandomKind::Float, Some(42)).unwrap();
        let b = RandomLoader::open(file.path(), RandomKind::Float, Some(42)).unwrap();
        assert_eq!(
            a.get(&Query::plain("u1")).unwrap(),
            b.get(&Query::plain("u1")).unwrap()
        );
    }

    #[test]
    fn bad_shape_fails_at_construction() {
        let file = write("u1 3,x\n");
        assert!(RandomLoader::open(file.path(), RandomKind::Float, None).is_err());
    }
}
