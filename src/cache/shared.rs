//! Directory-backed record cache shared between worker processes.
//!
//! Each record is one file named after a hash of its cache key. The file
//! starts with a one-line JSON header carrying the key and the field layout,
//! followed by the array payloads as `.npy` blobs, so float values (including
//! NaN and infinities) come back bit for bit. Writes go to a temporary file in
//! the same directory and are renamed into place, so two workers inserting
//! the same key race harmlessly.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use half::f16;
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DatasetError, ErrorCode, Result};
use crate::loader::npy;
use crate::types::{Array, Field, FieldMap, Record};

use super::RecordCache;

const ENTRY_EXT: &str = "rec";

/// Unique suffix for temporary files of this process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// First line of an entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    fields: Vec<FieldHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum FieldHeader {
    Array { name: String, arrays: Vec<BlobHeader> },
    Pair { name: String, arrays: Vec<BlobHeader> },
    Labels { name: String, arrays: Vec<BlobHeader>, phones: Vec<String> },
    Text { name: String, text: String },
}

/// One `.npy` blob of the payload.
#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    bytes: usize,
    /// Stored widened to f32; narrowed again on read.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    half: bool,
}

pub struct SharedCache {
    dir: PathBuf,
    max_size: usize,
}

impl SharedCache {
    /// Opens (creating if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>, max_size: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DatasetError::io(dir.display(), e))?;
        Ok(Self { dir, max_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(&digest[..8]), ENTRY_EXT))
    }

    /// Entry files currently in the directory, with their sizes.
    fn entries(&self) -> Vec<(PathBuf, u64)> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == ENTRY_EXT))
            .filter_map(|entry| {
                let len = entry.metadata().ok()?.len();
                Some((entry.path(), len))
            })
            .collect()
    }
}

impl RecordCache for SharedCache {
    fn get(&self, key: &str) -> Result<Option<Arc<Record>>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DatasetError::io(path.display(), e)),
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        let (stored_key, record) = decode_entry(&bytes)
            .map_err(|e| DatasetError::decode_failed(format!("{}: {}", path.display(), e.message)))?;
        if stored_key != key {
            // Truncated-hash collision: the file belongs to another key.
            tracing::warn!(key, stored = %stored_key, path = %path.display(), "shared cache entry holds another key");
            return Ok(None);
        }
        Ok(Some(Arc::new(record)))
    }

    fn insert(&self, key: &str, record: Arc<Record>) -> Result<()> {
        let path = self.entry_path(key);
        let bytes = encode_entry(key, &record)?;

        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &bytes).map_err(|e| DatasetError::io(tmp.display(), e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(DatasetError::io(path.display(), e));
        }
        tracing::debug!(key, path = %path.display(), bytes = bytes.len(), "shared cache entry written");
        Ok(())
    }

    fn size(&self) -> usize {
        self.entries()
            .iter()
            .map(|(_, len)| *len as usize)
            .sum()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_shared(&self) -> bool {
        true
    }
}

fn encode_entry(key: &str, record: &Record) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    let mut fields = Vec::with_capacity(record.len());
    for (name, field) in record.iter() {
        let name = name.to_string();
        fields.push(match field {
            Field::Array(a) => FieldHeader::Array {
                name,
                arrays: vec![write_blob(a, &mut payload)?],
            },
            Field::Pair(a, b) => FieldHeader::Pair {
                name,
                arrays: vec![write_blob(a, &mut payload)?, write_blob(b, &mut payload)?],
            },
            Field::Labels { intervals, phones } => FieldHeader::Labels {
                name,
                arrays: vec![write_blob(intervals, &mut payload)?],
                phones: phones.clone(),
            },
            Field::Text(text) => FieldHeader::Text {
                name,
                text: text.clone(),
            },
        });
    }

    let header = EntryHeader {
        key: key.to_string(),
        fields,
    };
    let mut bytes = serde_json::to_vec(&header)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn write_blob(array: &Array, out: &mut Vec<u8>) -> Result<BlobHeader> {
    let start = out.len();
    let written = match array {
        Array::F16(a) => a.mapv(f16::to_f32).write_npy(&mut *out),
        Array::F32(a) => a.write_npy(&mut *out),
        Array::F64(a) => a.write_npy(&mut *out),
        Array::I32(a) => a.write_npy(&mut *out),
        Array::I64(a) => a.write_npy(&mut *out),
        Array::U8(a) => a.write_npy(&mut *out),
        Array::Bool(a) => a.write_npy(&mut *out),
    };
    written.map_err(|e| {
        DatasetError::new(ErrorCode::IoFailed, format!("encoding cache entry: {}", e))
    })?;
    Ok(BlobHeader {
        bytes: out.len() - start,
        half: matches!(array, Array::F16(_)),
    })
}

fn decode_entry(bytes: &[u8]) -> Result<(String, Record)> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| DatasetError::decode_failed("entry header is not terminated"))?;
    let header: EntryHeader = serde_json::from_slice(&bytes[..split])?;
    let mut payload = &bytes[split + 1..];

    let mut fields = FieldMap::new();
    for field in header.fields {
        let (name, field) = match field {
            FieldHeader::Array { name, arrays } => {
                let [a] = read_blobs::<1>(&arrays, &mut payload)?;
                (name, Field::Array(a))
            }
            FieldHeader::Pair { name, arrays } => {
                let [a, b] = read_blobs::<2>(&arrays, &mut payload)?;
                (name, Field::Pair(a, b))
            }
            FieldHeader::Labels { name, arrays, phones } => {
                let [intervals] = read_blobs::<1>(&arrays, &mut payload)?;
                (name, Field::Labels { intervals, phones })
            }
            FieldHeader::Text { name, text } => (name, Field::Text(text)),
        };
        fields.insert(name, field);
    }
    if !payload.is_empty() {
        return Err(DatasetError::decode_failed(format!(
            "{} trailing bytes after the last array",
            payload.len()
        )));
    }
    Ok((header.key, Record::new(fields)))
}

/// Reads exactly `N` blobs off the front of `payload`.
fn read_blobs<const N: usize>(blobs: &[BlobHeader], payload: &mut &[u8]) -> Result<[Array; N]> {
    if blobs.len() != N {
        return Err(DatasetError::decode_failed(format!(
            "expected {} arrays, header lists {}",
            N,
            blobs.len()
        )));
    }
    let mut arrays = Vec::with_capacity(N);
    for blob in blobs {
        if blob.bytes > payload.len() {
            return Err(DatasetError::decode_failed("entry is truncated"));
        }
        let (head, rest) = payload.split_at(blob.bytes);
        *payload = rest;
        let array = match npy::read_any(head)? {
            Array::F32(a) if blob.half => Array::F16(a.mapv(f16::from_f32)),
            array => array,
        };
        arrays.push(array);
    }
    arrays
        .try_into()
        .map_err(|_| DatasetError::decode_failed("array count mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Array, Field, FieldMap};

    fn record() -> Arc<Record> {
        let mut fields = FieldMap::new();
        fields.insert("input".into(), Field::Array(Array::from_f32(vec![0.25, -1.0])));
        fields.insert(
            "output".into(),
            Field::Labels {
                intervals: Array::from_f32(vec![0.0, 0.5]),
                phones: vec!["a".into()],
            },
        );
        Arc::new(Record::new(fields))
    }

    #[test]
    fn insert_then_get_from_another_handle() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SharedCache::open(dir.path(), 1 << 20).unwrap();
        let reader = SharedCache::open(dir.path(), 1 << 20).unwrap();

        assert!(reader.get("u1").unwrap().is_none());
        writer.insert("u1", record()).unwrap();

        let got = reader.get("u1").unwrap().unwrap();
        assert_eq!(*got, *record());
        assert_eq!(reader.len(), 1);
        assert!(reader.is_shared());
    }

    #[test]
    fn duplicate_insert_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 1 << 20).unwrap();
        cache.insert("u1", record()).unwrap();
        let size = cache.size();
        cache.insert("u1", record()).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), size);
        assert!(size > 0);
    }

    #[test]
    fn entry_names_are_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 10).unwrap();
        let name = cache.entry_path("spk/utt 1").file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name.len(), 16 + ".rec".len());
        assert!(name.trim_end_matches(".rec").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 10).unwrap();
        std::fs::write(cache.entry_path("u1"), b"{not json").unwrap();
        assert!(cache.get("u1").is_err());
    }

    #[test]
    fn non_finite_floats_come_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 1 << 20).unwrap();

        let mut fields = FieldMap::new();
        fields.insert(
            "feats".into(),
            Field::Array(Array::from_f32(vec![f32::NEG_INFINITY, f32::NAN, 0.5])),
        );
        fields.insert(
            "input".into(),
            Field::Pair(
                Array::F16(ndarray::arr1(&[f16::INFINITY, f16::from_f32(0.25)]).into_dyn()),
                Array::from_i32(vec![24000]),
            ),
        );
        fields.insert("text".into(), Field::Text("la la".into()));
        cache.insert("u1", Arc::new(Record::new(fields))).unwrap();

        // Fetched twice: a lossy entry would only fail on the second read.
        for _ in 0..2 {
            let got = cache.get("u1").unwrap().unwrap();
            let feats = got.array("feats").unwrap().as_f32().unwrap();
            let bits: Vec<u32> = feats.iter().map(|x| x.to_bits()).collect();
            assert_eq!(
                bits,
                vec![f32::NEG_INFINITY.to_bits(), f32::NAN.to_bits(), 0.5f32.to_bits()]
            );

            let Some(Field::Pair(Array::F16(wave), rate)) = got.get("input") else {
                panic!("input is not an f16 pair");
            };
            assert_eq!(wave.as_slice().unwrap(), &[f16::INFINITY, f16::from_f32(0.25)]);
            assert_eq!(*rate, Array::from_i32(vec![24000]));
            assert_eq!(got.get("text"), Some(&Field::Text("la la".into())));
        }
    }

    #[test]
    fn entry_of_another_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 1 << 20).unwrap();
        cache.insert("u1", record()).unwrap();
        std::fs::copy(cache.entry_path("u1"), cache.entry_path("u2")).unwrap();

        assert!(cache.get("u2").unwrap().is_none());
        assert_eq!(*cache.get("u1").unwrap().unwrap(), *record());
    }

    #[test]
    fn truncated_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 1 << 20).unwrap();
        cache.insert("u1", record()).unwrap();
        let path = cache.entry_path("u1");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = cache.get("u1").unwrap_err();
        assert_eq!(err.code, ErrorCode::DecodeFailed);
    }

    #[test]
    fn budget_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SharedCache::open(dir.path(), 1).unwrap();
        assert!(cache.has_room());
        cache.insert("u1", record()).unwrap();
        assert!(!cache.has_room());
    }
}
