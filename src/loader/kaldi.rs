//! Kaldi binary ark loader.
//!
//! Index values point into ark archives as `path:offset`:
//!
//! ```text
//! utterance_id_A /some/where/a.ark:123
//! utterance_id_B /some/where/a.ark:456
//! ```
//!
//! Each offset must land on a binary object header (`\0B`) followed by a
//! float (`FM`/`FV`) or double (`DM`/`DV`) matrix or vector. Compressed
//! matrices are not supported.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::error::{DatasetError, Result};
use crate::types::{Array, Payload};

use super::fd_cache::FdCache;
use super::{Index, Loader, Query};

/// Lazily reads ark entries, keeping at most `max_cache_fd` archives open.
pub struct KaldiArkLoader {
    index: Index,
    handles: FdCache,
}

impl KaldiArkLoader {
    pub fn open(path: &Path, max_cache_fd: usize) -> Result<Self> {
        Ok(Self {
            index: Index::read(path)?,
            handles: FdCache::new(max_cache_fd),
        })
    }
}

impl Loader for KaldiArkLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        let value = self.index.get(query.id)?;
        let (ark, offset) = split_offset(value)?;
        let array = self.handles.with_file(Path::new(ark), |file| {
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| DatasetError::io(ark, e))?;
            read_object(file).map_err(|e| {
                DatasetError::decode_failed(format!("{}:{}: {}", ark, offset, e.message))
            })
        })?;
        Ok(Payload::Array(array))
    }

    fn keys(&self) -> &[String] {
        self.index.keys()
    }
}

/// Splits `a.ark:123` into path and byte offset. A missing offset means 0.
fn split_offset(value: &str) -> Result<(&str, u64)> {
    match value.rsplit_once(':') {
        Some((path, offset)) if !offset.is_empty() && offset.bytes().all(|b| b.is_ascii_digit()) => {
            let offset = offset
                .parse::<u64>()
                .map_err(|e| DatasetError::decode_failed(format!("{}: {}", value, e)))?;
            Ok((path, offset))
        }
        _ => Ok((value, 0)),
    }
}

/// Reads one binary matrix or vector at the current position.
fn read_object(file: &mut File) -> Result<Array> {
    let mut header = [0u8; 2];
    read_exact(file, &mut header)?;
    if &header != b"\0B" {
        return Err(DatasetError::decode_failed("only binary ark objects are supported"));
    }

    let token = read_token(file)?;
    match token.as_str() {
        "FM" => {
            let (rows, cols) = (read_dim(file)?, read_dim(file)?);
            let data = read_values::<4>(file, rows * cols)?
                .map(f32::from_le_bytes)
                .collect();
            matrix(rows, cols, data).map(Array::F32)
        }
        "DM" => {
            let (rows, cols) = (read_dim(file)?, read_dim(file)?);
            let data = read_values::<8>(file, rows * cols)?
                .map(f64::from_le_bytes)
                .collect();
            matrix(rows, cols, data).map(Array::F64)
        }
        "FV" => {
            let len = read_dim(file)?;
            let data = read_values::<4>(file, len)?.map(f32::from_le_bytes).collect();
            Ok(Array::F32(Array1::from_vec(data).into_dyn()))
        }
        "DV" => {
            let len = read_dim(file)?;
            let data = read_values::<8>(file, len)?.map(f64::from_le_bytes).collect();
            Ok(Array::F64(Array1::from_vec(data).into_dyn()))
        }
        "CM" | "CM2" | "CM3" => Err(DatasetError::decode_failed(
            "compressed matrices are not supported",
        )),
        other => Err(DatasetError::decode_failed(format!(
            "unknown object type {:?}",
            other
        ))),
    }
}

fn matrix<T>(rows: usize, cols: usize, data: Vec<T>) -> Result<ndarray::ArrayD<T>> {
    Array2::from_shape_vec((rows, cols), data)
        .map(|m| m.into_dyn())
        .map_err(|e| DatasetError::decode_failed(e.to_string()))
}

/// Reads a space-terminated type token such as `FM`.
fn read_token(file: &mut File) -> Result<String> {
    let mut token = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        read_exact(file, &mut byte)?;
        if byte[0] == b' ' {
            break;
        }
        token.push(byte[0]);
        if token.len() > 8 {
            return Err(DatasetError::decode_failed("object type token too long"));
        }
    }
    Ok(String::from_utf8_lossy(&token).into_owned())
}

/// Reads a dimension: a size byte (always 4) then a little-endian i32.
fn read_dim(file: &mut File) -> Result<usize> {
    let mut buf = [0u8; 5];
    read_exact(file, &mut buf)?;
    if buf[0] != 4 {
        return Err(DatasetError::decode_failed(format!(
            "expected 4-byte dimension, got size byte {}",
            buf[0]
        )));
    }
    let dim = i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    usize::try_from(dim)
        .map_err(|_| DatasetError::decode_failed(format!("negative dimension {}", dim)))
}

fn read_values<const N: usize>(
    file: &mut File,
    count: usize,
) -> Result<impl Iterator<Item = [u8; N]>> {
    let mut bytes = vec![0u8; count * N];
    read_exact(file, &mut bytes)?;
    Ok((0..count).map(move |i| {
        let mut chunk = [0u8; N];
        chunk.copy_from_slice(&bytes[i * N..(i + 1) * N]);
        chunk
    }))
}

fn read_exact(file: &mut File, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf)
        .map_err(|e| DatasetError::decode_failed(format!("truncated ark object: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;
    use tempfile::tempdir;

    fn dim(n: i32) -> Vec<u8> {
        let mut v = vec![4u8];
        v.extend_from_slice(&n.to_le_bytes());
        v
    }

    fn float_matrix(rows: i32, cols: i32, values: &[f32]) -> Vec<u8> {
        let mut v = b"\0BFM ".to_vec();
        v.extend(dim(rows));
        v.extend(dim(cols));
        for x in values {
            v.extend_from_slice(&x.to_le_bytes());
        }
        v
    }

    fn double_vector(values: &[f64]) -> Vec<u8> {
        let mut v = b"\0BDV ".to_vec();
        v.extend(dim(values.len() as i32));
        for x in values {
            v.extend_from_slice(&x.to_le_bytes());
        }
        v
    }

    /// Writes an ark with two entries and returns the scp index path.
    fn write_ark(dir: &Path) -> std::path::PathBuf {
        let ark = dir.join("feats.ark");
        let mut file = File::create(&ark).unwrap();
        let mut offsets = Vec::new();
        let mut pos = 0usize;
        for (key, body) in [
            ("u1", float_matrix(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])),
            ("u2", double_vector(&[0.5, -0.5])),
        ] {
            let prefix = format!("{} ", key);
            file.write_all(prefix.as_bytes()).unwrap();
            pos += prefix.len();
            offsets.push((key, pos));
            file.write_all(&body).unwrap();
            pos += body.len();
        }
        let scp = dir.join("feats.scp");
        let index: String = offsets
            .iter()
            .map(|(k, o)| format!("{} {}:{}\n", k, ark.display(), o))
            .collect();
        std::fs::write(&scp, index).unwrap();
        scp
    }

    #[test]
    fn reads_matrices_and_vectors() {
        let dir = tempdir().unwrap();
        let scp = write_ark(dir.path());

        for max_fd in [0, 1] {
            let loader = KaldiArkLoader::open(&scp, max_fd).unwrap();
            match loader.get(&Query::plain("u1")).unwrap() {
                Payload::Array(Array::F32(m)) => {
                    assert_eq!(m.shape(), &[2, 3]);
                    assert_eq!(m[[1, 2]], 6.0);
                }
                other => panic!("unexpected payload {:?}", other),
            }
            match loader.get(&Query::plain("u2")).unwrap() {
                Payload::Array(Array::F64(v)) => {
                    assert_eq!(v.iter().copied().collect::<Vec<_>>(), vec![0.5, -0.5]);
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
    }

    #[test]
    fn compressed_matrix_is_rejected() {
        let dir = tempdir().unwrap();
        let ark = dir.path().join("c.ark");
        std::fs::write(&ark, b"u1 \0BCM \x00\x00\x00\x00").unwrap();
        let scp = dir.path().join("c.scp");
        std::fs::write(&scp, format!("u1 {}:3\n", ark.display())).unwrap();

        let loader = KaldiArkLoader::open(&scp, 0).unwrap();
        let err = loader.get(&Query::plain("u1")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DecodeFailed);
        assert!(err.message.contains("compressed"));
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(split_offset("a.ark:12").unwrap(), ("a.ark", 12));
        assert_eq!(split_offset("a.ark").unwrap(), ("a.ark", 0));
        assert_eq!(split_offset("C:/data/a.ark:7").unwrap(), ("C:/data/a.ark", 7));
    }
}
