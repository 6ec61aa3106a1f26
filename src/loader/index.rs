//! Two-column index files.
//!
//! Every modality is described by a text file with one utterance per line:
//!
//! ```text
//! utt_0001 /data/wav/utt_0001.wav
//! utt_0002 /data/wav/utt_0002.wav
//! ```
//!
//! The first whitespace-delimited token is the utterance id, the rest of the
//! line (trimmed) is the value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};

/// A parsed two-column index, in file order.
#[derive(Debug, Clone)]
pub struct Index {
    path: PathBuf,
    keys: Vec<String>,
    values: HashMap<String, String>,
}

impl Index {
    /// Reads an index file. Blank lines are skipped.
    ///
    /// Fails with DUPLICATE_KEY when an id repeats and EMPTY_INDEX when the
    /// file holds no entries.
    pub fn read(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DatasetError::io(path.display(), e))?;
        Self::parse(path, &content)
    }

    /// Parses index text that was read from `path`.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut keys = Vec::new();
        let mut values = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line, ""),
            };
            if values.contains_key(key) {
                return Err(DatasetError::duplicate_key(key, path.display()));
            }
            keys.push(key.to_string());
            values.insert(key.to_string(), value.to_string());
        }

        if keys.is_empty() {
            return Err(DatasetError::empty_index(path.display()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            keys,
            values,
        })
    }

    /// Returns the value of `key`, or KEY_NOT_FOUND.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| DatasetError::key_not_found(key, self.path.display()))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterates `(id, value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(move |k| (k.as_str(), self.values[k].as_str()))
    }
}
