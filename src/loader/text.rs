//! Inline text and numeric sequence loaders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::types::{Array, Payload};

use super::{Index, Loader, Query};

/// Element type and delimiter of an inline numeric sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFormat {
    /// `utt 12 0 1 3`
    TextInt,
    /// `utt 100,80`
    CsvInt,
    /// `utt 12. 3.1 3.4`
    TextFloat,
    /// `utt 12.,3.1,3.4`
    CsvFloat,
}

impl NumericFormat {
    fn delimiter(&self) -> Option<char> {
        match self {
            NumericFormat::TextInt | NumericFormat::TextFloat => None,
            NumericFormat::CsvInt | NumericFormat::CsvFloat => Some(','),
        }
    }

    /// Parses one value. Integers become int64, floats become float32.
    pub fn parse(&self, value: &str) -> std::result::Result<Array, String> {
        let tokens: Vec<&str> = match self.delimiter() {
            None => value.split_whitespace().collect(),
            Some(d) => value
                .split(d)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect(),
        };
        match self {
            NumericFormat::TextInt | NumericFormat::CsvInt => tokens
                .iter()
                .map(|t| t.parse::<i64>().map_err(|e| format!("{:?}: {}", t, e)))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Array::from_i64),
            NumericFormat::TextFloat | NumericFormat::CsvFloat => tokens
                .iter()
                .map(|t| t.parse::<f32>().map_err(|e| format!("{:?}: {}", t, e)))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Array::from_f32),
        }
    }
}

/// Eagerly parsed numeric sequences, one 1-D array per utterance.
pub struct NumericTextLoader {
    path: PathBuf,
    keys: Vec<String>,
    values: HashMap<String, Array>,
}

impl NumericTextLoader {
    pub fn open(path: &Path, format: NumericFormat) -> Result<Self> {
        let index = Index::read(path)?;
        let mut values = HashMap::with_capacity(index.len());
        for (id, value) in index.iter() {
            let array = format.parse(value).map_err(|reason| {
                DatasetError::decode_failed(format!("{} ({}): {}", path.display(), id, reason))
            })?;
            values.insert(id.to_string(), array);
        }
        Ok(Self {
            path: path.to_path_buf(),
            keys: index.keys().to_vec(),
            values,
        })
    }
}

impl Loader for NumericTextLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        self.values
            .get(query.id)
            .map(|a| Payload::Array(a.clone()))
            .ok_or_else(|| DatasetError::key_not_found(query.id, self.path.display()))
    }

    fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Raw text per utterance, left for preprocessing to encode.
pub struct TextLoader {
    index: Index,
}

impl TextLoader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            index: Index::read(path)?,
        })
    }
}

impl Loader for TextLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        self.index
            .get(query.id)
            .map(|text| Payload::Text(text.to_string()))
    }

    fn keys(&self) -> &[String] {
        self.index.keys()
    }
}
