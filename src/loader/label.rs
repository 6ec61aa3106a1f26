//! Phone label loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::types::{Interval, Payload};

use super::{Index, Loader, Query};

/// Eagerly parsed label index:
///
/// ```text
/// utterance_id_a 0.0 0.35 sil 0.35 0.52 a 0.52 0.80 k ...
/// ```
pub struct LabelLoader {
    path: PathBuf,
    keys: Vec<String>,
    labels: HashMap<String, Vec<Interval>>,
}

impl LabelLoader {
    pub fn open(path: &Path) -> Result<Self> {
        let index = Index::read(path)?;
        let mut labels = HashMap::with_capacity(index.len());
        for (id, value) in index.iter() {
            let intervals = parse_intervals(value).map_err(|reason| {
                DatasetError::decode_failed(format!("{} ({}): {}", path.display(), id, reason))
            })?;
            labels.insert(id.to_string(), intervals);
        }
        Ok(Self {
            path: path.to_path_buf(),
            keys: index.keys().to_vec(),
            labels,
        })
    }
}

impl Loader for LabelLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        self.labels
            .get(query.id)
            .map(|intervals| Payload::Intervals(intervals.clone()))
            .ok_or_else(|| DatasetError::key_not_found(query.id, self.path.display()))
    }

    fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Parses `start end phone` triples.
fn parse_intervals(value: &str) -> std::result::Result<Vec<Interval>, String> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() % 3 != 0 {
        return Err(format!(
            "expected start/end/phone triples, got {} tokens",
            tokens.len()
        ));
    }
    tokens
        .chunks(3)
        .map(|t| {
            let start = t[0].parse::<f32>().map_err(|e| format!("{:?}: {}", t[0], e))?;
            let end = t[1].parse::<f32>().map_err(|e| format!("{:?}: {}", t[1], e))?;
            Ok(Interval {
                start,
                end,
                phone: t[2].to_string(),
            })
        })
        .collect()
}
