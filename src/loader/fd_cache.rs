//! Open file handle cache with LRU eviction.
//!
//! Loaders that read many small records out of a few large archives keep
//! their handles open between queries, bounded by `max_cache_fd`.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{DatasetError, ErrorCode, Result};

/// Bounded set of open files shared by one loader.
pub struct FdCache {
    inner: Mutex<Handles>,
    max_open: usize,
}

struct Handles {
    files: HashMap<PathBuf, HandleEntry>,
    access_counter: u64,
}

/// An open file with its last access stamp.
struct HandleEntry {
    file: File,
    last_accessed: u64,
}

impl FdCache {
    /// Creates a cache keeping at most `max_open` files open.
    /// With 0, every access opens and closes its own handle.
    pub fn new(max_open: usize) -> Self {
        Self {
            inner: Mutex::new(Handles {
                files: HashMap::new(),
                access_counter: 0,
            }),
            max_open,
        }
    }

    /// Runs `f` with an open handle to `path`.
    pub fn with_file<T>(&self, path: &Path, f: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        if self.max_open == 0 {
            let mut file = open(path)?;
            return f(&mut file);
        }

        let mut handles = self
            .inner
            .lock()
            .map_err(|_| DatasetError::new(ErrorCode::IoFailed, "file handle cache lock poisoned"))?;
        handles.access_counter += 1;
        let stamp = handles.access_counter;

        if !handles.files.contains_key(path) {
            if handles.files.len() >= self.max_open {
                handles.evict_lru();
            }
            let file = open(path)?;
            handles.files.insert(
                path.to_path_buf(),
                HandleEntry {
                    file,
                    last_accessed: stamp,
                },
            );
        }

        match handles.files.get_mut(path) {
            Some(entry) => {
                entry.last_accessed = stamp;
                f(&mut entry.file)
            }
            None => {
                let mut file = open(path)?;
                f(&mut file)
            }
        }
    }

    /// Returns the number of open handles.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|h| h.files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .map(|h| h.files.contains_key(path))
            .unwrap_or(false)
    }
}

impl Handles {
    /// Closes the least recently used handle.
    fn evict_lru(&mut self) {
        let oldest = self
            .files
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.files.remove(&key);
        }
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| DatasetError::io(path.display(), e))
}
