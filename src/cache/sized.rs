//! Process-local record cache with byte accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{DatasetError, ErrorCode, Result};
use crate::types::Record;

use super::RecordCache;

/// In-memory id → record map that tracks the summed record sizes.
pub struct SizedCache {
    records: RwLock<HashMap<String, Arc<Record>>>,
    /// Sum of `Record::nbytes` over every entry.
    size: AtomicUsize,
    max_size: usize,
}

impl SizedCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            size: AtomicUsize::new(0),
            max_size,
        }
    }

    /// Checks if a record id exists in the cache.
    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .map(|records| records.contains_key(id))
            .unwrap_or(false)
    }

    /// Removes a record, returning it if present.
    pub fn remove(&self, id: &str) -> Result<Option<Arc<Record>>> {
        let removed = self.records.write().map_err(poisoned)?.remove(id);
        if let Some(record) = &removed {
            self.size.fetch_sub(record.nbytes(), Ordering::AcqRel);
        }
        Ok(removed)
    }

    /// Clears all entries from the cache.
    pub fn clear(&self) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.clear();
        self.size.store(0, Ordering::Release);
        Ok(())
    }
}

impl RecordCache for SizedCache {
    fn get(&self, id: &str) -> Result<Option<Arc<Record>>> {
        Ok(self.records.read().map_err(poisoned)?.get(id).cloned())
    }

    fn insert(&self, id: &str, record: Arc<Record>) -> Result<()> {
        let added = record.nbytes();
        let mut records = self.records.write().map_err(poisoned)?;
        match records.insert(id.to_string(), record) {
            Some(previous) => {
                let removed = previous.nbytes();
                if added >= removed {
                    self.size.fetch_add(added - removed, Ordering::AcqRel);
                } else {
                    self.size.fetch_sub(removed - added, Ordering::AcqRel);
                }
            }
            None => {
                self.size.fetch_add(added, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    fn is_shared(&self) -> bool {
        false
    }
}

fn poisoned<T>(_: T) -> DatasetError {
    DatasetError::new(ErrorCode::IoFailed, "record cache lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Array, Field, FieldMap};

    fn record(values: Vec<f32>) -> Arc<Record> {
        let mut fields = FieldMap::new();
        fields.insert("input".into(), Field::Array(Array::from_f32(values)));
        Arc::new(Record::new(fields))
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = SizedCache::new(100);
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(cache.has_room());
    }

    #[test]
    fn insert_and_get() {
        let cache = SizedCache::new(1000);
        let r = record(vec![0.5; 4]);
        cache.insert("u1", r.clone()).unwrap();

        assert!(cache.contains("u1"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), r.nbytes());
        assert!(Arc::ptr_eq(&cache.get("u1").unwrap().unwrap(), &r));
        assert!(cache.get("u2").unwrap().is_none());
    }

    #[test]
    fn reinsert_does_not_double_count() {
        let cache = SizedCache::new(1000);
        cache.insert("u1", record(vec![0.0; 4])).unwrap();
        cache.insert("u1", record(vec![0.0; 4])).unwrap();
        assert_eq!(cache.size(), record(vec![0.0; 4]).nbytes());

        cache.insert("u1", record(vec![0.0; 2])).unwrap();
        assert_eq!(cache.size(), record(vec![0.0; 2]).nbytes());
    }

    #[test]
    fn budget_reached() {
        let r = record(vec![0.0; 16]);
        let cache = SizedCache::new(r.nbytes());
        cache.insert("u1", r).unwrap();
        assert!(!cache.has_room());
    }

    #[test]
    fn remove_and_clear() {
        let cache = SizedCache::new(1000);
        cache.insert("u1", record(vec![1.0])).unwrap();
        cache.insert("u2", record(vec![1.0])).unwrap();

        assert!(cache.remove("u1").unwrap().is_some());
        assert!(!cache.contains("u1"));
        assert_eq!(cache.size(), record(vec![1.0]).nbytes());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn concurrent_inserts() {
        let cache = Arc::new(SizedCache::new(1 << 20));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        cache.insert(&format!("u{}", i + t * 25), record(vec![0.0; 8])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.size(), 100 * record(vec![0.0; 8]).nbytes());
    }
}
