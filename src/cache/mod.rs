//! Record caches.
//!
//! A cache holds assembled records up to a byte budget. The dataset admits a
//! record only while the cache's current size is below the budget; there is no
//! eviction, so the budget is approximate.

pub mod shared;
pub mod sized;

use std::sync::Arc;

use crate::config::{CacheMode, DatasetConfig};
use crate::error::Result;
use crate::types::Record;

pub use shared::SharedCache;
pub use sized::SizedCache;

/// Id → record store shared by every caller of one dataset.
pub trait RecordCache: Send + Sync {
    /// Returns the cached record for `id`, if any.
    fn get(&self, id: &str) -> Result<Option<Arc<Record>>>;

    /// Stores `record` under `id`. Re-inserting an id replaces the entry.
    fn insert(&self, id: &str, record: Arc<Record>) -> Result<()>;

    /// Current size in bytes.
    fn size(&self) -> usize;

    /// Byte budget.
    fn max_size(&self) -> usize;

    /// Number of cached records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether entries are visible to other processes.
    fn is_shared(&self) -> bool;

    /// Whether another record may be admitted.
    fn has_room(&self) -> bool {
        self.size() < self.max_size()
    }
}

/// Builds the cache selected by the configuration.
///
/// Returns `None` for a zero budget.
pub fn from_config(config: &DatasetConfig) -> Result<Option<Box<dyn RecordCache>>> {
    let max_size = usize::try_from(config.max_cache_size).unwrap_or(usize::MAX);
    if max_size == 0 {
        return Ok(None);
    }
    let cache: Box<dyn RecordCache> = match &config.cache_mode {
        CacheMode::Local => Box::new(SizedCache::new(max_size)),
        CacheMode::Shared { .. } => {
            Box::new(SharedCache::open(config.effective_cache_dir(), max_size)?)
        }
    };
    tracing::debug!(
        max_size,
        shared = cache.is_shared(),
        "record cache enabled"
    );
    Ok(Some(cache))
}
