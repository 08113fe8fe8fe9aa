use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use super::Image;

/// Rows of a source image, read on demand.
///
/// Output images read their source a few rows at a time, top to bottom, so
/// only the most recently used rows are kept.
pub struct RowCache {
    source: Box<dyn Image>,
    row_len: usize,
    rows: Mutex<LruCache<u32, Arc<[f32]>>>,
}

impl RowCache {
    pub fn new(source: Box<dyn Image>, capacity: usize) -> Self {
        let row_len = source.width() as usize * source.channels();
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            row_len,
            rows: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Keep at least `capacity` rows.
    pub fn reserve(&self, capacity: usize) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(capacity) = NonZeroUsize::new(capacity) {
            if capacity > rows.cap() {
                rows.resize(capacity);
            }
        }
    }

    /// Samples of source row `y`.
    pub fn row(&self, y: usize) -> Arc<[f32]> {
        let y = y as u32;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(row) = rows.get(&y) {
            return row.clone();
        }

        let mut data = vec![0.0; self.row_len];
        self.source.read_row(y, &mut data);
        let row: Arc<[f32]> = data.into();
        rows.put(y, row.clone());
        row
    }
}
