//! Per-chunk reference heart-rate cache.
//!
//! Estimating a heart rate from a label chunk is an FFT per sample, and the same chunk is
//! revisited every epoch, so the augmentor memoises it by [`SampleKey`].

use crate::types::DatasetResult;
use data_contracts::SampleKey;
use std::collections::{HashMap, VecDeque};

pub trait HeartRateCache {
    /// Return the cached value for `key`, calling `compute` only on a miss.
    fn get_or_compute(
        &mut self,
        key: &SampleKey,
        compute: &mut dyn FnMut() -> DatasetResult<f32>,
    ) -> DatasetResult<f32>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry (used for epoch-scoped caching).
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

/// FIFO-bounded map; `capacity: None` keeps every key for the cache's lifetime.
#[derive(Debug, Clone, Default)]
pub struct BoundedHrCache {
    capacity: Option<usize>,
    entries: HashMap<SampleKey, f32>,
    order: VecDeque<SampleKey>,
    stats: CacheStats,
}

impl BoundedHrCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn get(&self, key: &SampleKey) -> Option<f32> {
        self.entries.get(key).copied()
    }
}

impl HeartRateCache for BoundedHrCache {
    fn get_or_compute(
        &mut self,
        key: &SampleKey,
        compute: &mut dyn FnMut() -> DatasetResult<f32>,
    ) -> DatasetResult<f32> {
        if let Some(hr) = self.entries.get(key) {
            self.stats.hits += 1;
            tracing::trace!(%key, hr, "heart-rate cache hit");
            return Ok(*hr);
        }
        let hr = compute()?;
        self.stats.misses += 1;
        tracing::trace!(%key, hr, "heart-rate cache miss");
        self.entries.insert(key.clone(), hr);
        self.order.push_back(key.clone());
        if let Some(cap) = self.capacity {
            while self.entries.len() > cap {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
            }
        }
        Ok(hr)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
