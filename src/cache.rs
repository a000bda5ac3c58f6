//! Per-request memoization of expression mapper calls.
//!
//! Samples are bucketed coarsely so perceptually similar instants reuse one
//! mapper call. The key table sits behind a mutex; each key owns a slot with
//! its own lock, so a key is computed at most once even when mapper calls
//! run on a worker pool, while different keys compute in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::error::Result;
use crate::types::{ExpressionParameters, TimelineSample};

/// Quantized (energy, tempo, happy, sad) bucket of a timeline sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub energy: i64,
    pub tempo: i64,
    pub happy: i64,
    pub sad: i64,
}

impl CacheKey {
    pub fn from_sample(sample: &TimelineSample) -> Self {
        Self {
            energy: (sample.energy * 10.0).round() as i64,
            tempo: (sample.tempo / 20.0).round() as i64,
            happy: (sample.emotion_scores.happy * 10.0).round() as i64,
            sad: (sample.emotion_scores.sad * 10.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

type Slot = Arc<Mutex<Option<ExpressionParameters>>>;

struct Entry {
    slot: Slot,
    last_used: u64,
}

#[derive(Default)]
struct Table {
    entries: HashMap<CacheKey, Entry>,
    clock: u64,
}

#[derive(Default)]
pub struct ExpressionCache {
    table: Mutex<Table>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic inside a mapper must not make the cache unusable
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` keys, evicting the least recently used.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Return the cached parameters for the sample's bucket, computing them
    /// with `compute` on a miss. A failed computation is not cached.
    pub fn get_or_compute<F>(
        &self,
        sample: &TimelineSample,
        compute: F,
    ) -> Result<ExpressionParameters>
    where
        F: FnOnce(&TimelineSample) -> Result<ExpressionParameters>,
    {
        let key = CacheKey::from_sample(sample);
        let slot = self.slot_for(key);

        let mut guard = lock(&slot);
        if let Some(cached) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(?key, "expression cache hit");
            return Ok(*cached);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = compute(sample)?;
        *guard = Some(computed);
        Ok(computed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, key: CacheKey) -> Slot {
        let mut table = lock(&self.table);
        table.clock += 1;
        let now = table.clock;

        if let Some(entry) = table.entries.get_mut(&key) {
            entry.last_used = now;
            return Arc::clone(&entry.slot);
        }

        if let Some(capacity) = self.capacity {
            while table.entries.len() >= capacity {
                let oldest = table
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(candidate, _)| *candidate);
                match oldest {
                    Some(evicted) => {
                        table.entries.remove(&evicted);
                        trace!(?evicted, "evicted expression cache entry");
                    }
                    None => break,
                }
            }
        }

        let slot: Slot = Arc::new(Mutex::new(None));
        table.entries.insert(
            key,
            Entry {
                slot: Arc::clone(&slot),
                last_used: now,
            },
        );
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpressionError;
    use crate::types::EmotionScores;
    use std::sync::atomic::AtomicUsize;

    fn sample(energy: f64, tempo: f64) -> TimelineSample {
        TimelineSample {
            timestamp: 0.0,
            tempo,
            energy,
            spectral_centroid: 0.2,
            pitch: 0.0,
            emotion_scores: EmotionScores::uniform(),
        }
    }

    #[test]
    fn key_quantizes_features() {
        let key = CacheKey::from_sample(&sample(0.44, 131.0));
        assert_eq!(
            key,
            CacheKey {
                energy: 4,
                tempo: 7,
                happy: 2,
                sad: 2
            }
        );
    }

    #[test]
    fn same_bucket_reuses_one_mapper_call() {
        let cache = ExpressionCache::new();
        let calls = AtomicUsize::new(0);
        let compute = |_: &TimelineSample| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExpressionParameters::neutral())
        };
        let first = cache.get_or_compute(&sample(0.41, 120.0), compute).unwrap();
        let second = cache.get_or_compute(&sample(0.43, 121.0), compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn different_buckets_compute_separately() {
        let cache = ExpressionCache::new();
        let calls = AtomicUsize::new(0);
        let compute = |_: &TimelineSample| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExpressionParameters::neutral())
        };
        cache.get_or_compute(&sample(0.1, 120.0), compute).unwrap();
        cache.get_or_compute(&sample(0.9, 120.0), compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hit_returns_independent_copy() {
        let cache = ExpressionCache::new();
        let mut first = cache
            .get_or_compute(&sample(0.5, 100.0), |_| Ok(ExpressionParameters::neutral()))
            .unwrap();
        first.cheek = 1.0;
        let second = cache
            .get_or_compute(&sample(0.5, 100.0), |_| unreachable!("cached"))
            .unwrap();
        assert_eq!(second.cheek, 0.0);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = ExpressionCache::new();
        let failed = cache.get_or_compute(&sample(0.5, 100.0), |s| {
            Err(ExpressionError::mapping(s.timestamp, "offline"))
        });
        assert!(failed.is_err());
        let recovered = cache
            .get_or_compute(&sample(0.5, 100.0), |_| Ok(ExpressionParameters::neutral()))
            .unwrap();
        assert_eq!(recovered, ExpressionParameters::neutral());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = ExpressionCache::with_capacity(2);
        let neutral = |_: &TimelineSample| Ok(ExpressionParameters::neutral());
        cache.get_or_compute(&sample(0.1, 100.0), neutral).unwrap();
        cache.get_or_compute(&sample(0.5, 100.0), neutral).unwrap();
        cache.get_or_compute(&sample(0.1, 100.0), neutral).unwrap();
        cache.get_or_compute(&sample(0.9, 100.0), neutral).unwrap();
        assert_eq!(cache.len(), 2);

        let calls = AtomicUsize::new(0);
        cache
            .get_or_compute(&sample(0.1, 100.0), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ExpressionParameters::neutral())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0, "recently used key survives");
    }

    #[test]
    fn concurrent_access_computes_each_key_once() {
        let cache = ExpressionCache::new();
        let calls = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    cache
                        .get_or_compute(&sample(0.3, 140.0), |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(ExpressionParameters::neutral())
                        })
                        .unwrap();
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
