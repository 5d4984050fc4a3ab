//! Single-flight generation cache.
//!
//! Concurrent lookups of one [`CanonicalKey`] share a single computation and
//! all observe its outcome. Successful results are kept in a bounded LRU with
//! optional time-to-live; failures are never stored, so the next identical
//! request starts from scratch.

use moka::future::Cache;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{
    config::CacheConfig,
    error::{GenError, Result},
    models::{CanonicalKey, GenerationResult},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub computations: u64,
    pub failures: u64,
    pub entries: u64,
}

pub struct GenerationCache {
    entries: Cache<CanonicalKey, Arc<GenerationResult>>,
    lookups: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

impl GenerationCache {
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self {
            entries: builder.build(),
            lookups: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Return the stored result for `key`, or run `compute` at most once across
    /// all concurrent callers presenting the same key.
    pub async fn get_or_compute<F>(&self, key: CanonicalKey, compute: F) -> Result<Arc<GenerationResult>>
    where
        F: Future<Output = Result<GenerationResult>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let init = async {
            self.computations.fetch_add(1, Ordering::Relaxed);
            match compute.await {
                Ok(result) => Ok(Arc::new(result)),
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            }
        };

        self.entries
            .try_get_with(key, init)
            .await
            .map_err(|shared: Arc<GenError>| (*shared).clone())
    }

    pub async fn get(&self, key: &CanonicalKey) -> Option<Arc<GenerationResult>> {
        self.entries.get(key).await
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.entries.contains_key(key)
    }

    pub async fn invalidate(&self, key: &CanonicalKey) {
        self.entries.invalidate(key).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}
