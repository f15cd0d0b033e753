//! Session-scoped resource cache with single-flight fetches
//!
//! Concurrent callers asking for the same `(kind, id)` converge on one
//! underlying fetch and all observe its outcome, success or failure. Only
//! successes are memoized. Entries never expire; [`ResourceCache::clear`] is
//! the session reset and [`ResourceCache::evict`] the explicit per-key refresh.
//!
//! The in-flight fetch is a [`Shared`] future: every waiter polls the same
//! work, so a caller that goes away mid-fetch does not abort it for the
//! others. If every waiter goes away the future stays parked in its slot and
//! the next caller resumes it; nothing partial is ever stored.

use crate::error::Result;
use crate::extract::Record;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Resource families held by the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Series page metadata, keyed by series id
    SeriesDetails,
    /// Chapter list, keyed by series id
    Chapters,
    /// Page list, keyed by chapter id
    Pages,
}

/// Cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Resource family
    pub kind: ResourceKind,
    /// Identity within the family
    pub id: String,
}

impl ResourceKey {
    /// Build a key
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// A memoized record
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Extracted record
    pub record: Arc<Record>,
    /// When the fetch that produced it completed
    pub fetched_at: DateTime<Utc>,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Record>>>>;

enum Slot {
    Ready(CacheEntry),
    InFlight { generation: u64, fetch: SharedFetch },
}

#[derive(Default)]
struct Slots {
    entries: HashMap<ResourceKey, Slot>,
    next_generation: u64,
}

/// Single-flight memo of extracted records
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct ResourceCache {
    slots: Arc<Mutex<Slots>>,
}

impl ResourceCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `(kind, id)` or run `fetch` to produce it
    ///
    /// `fetch` is only invoked when no result is cached and no fetch for the
    /// key is in flight; otherwise the caller joins the existing one. Errors
    /// are returned to every joined caller unchanged and are not cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: ResourceKind,
        id: &str,
        fetch: F,
    ) -> Result<Arc<Record>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Record>> + Send + 'static,
    {
        let key = ResourceKey::new(kind, id);

        let (generation, shared) = {
            let mut slots = self.slots.lock().await;
            match slots.entries.get(&key) {
                Some(Slot::Ready(entry)) => {
                    tracing::trace!(?kind, id, "Cache hit");
                    return Ok(entry.record.clone());
                }
                Some(Slot::InFlight { generation, fetch }) => {
                    tracing::debug!(?kind, id, "Joining in-flight fetch");
                    (*generation, fetch.clone())
                }
                None => {
                    let generation = slots.next_generation;
                    slots.next_generation += 1;
                    let shared = fetch().map(|r| r.map(Arc::new)).boxed().shared();
                    slots.entries.insert(
                        key.clone(),
                        Slot::InFlight {
                            generation,
                            fetch: shared.clone(),
                        },
                    );
                    tracing::debug!(?kind, id, "Cache miss, fetching");
                    (generation, shared)
                }
            }
        };

        let result = shared.await;

        // First waiter to settle replaces the slot; a slot evicted or cleared
        // meanwhile belongs to a newer generation (or none) and is left alone
        let mut slots = self.slots.lock().await;
        let owns_slot = matches!(
            slots.entries.get(&key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        );
        if owns_slot {
            match &result {
                Ok(record) => {
                    slots.entries.insert(
                        key,
                        Slot::Ready(CacheEntry {
                            record: record.clone(),
                            fetched_at: Utc::now(),
                        }),
                    );
                }
                Err(e) => {
                    tracing::debug!(?kind, id, error = %e, "Fetch failed, not caching");
                    slots.entries.remove(&key);
                }
            }
        }

        result
    }

    /// Cached entry for a key, without fetching
    pub async fn peek(&self, kind: ResourceKind, id: &str) -> Option<CacheEntry> {
        let slots = self.slots.lock().await;
        match slots.entries.get(&ResourceKey::new(kind, id)) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Forget one key; returns whether anything was cached or in flight
    ///
    /// Waiters on an in-flight fetch still receive its result, but the result
    /// is not stored.
    pub async fn evict(&self, kind: ResourceKind, id: &str) -> bool {
        let mut slots = self.slots.lock().await;
        slots.entries.remove(&ResourceKey::new(kind, id)).is_some()
    }

    /// Forget everything
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        let dropped = slots.entries.len();
        slots.entries.clear();
        tracing::debug!(dropped, "Resource cache cleared");
    }

    /// Number of completed entries
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .entries
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    /// Whether no completed entries are held
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
