//! Time-boxed cache for the rendered home feed.
//!
//! Entries are HTML fragments keyed by the raw `?page=` value. An entry is
//! served until `ttl` has elapsed since it was stored or until
//! [`FeedCache::invalidate_all`] runs; new posts are not pushed into the cache.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use metrics::counter;
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

pub const METRIC_FEED_CACHE_HIT: &str = "penfeed_feed_cache_hit_total";
pub const METRIC_FEED_CACHE_MISS: &str = "penfeed_feed_cache_miss_total";

const SOURCE: &str = "penfeed::cache";

#[derive(Clone)]
pub struct FeedCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedFragment>>>,
}

#[derive(Clone)]
struct CachedFragment {
    html: Arc<str>,
    stored_at: Instant,
}

impl CachedFragment {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.stored_at) < ttl
    }
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key of one home feed page.
    pub fn index_key(page: Option<&str>) -> String {
        format!("index:{}", page.unwrap_or_default())
    }

    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        guard
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.html.clone())
    }

    /// Store a fragment, dropping any entries that have already expired.
    pub async fn put(&self, key: String, html: impl Into<Arc<str>>) {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.is_fresh(self.ttl, now));
        guard.insert(
            key,
            CachedFragment {
                html: html.into(),
                stored_at: now,
            },
        );
    }

    /// Serve `key` from the cache, or render, store, and return it.
    ///
    /// Render failures are returned as-is and nothing is stored.
    pub async fn get_or_render<F, Fut, E>(&self, key: &str, render: F) -> Result<Arc<str>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(html) = self.get(key).await {
            counter!(METRIC_FEED_CACHE_HIT).increment(1);
            debug!(target = SOURCE, key, "feed cache hit");
            return Ok(html);
        }

        counter!(METRIC_FEED_CACHE_MISS).increment(1);
        debug!(target = SOURCE, key, "feed cache miss");

        let html: Arc<str> = render().await?.into();
        self.put(key.to_string(), html.clone()).await;
        Ok(html)
    }

    /// Drop every entry; returns how many were removed.
    pub async fn invalidate_all(&self) -> usize {
        let mut guard = self.entries.write().await;
        let removed = guard.len();
        guard.clear();
        debug!(target = SOURCE, removed, "feed cache cleared");
        removed
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.entries.read().await;
        guard
            .values()
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
