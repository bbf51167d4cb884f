use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use critique_reviews::{ScrapeError, Scraper, Snapshot, SnapshotStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Crawl and cache knobs for the serving layer.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub max_pages: u32,
    pub delay: Duration,
    pub ttl: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_pages: 10,
            delay: Duration::from_secs(1),
            ttl: Duration::from_secs(600),
        }
    }
}

/// A snapshot and the moment it entered the cache.
#[derive(Debug)]
pub struct CachedSnapshot {
    pub snapshot: Arc<Snapshot>,
    pub cached_at: Instant,
}

impl CachedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            cached_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

/// Shared handler state. Cloning shares the cache.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    scraper: Scraper,
    store: Arc<dyn SnapshotStore>,
    policy: RefreshPolicy,
    cache: RwLock<Option<Arc<CachedSnapshot>>>,
    refreshing: AtomicBool,
}

/// Clears the refresh flag when the refresh ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AppState {
    pub fn new(scraper: Scraper, store: Arc<dyn SnapshotStore>, policy: RefreshPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                scraper,
                store,
                policy,
                cache: RwLock::new(None),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    pub async fn cached(&self) -> Option<Arc<CachedSnapshot>> {
        self.inner.cache.read().await.clone()
    }

    pub async fn install(&self, snapshot: Snapshot) -> Arc<CachedSnapshot> {
        let cached = Arc::new(CachedSnapshot::new(snapshot));
        *self.inner.cache.write().await = Some(cached.clone());
        cached
    }

    /// Fill the cache from the store. A loaded snapshot counts as fresh.
    pub async fn preload(&self) -> Option<Arc<CachedSnapshot>> {
        match self.inner.store.load().await {
            Ok(Some(snapshot)) => {
                info!(target: "api.cache", reviews = snapshot.count(), "cache.preloaded");
                Some(self.install(snapshot).await)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(target: "api.cache", error = %err, "cache.preload.failed");
                None
            }
        }
    }

    fn try_begin_refresh(&self) -> Option<InFlight<'_>> {
        self.inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.inner.refreshing))
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::Acquire)
    }

    /// Crawl now, swap the cache and persist.
    ///
    /// `Ok(None)` means another refresh already holds the slot.
    pub async fn refresh(&self) -> Result<Option<Arc<CachedSnapshot>>, ScrapeError> {
        let Some(_slot) = self.try_begin_refresh() else {
            return Ok(None);
        };
        let policy = self.inner.policy;
        let snapshot = self
            .inner
            .scraper
            .scrape_reviews(policy.max_pages, policy.delay)
            .await?;
        let cached = self.install(snapshot).await;
        info!(target: "api.cache", reviews = cached.snapshot.count(), "cache.refreshed");

        if let Err(err) = self.inner.store.save(&cached.snapshot).await {
            warn!(target: "api.cache", error = %err, "cache.save.failed");
        }
        Ok(Some(cached))
    }

    /// Start a background refresh unless one is already running.
    pub fn spawn_refresh(&self) {
        if self.is_refreshing() {
            return;
        }
        let state = self.clone();
        tokio::spawn(async move {
            if let Err(err) = state.refresh().await {
                warn!(target: "api.cache", error = %err, "api.refresh.failed");
            }
        });
    }
}
