//! Application-level owner of the tracker and its scheduler

use crate::cache::{EstimateSize, LruCache, SharedCache};
use crate::config::{CacheConfiguration, LifecycleConfig, PoolConfiguration};
use crate::metrics::CleanupStats;
use crate::pool::{FactoryPool, ObjectPool, Poolable, SharedPool};
use crate::scheduler::Scheduler;
use crate::tracker::ResourceTracker;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Owns the resource tracker and the scheduler driving its maintenance
///
/// Consumers receive pools, caches and the tracker from here instead of
/// reaching for globals. Every pool and cache created through the context
/// is registered with the tracker so memory-pressure sweeps can shrink it.
///
/// # Examples
///
/// ```
/// use lifecore::{FrameScheduler, LifecycleConfig, LifecycleContext, PoolConfiguration};
/// use std::sync::Arc;
///
/// let scheduler = Arc::new(FrameScheduler::new());
/// let context = LifecycleContext::new(LifecycleConfig::default(), scheduler.clone());
/// context.initialize();
///
/// let labels = context.create_factory_pool(
///     String::new,
///     |s: &mut String| s.clear(),
///     PoolConfiguration::new().with_name("labels"),
/// );
/// labels.checkout().push_str("quest");
///
/// for _ in 0..300 {
///     scheduler.tick();
/// }
///
/// context.dispose();
/// assert!(scheduler.is_empty());
/// ```
pub struct LifecycleContext {
    tracker: Arc<ResourceTracker>,
    scheduler: Arc<dyn Scheduler>,
    cache_defaults: CacheConfiguration,
    disposed: AtomicBool,
    initialized: Mutex<bool>,
}

impl LifecycleContext {
    pub fn new(config: LifecycleConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_tracker(ResourceTracker::new(config.tracker), scheduler, config.cache)
    }

    /// Wrap an already configured tracker, e.g. one with a memory source
    pub fn from_tracker(
        tracker: ResourceTracker,
        scheduler: Arc<dyn Scheduler>,
        cache_defaults: CacheConfiguration,
    ) -> Self {
        Self {
            tracker: Arc::new(tracker),
            scheduler,
            cache_defaults,
            disposed: AtomicBool::new(false),
            initialized: Mutex::new(false),
        }
    }

    /// Start periodic maintenance; `false` if already running or disposed
    pub fn initialize(&self) -> bool {
        let mut initialized = self.initialized.lock();
        if *initialized || self.is_disposed() {
            return false;
        }
        *initialized = self.tracker.start(Arc::clone(&self.scheduler));
        if *initialized {
            info!(component = "LifecycleContext", "lifecycle context initialized");
        }
        *initialized
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn create_pool<T>(&self, config: PoolConfiguration) -> SharedPool<ObjectPool<T>>
    where
        T: Poolable + Send + 'static,
    {
        let pool = SharedPool::new(ObjectPool::new(config));
        self.tracker.register_reclaimable(pool.shared());
        pool
    }

    pub fn create_factory_pool<T, C, R>(
        &self,
        create: C,
        reset: R,
        config: PoolConfiguration,
    ) -> SharedPool<FactoryPool<T>>
    where
        T: Send + 'static,
        C: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        let pool = SharedPool::new(FactoryPool::new(create, reset, config));
        self.tracker.register_reclaimable(pool.shared());
        pool
    }

    /// A cache with the context's default bounds under `name`
    pub fn create_cache<V>(&self, name: impl Into<String>) -> SharedCache<V>
    where
        V: EstimateSize + Send + 'static,
    {
        let config = self.cache_defaults.clone().with_name(name);
        self.adopt_cache(LruCache::new(config))
    }

    /// Share and register a cache built elsewhere, e.g. with a custom estimator
    pub fn adopt_cache<V: Send + 'static>(&self, cache: LruCache<V>) -> SharedCache<V> {
        let cache = Arc::new(Mutex::new(cache));
        self.tracker.register_reclaimable(&cache);
        cache
    }

    /// Cancel maintenance and clean every tracked resource
    ///
    /// Only the first call does anything; later calls return `None`.
    pub fn dispose(&self) -> Option<CleanupStats> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let stats = self.tracker.dispose();
        *self.initialized.lock() = false;
        info!(
            component = "LifecycleContext",
            cleaned = stats.cleaned,
            failed = stats.failed,
            "lifecycle context disposed"
        );
        Some(stats)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for LifecycleContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
