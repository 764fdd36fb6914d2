//! Resource cleanup and leak detection

use crate::cache::SharedCache;
use crate::config::TrackerConfiguration;
use crate::errors::{LifecycleError, LifecycleResult};
use crate::eviction::{EvictionPolicy, ResourceTimes};
use crate::health::HealthStatus;
use crate::leak::{LeakHeuristics, LeakReason, LeakSuspect};
use crate::memory::{MemoryCheck, MemoryPressure, MemorySource};
use crate::metrics::{CleanupStats, TrackerStats};
use crate::reclaim::{Reclaimable, Reclaimed};
use crate::scheduler::{ScheduleHandle, Scheduler};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Passes `force_cleanup_all` makes over resources tracked by cleanup callbacks themselves
const FORCE_CLEANUP_PASSES: usize = 8;

/// Unique id of a tracked resource; never reused within a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res-{}", self.0)
    }
}

/// Kind of a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceKind {
    Listener,
    Timer,
    Observer,
    Animation,
    Node,
    CacheEntry,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Listener,
        ResourceKind::Timer,
        ResourceKind::Observer,
        ResourceKind::Animation,
        ResourceKind::Node,
        ResourceKind::CacheEntry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Listener => "listener",
            ResourceKind::Timer => "timer",
            ResourceKind::Observer => "observer",
            ResourceKind::Animation => "animation",
            ResourceKind::Node => "node",
            ResourceKind::CacheEntry => "cache-entry",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive part of a tracked resource, as seen by hosts and reports
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub label: String,

    /// Grouping name swept by `cleanup_context`
    pub context: Option<String>,

    pub estimated_size: usize,
}

/// Teardown closure run exactly once when a resource is cleaned
pub type CleanupFn = Box<dyn FnOnce() + Send + Sync>;

/// A resource to hand to [`ResourceTracker::track_resource`]
///
/// # Examples
///
/// ```
/// use lifecore::{ResourceDescriptor, ResourceKind, ResourceTracker, TrackerConfiguration};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let tracker = ResourceTracker::new(TrackerConfiguration::default());
/// let detached = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&detached);
///
/// let id = tracker.track_resource(
///     ResourceDescriptor::new(ResourceKind::Listener, move || flag.store(true, Ordering::Relaxed))
///         .with_label("quest-list:click")
///         .with_context("panel:quest"),
/// );
///
/// assert!(tracker.cleanup_resource(id));
/// assert!(detached.load(Ordering::Relaxed));
/// assert!(!tracker.cleanup_resource(id));
/// ```
pub struct ResourceDescriptor {
    kind: ResourceKind,
    label: String,
    context: Option<String>,
    estimated_size: usize,
    cleanup: CleanupFn,
}

impl ResourceDescriptor {
    pub fn new<F>(kind: ResourceKind, cleanup: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            kind,
            label: String::new(),
            context: None,
            estimated_size: 0,
            cleanup: Box::new(cleanup),
        }
    }

    /// Describe a cache entry whose cleanup removes `key` from `cache`
    pub fn cache_entry<V: Send + 'static>(cache: &SharedCache<V>, key: impl Into<String>) -> Self {
        let key = key.into();
        let estimated_size = cache.lock().get_item(&key).map_or(0, |item| item.byte_size);
        let label = key.clone();
        let cache = Arc::downgrade(cache);

        Self::new(ResourceKind::CacheEntry, move || {
            if let Some(cache) = cache.upgrade() {
                cache.lock().remove(&key);
            }
        })
        .with_label(label)
        .with_estimated_size(estimated_size)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_estimated_size(mut self, bytes: usize) -> Self {
        self.estimated_size = bytes;
        self
    }
}

struct TrackedResource {
    info: ResourceInfo,
    times: ResourceTimes,
    cleanup: CleanupFn,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    cleaned: AtomicU64,
    failed: AtomicU64,
    bytes_freed: AtomicU64,
    cleanup_runs: AtomicU64,
    leaks: AtomicUsize,
}

struct Maintenance {
    scheduler: Arc<dyn Scheduler>,
    handles: Vec<ScheduleHandle>,
}

/// Clears the sweep flag when a sweep ends
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry of releasable resources with periodic, pressure-driven cleanup
///
/// Every resource is either active (registered) or cleaned (removed).
/// Cleanup callbacks run outside internal locks and are isolated: a
/// panicking callback is logged and counted, and the sweep carries on.
/// Callbacks may call back into the tracker.
pub struct ResourceTracker {
    config: TrackerConfiguration,
    resources: DashMap<ResourceId, TrackedResource>,
    contexts: DashMap<String, Vec<CleanupFn>>,
    next_id: AtomicU64,
    counters: Counters,
    sweeping: AtomicBool,
    leak_heuristics: LeakHeuristics,
    memory: Option<Arc<dyn MemorySource>>,
    last_pressure: Mutex<MemoryPressure>,
    reclaimables: Mutex<Vec<Weak<dyn Reclaimable>>>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl ResourceTracker {
    pub fn new(config: TrackerConfiguration) -> Self {
        let config = config.sanitized();
        Self {
            leak_heuristics: LeakHeuristics::new(config.leak_age, config.leak_idle),
            config,
            resources: DashMap::new(),
            contexts: DashMap::new(),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
            sweeping: AtomicBool::new(false),
            memory: None,
            last_pressure: Mutex::new(MemoryPressure::Normal),
            reclaimables: Mutex::new(Vec::new()),
            maintenance: Mutex::new(None),
        }
    }

    /// Read heap usage from `source` in `check_memory_thresholds`
    pub fn with_memory_source(mut self, source: Arc<dyn MemorySource>) -> Self {
        self.memory = Some(source);
        self
    }

    /// Let leak detection ask the host whether a listener's target is still attached
    pub fn with_reachability<F>(mut self, is_reachable: F) -> Self
    where
        F: Fn(&ResourceInfo) -> bool + Send + Sync + 'static,
    {
        self.leak_heuristics.set_reachability(Arc::new(is_reachable));
        self
    }

    pub fn config(&self) -> &TrackerConfiguration {
        &self.config
    }

    /// Register a resource that has just been acquired
    ///
    /// Past 80% of `max_resources` this triggers a normal sweep before returning.
    pub fn track_resource(&self, descriptor: ResourceDescriptor) -> ResourceId {
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let ResourceDescriptor {
            kind,
            label,
            context,
            estimated_size,
            cleanup,
        } = descriptor;

        self.resources.insert(
            id,
            TrackedResource {
                info: ResourceInfo {
                    id,
                    kind,
                    label,
                    context,
                    estimated_size,
                },
                times: ResourceTimes::new(Instant::now()),
                cleanup,
            },
        );
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        if self.resources.len().saturating_mul(5) > self.config.max_resources.saturating_mul(4)
            && !self.sweeping.load(Ordering::Relaxed)
        {
            debug!(
                component = "ResourceTracker",
                tracked = self.resources.len(),
                max = self.config.max_resources,
                "registry near its cap, sweeping"
            );
            self.perform_cleanup(false);
        }
        id
    }

    /// Mark a resource as in use; `false` for unknown ids
    pub fn touch_resource(&self, id: ResourceId) -> bool {
        match self.resources.get_mut(&id) {
            Some(mut resource) => {
                resource.times.touch(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Clean one resource; `true` when its callback ran to completion
    pub fn cleanup_resource(&self, id: ResourceId) -> bool {
        match self.try_cleanup_resource(id) {
            Ok(()) => true,
            Err(LifecycleError::UnknownResource(_)) => {
                debug!(component = "ResourceTracker", %id, "cleanup of untracked resource ignored");
                false
            }
            Err(_) => false,
        }
    }

    /// Like [`cleanup_resource`](Self::cleanup_resource), reporting why nothing ran
    pub fn try_cleanup_resource(&self, id: ResourceId) -> LifecycleResult<()> {
        let (_, resource) = self
            .resources
            .remove(&id)
            .ok_or(LifecycleError::UnknownResource(id))?;
        self.run_cleanup(resource)
    }

    /// Add a callback run by `cleanup_context(name)` or `force_cleanup_all`
    pub fn register_context_cleanup<F>(&self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.contexts
            .entry(name.into())
            .or_default()
            .push(Box::new(cleanup));
    }

    /// Run the callbacks registered under `name` and clean the resources tracked in it
    ///
    /// Returns how many callbacks and resources were cleaned successfully.
    /// Calling it again for the same name is a no-op.
    pub fn cleanup_context(&self, name: &str) -> usize {
        let mut cleaned = 0;

        if let Some((_, callbacks)) = self.contexts.remove(name) {
            for callback in callbacks {
                if self.run_context_callback(name, callback) {
                    cleaned += 1;
                }
            }
        }

        let ids: Vec<ResourceId> = self
            .resources
            .iter()
            .filter(|entry| entry.info.context.as_deref() == Some(name))
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            if let Some((_, resource)) = self.resources.remove(&id)
                && self.run_cleanup(resource).is_ok()
            {
                cleaned += 1;
            }
        }

        debug!(component = "ResourceTracker", context = name, cleaned, "context cleaned");
        cleaned
    }

    /// Sweep resources idle longer than `max_age` (half of it when aggressive)
    ///
    /// Also evicts the least recently used resources while the registry is
    /// over its cap, asks registered pools and caches to shrink, and runs a
    /// leak scan for reporting. Re-entrant calls from cleanup callbacks
    /// return immediately.
    pub fn perform_cleanup(&self, aggressive: bool) -> CleanupStats {
        let mut stats = CleanupStats {
            aggressive,
            ..Default::default()
        };
        let Some(_guard) = SweepGuard::acquire(&self.sweeping) else {
            debug!(component = "ResourceTracker", "sweep already running");
            return stats;
        };

        let started = Instant::now();
        let policy = EvictionPolicy::IdleTimeout(self.config.max_age);
        let policy = if aggressive { policy.halved() } else { policy };

        let mut expired = Vec::new();
        let mut fresh = Vec::new();
        for entry in self.resources.iter() {
            if entry.times.expiry(&policy, started).is_some() {
                expired.push(*entry.key());
            } else {
                fresh.push((entry.times.last_used, *entry.key()));
            }
        }

        if fresh.len() > self.config.max_resources {
            let excess = fresh.len() - self.config.max_resources;
            fresh.sort_unstable();
            expired.extend(fresh.iter().take(excess).map(|(_, id)| *id));
            warn!(
                component = "ResourceTracker",
                excess,
                max = self.config.max_resources,
                "registry over its cap, evicting least recently used resources"
            );
        }

        for id in expired {
            let Some((_, resource)) = self.resources.remove(&id) else {
                continue;
            };
            let size = resource.info.estimated_size;
            match self.run_cleanup(resource) {
                Ok(()) => {
                    stats.cleaned += 1;
                    stats.bytes_freed += size;
                }
                Err(_) => stats.failed += 1,
            }
        }

        let reclaimed = self.reclaim_all(aggressive);
        stats.reclaimed_objects = reclaimed.objects;
        stats.bytes_freed += reclaimed.bytes;
        stats.leaks_detected = self.detect_resource_leaks().len();
        stats.duration = started.elapsed();
        self.counters.cleanup_runs.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = "ResourceTracker",
            aggressive,
            cleaned = stats.cleaned,
            failed = stats.failed,
            reclaimed = stats.reclaimed_objects,
            leaks = stats.leaks_detected,
            remaining = self.resources.len(),
            "sweep finished"
        );
        stats
    }

    /// Report resources that look leaked without cleaning them
    pub fn detect_resource_leaks(&self) -> Vec<LeakSuspect> {
        let now = Instant::now();
        let snapshot: Vec<(ResourceInfo, ResourceTimes)> = self
            .resources
            .iter()
            .map(|entry| (entry.info.clone(), entry.times))
            .collect();

        let suspects: Vec<LeakSuspect> = snapshot
            .iter()
            .filter_map(|(info, times)| self.leak_heuristics.classify(info, times, now))
            .collect();

        self.counters.leaks.store(suspects.len(), Ordering::Relaxed);
        if !suspects.is_empty() {
            let count = |reason: LeakReason| suspects.iter().filter(|s| s.reason == reason).count();
            warn!(
                component = "ResourceTracker",
                suspects = suspects.len(),
                stale = count(LeakReason::Stale),
                unused = count(LeakReason::Unused),
                detached = count(LeakReason::Detached),
                "possible resource leaks"
            );
        }
        suspects
    }

    /// Read heap usage and sweep according to the configured thresholds
    pub fn check_memory_thresholds(&self) -> MemoryCheck {
        let usage = self.memory.as_ref().and_then(|source| source.heap_usage_percent());
        let Some(usage) = usage else {
            return MemoryCheck::default();
        };

        let pressure = MemoryPressure::classify(usage, &self.config.thresholds);
        *self.last_pressure.lock() = pressure;

        let cleanup = match pressure {
            MemoryPressure::Normal => None,
            MemoryPressure::Warning => {
                info!(component = "ResourceTracker", usage, "memory usage above warning threshold");
                Some(self.perform_cleanup(false))
            }
            MemoryPressure::Critical => {
                warn!(component = "ResourceTracker", usage, "memory usage critical, sweeping aggressively");
                Some(self.perform_cleanup(true))
            }
            MemoryPressure::Emergency => {
                error!(component = "ResourceTracker", usage, "memory usage at emergency level, sweeping aggressively");
                Some(self.perform_cleanup(true))
            }
        };

        MemoryCheck {
            usage_percent: Some(usage),
            pressure,
            cleanup,
        }
    }

    /// Clean every resource and run every context callback
    pub fn force_cleanup_all(&self) -> CleanupStats {
        let started = Instant::now();
        let mut stats = CleanupStats {
            aggressive: true,
            ..Default::default()
        };

        for _ in 0..FORCE_CLEANUP_PASSES {
            let names: Vec<String> = self.contexts.iter().map(|entry| entry.key().clone()).collect();
            for name in names {
                if let Some((_, callbacks)) = self.contexts.remove(&name) {
                    for callback in callbacks {
                        stats.context_callbacks += 1;
                        self.run_context_callback(&name, callback);
                    }
                }
            }

            let ids: Vec<ResourceId> = self.resources.iter().map(|entry| *entry.key()).collect();
            for id in ids {
                let Some((_, resource)) = self.resources.remove(&id) else {
                    continue;
                };
                let size = resource.info.estimated_size;
                match self.run_cleanup(resource) {
                    Ok(()) => {
                        stats.cleaned += 1;
                        stats.bytes_freed += size;
                    }
                    Err(_) => stats.failed += 1,
                }
            }

            if self.resources.is_empty() && self.contexts.is_empty() {
                break;
            }
        }

        if !self.resources.is_empty() || !self.contexts.is_empty() {
            warn!(
                component = "ResourceTracker",
                remaining = self.resources.len(),
                "cleanup callbacks keep tracking new resources"
            );
        }

        self.counters.leaks.store(0, Ordering::Relaxed);
        stats.duration = started.elapsed();
        info!(
            component = "ResourceTracker",
            cleaned = stats.cleaned,
            failed = stats.failed,
            callbacks = stats.context_callbacks,
            "all resources cleaned"
        );
        stats
    }

    /// Let sweeps shrink `target`; the tracker keeps only a weak reference
    pub fn register_reclaimable<R: Reclaimable + 'static>(&self, target: &Arc<R>) {
        let weak: Weak<dyn Reclaimable> = Arc::downgrade(target) as Weak<dyn Reclaimable>;
        self.reclaimables.lock().push(weak);
    }

    pub fn get_stats(&self) -> TrackerStats {
        TrackerStats {
            total_resources: self.counters.total.load(Ordering::Relaxed),
            current_resources: self.resources.len(),
            cleaned_resources: self.counters.cleaned.load(Ordering::Relaxed),
            failed_cleanups: self.counters.failed.load(Ordering::Relaxed),
            leaks_detected: self.counters.leaks.load(Ordering::Relaxed),
            bytes_freed: self.counters.bytes_freed.load(Ordering::Relaxed),
            cleanup_runs: self.counters.cleanup_runs.load(Ordering::Relaxed),
            contexts: self.contexts.len(),
        }
    }

    /// Count of tracked resources per kind; kinds with none are omitted
    pub fn get_resource_breakdown(&self) -> HashMap<ResourceKind, usize> {
        let mut breakdown = HashMap::new();
        for entry in self.resources.iter() {
            *breakdown.entry(entry.info.kind).or_insert(0) += 1;
        }
        breakdown
    }

    pub fn resource_info(&self, id: ResourceId) -> Option<ResourceInfo> {
        self.resources.get(&id).map(|entry| entry.info.clone())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            &self.get_stats(),
            self.config.max_resources,
            *self.last_pressure.lock(),
        )
    }

    /// Schedule periodic sweeps and memory checks on `scheduler`
    ///
    /// Returns `false` if maintenance is already running.
    pub fn start(self: &Arc<Self>, scheduler: Arc<dyn Scheduler>) -> bool {
        let mut maintenance = self.maintenance.lock();
        if maintenance.is_some() {
            warn!(component = "ResourceTracker", "maintenance already scheduled");
            return false;
        }

        let tracker = Arc::downgrade(self);
        let sweep = scheduler.every_n_frames(
            self.config.cleanup_interval_frames,
            Box::new(move || {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.perform_cleanup(false);
                }
            }),
        );

        let tracker = Arc::downgrade(self);
        let memory_check = scheduler.every_n_frames(
            self.config.memory_check_interval_frames,
            Box::new(move || {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.check_memory_thresholds();
                }
            }),
        );

        *maintenance = Some(Maintenance {
            scheduler,
            handles: vec![sweep, memory_check],
        });
        info!(
            component = "ResourceTracker",
            cleanup_every = self.config.cleanup_interval_frames,
            memory_check_every = self.config.memory_check_interval_frames,
            "maintenance scheduled"
        );
        true
    }

    /// Cancel scheduled maintenance; tracked resources are left alone
    pub fn stop(&self) -> bool {
        let Some(maintenance) = self.maintenance.lock().take() else {
            return false;
        };
        for handle in maintenance.handles {
            maintenance.scheduler.cancel(handle);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.maintenance.lock().is_some()
    }

    /// Cancel maintenance, then clean everything
    pub fn dispose(&self) -> CleanupStats {
        self.stop();
        self.force_cleanup_all()
    }

    fn run_cleanup(&self, resource: TrackedResource) -> LifecycleResult<()> {
        let TrackedResource { info, cleanup, .. } = resource;
        match panic::catch_unwind(AssertUnwindSafe(cleanup)) {
            Ok(()) => {
                self.counters.cleaned.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_freed
                    .fetch_add(info.estimated_size as u64, Ordering::Relaxed);
                debug!(component = "ResourceTracker", id = %info.id, kind = %info.kind, "resource cleaned");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    component = "ResourceTracker",
                    id = %info.id,
                    kind = %info.kind,
                    label = %info.label,
                    %message,
                    "resource cleanup panicked"
                );
                Err(LifecycleError::CleanupPanicked {
                    id: info.id,
                    message,
                })
            }
        }
    }

    fn run_context_callback(&self, context: &str, callback: CleanupFn) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(()) => true,
            Err(payload) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    component = "ResourceTracker",
                    context,
                    message = %panic_message(payload.as_ref()),
                    "context cleanup callback panicked"
                );
                false
            }
        }
    }

    fn reclaim_all(&self, aggressive: bool) -> Reclaimed {
        let live: Vec<Arc<dyn Reclaimable>> = {
            let mut targets = self.reclaimables.lock();
            targets.retain(|target| target.strong_count() > 0);
            targets.iter().filter_map(Weak::upgrade).collect()
        };

        let mut total = Reclaimed::default();
        for target in live {
            let reclaimed = target.reclaim(aggressive);
            if reclaimed.objects > 0 {
                debug!(
                    component = "ResourceTracker",
                    target = %target.name(),
                    objects = reclaimed.objects,
                    bytes = reclaimed.bytes,
                    "reclaimed idle memory"
                );
            }
            total.objects += reclaimed.objects;
            total.bytes += reclaimed.bytes;
        }
        self.counters
            .bytes_freed
            .fetch_add(total.bytes as u64, Ordering::Relaxed);
        total
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruCache;
    use crate::config::{CacheConfiguration, MemoryThresholds, PoolConfiguration};
    use crate::memory::MemoryGauge;
    use crate::pool::{FactoryPool, SharedPool};
    use crate::scheduler::FrameScheduler;
    use std::time::Duration;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn counting(kind: ResourceKind, runs: &Arc<AtomicUsize>) -> ResourceDescriptor {
        let runs = Arc::clone(runs);
        ResourceDescriptor::new(kind, move || {
            runs.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn tracker(config: TrackerConfiguration) -> ResourceTracker {
        ResourceTracker::new(config)
    }

    #[test]
    fn test_cleanup_resource_runs_once() {
        let tracker = tracker(TrackerConfiguration::default());
        let runs = counter();
        let id = tracker.track_resource(counting(ResourceKind::Timer, &runs));

        assert!(tracker.touch_resource(id));
        assert!(tracker.cleanup_resource(id));
        assert!(!tracker.cleanup_resource(id));
        assert!(!tracker.touch_resource(id));
        assert_eq!(tracker.try_cleanup_resource(id), Err(LifecycleError::UnknownResource(id)));
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        let stats = tracker.get_stats();
        assert_eq!(stats.total_resources, 1);
        assert_eq!(stats.cleaned_resources, 1);
        assert_eq!(stats.current_resources, 0);
    }

    #[test]
    fn test_uncapped_registry_tracks_without_sweeping() {
        let tracker = tracker(TrackerConfiguration::new().with_max_resources(usize::MAX));
        let runs = counter();
        for _ in 0..3 {
            tracker.track_resource(counting(ResourceKind::Node, &runs));
        }

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.get_stats().cleanup_runs, 0);
        assert!(tracker.get_health_status().is_healthy());
    }

    #[test]
    fn test_ids_are_unique() {
        let tracker = tracker(TrackerConfiguration::default());
        let runs = counter();
        let a = tracker.track_resource(counting(ResourceKind::Node, &runs));
        tracker.cleanup_resource(a);
        let b = tracker.track_resource(counting(ResourceKind::Node, &runs));
        assert_ne!(a, b);
    }

    #[test]
    fn test_panicking_cleanup_is_contained() {
        let tracker = tracker(TrackerConfiguration::default());
        let runs = counter();
        let bad = tracker.track_resource(
            ResourceDescriptor::new(ResourceKind::Observer, || panic!("observer already gone"))
                .with_context("panel:map"),
        );
        tracker.track_resource(counting(ResourceKind::Observer, &runs).with_context("panel:map"));

        assert!(matches!(
            tracker.try_cleanup_resource(bad),
            Err(LifecycleError::CleanupPanicked { message, .. }) if message == "observer already gone"
        ));
        assert!(tracker.resource_info(bad).is_none());

        let bad_again = tracker.track_resource(
            ResourceDescriptor::new(ResourceKind::Observer, || panic!("again")).with_context("panel:map"),
        );
        assert_eq!(tracker.cleanup_context("panel:map"), 1);
        assert!(tracker.resource_info(bad_again).is_none());
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert_eq!(tracker.get_stats().failed_cleanups, 2);
    }

    #[test]
    fn test_cleanup_context_is_idempotent() {
        let tracker = tracker(TrackerConfiguration::default());
        let runs = counter();
        let callbacks = counter();
        let seen = Arc::clone(&callbacks);
        tracker.register_context_cleanup("panel:quest", move || {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        tracker.track_resource(counting(ResourceKind::Listener, &runs).with_context("panel:quest"));
        tracker.track_resource(counting(ResourceKind::Listener, &runs).with_context("panel:quest"));
        tracker.track_resource(counting(ResourceKind::Listener, &runs).with_context("panel:items"));

        assert_eq!(tracker.cleanup_context("panel:quest"), 3);
        let after_first = tracker.get_stats().current_resources;
        assert_eq!(after_first, 1);

        assert_eq!(tracker.cleanup_context("panel:quest"), 0);
        assert_eq!(tracker.get_stats().current_resources, after_first);
        assert_eq!(callbacks.load(Ordering::Relaxed), 1);
        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_force_cleanup_all_empties_everything() {
        let tracker = tracker(TrackerConfiguration::default());
        let runs = counter();
        for kind in ResourceKind::ALL {
            for _ in 0..3 {
                tracker.track_resource(counting(kind, &runs));
            }
        }
        tracker.track_resource(ResourceDescriptor::new(ResourceKind::Animation, || panic!("boom")));
        let callbacks = counter();
        let seen = Arc::clone(&callbacks);
        tracker.register_context_cleanup("editor", move || {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(tracker.get_resource_breakdown()[&ResourceKind::Animation], 4);

        let stats = tracker.force_cleanup_all();

        assert_eq!(stats.cleaned, 18);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.context_callbacks, 1);
        assert_eq!(tracker.get_stats().current_resources, 0);
        assert_eq!(tracker.get_stats().contexts, 0);
        assert!(tracker.get_resource_breakdown().is_empty());
        assert_eq!(runs.load(Ordering::Relaxed), 18);
        assert_eq!(callbacks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_force_cleanup_handles_reentrant_tracking() {
        let tracker = Arc::new(tracker(TrackerConfiguration::default()));
        let inner = Arc::downgrade(&tracker);
        tracker.track_resource(ResourceDescriptor::new(ResourceKind::Node, move || {
            if let Some(tracker) = inner.upgrade() {
                tracker.track_resource(ResourceDescriptor::new(ResourceKind::Node, || {}));
            }
        }));

        let stats = tracker.force_cleanup_all();
        assert_eq!(stats.cleaned, 2);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_cleanup_sweeps_idle_resources() {
        let tracker = tracker(TrackerConfiguration::new().with_max_age(Duration::from_secs(300)));
        let runs = counter();
        let busy = tracker.track_resource(counting(ResourceKind::Timer, &runs));
        let idle = tracker.track_resource(counting(ResourceKind::Timer, &runs).with_estimated_size(128));

        tokio::time::advance(Duration::from_secs(240)).await;
        tracker.touch_resource(busy);
        tokio::time::advance(Duration::from_secs(120)).await;

        let stats = tracker.perform_cleanup(false);
        assert_eq!(stats.cleaned, 1);
        assert_eq!(stats.bytes_freed, 128);
        assert!(tracker.resource_info(idle).is_none());
        assert!(tracker.resource_info(busy).is_some());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tracker.perform_cleanup(false).cleaned, 0);
        assert_eq!(tracker.perform_cleanup(true).cleaned, 1);
        assert!(tracker.is_empty());
        assert_eq!(tracker.get_stats().cleanup_runs, 3);
    }

    #[test]
    fn test_backpressure_keeps_registry_at_cap() {
        let tracker = tracker(TrackerConfiguration::new().with_max_resources(10));
        let runs = counter();
        let ids: Vec<ResourceId> = (0..20)
            .map(|_| tracker.track_resource(counting(ResourceKind::Node, &runs)))
            .collect();

        assert_eq!(tracker.len(), 10);
        assert_eq!(runs.load(Ordering::Relaxed), 10);
        assert!(ids[..10].iter().all(|id| tracker.resource_info(*id).is_none()));
        assert!(ids[10..].iter().all(|id| tracker.resource_info(*id).is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaks_are_reported_not_cleaned() {
        let tracker = tracker(
            TrackerConfiguration::new()
                .with_max_age(Duration::from_secs(3600))
                .with_leak_limits(Duration::from_secs(7200), Duration::from_secs(600)),
        )
        .with_reachability(|info: &ResourceInfo| info.label != "detached");
        let runs = counter();
        tracker.track_resource(counting(ResourceKind::Listener, &runs).with_label("detached"));
        tracker.track_resource(counting(ResourceKind::Listener, &runs).with_label("attached"));
        assert_eq!(tracker.detect_resource_leaks().len(), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        let suspects = tracker.detect_resource_leaks();
        assert_eq!(suspects.len(), 2);
        assert!(suspects.iter().all(|s| s.reason == LeakReason::Unused));

        let stats = tracker.perform_cleanup(false);
        assert_eq!(stats.cleaned, 0);
        assert_eq!(stats.leaks_detected, 2);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get_stats().leaks_detected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_thresholds_escalate() {
        let gauge = Arc::new(MemoryGauge::new());
        let tracker = tracker(
            TrackerConfiguration::new()
                .with_max_age(Duration::from_secs(100))
                .with_thresholds(MemoryThresholds::new(70.0, 85.0, 95.0)),
        )
        .with_memory_source(gauge.clone());
        let runs = counter();
        tracker.track_resource(counting(ResourceKind::Animation, &runs));

        assert_eq!(tracker.check_memory_thresholds(), MemoryCheck::default());

        gauge.set(50.0);
        let check = tracker.check_memory_thresholds();
        assert_eq!(check.pressure, MemoryPressure::Normal);
        assert!(check.cleanup.is_none());

        tokio::time::advance(Duration::from_secs(60)).await;
        gauge.set(75.0);
        let check = tracker.check_memory_thresholds();
        assert_eq!(check.pressure, MemoryPressure::Warning);
        assert_eq!(check.cleanup.map(|c| (c.aggressive, c.cleaned)), Some((false, 0)));

        gauge.set(90.0);
        let check = tracker.check_memory_thresholds();
        assert_eq!(check.pressure, MemoryPressure::Critical);
        assert_eq!(check.cleanup.map(|c| (c.aggressive, c.cleaned)), Some((true, 1)));

        gauge.set(99.0);
        assert_eq!(tracker.check_memory_thresholds().pressure, MemoryPressure::Emergency);
        assert!(!tracker.get_health_status().is_healthy());
    }

    #[test]
    fn test_sweeps_shrink_registered_pools() {
        let tracker = tracker(TrackerConfiguration::default());
        let pool = SharedPool::new(FactoryPool::new(
            || 0u64,
            |n: &mut u64| *n = 0,
            PoolConfiguration::new().with_capacity(2),
        ));
        tracker.register_reclaimable(pool.shared());
        {
            let mut guard = pool.lock();
            let held: Vec<u64> = (0..3).map(|_| guard.get()).collect();
            for n in held {
                guard.release(n);
            }
        }

        assert_eq!(tracker.perform_cleanup(false).reclaimed_objects, 1);
        assert_eq!(tracker.perform_cleanup(true).reclaimed_objects, 1);
        assert_eq!(pool.lock().available(), 1);

        drop(pool);
        assert_eq!(tracker.perform_cleanup(true).reclaimed_objects, 0);
        assert!(tracker.reclaimables.lock().is_empty());
    }

    #[test]
    fn test_cache_entry_descriptor_removes_key() {
        let tracker = tracker(TrackerConfiguration::default());
        let cache: SharedCache<String> = Arc::new(Mutex::new(LruCache::new(CacheConfiguration::default())));
        cache.lock().cache("quests.json", "[]".to_string(), "quests");

        let id = tracker.track_resource(ResourceDescriptor::cache_entry(&cache, "quests.json"));
        let info = tracker.resource_info(id).unwrap();
        assert_eq!(info.kind, ResourceKind::CacheEntry);
        assert_eq!(info.estimated_size, 4);

        assert!(tracker.cleanup_resource(id));
        assert!(!cache.lock().has("quests.json"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_maintenance_and_dispose() {
        let tracker = Arc::new(tracker(
            TrackerConfiguration::new()
                .with_max_age(Duration::from_millis(500))
                .with_cleanup_interval(2)
                .with_memory_check_interval(4),
        ));
        let scheduler = Arc::new(FrameScheduler::new());
        assert!(tracker.start(scheduler.clone()));
        assert!(!tracker.start(scheduler.clone()));
        assert_eq!(scheduler.len(), 2);

        let runs = counter();
        tracker.track_resource(counting(ResourceKind::Timer, &runs));
        tokio::time::advance(Duration::from_secs(1)).await;

        scheduler.tick();
        assert_eq!(runs.load(Ordering::Relaxed), 0);
        scheduler.tick();
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        tracker.track_resource(counting(ResourceKind::Timer, &runs));
        let stats = tracker.dispose();
        assert_eq!(stats.cleaned, 1);
        assert!(scheduler.is_empty());
        assert!(!tracker.is_running());
        assert!(tracker.is_empty());
    }
}
