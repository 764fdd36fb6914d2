//! Statistics snapshots and metrics export

use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of a pool's counters
///
/// `current_usage` always equals `total_created - available`.
///
/// # Examples
///
/// ```
/// use lifecore::{FactoryPool, PoolConfiguration};
///
/// let mut pool = FactoryPool::new(Vec::<u8>::new, |v: &mut Vec<u8>| v.clear(), PoolConfiguration::default());
/// let buffer = pool.get();
///
/// let stats = pool.get_stats();
/// assert_eq!(stats.total_created, 1);
/// assert_eq!(stats.current_usage, 1);
/// pool.release(buffer);
/// assert_eq!(pool.get_stats().available, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    pub name: String,

    /// Configured capacity
    pub size: usize,

    /// Idle instances on the free list
    pub available: usize,

    pub total_created: usize,
    pub total_returned: usize,

    /// Idle instances discarded by `clear`, `resize` or reclamation
    pub total_destroyed: usize,

    /// Instances currently checked out
    ///
    /// Computed as created minus idle, floored at 0. The floor only matters
    /// when instances the pool never created were released into it.
    pub current_usage: usize,
}

impl PoolStats {
    /// Checked-out instances relative to capacity; may exceed 1.0 since pools are elastic
    pub fn utilization(&self) -> f64 {
        if self.size > 0 {
            self.current_usage as f64 / self.size as f64
        } else {
            0.0
        }
    }

    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("name".to_string(), self.name.clone());
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("current_usage".to_string(), self.current_usage.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization()));
        metrics
    }
}

/// Snapshot of an LRU cache's occupancy and counters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    pub name: String,
    pub count: usize,
    pub max_count: usize,

    /// Sum of estimated entry sizes
    pub byte_size: usize,
    pub max_size: usize,

    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("name".to_string(), self.name.clone());
        metrics.insert("count".to_string(), self.count.to_string());
        metrics.insert("max_count".to_string(), self.max_count.to_string());
        metrics.insert("byte_size".to_string(), self.byte_size.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("hits".to_string(), self.hits.to_string());
        metrics.insert("misses".to_string(), self.misses.to_string());
        metrics.insert("evictions".to_string(), self.evictions.to_string());
        metrics.insert("hit_rate".to_string(), format!("{:.2}", self.hit_rate()));
        metrics
    }
}

/// Outcome of one sweep (`perform_cleanup` or `force_cleanup_all`)
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CleanupStats {
    pub aggressive: bool,

    /// Resources whose cleanup ran to completion
    pub cleaned: usize,

    /// Resources whose cleanup panicked; they are still removed
    pub failed: usize,

    /// Context callbacks run (force cleanup only)
    pub context_callbacks: usize,

    /// Leak suspects reported by the post-sweep scan
    pub leaks_detected: usize,

    /// Idle pool instances and cache entries released by reclaimables
    pub reclaimed_objects: usize,

    /// Estimated bytes released by cleaned resources and reclaimables
    pub bytes_freed: usize,

    pub duration: Duration,
}

impl CleanupStats {
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("aggressive".to_string(), self.aggressive.to_string());
        metrics.insert("cleaned".to_string(), self.cleaned.to_string());
        metrics.insert("failed".to_string(), self.failed.to_string());
        metrics.insert("context_callbacks".to_string(), self.context_callbacks.to_string());
        metrics.insert("leaks_detected".to_string(), self.leaks_detected.to_string());
        metrics.insert("reclaimed_objects".to_string(), self.reclaimed_objects.to_string());
        metrics.insert("bytes_freed".to_string(), self.bytes_freed.to_string());
        metrics.insert("duration_us".to_string(), self.duration.as_micros().to_string());
        metrics
    }
}

/// Cumulative tracker counters
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrackerStats {
    /// Resources ever tracked
    pub total_resources: u64,

    /// Resources currently registered
    pub current_resources: usize,

    pub cleaned_resources: u64,
    pub failed_cleanups: u64,

    /// Suspects reported by the most recent leak scan
    pub leaks_detected: usize,

    pub bytes_freed: u64,
    pub cleanup_runs: u64,

    /// Context names with pending callbacks
    pub contexts: usize,
}

impl TrackerStats {
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_resources".to_string(), self.total_resources.to_string());
        metrics.insert("current_resources".to_string(), self.current_resources.to_string());
        metrics.insert("cleaned_resources".to_string(), self.cleaned_resources.to_string());
        metrics.insert("failed_cleanups".to_string(), self.failed_cleanups.to_string());
        metrics.insert("leaks_detected".to_string(), self.leaks_detected.to_string());
        metrics.insert("bytes_freed".to_string(), self.bytes_freed.to_string());
        metrics.insert("cleanup_runs".to_string(), self.cleanup_runs.to_string());
        metrics.insert("contexts".to_string(), self.contexts.to_string());
        metrics
    }
}

#[cfg(feature = "metrics")]
pub use exporter::PrometheusExporter;

#[cfg(feature = "metrics")]
mod exporter {
    use super::{CacheStats, PoolStats, TrackerStats};
    use crate::errors::{LifecycleError, LifecycleResult};
    use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

    /// Publishes stats snapshots as Prometheus gauges
    ///
    /// # Examples
    ///
    /// ```
    /// use lifecore::{CacheConfiguration, LruCache, PrometheusExporter};
    ///
    /// let exporter = PrometheusExporter::new("editor").unwrap();
    /// let mut cache: LruCache<String> = LruCache::new(CacheConfiguration::new().with_name("files"));
    /// cache.cache("a.json", "{}".to_string(), "a");
    ///
    /// exporter.observe_cache(&cache.get_stats());
    /// let output = exporter.encode().unwrap();
    /// assert!(output.contains("editor_cache_entries"));
    /// assert!(output.contains("cache=\"files\""));
    /// ```
    pub struct PrometheusExporter {
        registry: Registry,
        pool_objects: IntGaugeVec,
        pool_totals: IntGaugeVec,
        cache_entries: IntGaugeVec,
        cache_bytes: IntGaugeVec,
        cache_events: IntGaugeVec,
        tracker_resources: IntGaugeVec,
        tracker_totals: IntGaugeVec,
    }

    impl PrometheusExporter {
        pub fn new(namespace: &str) -> LifecycleResult<Self> {
            let registry = Registry::new();

            let gauge = |name: &str, help: &str, labels: &[&str]| -> LifecycleResult<IntGaugeVec> {
                let vec = IntGaugeVec::new(Opts::new(name, help).namespace(namespace), labels)?;
                registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            };

            let pool_objects = gauge("pool_objects", "Pool instances by state", &["pool", "state"])?;
            let pool_totals = gauge("pool_totals", "Cumulative pool counters", &["pool", "counter"])?;
            let cache_entries = gauge("cache_entries", "Cached entries", &["cache", "bound"])?;
            let cache_bytes = gauge("cache_bytes", "Estimated cached bytes", &["cache", "bound"])?;
            let cache_events = gauge("cache_events", "Cumulative cache events", &["cache", "event"])?;
            let tracker_resources = gauge("tracker_resources", "Currently tracked resources", &["state"])?;
            let tracker_totals = gauge("tracker_totals", "Cumulative tracker counters", &["counter"])?;

            Ok(Self {
                registry,
                pool_objects,
                pool_totals,
                cache_entries,
                cache_bytes,
                cache_events,
                tracker_resources,
                tracker_totals,
            })
        }

        pub fn observe_pool(&self, stats: &PoolStats) {
            let name = stats.name.as_str();
            self.pool_objects.with_label_values(&[name, "available"]).set(to_i64(stats.available as u64));
            self.pool_objects.with_label_values(&[name, "in_use"]).set(to_i64(stats.current_usage as u64));
            self.pool_objects.with_label_values(&[name, "capacity"]).set(to_i64(stats.size as u64));
            self.pool_totals.with_label_values(&[name, "created"]).set(to_i64(stats.total_created as u64));
            self.pool_totals.with_label_values(&[name, "returned"]).set(to_i64(stats.total_returned as u64));
            self.pool_totals.with_label_values(&[name, "destroyed"]).set(to_i64(stats.total_destroyed as u64));
        }

        pub fn observe_cache(&self, stats: &CacheStats) {
            let name = stats.name.as_str();
            self.cache_entries.with_label_values(&[name, "current"]).set(to_i64(stats.count as u64));
            self.cache_entries.with_label_values(&[name, "max"]).set(to_i64(stats.max_count as u64));
            self.cache_bytes.with_label_values(&[name, "current"]).set(to_i64(stats.byte_size as u64));
            self.cache_bytes.with_label_values(&[name, "max"]).set(to_i64(stats.max_size as u64));
            self.cache_events.with_label_values(&[name, "hit"]).set(to_i64(stats.hits));
            self.cache_events.with_label_values(&[name, "miss"]).set(to_i64(stats.misses));
            self.cache_events.with_label_values(&[name, "eviction"]).set(to_i64(stats.evictions));
        }

        pub fn observe_tracker(&self, stats: &TrackerStats) {
            self.tracker_resources.with_label_values(&["active"]).set(to_i64(stats.current_resources as u64));
            self.tracker_resources.with_label_values(&["suspected_leak"]).set(to_i64(stats.leaks_detected as u64));
            self.tracker_totals.with_label_values(&["tracked"]).set(to_i64(stats.total_resources));
            self.tracker_totals.with_label_values(&["cleaned"]).set(to_i64(stats.cleaned_resources));
            self.tracker_totals.with_label_values(&["failed"]).set(to_i64(stats.failed_cleanups));
            self.tracker_totals.with_label_values(&["bytes_freed"]).set(to_i64(stats.bytes_freed));
            self.tracker_totals.with_label_values(&["cleanup_runs"]).set(to_i64(stats.cleanup_runs));
        }

        /// Render every registered gauge in the text exposition format
        pub fn encode(&self) -> LifecycleResult<String> {
            let mut buffer = Vec::new();
            TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
            String::from_utf8(buffer).map_err(|err| LifecycleError::Metrics(err.to_string()))
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }
    }

    fn to_i64(value: u64) -> i64 {
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_export() {
        let stats = PoolStats {
            name: "nodes".to_string(),
            size: 10,
            available: 3,
            total_created: 8,
            total_returned: 5,
            total_destroyed: 0,
            current_usage: 5,
        };

        let exported = stats.export();
        assert_eq!(exported["current_usage"], "5");
        assert_eq!(exported["utilization"], "0.50");
    }

    #[test]
    fn test_cache_hit_rate() {
        let stats = CacheStats {
            name: "files".to_string(),
            count: 0,
            max_count: 1,
            byte_size: 0,
            max_size: 1,
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_exporter_tracker() {
        let exporter = PrometheusExporter::new("test").unwrap();
        exporter.observe_tracker(&TrackerStats {
            current_resources: 4,
            total_resources: 9,
            ..Default::default()
        });

        let output = exporter.encode().unwrap();
        assert!(output.contains("test_tracker_resources{state=\"active\"} 4"));
        assert!(output.contains("test_tracker_totals{counter=\"tracked\"} 9"));
    }
}
