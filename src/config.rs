//! Configuration for pools, caches and the resource tracker

use crate::errors::{LifecycleError, LifecycleResult};
use std::time::Duration;

/// Configuration for an [`ObjectPool`](crate::ObjectPool) or
/// [`FactoryPool`](crate::FactoryPool)
///
/// # Examples
///
/// ```
/// use lifecore::PoolConfiguration;
///
/// let config = PoolConfiguration::new()
///     .with_name("completion-items")
///     .with_capacity(64)
///     .with_preallocate(16);
///
/// assert_eq!(config.capacity, 64);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfiguration {
    /// Name reported in stats and log events
    pub name: String,

    /// Number of idle instances retained by `clear()`
    pub capacity: usize,

    /// Idle instances created eagerly at construction
    pub preallocate: usize,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 100,
            preallocate: 0,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_preallocate(mut self, count: usize) -> Self {
        self.preallocate = count;
        self
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.capacity < 1 {
            return Err(LifecycleError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

/// Bounds for an [`LruCache`](crate::LruCache)
///
/// `max_size` is compared against estimated byte sizes, so it is an
/// approximate memory bound rather than an exact one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfiguration {
    pub name: String,

    /// Upper bound on the sum of estimated entry sizes, in bytes
    pub max_size: usize,

    /// Upper bound on the number of entries
    pub max_count: usize,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            max_size: 50 * 1024 * 1024,
            max_count: 1000,
        }
    }
}

impl CacheConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_size(mut self, bytes: usize) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = count;
        self
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.max_size < 1 {
            return Err(LifecycleError::InvalidCacheBound {
                bound: "max_size",
                value: self.max_size,
            });
        }
        if self.max_count < 1 {
            return Err(LifecycleError::InvalidCacheBound {
                bound: "max_count",
                value: self.max_count,
            });
        }
        Ok(())
    }
}

/// Heap-usage percentages at which the tracker escalates cleanup
///
/// # Examples
///
/// ```
/// use lifecore::MemoryThresholds;
///
/// let thresholds = MemoryThresholds::new(60.0, 80.0, 90.0);
/// assert!(thresholds.validate().is_ok());
///
/// let broken = MemoryThresholds::new(80.0, 60.0, 90.0);
/// assert!(broken.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MemoryThresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            warning: 70.0,
            critical: 85.0,
            emergency: 95.0,
        }
    }
}

impl MemoryThresholds {
    pub fn new(warning: f64, critical: f64, emergency: f64) -> Self {
        Self {
            warning,
            critical,
            emergency,
        }
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        let ordered = 0.0 <= self.warning
            && self.warning < self.critical
            && self.critical < self.emergency
            && self.emergency <= 100.0;
        if !ordered {
            return Err(LifecycleError::InvalidThresholds {
                warning: self.warning,
                critical: self.critical,
                emergency: self.emergency,
            });
        }
        Ok(())
    }
}

/// Configuration for the [`ResourceTracker`](crate::ResourceTracker)
///
/// # Examples
///
/// ```
/// use lifecore::TrackerConfiguration;
/// use std::time::Duration;
///
/// let config = TrackerConfiguration::new()
///     .with_max_age(Duration::from_secs(60))
///     .with_max_resources(500)
///     .with_cleanup_interval(120);
///
/// assert_eq!(config.max_resources, 500);
/// assert_eq!(config.cleanup_interval_frames, 120);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackerConfiguration {
    /// Idle time after which a resource is swept; halved for aggressive sweeps
    pub max_age: Duration,

    /// Hard cap on tracked resources
    pub max_resources: usize,

    /// Frames between periodic sweeps
    pub cleanup_interval_frames: u32,

    /// Frames between memory-threshold checks
    pub memory_check_interval_frames: u32,

    pub thresholds: MemoryThresholds,

    /// Age past which a resource is reported as a leak suspect
    pub leak_age: Duration,

    /// Idle time past which a resource is reported as a leak suspect
    pub leak_idle: Duration,
}

impl Default for TrackerConfiguration {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            max_resources: 10_000,
            cleanup_interval_frames: 300,
            memory_check_interval_frames: 600,
            thresholds: MemoryThresholds::default(),
            leak_age: Duration::from_secs(30 * 60),
            leak_idle: Duration::from_secs(10 * 60),
        }
    }
}

impl TrackerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_max_resources(mut self, count: usize) -> Self {
        self.max_resources = count;
        self
    }

    pub fn with_cleanup_interval(mut self, frames: u32) -> Self {
        self.cleanup_interval_frames = frames;
        self
    }

    pub fn with_memory_check_interval(mut self, frames: u32) -> Self {
        self.memory_check_interval_frames = frames;
        self
    }

    pub fn with_thresholds(mut self, thresholds: MemoryThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the age and idle limits used by leak detection
    pub fn with_leak_limits(mut self, age: Duration, idle: Duration) -> Self {
        self.leak_age = age;
        self.leak_idle = idle;
        self
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.max_resources < 1 {
            return Err(LifecycleError::InvalidCapacity(self.max_resources));
        }
        if self.cleanup_interval_frames < 1 {
            return Err(LifecycleError::InvalidInterval(self.cleanup_interval_frames));
        }
        if self.memory_check_interval_frames < 1 {
            return Err(LifecycleError::InvalidInterval(
                self.memory_check_interval_frames,
            ));
        }
        self.thresholds.validate()
    }

    /// Replace out-of-range values with defaults, logging each correction
    pub(crate) fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_resources < 1 {
            tracing::warn!(
                component = "ResourceTracker",
                "max_resources of 0 clamped to 1"
            );
            self.max_resources = 1;
        }
        if self.cleanup_interval_frames < 1 {
            tracing::warn!(
                component = "ResourceTracker",
                "cleanup interval of 0 frames clamped to 1"
            );
            self.cleanup_interval_frames = 1;
        }
        if self.memory_check_interval_frames < 1 {
            tracing::warn!(
                component = "ResourceTracker",
                "memory check interval of 0 frames clamped to 1"
            );
            self.memory_check_interval_frames = 1;
        }
        if let Err(err) = self.thresholds.validate() {
            tracing::warn!(component = "ResourceTracker", %err, "falling back to default thresholds");
            self.thresholds = defaults.thresholds;
        }
        self
    }
}

/// Configuration for a whole [`LifecycleContext`](crate::LifecycleContext)
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LifecycleConfig {
    pub tracker: TrackerConfiguration,

    /// Bounds used by `create_cache` when none are given
    pub cache: CacheConfiguration,
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker: TrackerConfiguration) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfiguration) -> Self {
        self.cache = cache;
        self
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        self.tracker.validate()?;
        self.cache.validate()
    }
}
