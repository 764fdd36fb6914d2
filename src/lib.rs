//! # lifecore
//!
//! Memory and lifecycle management for long-running, frame-driven hosts
//! such as editors and game runtimes.
//!
//! ## Features
//!
//! - Object pools for `Poolable` types and for factory-built host types
//! - Automatic return of pooled objects via RAII (Drop trait)
//! - A byte- and count-bounded LRU cache with hit/miss statistics
//! - A resource tracker that sweeps idle resources, enforces a hard cap,
//!   reacts to memory pressure and reports likely leaks
//! - Frame-driven and tokio interval schedulers for periodic maintenance
//! - Health status and Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use lifecore::{
//!     FrameScheduler, LifecycleConfig, LifecycleContext, ResourceDescriptor, ResourceKind,
//! };
//! use std::sync::Arc;
//!
//! let scheduler = Arc::new(FrameScheduler::new());
//! let context = LifecycleContext::new(LifecycleConfig::default(), scheduler.clone());
//! context.initialize();
//!
//! let docs = context.create_cache::<String>("docs");
//! docs.lock().cache("readme", "# Hello".to_string(), "README.md");
//!
//! context.tracker().track_resource(
//!     ResourceDescriptor::new(ResourceKind::Listener, || println!("listener detached"))
//!         .with_context("panel:docs"),
//! );
//!
//! // once per rendered frame
//! scheduler.tick();
//!
//! context.tracker().cleanup_context("panel:docs");
//! context.dispose();
//! ```

mod cache;
mod config;
mod context;
mod errors;
mod eviction;
mod health;
mod leak;
mod memory;
mod metrics;
mod pool;
mod reclaim;
mod scheduler;
mod tracker;

#[cfg(feature = "serde")]
pub use cache::json_size;
pub use cache::{CacheItem, EstimateSize, Iter, LruCache, SharedCache};
pub use config::{
    CacheConfiguration, LifecycleConfig, MemoryThresholds, PoolConfiguration, TrackerConfiguration,
};
pub use context::LifecycleContext;
pub use errors::{LifecycleError, LifecycleResult};
pub use health::HealthStatus;
pub use leak::{LeakReason, LeakSuspect, ReachabilityCheck};
pub use memory::{MemoryCheck, MemoryGauge, MemoryPressure, MemorySource};
#[cfg(feature = "metrics")]
pub use metrics::PrometheusExporter;
pub use metrics::{CacheStats, CleanupStats, PoolStats, TrackerStats};
pub use pool::{FactoryPool, ObjectPool, Poolable, PooledObject, SharedPool};
pub use reclaim::{Reclaimable, Reclaimed};
pub use scheduler::{FrameScheduler, IntervalScheduler, ScheduleHandle, Scheduler, Task};
pub use tracker::{
    CleanupFn, ResourceDescriptor, ResourceId, ResourceInfo, ResourceKind, ResourceTracker,
};
