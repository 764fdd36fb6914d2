//! Health monitoring for the resource tracker

use crate::memory::MemoryPressure;
use crate::metrics::TrackerStats;

/// Health status of a resource tracker
///
/// # Examples
///
/// ```
/// use lifecore::{ResourceDescriptor, ResourceKind, ResourceTracker, TrackerConfiguration};
///
/// let tracker = ResourceTracker::new(TrackerConfiguration::default());
/// tracker.track_resource(ResourceDescriptor::new(ResourceKind::Timer, || {}));
///
/// let health = tracker.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.active_resources, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the tracker is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Registry fill level against `max_resources` (0.0 to 1.0)
    pub utilization: f64,

    pub active_resources: usize,
    pub max_resources: usize,

    /// Leak suspects found by the latest scan
    pub leak_suspects: usize,

    /// Pressure band of the latest memory check
    pub memory_pressure: MemoryPressure,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(stats: &TrackerStats, max_resources: usize, pressure: MemoryPressure) -> Self {
        let utilization = if max_resources > 0 {
            stats.current_resources as f64 / max_resources as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization >= 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if pressure >= MemoryPressure::Critical {
            warnings.push(format!("Memory pressure: {pressure:?}"));
            is_healthy = false;
        } else if pressure == MemoryPressure::Warning {
            warnings.push("Memory usage above warning threshold".to_string());
        }

        if stats.leaks_detected > 0 {
            warnings.push(format!("{} possible resource leaks", stats.leaks_detected));
            is_healthy = false;
        }

        if stats.failed_cleanups > 0 {
            warnings.push(format!("{} cleanup callbacks failed", stats.failed_cleanups));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            active_resources: stats.current_resources,
            max_resources,
            leak_suspects: stats.leaks_detected,
            memory_pressure: pressure,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(current: usize) -> TrackerStats {
        TrackerStats {
            current_resources: current,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_when_quiet() {
        let health = HealthStatus::new(&stats(10), 100, MemoryPressure::Normal);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 0);
        assert!((health.utilization - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_cap_is_unhealthy() {
        let health = HealthStatus::new(&stats(95), 100, MemoryPressure::Normal);
        assert!(!health.is_healthy());
        assert_eq!(health.warnings, vec!["High utilization: 95.0%".to_string()]);
    }

    #[test]
    fn test_warning_pressure_only_warns() {
        let health = HealthStatus::new(&stats(0), 100, MemoryPressure::Warning);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);

        let health = HealthStatus::new(&stats(0), 100, MemoryPressure::Critical);
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_leaks_and_failures() {
        let stats = TrackerStats {
            leaks_detected: 2,
            failed_cleanups: 1,
            ..Default::default()
        };
        let health = HealthStatus::new(&stats, 100, MemoryPressure::Normal);
        assert!(!health.is_healthy());
        assert_eq!(health.leak_suspects, 2);
        assert_eq!(health.warning_count, 2);
    }
}
