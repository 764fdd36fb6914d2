//! Memory-pressure signals consumed by the tracker

use crate::config::MemoryThresholds;
use crate::metrics::CleanupStats;

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the host's current heap usage, as a percentage in 0..=100
///
/// `None` means the host cannot tell; the tracker then takes no action.
pub trait MemorySource: Send + Sync {
    fn heap_usage_percent(&self) -> Option<f64>;
}

impl<F> MemorySource for F
where
    F: Fn() -> Option<f64> + Send + Sync,
{
    fn heap_usage_percent(&self) -> Option<f64> {
        self()
    }
}

/// A settable usage reading, for hosts that push measurements
///
/// # Examples
///
/// ```
/// use lifecore::{MemoryGauge, MemorySource};
///
/// let gauge = MemoryGauge::new();
/// assert_eq!(gauge.heap_usage_percent(), None);
///
/// gauge.set(72.5);
/// assert_eq!(gauge.heap_usage_percent(), Some(72.5));
/// ```
#[derive(Debug)]
pub struct MemoryGauge {
    // f64 bits; NaN means unset
    bits: AtomicU64,
}

impl MemoryGauge {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn set(&self, percent: f64) {
        self.bits.store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    pub fn unset(&self) {
        self.bits.store(f64::NAN.to_bits(), Ordering::Relaxed);
    }
}

impl Default for MemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for MemoryGauge {
    fn heap_usage_percent(&self) -> Option<f64> {
        let value = f64::from_bits(self.bits.load(Ordering::Relaxed));
        (!value.is_nan()).then_some(value)
    }
}

/// Pressure band a usage reading falls into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MemoryPressure {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl MemoryPressure {
    pub fn classify(usage_percent: f64, thresholds: &MemoryThresholds) -> Self {
        if usage_percent >= thresholds.emergency {
            MemoryPressure::Emergency
        } else if usage_percent >= thresholds.critical {
            MemoryPressure::Critical
        } else if usage_percent >= thresholds.warning {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }
}

/// Result of one memory-threshold check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCheck {
    pub usage_percent: Option<f64>,
    pub pressure: MemoryPressure,

    /// The sweep the check triggered, if any
    pub cleanup: Option<CleanupStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bands() {
        let thresholds = MemoryThresholds::default();
        assert_eq!(MemoryPressure::classify(10.0, &thresholds), MemoryPressure::Normal);
        assert_eq!(MemoryPressure::classify(70.0, &thresholds), MemoryPressure::Warning);
        assert_eq!(MemoryPressure::classify(84.9, &thresholds), MemoryPressure::Warning);
        assert_eq!(MemoryPressure::classify(85.0, &thresholds), MemoryPressure::Critical);
        assert_eq!(MemoryPressure::classify(99.0, &thresholds), MemoryPressure::Emergency);
    }

    #[test]
    fn test_closure_source() {
        let source = || Some(42.0);
        assert_eq!(source.heap_usage_percent(), Some(42.0));
    }

    #[test]
    fn test_gauge_clamps() {
        let gauge = MemoryGauge::new();
        gauge.set(150.0);
        assert_eq!(gauge.heap_usage_percent(), Some(100.0));
        gauge.unset();
        assert_eq!(gauge.heap_usage_percent(), None);
    }
}
