//! Heuristics that flag likely-leaked resources

use crate::eviction::{EvictionPolicy, Expiry, ResourceTimes};
use crate::tracker::{ResourceInfo, ResourceKind};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Why a resource looks leaked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakReason {
    /// Alive far longer than the leak age
    Stale,

    /// Not touched for longer than the leak idle time
    Unused,

    /// A listener whose target is no longer reachable from the host's root
    Detached,
}

/// A resource flagged by leak detection
///
/// Suspects are only reported; detection never cleans them up.
#[derive(Debug, Clone)]
pub struct LeakSuspect {
    pub info: ResourceInfo,
    pub reason: LeakReason,
    pub age: Duration,
    pub idle: Duration,
}

/// Host predicate telling whether a resource's target is still attached
pub type ReachabilityCheck = Arc<dyn Fn(&ResourceInfo) -> bool + Send + Sync>;

pub(crate) struct LeakHeuristics {
    policy: EvictionPolicy,
    reachability: Option<ReachabilityCheck>,
}

impl LeakHeuristics {
    pub fn new(leak_age: Duration, leak_idle: Duration) -> Self {
        Self {
            policy: EvictionPolicy::Combined {
                ttl: leak_age,
                idle_timeout: leak_idle,
            },
            reachability: None,
        }
    }

    pub fn set_reachability(&mut self, check: ReachabilityCheck) {
        self.reachability = Some(check);
    }

    pub fn classify(
        &self,
        info: &ResourceInfo,
        times: &ResourceTimes,
        now: Instant,
    ) -> Option<LeakSuspect> {
        let reason = match times.expiry(&self.policy, now) {
            Some(Expiry::Aged) => Some(LeakReason::Stale),
            Some(Expiry::Idle) => Some(LeakReason::Unused),
            None => self.detached(info).then_some(LeakReason::Detached),
        }?;

        Some(LeakSuspect {
            info: info.clone(),
            reason,
            age: times.age(now),
            idle: times.idle(now),
        })
    }

    fn detached(&self, info: &ResourceInfo) -> bool {
        if info.kind != ResourceKind::Listener {
            return false;
        }
        match &self.reachability {
            Some(is_reachable) => !is_reachable(info),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ResourceId;

    fn info(kind: ResourceKind, label: &str) -> ResourceInfo {
        ResourceInfo {
            id: ResourceId::from_raw(1),
            kind,
            label: label.to_string(),
            context: None,
            estimated_size: 0,
        }
    }

    #[test]
    fn test_classify_by_age_and_idle() {
        let heuristics = LeakHeuristics::new(Duration::from_secs(100), Duration::from_secs(10));
        let start = Instant::now();
        let mut times = ResourceTimes::new(start);
        let listener = info(ResourceKind::Timer, "tick");

        assert!(heuristics.classify(&listener, &times, start).is_none());

        let idle = heuristics.classify(&listener, &times, start + Duration::from_secs(11));
        assert_eq!(idle.map(|s| s.reason), Some(LeakReason::Unused));

        times.touch(start + Duration::from_secs(95));
        let stale = heuristics.classify(&listener, &times, start + Duration::from_secs(101));
        assert_eq!(stale.map(|s| s.reason), Some(LeakReason::Stale));
    }

    #[test]
    fn test_detached_listener() {
        let mut heuristics = LeakHeuristics::new(Duration::from_secs(100), Duration::from_secs(100));
        heuristics.set_reachability(Arc::new(|info: &ResourceInfo| info.label != "gone"));
        let start = Instant::now();
        let times = ResourceTimes::new(start);

        let gone = heuristics.classify(&info(ResourceKind::Listener, "gone"), &times, start);
        assert_eq!(gone.map(|s| s.reason), Some(LeakReason::Detached));

        assert!(heuristics.classify(&info(ResourceKind::Listener, "here"), &times, start).is_none());
        assert!(heuristics.classify(&info(ResourceKind::Node, "gone"), &times, start).is_none());
    }
}
