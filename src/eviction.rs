//! Age and idle-time rules for tracked resources

use std::time::Duration;
use tokio::time::Instant;

/// Rule deciding when a tracked resource has outlived its welcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionPolicy {
    /// Expires after going untouched for a duration
    IdleTimeout(Duration),

    /// Age limit or idle timeout, whichever trips first
    Combined {
        ttl: Duration,
        idle_timeout: Duration,
    },
}

impl EvictionPolicy {
    /// The same policy with every limit cut in half
    pub fn halved(self) -> Self {
        match self {
            EvictionPolicy::IdleTimeout(idle) => EvictionPolicy::IdleTimeout(idle / 2),
            EvictionPolicy::Combined { ttl, idle_timeout } => EvictionPolicy::Combined {
                ttl: ttl / 2,
                idle_timeout: idle_timeout / 2,
            },
        }
    }
}

/// Which limit a resource crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    Aged,
    Idle,
}

/// Creation and last-use stamps of a tracked resource
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceTimes {
    pub created_at: Instant,
    pub last_used: Instant,
}

impl ResourceTimes {
    pub fn new(now: Instant) -> Self {
        Self {
            created_at: now,
            last_used: now,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    pub fn expiry(&self, policy: &EvictionPolicy, now: Instant) -> Option<Expiry> {
        match policy {
            EvictionPolicy::IdleTimeout(timeout) => {
                (self.idle(now) > *timeout).then_some(Expiry::Idle)
            }
            EvictionPolicy::Combined { ttl, idle_timeout } => {
                if self.age(now) > *ttl {
                    Some(Expiry::Aged)
                } else if self.idle(now) > *idle_timeout {
                    Some(Expiry::Idle)
                } else {
                    None
                }
            }
        }
    }
}
