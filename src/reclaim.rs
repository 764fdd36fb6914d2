//! Shrinking pools and caches on behalf of the resource tracker

use crate::cache::LruCache;
use crate::pool::{FactoryPool, ObjectPool, Poolable};

use parking_lot::Mutex;
use std::mem::size_of;

/// What a reclamation pass released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reclaimed {
    /// Idle pool instances destroyed or cache entries evicted
    pub objects: usize,

    /// Estimated bytes released
    pub bytes: usize,
}

/// A pool or cache the tracker may ask to give memory back
///
/// Implementations must not block: a structure that is in use elsewhere is
/// skipped and reports nothing released.
pub trait Reclaimable: Send + Sync {
    fn name(&self) -> String;

    /// Normal passes trim to configured bounds; aggressive passes go below them
    fn reclaim(&self, aggressive: bool) -> Reclaimed;
}

impl<T: Poolable + Send> Reclaimable for Mutex<ObjectPool<T>> {
    fn name(&self) -> String {
        self.try_lock()
            .map(|pool| pool.name().to_string())
            .unwrap_or_default()
    }

    fn reclaim(&self, aggressive: bool) -> Reclaimed {
        let Some(mut pool) = self.try_lock() else {
            return Reclaimed::default();
        };
        let keep = pool_target(pool.capacity(), aggressive);
        let objects = pool.trim_to(keep);
        Reclaimed {
            objects,
            bytes: objects * size_of::<T>(),
        }
    }
}

impl<T: Send> Reclaimable for Mutex<FactoryPool<T>> {
    fn name(&self) -> String {
        self.try_lock()
            .map(|pool| pool.name().to_string())
            .unwrap_or_default()
    }

    fn reclaim(&self, aggressive: bool) -> Reclaimed {
        let Some(mut pool) = self.try_lock() else {
            return Reclaimed::default();
        };
        let keep = pool_target(pool.capacity(), aggressive);
        let objects = pool.trim_to(keep);
        Reclaimed {
            objects,
            bytes: objects * size_of::<T>(),
        }
    }
}

impl<V: Send> Reclaimable for Mutex<LruCache<V>> {
    fn name(&self) -> String {
        self.try_lock()
            .map(|cache| cache.name().to_string())
            .unwrap_or_default()
    }

    /// Bounds are enforced on every insert, so only aggressive passes evict
    fn reclaim(&self, aggressive: bool) -> Reclaimed {
        if !aggressive {
            return Reclaimed::default();
        }
        let Some(mut cache) = self.try_lock() else {
            return Reclaimed::default();
        };
        let target = cache.get_stats().max_size / 2;
        let (objects, bytes) = cache.trim_to(target);
        Reclaimed { objects, bytes }
    }
}

fn pool_target(capacity: usize, aggressive: bool) -> usize {
    if aggressive { capacity / 2 } else { capacity }
}
