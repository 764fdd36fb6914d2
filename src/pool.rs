//! Class-based and factory-based object pools

use crate::config::PoolConfiguration;
use crate::errors::{LifecycleError, LifecycleResult};
use crate::metrics::PoolStats;

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Contract for types managed by an [`ObjectPool`]
///
/// Fresh instances come from `Default`. `reset` must restore that default
/// state; `init` runs on every acquire and `destroy` only when an idle
/// instance is discarded for good.
pub trait Poolable: Default {
    /// Argument handed to `init` on acquire; use `()` when there is none
    type Args;

    fn reset(&mut self);

    fn init(&mut self, _args: Self::Args) {}

    fn destroy(&mut self) {}
}

/// Dense free list shared by both pool flavours.
///
/// `buffer[..]` holds the idle instances and its length is the free-list
/// top, so acquire and release are a `Vec` pop and push.
struct FreeList<T> {
    name: String,
    component: &'static str,
    buffer: Vec<T>,
    capacity: usize,
    total_created: usize,
    total_returned: usize,
    total_destroyed: usize,
}

impl<T> FreeList<T> {
    fn new(config: &PoolConfiguration, component: &'static str) -> Self {
        let capacity = match config.validate() {
            Ok(()) => config.capacity,
            Err(err) => {
                warn!(component, pool = %config.name, %err, "clamping pool capacity to 1");
                1
            }
        };

        Self {
            name: config.name.clone(),
            component,
            buffer: Vec::with_capacity(capacity),
            capacity,
            total_created: 0,
            total_returned: 0,
            total_destroyed: 0,
        }
    }

    fn pop_or(&mut self, create: impl FnOnce() -> T) -> T {
        match self.buffer.pop() {
            Some(obj) => obj,
            None => {
                self.total_created += 1;
                create()
            }
        }
    }

    fn push(&mut self, obj: T) {
        self.buffer.push(obj);
        self.total_returned += 1;
        if self.buffer.len() > self.total_created {
            warn!(
                component = self.component,
                pool = %self.name,
                idle = self.buffer.len(),
                created = self.total_created,
                "released an instance this pool did not create"
            );
        }
    }

    fn warn_null_release(&self) {
        warn!(
            component = self.component,
            pool = %self.name,
            "ignoring release of a missing object"
        );
    }

    /// Discard idle instances above `keep`, newest first.
    ///
    /// Discarded instances no longer count as created, which keeps
    /// `current_usage` equal to the number of checked-out objects.
    fn truncate(&mut self, keep: usize, mut destroy: impl FnMut(T)) -> usize {
        let mut discarded = 0;
        while self.buffer.len() > keep {
            let Some(obj) = self.buffer.pop() else { break };
            destroy(obj);
            discarded += 1;
        }
        self.total_created = self.total_created.saturating_sub(discarded);
        self.total_destroyed += discarded;
        if discarded > 0 {
            debug!(component = self.component, pool = %self.name, discarded, "discarded idle instances");
        }
        discarded
    }

    fn resize(&mut self, new_capacity: usize, destroy: impl FnMut(T)) -> LifecycleResult<()> {
        if new_capacity < 1 {
            let err = LifecycleError::InvalidCapacity(new_capacity);
            warn!(component = self.component, pool = %self.name, %err, "resize rejected");
            return Err(err);
        }
        if new_capacity < self.capacity {
            self.truncate(new_capacity, destroy);
        }
        self.capacity = new_capacity;
        Ok(())
    }

    fn pre_allocate(&mut self, requested: usize, mut create: impl FnMut() -> T) -> usize {
        let room = self.capacity.saturating_sub(self.buffer.len());
        let count = requested.min(room);
        if count < requested {
            warn!(
                component = self.component,
                pool = %self.name,
                requested,
                allocated = count,
                "pre-allocation limited by capacity"
            );
        }
        self.buffer.reserve(count);
        for _ in 0..count {
            self.buffer.push(create());
        }
        self.total_created += count;
        count
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            size: self.capacity,
            available: self.buffer.len(),
            total_created: self.total_created,
            total_returned: self.total_returned,
            total_destroyed: self.total_destroyed,
            current_usage: self.total_created.saturating_sub(self.buffer.len()),
        }
    }
}

/// Pool of [`Poolable`] instances
///
/// `get` never fails: an empty free list allocates a new instance, so the
/// pool grows past `capacity` under load. `capacity` only bounds how many
/// idle instances survive `clear`.
///
/// # Examples
///
/// ```
/// use lifecore::{ObjectPool, PoolConfiguration, Poolable};
///
/// #[derive(Default)]
/// struct Marker {
///     line: u32,
///     message: String,
/// }
///
/// impl Poolable for Marker {
///     type Args = u32;
///
///     fn reset(&mut self) {
///         self.line = 0;
///         self.message.clear();
///     }
///
///     fn init(&mut self, line: u32) {
///         self.line = line;
///     }
/// }
///
/// let mut pool = ObjectPool::<Marker>::new(PoolConfiguration::new().with_capacity(8));
/// let marker = pool.get(12);
/// assert_eq!(marker.line, 12);
///
/// pool.release(marker);
/// assert_eq!(pool.get_stats().available, 1);
/// ```
pub struct ObjectPool<T: Poolable> {
    free: FreeList<T>,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(config: PoolConfiguration) -> Self {
        let mut pool = Self {
            free: FreeList::new(&config, "ObjectPool"),
        };
        if config.preallocate > 0 {
            pool.pre_allocate(config.preallocate);
        }
        pool
    }

    /// Acquire an instance and run `init` on it
    pub fn get(&mut self, args: T::Args) -> T {
        let mut obj = self.free.pop_or(T::default);
        obj.init(args);
        obj
    }

    /// Reset `obj` and put it back on the free list
    ///
    /// `obj` must have come from this pool's `get`. Foreign instances are
    /// accepted with a warning but leave the usage counters meaningless.
    pub fn release(&mut self, mut obj: T) {
        obj.reset();
        self.free.push(obj);
    }

    /// Like [`release`](Self::release), but a `None` is logged and ignored
    pub fn release_opt(&mut self, obj: Option<T>) {
        match obj {
            Some(obj) => self.release(obj),
            None => self.free.warn_null_release(),
        }
    }

    /// Put `obj` back without resetting it.
    ///
    /// Only for callers that know the object is already in its default
    /// state; the next `get` hands it out as is. The same ownership rule
    /// as [`release`](Self::release) applies.
    pub fn simple_release(&mut self, obj: T) {
        self.free.push(obj);
    }

    /// Discard idle instances beyond `capacity`, returning how many were destroyed
    pub fn clear(&mut self) -> usize {
        let capacity = self.free.capacity;
        self.trim_to(capacity)
    }

    /// Discard idle instances beyond `keep` without changing the capacity
    pub fn trim_to(&mut self, keep: usize) -> usize {
        self.free.truncate(keep, |mut obj: T| obj.destroy())
    }

    /// Change the capacity; shrinking discards surplus idle instances first
    pub fn resize(&mut self, new_capacity: usize) -> LifecycleResult<()> {
        self.free.resize(new_capacity, |mut obj: T| obj.destroy())
    }

    /// Eagerly create idle instances, limited by the room left under `capacity`
    pub fn pre_allocate(&mut self, count: usize) -> usize {
        self.free.pre_allocate(count, T::default)
    }

    pub fn get_stats(&self) -> PoolStats {
        self.free.stats()
    }

    pub fn name(&self) -> &str {
        &self.free.name
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity
    }

    pub fn available(&self) -> usize {
        self.free.buffer.len()
    }
}

impl<T: Poolable> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        for obj in self.free.buffer.iter_mut() {
            obj.destroy();
        }
    }
}

type CreateFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type DestroyFn<T> = Box<dyn Fn(T) + Send + Sync>;

/// Pool whose instances are built, reset and destroyed by injected functions
///
/// Used for host types that cannot implement [`Poolable`] themselves.
pub struct FactoryPool<T> {
    free: FreeList<T>,
    create: CreateFn<T>,
    reset: ResetFn<T>,
    destroy: Option<DestroyFn<T>>,
}

impl<T> FactoryPool<T> {
    pub fn new<C, R>(create: C, reset: R, config: PoolConfiguration) -> Self
    where
        C: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        let mut pool = Self {
            free: FreeList::new(&config, "FactoryPool"),
            create: Box::new(create),
            reset: Box::new(reset),
            destroy: None,
        };
        if config.preallocate > 0 {
            pool.pre_allocate(config.preallocate);
        }
        pool
    }

    /// Set the function run on permanently discarded instances
    pub fn with_destroy<D>(mut self, destroy: D) -> Self
    where
        D: Fn(T) + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }

    pub fn get(&mut self) -> T {
        let create = &self.create;
        self.free.pop_or(|| create())
    }

    /// Reset `obj` and put it back; `obj` must have come from this pool's `get`
    pub fn release(&mut self, mut obj: T) {
        (self.reset)(&mut obj);
        self.free.push(obj);
    }

    pub fn release_opt(&mut self, obj: Option<T>) {
        match obj {
            Some(obj) => self.release(obj),
            None => self.free.warn_null_release(),
        }
    }

    /// Put `obj` back without running the reset function
    pub fn simple_release(&mut self, obj: T) {
        self.free.push(obj);
    }

    pub fn clear(&mut self) -> usize {
        let capacity = self.free.capacity;
        self.trim_to(capacity)
    }

    pub fn trim_to(&mut self, keep: usize) -> usize {
        let destroy = &self.destroy;
        self.free.truncate(keep, |obj| {
            if let Some(destroy) = destroy {
                destroy(obj);
            }
        })
    }

    pub fn resize(&mut self, new_capacity: usize) -> LifecycleResult<()> {
        let destroy = &self.destroy;
        self.free.resize(new_capacity, |obj| {
            if let Some(destroy) = destroy {
                destroy(obj);
            }
        })
    }

    pub fn pre_allocate(&mut self, count: usize) -> usize {
        let create = &self.create;
        self.free.pre_allocate(count, || create())
    }

    pub fn get_stats(&self) -> PoolStats {
        self.free.stats()
    }

    pub fn name(&self) -> &str {
        &self.free.name
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity
    }

    pub fn available(&self) -> usize {
        self.free.buffer.len()
    }
}

impl<T> Drop for FactoryPool<T> {
    fn drop(&mut self) {
        if let Some(destroy) = &self.destroy {
            for obj in self.free.buffer.drain(..) {
                destroy(obj);
            }
        }
    }
}

/// A pooled object that goes back to its pool when dropped
///
/// If the pool has been dropped in the meantime the object is simply dropped.
pub struct PooledObject<T> {
    value: Option<T>,
    return_fn: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T> PooledObject<T> {
    fn new(value: T, return_fn: Arc<dyn Fn(T) + Send + Sync>) -> Self {
        Self {
            value: Some(value),
            return_fn,
        }
    }

    /// Take the value out; it will not be returned to the pool
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("Value already taken")
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            (self.return_fn)(value);
        }
    }
}

/// A pool shared between an owner and the resource tracker
///
/// # Examples
///
/// ```
/// use lifecore::{FactoryPool, PoolConfiguration, SharedPool};
///
/// let pool = SharedPool::new(FactoryPool::new(
///     String::new,
///     |s: &mut String| s.clear(),
///     PoolConfiguration::new().with_name("labels"),
/// ));
///
/// {
///     let mut label = pool.checkout();
///     label.push_str("quest");
///     assert_eq!(pool.lock().get_stats().current_usage, 1);
/// }
///
/// assert_eq!(pool.lock().get_stats().available, 1);
/// ```
pub struct SharedPool<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> Clone for SharedPool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> SharedPool<P> {
    pub fn new(pool: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, P> {
        self.inner.lock()
    }

    pub(crate) fn shared(&self) -> &Arc<Mutex<P>> {
        &self.inner
    }
}

impl<T: Poolable + Send + 'static> SharedPool<ObjectPool<T>> {
    /// Acquire an instance that releases itself on drop
    pub fn checkout(&self, args: T::Args) -> PooledObject<T> {
        let value = self.inner.lock().get(args);
        let pool: Weak<Mutex<ObjectPool<T>>> = Arc::downgrade(&self.inner);
        PooledObject::new(
            value,
            Arc::new(move |obj| {
                if let Some(pool) = pool.upgrade() {
                    pool.lock().release(obj);
                }
            }),
        )
    }
}

impl<T: Send + 'static> SharedPool<FactoryPool<T>> {
    /// Acquire an instance that releases itself on drop
    pub fn checkout(&self) -> PooledObject<T> {
        let value = self.inner.lock().get();
        let pool: Weak<Mutex<FactoryPool<T>>> = Arc::downgrade(&self.inner);
        PooledObject::new(
            value,
            Arc::new(move |obj| {
                if let Some(pool) = pool.upgrade() {
                    pool.lock().release(obj);
                }
            }),
        )
    }
}
