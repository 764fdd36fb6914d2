//! Periodic task scheduling driven by rendered frames or wall-clock intervals

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Identifies a scheduled task for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

/// A task run once per interval
pub type Task = Box<dyn FnMut() + Send>;

/// Runs tasks every N frames
///
/// Hosts with a render loop use [`FrameScheduler`]; hosts without one use
/// [`IntervalScheduler`], which maps a frame to a fixed duration.
pub trait Scheduler: Send + Sync {
    fn every_n_frames(&self, frames: u32, task: Task) -> ScheduleHandle;

    /// Stop a task; `false` if it was never scheduled or already cancelled
    fn cancel(&self, handle: ScheduleHandle) -> bool;
}

fn clamp_frames(frames: u32, component: &'static str) -> u32 {
    if frames == 0 {
        warn!(component, "frame interval of 0 clamped to 1");
        1
    } else {
        frames
    }
}

struct FrameTask {
    handle: ScheduleHandle,
    interval: u32,
    elapsed: u32,
    // None while the task is running
    task: Option<Task>,
}

/// Scheduler advanced by the host calling [`tick`](FrameScheduler::tick) once per rendered frame
///
/// Tasks run outside the internal lock, so they may schedule or cancel
/// tasks (including themselves). While the host stops ticking, nothing runs.
///
/// # Examples
///
/// ```
/// use lifecore::{FrameScheduler, Scheduler};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let scheduler = FrameScheduler::new();
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// scheduler.every_n_frames(3, Box::new(move || {
///     counter.fetch_add(1, Ordering::Relaxed);
/// }));
///
/// for _ in 0..7 {
///     scheduler.tick();
/// }
/// assert_eq!(runs.load(Ordering::Relaxed), 2);
/// ```
pub struct FrameScheduler {
    tasks: Mutex<Vec<FrameTask>>,
    next_id: AtomicU64,
    frame: AtomicU64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            frame: AtomicU64::new(0),
        }
    }

    /// Advance one frame and run every task that came due, returning how many ran
    pub fn tick(&self) -> usize {
        self.frame.fetch_add(1, Ordering::Relaxed);

        let due: Vec<(ScheduleHandle, Task)> = {
            let mut tasks = self.tasks.lock();
            tasks
                .iter_mut()
                .filter_map(|entry| {
                    entry.elapsed += 1;
                    if entry.elapsed < entry.interval {
                        return None;
                    }
                    entry.elapsed = 0;
                    entry.task.take().map(|task| (entry.handle, task))
                })
                .collect()
        };

        let ran = due.len();
        for (handle, mut task) in due {
            task();
            let mut tasks = self.tasks.lock();
            if let Some(entry) = tasks.iter_mut().find(|entry| entry.handle == handle) {
                entry.task = Some(task);
            }
        }
        ran
    }

    /// Frames ticked so far
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// Number of scheduled tasks
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FrameScheduler {
    fn every_n_frames(&self, frames: u32, task: Task) -> ScheduleHandle {
        let handle = ScheduleHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks.lock().push(FrameTask {
            handle,
            interval: clamp_frames(frames, "FrameScheduler"),
            elapsed: 0,
            task: Some(task),
        });
        debug!(component = "FrameScheduler", ?handle, frames, "task scheduled");
        handle
    }

    fn cancel(&self, handle: ScheduleHandle) -> bool {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|entry| entry.handle != handle);
        before != tasks.len()
    }
}

/// Scheduler for hosts without a render loop, backed by tokio intervals
///
/// A frame lasts `frame_duration`; a task scheduled every N frames runs
/// every `N * frame_duration`, first after one full period.
pub struct IntervalScheduler {
    runtime: Handle,
    frame_duration: Duration,
    tasks: DashMap<ScheduleHandle, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl IntervalScheduler {
    /// A zero `frame_duration` is clamped to 1 ms
    pub fn new(runtime: Handle, frame_duration: Duration) -> Self {
        let frame_duration = if frame_duration.is_zero() {
            warn!(component = "IntervalScheduler", "frame duration of 0 clamped to 1ms");
            Duration::from_millis(1)
        } else {
            frame_duration
        };
        Self {
            runtime,
            frame_duration,
            tasks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build on the runtime of the calling context, if there is one
    pub fn from_current(frame_duration: Duration) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::new(runtime, frame_duration))
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}

impl Scheduler for IntervalScheduler {
    fn every_n_frames(&self, frames: u32, mut task: Task) -> ScheduleHandle {
        let handle = ScheduleHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let period = self.frame_duration * clamp_frames(frames, "IntervalScheduler");

        let join = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                task();
            }
        });
        self.tasks.insert(handle, join);
        debug!(component = "IntervalScheduler", ?handle, ?period, "task scheduled");
        handle
    }

    fn cancel(&self, handle: ScheduleHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some((_, join)) => {
                join.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
