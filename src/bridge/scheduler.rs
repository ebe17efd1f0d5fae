//! Frame scheduler - at-most-once-per-frame recomputation.
//!
//! Change notifications are coarse and can arrive in bursts. Instead of
//! recomputing on every one of them, watchers schedule a task here and the
//! host flushes the scheduler once per rendered frame:
//!
//! ```text
//! notify ─┐
//! notify ─┼─► schedule(task) ──► pending (deduplicated by TaskId)
//! notify ─┘                             │
//!                         flush_frame() ▼
//!                              task runs once
//! ```
//!
//! Pollers registered with [`FrameScheduler::poll_every_frame`] run on every
//! flush, for watchers that dirty-check on a fixed cadence instead of
//! waiting for notifications.
//!
//! Tasks are held weakly. When the owning watcher is dropped its task is
//! skipped, so nothing runs against dead state.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Identifies a task slot in a [`FrameScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Work run at the end of a frame.
pub type FrameTask = Rc<dyn Fn()>;

struct SchedulerInner {
    pending: RefCell<Vec<(TaskId, Weak<dyn Fn()>)>>,
    queued: RefCell<HashSet<TaskId>>,
    pollers: RefCell<Vec<(TaskId, Weak<dyn Fn()>)>>,
    next_id: Cell<u64>,
    frame: Cell<u64>,
}

/// Per-root frame queue. Cloning creates a new handle to the **same** queue.
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Rc<SchedulerInner>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("frame", &self.frame())
            .field("pending", &self.pending())
            .field("pollers", &self.inner.pollers.borrow().len())
            .finish()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                pending: RefCell::new(Vec::new()),
                queued: RefCell::new(HashSet::new()),
                pollers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                frame: Cell::new(0),
            }),
        }
    }

    /// Allocate a task slot.
    pub fn next_task_id(&self) -> TaskId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        TaskId(id)
    }

    /// Queue `task` for the end of the current frame.
    ///
    /// Returns `false` if the slot was already queued this frame (the
    /// notification was coalesced).
    pub fn schedule(&self, id: TaskId, task: &FrameTask) -> bool {
        if !self.inner.queued.borrow_mut().insert(id) {
            log::trace!("task {:?} already queued for frame {}", id, self.frame());
            return false;
        }
        self.inner.pending.borrow_mut().push((id, Rc::downgrade(task)));
        true
    }

    /// Run `task` on every flush until cancelled or dropped.
    pub fn poll_every_frame(&self, id: TaskId, task: &FrameTask) {
        let mut pollers = self.inner.pollers.borrow_mut();
        pollers.retain(|(existing, _)| *existing != id);
        pollers.push((id, Rc::downgrade(task)));
    }

    /// Remove a queued task and any poller registered under `id`.
    pub fn cancel(&self, id: TaskId) {
        if self.inner.queued.borrow_mut().remove(&id) {
            self.inner.pending.borrow_mut().retain(|(queued, _)| *queued != id);
        }
        self.inner.pollers.borrow_mut().retain(|(poller, _)| *poller != id);
    }

    /// Whether `id` is queued for the current frame.
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.inner.queued.borrow().contains(&id)
    }

    /// Run everything queued for this frame, then all pollers.
    ///
    /// Tasks scheduled while flushing are kept for the next frame. Returns
    /// the number of tasks that ran.
    ///
    /// # Panics
    ///
    /// A panicking task does not stop the frame: every other task still
    /// runs, then the first panic is resumed.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        self.inner.queued.borrow_mut().clear();

        // Drop dead pollers first so the list does not grow with unmounted watchers.
        let pollers: Vec<FrameTask> = {
            let mut pollers = self.inner.pollers.borrow_mut();
            pollers.retain(|(_, task)| task.strong_count() > 0);
            pollers.iter().filter_map(|(_, task)| task.upgrade()).collect()
        };

        let tasks = pending
            .into_iter()
            .filter_map(|(_, task)| task.upgrade())
            .chain(pollers);

        let mut ran = 0;
        let mut first_panic = None;
        for task in tasks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task())) {
                log::warn!("frame task panicked, finishing frame {} first", self.frame());
                first_panic.get_or_insert(payload);
            }
            ran += 1;
        }

        self.inner.frame.set(self.inner.frame.get() + 1);
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        ran
    }

    /// Number of frames flushed so far.
    pub fn frame(&self) -> u64 {
        self.inner.frame.get()
    }

    /// Number of tasks queued for the current frame.
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_task() -> (FrameTask, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let task: FrameTask = Rc::new(move || count_clone.set(count_clone.get() + 1));
        (task, count)
    }

    #[test]
    fn test_burst_coalesces_to_one_run() {
        let scheduler = FrameScheduler::new();
        let id = scheduler.next_task_id();
        let (task, count) = counting_task();

        assert!(scheduler.schedule(id, &task));
        assert!(!scheduler.schedule(id, &task));
        assert!(!scheduler.schedule(id, &task));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(count.get(), 0, "nothing runs before the frame ends");

        assert_eq!(scheduler.flush(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(scheduler.frame(), 1);

        // Next frame accepts the slot again
        assert!(scheduler.schedule(id, &task));
        scheduler.flush();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_distinct_slots_each_run() {
        let scheduler = FrameScheduler::new();
        let (a, a_count) = counting_task();
        let (b, b_count) = counting_task();

        scheduler.schedule(scheduler.next_task_id(), &a);
        scheduler.schedule(scheduler.next_task_id(), &b);
        assert_eq!(scheduler.flush(), 2);
        assert_eq!((a_count.get(), b_count.get()), (1, 1));
    }

    #[test]
    fn test_cancel_removes_pending_task() {
        let scheduler = FrameScheduler::new();
        let id = scheduler.next_task_id();
        let (task, count) = counting_task();

        scheduler.schedule(id, &task);
        assert!(scheduler.is_scheduled(id));
        scheduler.cancel(id);
        assert!(!scheduler.is_scheduled(id));

        assert_eq!(scheduler.flush(), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_dropped_task_is_skipped() {
        let scheduler = FrameScheduler::new();
        let (task, count) = counting_task();
        scheduler.schedule(scheduler.next_task_id(), &task);

        drop(task);
        assert_eq!(scheduler.flush(), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_task_scheduled_during_flush_waits_for_next_frame() {
        let scheduler = FrameScheduler::new();
        let id = scheduler.next_task_id();
        let count = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<FrameTask>>> = Rc::new(RefCell::new(None));
        let task: FrameTask = {
            let scheduler = scheduler.clone();
            let count = count.clone();
            let slot = Rc::downgrade(&slot);
            Rc::new(move || {
                count.set(count.get() + 1);
                if let Some(slot) = slot.upgrade() {
                    if let Some(me) = slot.borrow().as_ref() {
                        scheduler.schedule(id, me);
                    }
                }
            })
        };
        *slot.borrow_mut() = Some(task.clone());

        scheduler.schedule(id, &task);
        scheduler.flush();
        assert_eq!(count.get(), 1);
        assert_eq!(scheduler.pending(), 1, "re-scheduled for the next frame");

        scheduler.flush();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_panicking_task_does_not_drop_the_rest_of_the_frame() {
        let scheduler = FrameScheduler::new();
        let bad: FrameTask = Rc::new(|| -> () { panic!("selector bug") });
        let (good, count) = counting_task();
        let (poller, polled) = counting_task();

        scheduler.schedule(scheduler.next_task_id(), &bad);
        scheduler.schedule(scheduler.next_task_id(), &good);
        scheduler.poll_every_frame(scheduler.next_task_id(), &poller);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| scheduler.flush()));
        assert!(result.is_err(), "the panic still propagates");
        assert_eq!(count.get(), 1, "tasks after the panicking one still ran");
        assert_eq!(polled.get(), 1);
        assert_eq!(scheduler.frame(), 1);
        assert_eq!(scheduler.pending(), 0);

        // The slot is free again for the next frame.
        assert!(scheduler.schedule(scheduler.next_task_id(), &good));
        assert_eq!(scheduler.flush(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_pollers_run_every_frame() {
        let scheduler = FrameScheduler::new();
        let id = scheduler.next_task_id();
        let (task, count) = counting_task();

        scheduler.poll_every_frame(id, &task);
        scheduler.poll_every_frame(id, &task);
        scheduler.flush();
        scheduler.flush();
        assert_eq!(count.get(), 2, "re-registering the same slot does not double-run");

        scheduler.cancel(id);
        scheduler.flush();
        assert_eq!(count.get(), 2);
    }
}
