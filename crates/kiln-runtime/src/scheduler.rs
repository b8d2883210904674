//! Update Scheduler
//!
//! Three FIFO buckets drained in priority order. A flush runs high
//! priority work to completion, then one pass over the normal and low
//! buckets (draining high again after every task). Work enqueued during
//! the pass waits for the next tick instead of looping synchronously.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Scheduled unit of work
pub type Task = Box<dyn FnOnce()>;

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Compact metadata code: 0 normal, 1 high, 2 low
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Priority::High,
            2 => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// Priority task queue
#[derive(Default)]
pub struct TaskQueue {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    low: VecDeque<Task>,
    /// A flush tick has been requested and not yet run
    tick_pending: bool,
    flushing: bool,
    flushes: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task. Returns true when the caller must request a tick.
    pub fn push(&mut self, task: Task, priority: Priority) -> bool {
        self.bucket(priority).push_back(task);
        if self.tick_pending || self.flushing {
            return false;
        }
        self.tick_pending = true;
        true
    }

    pub fn pop(&mut self, priority: Priority) -> Option<Task> {
        self.bucket(priority).pop_front()
    }

    pub fn len(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high.len(),
            Priority::Normal => self.normal.len(),
            Priority::Low => self.low.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.low.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub fn is_tick_pending(&self) -> bool {
        self.tick_pending
    }

    /// Number of completed flushes
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn bucket(&mut self, priority: Priority) -> &mut VecDeque<Task> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("high", &self.high.len())
            .field("normal", &self.normal.len())
            .field("low", &self.low.len())
            .field("tick_pending", &self.tick_pending)
            .field("flushing", &self.flushing)
            .finish()
    }
}

/// Run one flush over `queue`. No borrow is held while a task runs, so
/// tasks may enqueue more work.
///
/// Returns true when work remains and a new tick must be requested.
/// A nested call while a flush is running does nothing.
pub fn flush(queue: &RefCell<TaskQueue>) -> bool {
    {
        let mut q = queue.borrow_mut();
        if q.flushing {
            return false;
        }
        q.flushing = true;
        q.tick_pending = false;
    }

    drain_high(queue);
    for priority in [Priority::Normal, Priority::Low] {
        let pass = queue.borrow().len(priority);
        for _ in 0..pass {
            let task = queue.borrow_mut().pop(priority);
            let Some(task) = task else {
                break;
            };
            task();
            drain_high(queue);
        }
    }

    let mut q = queue.borrow_mut();
    q.flushing = false;
    q.flushes += 1;
    if q.is_empty() {
        return false;
    }
    tracing::trace!(queue = ?*q, "work left after flush, rescheduling");
    q.tick_pending = true;
    true
}

fn drain_high(queue: &RefCell<TaskQueue>) {
    loop {
        let task = queue.borrow_mut().pop(Priority::High);
        match task {
            Some(task) => task(),
            None => break,
        }
    }
}
