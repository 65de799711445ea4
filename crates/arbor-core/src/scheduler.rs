//! Deferral of batch drains.
//!
//! The manager never drains inline: the first change after a quiet period hands
//! a single-shot task to a [`Scheduler`], and the host decides when that task
//! runs. Two schedulers ship with the crate:
//!
//! - [`ManualScheduler`]: a queue owned by the caller, pumped explicitly with
//!   [`ManualScheduler::run_pending`] or [`ManualScheduler::run_until_idle`].
//! - [`LocalScheduler`]: a thread-local "run soon" queue shared by every root
//!   on the thread, pumped by the host loop with [`run_local_tasks`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Result;

pub type Task = Box<dyn FnOnce() -> Result<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

pub trait Scheduler: 'static {
    /// Runs `task` once, later, off the current call stack.
    fn schedule(&self, task: Task) -> TaskHandle;

    /// Drops a task that has not run yet.
    fn cancel(&self, _handle: TaskHandle) {}
}

#[derive(Default)]
struct TaskQueue {
    next: u64,
    tasks: VecDeque<(TaskHandle, Task)>,
}

impl TaskQueue {
    fn push(&mut self, task: Task) -> TaskHandle {
        self.next += 1;
        let handle = TaskHandle(self.next);
        self.tasks.push_back((handle, task));
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.tasks.retain(|(h, _)| *h != handle);
    }
}

/// A task queue the caller drains explicitly.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<RefCell<TaskQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }

    /// Runs the tasks queued at the time of the call. Tasks they schedule wait
    /// for the next call.
    pub fn run_pending(&self) -> Result<usize> {
        let due = self.pending();
        let mut ran = 0;
        while ran < due {
            let Some((_, task)) = self.queue.borrow_mut().tasks.pop_front() else {
                break;
            };
            ran += 1;
            task()?;
        }
        Ok(ran)
    }

    /// Runs tasks until the queue is empty, including tasks scheduled along the
    /// way. Stops at the first failing task.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().tasks.pop_front();
            let Some((_, task)) = next else {
                return Ok(ran);
            };
            ran += 1;
            task()?;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) -> TaskHandle {
        self.queue.borrow_mut().push(task)
    }

    fn cancel(&self, handle: TaskHandle) {
        self.queue.borrow_mut().cancel(handle);
    }
}

thread_local! {
    static LOCAL_TASKS: RefCell<TaskQueue> = RefCell::new(TaskQueue::default());
}

/// Schedules onto the current thread's run-soon queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalScheduler;

impl Scheduler for LocalScheduler {
    fn schedule(&self, task: Task) -> TaskHandle {
        LOCAL_TASKS.with(|q| q.borrow_mut().push(task))
    }

    fn cancel(&self, handle: TaskHandle) {
        LOCAL_TASKS.with(|q| q.borrow_mut().cancel(handle));
    }
}

pub fn local_tasks_pending() -> usize {
    LOCAL_TASKS.with(|q| q.borrow().tasks.len())
}

/// Drains the thread-local queue, including tasks scheduled while draining.
///
/// A failing task is returned to the caller after the remaining tasks ran, so
/// one root's runaway loop does not stall the others on the thread.
pub fn run_local_tasks() -> Result<usize> {
    let mut ran = 0;
    let mut first_error = None;
    loop {
        let next = LOCAL_TASKS.with(|q| q.borrow_mut().tasks.pop_front());
        let Some((_, task)) = next else {
            break;
        };
        ran += 1;
        if let Err(e) = task() {
            log::error!("scheduled task failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(ran),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn run_pending_defers_follow_up_tasks() {
        let sched = ManualScheduler::new();
        let hits = Rc::new(Cell::new(0));

        let inner_sched = sched.clone();
        let inner_hits = hits.clone();
        sched.schedule(Box::new(move || {
            inner_hits.set(inner_hits.get() + 1);
            let again = inner_hits.clone();
            inner_sched.schedule(Box::new(move || {
                again.set(again.get() + 10);
                Ok(())
            }));
            Ok(())
        }));

        assert_eq!(sched.run_pending().unwrap(), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(sched.pending(), 1);
        assert_eq!(sched.run_until_idle().unwrap(), 1);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let sched = ManualScheduler::new();
        let hit = Rc::new(Cell::new(false));
        let h = hit.clone();
        let handle = sched.schedule(Box::new(move || {
            h.set(true);
            Ok(())
        }));
        sched.cancel(handle);
        assert_eq!(sched.run_until_idle().unwrap(), 0);
        assert!(!hit.get());
    }
}
