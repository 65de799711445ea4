//! Batching of recompute, notify and destroy work.
//!
//! # State machine
//!
//! - **Idle**: nothing scheduled.
//! - **Pending**: a drain task sits in the scheduler; requests accumulate.
//! - **Draining**: the task is running. Each queue is taken before it is
//!   walked, so work requested while draining lands in the next batch.
//!
//! Phases run in a fixed order: recompute (so notify sees fresh values), then
//! notify, then destroy (so garbage collection sees up-to-date emptiness).
//!
//! # Runaway guard
//!
//! Every hop from idle to pending counts as one iteration. A drain that leaves
//! nothing behind resets the count; a chain of drains that keeps producing work
//! past [`EngineConfig::max_iterations`](crate::EngineConfig) fails with
//! [`ArborError::PossibleInfiniteLoop`] and discards the pending work.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use web_time::Instant;

use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::Phase;
use crate::runtime::{EntryId, Runtime};
use crate::scheduler::{Scheduler, TaskHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Pending,
    Draining,
}

/// Running totals over every drain of one root.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchStats {
    pub drains: u64,
    pub recomputed: u64,
    /// Entries whose listeners were called.
    pub notified: u64,
    /// Entries removed by garbage collection.
    pub destroyed: u64,
    /// Contained listener panics plus recompute and collection errors.
    pub failures: u64,
    pub last_drain_ms: f32,
}

pub struct Manager {
    scheduler: Box<dyn Scheduler>,
    state: Cell<ManagerState>,
    handle: Cell<Option<TaskHandle>>,
    iterations: Cell<u32>,
    max_iterations: u32,
    to_recompute: RefCell<Vec<EntryId>>,
    to_notify: RefCell<Vec<EntryId>>,
    to_destroy: RefCell<Vec<EntryId>>,
    stats: RefCell<BatchStats>,
}

impl Manager {
    pub(crate) fn new(scheduler: Box<dyn Scheduler>, max_iterations: u32) -> Self {
        Self {
            scheduler,
            state: Cell::new(ManagerState::Idle),
            handle: Cell::new(None),
            iterations: Cell::new(0),
            max_iterations: max_iterations.max(1),
            to_recompute: RefCell::new(Vec::new()),
            to_notify: RefCell::new(Vec::new()),
            to_destroy: RefCell::new(Vec::new()),
            stats: RefCell::new(BatchStats::default()),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state.get()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    pub fn stats(&self) -> BatchStats {
        *self.stats.borrow()
    }

    /// Queue lengths as `(recompute, notify, destroy)`.
    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.to_recompute.borrow().len(),
            self.to_notify.borrow().len(),
            self.to_destroy.borrow().len(),
        )
    }

    fn queue(&self, phase: Phase) -> &RefCell<Vec<EntryId>> {
        match phase {
            Phase::Recompute => &self.to_recompute,
            Phase::Notify => &self.to_notify,
            Phase::Destroy => &self.to_destroy,
        }
    }

    pub(crate) fn enqueue(&self, phase: Phase, id: EntryId) {
        self.queue(phase).borrow_mut().push(id);
    }

    fn take(&self, phase: Phase) -> Vec<EntryId> {
        std::mem::take(&mut *self.queue(phase).borrow_mut())
    }

    fn has_work(&self) -> bool {
        !self.to_recompute.borrow().is_empty()
            || !self.to_notify.borrow().is_empty()
            || !self.to_destroy.borrow().is_empty()
    }

    /// Schedules a drain if none is scheduled or running.
    pub(crate) fn wake(&self, rt: &Weak<Runtime>) -> Result<()> {
        if self.state.get() != ManagerState::Idle {
            return Ok(());
        }
        let next = self.iterations.get() + 1;
        if next > self.max_iterations {
            return Err(ArborError::PossibleInfiniteLoop {
                iterations: self.iterations.get(),
            });
        }
        self.iterations.set(next);
        self.state.set(ManagerState::Pending);

        let rt = rt.clone();
        let handle = self.scheduler.schedule(Box::new(move || match rt.upgrade() {
            Some(rt) => drain(&rt),
            None => Ok(()),
        }));
        self.handle.set(Some(handle));
        Ok(())
    }

    fn discard(&self) {
        self.to_recompute.borrow_mut().clear();
        self.to_notify.borrow_mut().clear();
        self.to_destroy.borrow_mut().clear();
    }

    pub(crate) fn shutdown(&self) {
        if let Some(handle) = self.handle.take() {
            self.scheduler.cancel(handle);
        }
        self.discard();
        self.state.set(ManagerState::Idle);
        self.iterations.set(0);
    }
}

#[derive(Default)]
struct Batch {
    recomputed: u64,
    notified: u64,
    destroyed: u64,
    failures: u64,
}

/// One scheduled pass over the three pending sets.
pub(crate) fn drain(rt: &Rc<Runtime>) -> Result<()> {
    let manager = &rt.manager;
    if rt.destroyed.get() {
        return Ok(());
    }
    manager.handle.set(None);
    manager.state.set(ManagerState::Draining);
    let started = Instant::now();
    let mut batch = Batch::default();

    let recompute = manager.take(Phase::Recompute);
    log::debug!(
        "drain #{}: {} to recompute",
        manager.iterations.get(),
        recompute.len()
    );
    for id in recompute {
        // A `get` may have pulled it already.
        if !rt.claim(id, Phase::Recompute) {
            continue;
        }
        match Entry::new(rt.clone(), id).recompute() {
            Ok(()) => batch.recomputed += 1,
            Err(e) => {
                log::error!("recompute of `{}` failed: {e}", rt.path_string(id));
                batch.failures += 1;
            }
        }
    }

    for id in manager.take(Phase::Notify) {
        if !rt.claim(id, Phase::Notify) {
            continue;
        }
        let baseline = rt.take_baseline(id);
        match Entry::new(rt.clone(), id).notify(baseline) {
            Ok(report) => {
                if report.called {
                    batch.notified += 1;
                }
                batch.failures += report.panics;
            }
            Err(e) => {
                log::error!("notify of `{}` failed: {e}", rt.path_string(id));
                batch.failures += 1;
            }
        }
    }

    for id in manager.take(Phase::Destroy) {
        if !rt.claim(id, Phase::Destroy) {
            continue;
        }
        match Entry::new(rt.clone(), id).garbage_collect() {
            Ok(removed) => batch.destroyed += removed as u64,
            // Swept by an ancestor earlier in this pass.
            Err(ArborError::Destroyed) => {}
            Err(e) => {
                log::error!("garbage collection of `{}` failed: {e}", rt.path_string(id));
                batch.failures += 1;
            }
        }
    }

    {
        let mut stats = manager.stats.borrow_mut();
        stats.drains += 1;
        stats.recomputed += batch.recomputed;
        stats.notified += batch.notified;
        stats.destroyed += batch.destroyed;
        stats.failures += batch.failures;
        stats.last_drain_ms = started.elapsed().as_secs_f32() * 1000.0;
        log::debug!(
            "drain done in {:.2} ms: {} recomputed, {} notified, {} destroyed, {} failed",
            stats.last_drain_ms,
            batch.recomputed,
            batch.notified,
            batch.destroyed,
            batch.failures
        );
    }

    manager.state.set(ManagerState::Idle);
    if rt.destroyed.get() {
        return Ok(());
    }
    if !manager.has_work() {
        manager.iterations.set(0);
        return Ok(());
    }
    if let Err(e) = manager.wake(&rt.this) {
        log::error!("{e}; discarding pending work");
        manager.discard();
        rt.clear_pending();
        manager.iterations.set(0);
        return Err(e);
    }
    Ok(())
}
