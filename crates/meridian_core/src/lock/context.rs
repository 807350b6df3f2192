//! Per-thread acquisition state.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::Instant;

use super::acquirable::Handler;
use crate::monitoring::WaitMonitor;
use crate::sync::ArrivalToken;
use crate::thread::{WaitOutcome, Worker, WorkerId, WorkerState};

/// Counters of how acquisitions were resolved on one context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Acquisitions resolved as owner or re-entrant, without synchronizing.
    pub fast_path: u64,
    /// Acquisitions that went through the synchronized path.
    pub synchronized: u64,
    /// Synchronized acquisitions that actually queued on a busy owner.
    pub queued: u64,
}

/// The calling thread's side of the acquisition protocol.
///
/// Worker threads own one for their whole life and tick every object
/// through a [`crate::Lease`] built on it. Other threads create one with
/// [`AcquisitionContext::detached`] and keep it on the stack. Not `Sync`:
/// one context per thread.
pub struct AcquisitionContext {
    worker: Option<Arc<Worker>>,
    monitor: Option<Arc<WaitMonitor>>,
    /// Owners this call stack currently holds a released request on.
    waiting_on: RefCell<Vec<WorkerId>>,
    /// Live accesses that parked this worker.
    parked: Cell<u32>,
    fast_path: Cell<u64>,
    synchronized: Cell<u64>,
    queued: Cell<u64>,
}

impl AcquisitionContext {
    /// Context for a thread that is not a scheduler worker.
    #[must_use]
    pub fn detached() -> Self {
        Self::build(None, None)
    }

    /// Detached context whose wait time is recorded in `monitor`.
    #[must_use]
    pub fn with_monitor(monitor: Arc<WaitMonitor>) -> Self {
        Self::build(None, Some(monitor))
    }

    pub(crate) fn for_worker(worker: Arc<Worker>, monitor: Arc<WaitMonitor>) -> Self {
        Self::build(Some(worker), Some(monitor))
    }

    fn build(worker: Option<Arc<Worker>>, monitor: Option<Arc<WaitMonitor>>) -> Self {
        Self {
            worker,
            monitor,
            waiting_on: RefCell::new(Vec::new()),
            parked: Cell::new(0),
            fast_path: Cell::new(0),
            synchronized: Cell::new(0),
            queued: Cell::new(0),
        }
    }

    /// Worker this context belongs to, `None` for detached contexts.
    #[must_use]
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker.as_ref().map(|worker| worker.id())
    }

    /// Snapshot of the acquisition counters.
    #[must_use]
    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            fast_path: self.fast_path.get(),
            synchronized: self.synchronized.get(),
            queued: self.queued.get(),
        }
    }

    /// Returns `true` if requests are queued on the calling worker.
    pub(crate) fn has_pending(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.queue().pending_len() > 0)
    }

    /// Releases and awaits every request queued on the calling worker.
    /// The caller must hold no object lock.
    pub(crate) fn serve_pending(&self) -> usize {
        self.worker.as_ref().map_or(0, |worker| worker.queue().drain())
    }

    fn owns(&self, id: WorkerId) -> bool {
        self.worker_id() == Some(id)
    }

    fn is_waiting_on(&self, id: WorkerId) -> bool {
        self.waiting_on.borrow().contains(&id)
    }

    fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }

    /// Resolves how the caller may touch an object with this affinity.
    pub(crate) fn route(&self, handler: &Handler) -> Route<'_> {
        match handler.worker_id() {
            None => self.unassigned(),
            Some(id) if self.owns(id) || self.is_waiting_on(id) => self.owned(),
            Some(_) => match handler.worker() {
                Some(owner) => self.foreign(owner),
                None => self.unassigned(),
            },
        }
    }

    /// Same as [`Self::route`] for a group already resolved to one owner.
    pub(crate) fn route_worker(&self, owner: Option<&Arc<Worker>>) -> Route<'_> {
        match owner {
            None => self.unassigned(),
            Some(owner) if self.owns(owner.id()) || self.is_waiting_on(owner.id()) => self.owned(),
            Some(owner) => self.foreign(Arc::clone(owner)),
        }
    }

    /// Routes and, when needed, synchronizes in one step. The caller must
    /// hold no object lock.
    pub(crate) fn access(&self, handler: &Handler) -> Access<'_> {
        self.route(handler).resolve(self)
    }

    /// Same as [`Self::access`] for a group already resolved to one owner.
    pub(crate) fn access_worker(&self, owner: Option<&Arc<Worker>>) -> Access<'_> {
        self.route_worker(owner).resolve(self)
    }

    fn owned(&self) -> Route<'_> {
        Self::bump(&self.fast_path);
        Route::Ready(Access::plain(self))
    }

    fn unassigned(&self) -> Route<'_> {
        Self::bump(&self.synchronized);
        Route::Ready(Access::plain(self))
    }

    fn foreign(&self, owner: Arc<Worker>) -> Route<'_> {
        Self::bump(&self.synchronized);
        if owner.state().in_tick_window() {
            Route::Queue(owner)
        } else {
            Route::Ready(Access::plain(self))
        }
    }

    /// Queues on `owner` and blocks until its drain releases the request.
    ///
    /// The caller must hold no object lock: a worker serves its own queue
    /// before parking, and while parked the resolver may release its
    /// requesters onto its objects.
    pub(crate) fn synchronize(&self, owner: &Arc<Worker>) -> Access<'_> {
        Self::bump(&self.queued);

        let previous = self.worker.as_ref().map(|me| {
            // One of our requesters may be the owner we are about to wait on.
            me.queue().drain();
            me.swap_state(WorkerState::Blocked)
        });
        let parked = self.enter_park();

        let started = self
            .monitor
            .as_ref()
            .filter(|monitor| monitor.is_enabled())
            .map(|_| Instant::now());

        let outcome = owner.queue().wait_for_release(self.worker_id());

        if let (Some(me), Some(previous)) = (&self.worker, previous) {
            me.set_state(previous);
        }
        if let (Some(monitor), Some(started)) = (&self.monitor, started) {
            monitor.record(started.elapsed());
        }

        let grant = match outcome {
            WaitOutcome::Quiescent => None,
            WaitOutcome::Released(token) => {
                self.waiting_on.borrow_mut().push(owner.id());
                Some(Grant {
                    owner: owner.id(),
                    token,
                })
            }
            WaitOutcome::Abandoned => {
                tracing::warn!(
                    owner = %owner.id(),
                    requester = ?self.worker_id(),
                    "owner exited while a request was queued; acquisition proceeds unsynchronized"
                );
                None
            }
        };
        Access {
            ctx: self,
            grant,
            parked,
        }
    }

    fn enter_park(&self) -> bool {
        let Some(me) = &self.worker else {
            return false;
        };
        if self.parked.get() == 0 {
            me.queue().park();
        }
        self.parked.set(self.parked.get() + 1);
        true
    }

    fn leave_park(&self) {
        let depth = self.parked.get().saturating_sub(1);
        self.parked.set(depth);
        if depth == 0 {
            if let Some(me) = &self.worker {
                me.queue().unpark();
            }
        }
    }

    fn leave_grant(&self, owner: WorkerId) {
        let mut waiting_on = self.waiting_on.borrow_mut();
        if let Some(position) = waiting_on.iter().rposition(|id| *id == owner) {
            waiting_on.remove(position);
        }
    }
}

impl std::fmt::Debug for AcquisitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionContext")
            .field("worker", &self.worker_id())
            .field("waiting_on", &self.waiting_on.borrow())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Where an acquisition goes next.
pub(crate) enum Route<'a> {
    /// Owner, re-entrant, unassigned or quiescent owner: lock and go.
    Ready(Access<'a>),
    /// Owner is inside its tick window: [`AcquisitionContext::synchronize`]
    /// first, with no object lock held.
    Queue(Arc<Worker>),
}

impl<'a> Route<'a> {
    fn resolve(self, ctx: &'a AcquisitionContext) -> Access<'a> {
        match self {
            Self::Ready(access) => access,
            Self::Queue(owner) => ctx.synchronize(&owner),
        }
    }
}

/// A resolved acquisition. Drop it after the object guard.
///
/// Dropping arrives at the owner's drain barrier first, then, for the last
/// access that parked this worker, settles requesters released while it
/// was parked.
pub(crate) struct Access<'a> {
    ctx: &'a AcquisitionContext,
    grant: Option<Grant>,
    parked: bool,
}

/// A released request held by the caller.
struct Grant {
    owner: WorkerId,
    token: ArrivalToken,
}

impl<'a> Access<'a> {
    fn plain(ctx: &'a AcquisitionContext) -> Self {
        Self {
            ctx,
            grant: None,
            parked: false,
        }
    }

    /// Returns `true` if the caller was released by the owner's drain.
    #[cfg(test)]
    pub(crate) fn is_synchronized(&self) -> bool {
        self.grant.is_some()
    }
}

impl Drop for Access<'_> {
    fn drop(&mut self) {
        if let Some(grant) = self.grant.take() {
            self.ctx.leave_grant(grant.owner);
            drop(grant.token);
        }
        if self.parked {
            self.ctx.leave_park();
        }
    }
}
