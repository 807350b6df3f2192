//! The ticking worker's hold on one object.
//!
//! A worker ticks an object while holding its lock. Whenever the tick has
//! to wait for another worker (queuing on a busy owner, or serving its own
//! queue) the lease gives the lock up first and takes it back afterwards,
//! so a parked worker never blocks anyone on the object it is ticking.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::MutexGuard;

use super::acquirable::{Acquirable, HandleId};
use super::acquisition;
use super::context::{AcquisitionContext, AcquisitionStats, Route};
use crate::thread::WorkerId;

/// Exclusive access to the object being ticked, plus the ticking thread's
/// way to every other handle.
pub struct Lease<'a, T> {
    id: HandleId,
    guard: MutexGuard<'a, T>,
    ctx: &'a AcquisitionContext,
}

impl<'a, T: 'static> Lease<'a, T> {
    pub(crate) fn new(id: HandleId, guard: MutexGuard<'a, T>, ctx: &'a AcquisitionContext) -> Self {
        Self { id, guard, ctx }
    }

    /// Identity of the leased handle.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Worker running the tick, `None` when ticked from a detached context.
    #[must_use]
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.ctx.worker_id()
    }

    /// Acquisition counters of the ticking thread.
    #[must_use]
    pub fn stats(&self) -> AcquisitionStats {
        self.ctx.stats()
    }

    /// Runs `action` against the object behind `handle`.
    ///
    /// Objects owned by the ticking worker cost one id comparison; the
    /// leased handle itself is handed straight out of the lease. When the
    /// owner is another worker mid-tick, the lease is released while the
    /// caller queues and reacquired once the action is done.
    pub fn acquire<U: 'static, R>(&mut self, handle: &Acquirable<U>, action: impl FnOnce(&mut U) -> R) -> R {
        if handle.id() == self.id {
            if let Some(own) = (&mut *self.guard as &mut dyn Any).downcast_mut::<U>() {
                return action(own);
            }
        }

        let ctx = self.ctx;
        match ctx.route(handle.handler()) {
            Route::Ready(access) => handle.with_access(access, action),
            Route::Queue(owner) => MutexGuard::unlocked(&mut self.guard, || {
                handle.with_access(ctx.synchronize(&owner), action)
            }),
        }
    }

    /// [`acquisition::acquire_for_each`] from inside a tick.
    ///
    /// Runs with the lease released; the leased handle may appear in
    /// `handles` and is visited like any other owned object.
    pub fn acquire_for_each<'h, U: 'h>(
        &mut self,
        handles: impl IntoIterator<Item = &'h Acquirable<U>>,
        consumer: impl FnMut(&mut U),
    ) {
        let ctx = self.ctx;
        MutexGuard::unlocked(&mut self.guard, || {
            acquisition::acquire_for_each(ctx, handles, consumer);
        });
    }

    /// [`acquisition::acquire_all`] from inside a tick.
    ///
    /// Runs with the lease released; the leased handle may appear in
    /// `handles`.
    pub fn acquire_all<'h, U: 'h, R>(
        &mut self,
        handles: impl IntoIterator<Item = &'h Acquirable<U>>,
        collector: impl FnOnce(&mut [&mut U]) -> R,
    ) -> R {
        let ctx = self.ctx;
        MutexGuard::unlocked(&mut self.guard, || acquisition::acquire_all(ctx, handles, collector))
    }

    /// Releases every request queued on the ticking worker and waits until
    /// each requester is done, so long ticks can let others through.
    ///
    /// Returns the number released; always zero on a detached context.
    pub fn drain_pending(&mut self) -> usize {
        let ctx = self.ctx;
        if !ctx.has_pending() {
            return 0;
        }
        MutexGuard::unlocked(&mut self.guard, || ctx.serve_pending())
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> fmt::Debug for Lease<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("worker", &self.ctx.worker_id())
            .finish_non_exhaustive()
    }
}
