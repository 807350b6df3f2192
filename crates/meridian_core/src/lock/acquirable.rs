//! Handles, affinity records and the tick capability.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::{Access, AcquisitionContext};
use super::lease::Lease;
use crate::thread::{Worker, WorkerId};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a handle. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Anything that advances once per tick.
///
/// The tick receives the object through a [`Lease`]: deref it for the
/// object itself and go through it for every other handle the tick
/// touches.
pub trait Tickable: Send + Sized + 'static {
    /// Advances the object by one tick. `time` is wall-clock milliseconds.
    fn tick(this: &mut Lease<'_, Self>, time: u64);
}

/// Affinity record: which worker ticks the object this cycle.
///
/// The id is read lock-free on the fast path. The worker reference is only
/// needed when a foreign thread has to queue on the owner.
#[derive(Debug, Default)]
pub struct Handler {
    worker_id: AtomicU64,
    worker: RwLock<Option<Arc<Worker>>>,
}

impl Handler {
    /// Creates an unassigned record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Owning worker for the current cycle, if any.
    #[must_use]
    pub fn worker_id(&self) -> Option<WorkerId> {
        WorkerId::from_raw(self.worker_id.load(Ordering::Acquire))
    }

    /// Returns `true` if no worker has been assigned.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.worker_id.load(Ordering::Acquire) == 0
    }

    pub(crate) fn worker(&self) -> Option<Arc<Worker>> {
        self.worker.read().clone()
    }

    /// Points the record at `worker`. Called by the assignment builder only.
    pub(crate) fn refresh_thread(&self, worker: &Arc<Worker>) {
        let mut slot = self.worker.write();
        *slot = Some(Arc::clone(worker));
        self.worker_id.store(worker.id().get(), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        let mut slot = self.worker.write();
        *slot = None;
        self.worker_id.store(0, Ordering::Release);
    }
}

/// Exclusive owner of one simulated object.
pub struct Acquirable<T> {
    id: HandleId,
    handler: Handler,
    value: Mutex<T>,
}

impl<T> Acquirable<T> {
    /// Wraps `value` in an unassigned handle.
    pub fn new(value: T) -> Self {
        Self {
            id: HandleId::next(),
            handler: Handler::new(),
            value: Mutex::new(value),
        }
    }

    /// Handle identity.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Affinity record.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Runs `action` against the wrapped object from outside any tick.
    ///
    /// Returns once the action completed. Blocks while the owning worker is
    /// mid-tick and has not drained its queue. Ticks go through
    /// [`Lease::acquire`] instead.
    pub fn acquire<R>(&self, ctx: &AcquisitionContext, action: impl FnOnce(&mut T) -> R) -> R {
        self.with_access(ctx.access(&self.handler), action)
    }

    /// Runs `action` under the object lock, then releases `access`.
    pub(crate) fn with_access<R>(&self, access: Access<'_>, action: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut value = self.value.lock();
            action(&mut value)
        };
        drop(access);
        result
    }

    /// Mutable access without synchronization. Exclusive borrow proves no
    /// other thread holds the handle.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the handle.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, T> {
        self.value.lock()
    }
}

impl<T> fmt::Debug for Acquirable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquirable")
            .field("id", &self.id)
            .field("worker", &self.handler.worker_id())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a handle the scheduler can tick.
pub trait Schedulable: Send + Sync {
    /// Handle identity.
    fn id(&self) -> HandleId;

    /// Affinity record.
    fn handler(&self) -> &Handler;

    /// Ticks the wrapped object on the calling worker.
    fn tick(&self, time: u64, ctx: &AcquisitionContext);
}

impl<T: Tickable> Schedulable for Acquirable<T> {
    fn id(&self) -> HandleId {
        self.id
    }

    fn handler(&self) -> &Handler {
        &self.handler
    }

    fn tick(&self, time: u64, ctx: &AcquisitionContext) {
        let mut lease = Lease::new(self.id, self.value.lock(), ctx);
        T::tick(&mut lease, time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u64);

    impl Tickable for Counter {
        fn tick(this: &mut Lease<'_, Self>, _time: u64) {
            this.0 += 1;
        }
    }

    #[test]
    fn test_handle_ids_are_unique_and_non_zero() {
        let a = Acquirable::new(1_u8);
        let b = Acquirable::new(2_u8);
        assert_ne!(a.id(), b.id());
        assert!(a.id().get() > 0);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_new_handle_is_unassigned() {
        let handle = Acquirable::new(0_u32);
        assert!(handle.handler().is_unassigned());
        assert_eq!(handle.handler().worker_id(), None);
    }

    #[test]
    fn test_schedulable_tick_advances_value() {
        let handle = Acquirable::new(Counter(0));
        let ctx = AcquisitionContext::detached();
        handle.tick(0, &ctx);
        handle.tick(50, &ctx);
        assert_eq!(handle.into_inner().0, 2);
    }

    #[test]
    fn test_acquire_unassigned_runs_action() {
        let handle = Acquirable::new(vec![1, 2]);
        let ctx = AcquisitionContext::detached();
        let len = handle.acquire(&ctx, |v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, 3);
        assert_eq!(ctx.stats().synchronized, 1);
        assert_eq!(ctx.stats().fast_path, 0);
    }
}
