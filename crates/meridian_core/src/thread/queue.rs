//! Per-worker queue of pending cross-thread requests.
//!
//! A request is queued while the owner is inside its tick window. A drain
//! swaps out every queued request, creates one [`DrainBarrier`] and hands
//! each requester an arrival token. The owner's own drains always await
//! the arrivals. The contention resolver may release a parked owner's queue
//! without awaiting; the owner settles those barriers when it unparks.
//! Lock order: queue state, then barrier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::batch_thread::WorkerId;
use crate::sync::{ArrivalToken, DrainBarrier};

/// What a requester got back from [`BatchQueue::wait_for_release`].
#[derive(Debug)]
pub enum WaitOutcome {
    /// The owner was outside its tick window. Nothing was queued.
    Quiescent,
    /// A drain released the request. Drop the token once done.
    Released(ArrivalToken),
    /// The owner exited while the request was queued.
    Abandoned,
}

#[derive(Debug)]
struct Request {
    ticket: u64,
    requester: Option<WorkerId>,
}

#[derive(Debug, Default)]
struct QueueState {
    accepting: bool,
    closed: bool,
    /// Owner is blocked on another queue and holds no object lock.
    parked: bool,
    next_ticket: u64,
    pending: Vec<Request>,
    granted: HashMap<u64, ArrivalToken>,
    /// Barriers released on the owner's behalf while it was parked.
    outstanding: Vec<Arc<DrainBarrier>>,
    drains: u64,
}

impl QueueState {
    /// Moves every pending request to `granted` under one new barrier.
    fn release_pending(&mut self) -> Option<(Arc<DrainBarrier>, usize)> {
        if self.pending.is_empty() {
            return None;
        }
        let barrier = DrainBarrier::new();
        let pending = std::mem::take(&mut self.pending);
        let released = pending.len();
        for request in pending {
            self.granted.insert(request.ticket, barrier.register());
        }
        self.drains += 1;
        Some((barrier, released))
    }
}

/// Pending-request queue owned by one worker.
#[derive(Debug, Default)]
pub struct BatchQueue {
    state: Mutex<QueueState>,
    released: Condvar,
}

impl BatchQueue {
    /// Creates a closed-window queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the tick window: requests queue from now on.
    pub(crate) fn open(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.accepting = true;
        }
    }

    /// Queues a request and blocks until a drain releases it.
    pub(crate) fn wait_for_release(&self, requester: Option<WorkerId>) -> WaitOutcome {
        let mut state = self.state.lock();
        if !state.accepting {
            return WaitOutcome::Quiescent;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.push(Request { ticket, requester });

        loop {
            if let Some(token) = state.granted.remove(&ticket) {
                return WaitOutcome::Released(token);
            }
            if state.closed {
                state.pending.retain(|request| request.ticket != ticket);
                return WaitOutcome::Abandoned;
            }
            self.released.wait(&mut state);
        }
    }

    /// Releases every queued request and blocks until all of them arrived.
    ///
    /// Only the owner drains, and only while it holds no object lock.
    /// Returns how many were released.
    pub fn drain(&self) -> usize {
        let released = {
            let mut state = self.state.lock();
            let released = state.release_pending();
            if released.is_some() {
                self.released.notify_all();
            }
            released
        };
        Self::await_released(released)
    }

    /// Closes the tick window and performs the final drain.
    ///
    /// Both happen under one lock, so no request can slip in after it.
    pub(crate) fn end_window(&self) -> usize {
        let released = {
            let mut state = self.state.lock();
            state.accepting = false;
            let released = state.release_pending();
            if released.is_some() {
                self.released.notify_all();
            }
            released
        };
        Self::await_released(released)
    }

    fn await_released(released: Option<(Arc<DrainBarrier>, usize)>) -> usize {
        match released {
            Some((barrier, count)) => {
                barrier.await_arrivals();
                count
            }
            None => 0,
        }
    }

    /// Marks the owner parked: from now on [`Self::release_parked`] may
    /// release its requesters from another thread.
    pub(crate) fn park(&self) {
        self.state.lock().parked = true;
    }

    /// Clears the parked mark and waits for every requester released
    /// while it was set. Returns how many drains were settled.
    ///
    /// Once this returns nobody acts on the owner's objects until its next
    /// drain.
    pub(crate) fn unpark(&self) -> usize {
        let outstanding = {
            let mut state = self.state.lock();
            state.parked = false;
            std::mem::take(&mut state.outstanding)
        };
        for barrier in &outstanding {
            barrier.await_arrivals();
        }
        outstanding.len()
    }

    /// Releases the queued requests of a parked owner without waiting for
    /// them. Does nothing unless the owner is parked.
    pub(crate) fn release_parked(&self) -> usize {
        let mut state = self.state.lock();
        if !state.parked {
            return 0;
        }
        match state.release_pending() {
            Some((barrier, count)) => {
                state.outstanding.push(barrier);
                self.released.notify_all();
                count
            }
            None => 0,
        }
    }

    /// Permanently closes the queue. Still-queued requesters are woken
    /// and abandoned.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.accepting = false;
        state.parked = false;
        self.released.notify_all();
    }

    /// Requests queued and not yet released.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Workers currently blocked on this queue. `None` entries are
    /// threads outside the pool.
    #[must_use]
    pub fn waiting(&self) -> Vec<Option<WorkerId>> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|request| request.requester)
            .collect()
    }

    /// Number of drains that released at least one request.
    #[must_use]
    pub fn drain_count(&self) -> u64 {
        self.state.lock().drains
    }

    /// Returns `true` while the tick window is open.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    /// Returns `true` while the owner is parked on another queue.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.state.lock().parked
    }
}
