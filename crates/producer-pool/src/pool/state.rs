//! Lock-protected pool bookkeeping.
//!
//! `PoolState` is a plain synchronous state machine; the async pool wraps it
//! in a mutex and never holds that mutex across an `.await`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::oneshot;

use super::waiters::{Grant, TicketId, WaitQueue};
use crate::producer::Producer;

/// Outcome of asking the state for a producer.
pub(crate) enum Checkout<C> {
    /// The oldest idle producer.
    Ready(Producer<C>),
    /// Capacity was reserved; the caller must create a producer.
    Grow,
    /// Nothing idle and no capacity left; wait on the receiver.
    Wait(TicketId, oneshot::Receiver<Grant<C>>),
}

/// Outcome of returning a grant to the state.
#[derive(Debug)]
pub(crate) enum CheckIn<C> {
    /// Given to the oldest waiter.
    HandedOff,
    /// Parked in the idle list.
    Idled,
    /// A capacity reservation was released.
    Freed,
    /// Not retained; the caller must close it, then give back its slot
    /// with `Grant::Slot`.
    Evict(Producer<C>),
}

/// Lifetime totals reported by `PoolStats`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Totals {
    pub created: u64,
    pub destroyed: u64,
    pub acquisitions: u64,
    pub handoffs: u64,
    pub timeouts: u64,
}

pub(crate) struct PoolState<C> {
    idle: VecDeque<Producer<C>>,
    waiters: WaitQueue<C>,
    /// Producers held by callers, in flight to a waiter, being created or
    /// being closed.
    running: usize,
    closed: bool,
    pub(crate) totals: Totals,
}

impl<C> PoolState<C> {
    pub(crate) fn new(max_capacity: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(max_capacity),
            waiters: WaitQueue::new(),
            running: 0,
            closed: false,
            totals: Totals::default(),
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.running
    }

    pub(crate) fn idling(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Park freshly created producers in the idle list.
    pub(crate) fn seed(&mut self, producers: impl IntoIterator<Item = Producer<C>>) {
        for producer in producers {
            self.totals.created += 1;
            self.idle.push_back(producer);
        }
    }

    pub(crate) fn checkout(&mut self, max_capacity: usize) -> Checkout<C> {
        if let Some(producer) = self.idle.pop_front() {
            self.running += 1;
            self.totals.acquisitions += 1;
            return Checkout::Ready(producer);
        }
        if self.running + self.idle.len() < max_capacity {
            self.running += 1;
            return Checkout::Grow;
        }
        let (ticket, rx) = self.waiters.enqueue();
        Checkout::Wait(ticket, rx)
    }

    /// Give back a producer or a capacity reservation.
    ///
    /// The oldest waiter is served first; a producer nobody waits for goes to
    /// the idle list unless `max_idle` producers are already idle.
    ///
    /// An evicted producer keeps its slot until it is closed, so live
    /// connections never exceed `max_capacity`.
    pub(crate) fn restore(&mut self, grant: Grant<C>, max_idle: usize) -> CheckIn<C> {
        if self.closed {
            return match grant {
                Grant::Producer(producer) => CheckIn::Evict(producer),
                Grant::Slot => {
                    self.running -= 1;
                    CheckIn::Freed
                }
            };
        }
        let is_producer = matches!(grant, Grant::Producer(_));
        match self.waiters.grant(grant) {
            Ok(()) => {
                if is_producer {
                    self.totals.handoffs += 1;
                    self.totals.acquisitions += 1;
                }
                CheckIn::HandedOff
            }
            Err(Grant::Producer(producer)) => {
                if self.idle.len() >= max_idle {
                    CheckIn::Evict(producer)
                } else {
                    self.running -= 1;
                    self.idle.push_back(producer);
                    CheckIn::Idled
                }
            }
            Err(Grant::Slot) => {
                self.running -= 1;
                CheckIn::Freed
            }
        }
    }

    /// A created producer reached its caller.
    pub(crate) fn record_created(&mut self) {
        self.totals.created += 1;
        self.totals.acquisitions += 1;
    }

    /// A producer created for a caller is dropped again without being used.
    pub(crate) fn forget_running(&mut self) {
        self.running -= 1;
    }

    pub(crate) fn cancel_wait(&mut self, ticket: TicketId) -> bool {
        self.waiters.cancel(ticket)
    }

    /// Mark the pool closed, wake all waiters and take the idle producers.
    ///
    /// Returns `None` if the pool was already closed.
    pub(crate) fn shutdown(&mut self) -> Option<(Vec<Producer<C>>, usize)> {
        if self.closed {
            return None;
        }
        self.closed = true;
        let woken = self.waiters.close();
        Some((self.idle.drain(..).collect(), woken))
    }
}

/// Lock-free mirror of the counts, refreshed after every state change.
///
/// Readers may observe slightly stale values; decisions are always made
/// against `PoolState` under the lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    running: AtomicUsize,
    idling: AtomicUsize,
    waiting: AtomicUsize,
}

impl Counters {
    pub(crate) fn publish<C>(&self, state: &PoolState<C>) {
        self.running.store(state.running(), Ordering::Release);
        self.idling.store(state.idling(), Ordering::Release);
        self.waiting.store(state.waiting(), Ordering::Release);
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn idling(&self) -> usize {
        self.idling.load(Ordering::Acquire)
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}
