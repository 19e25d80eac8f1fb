//! FIFO queue of blocked acquirers.
//!
//! Each blocked `acquire` owns the receiving half of a oneshot channel; the
//! queue keeps the sending halves in arrival order. Every mutation happens
//! under the pool lock, so a ticket that has left the queue has either been
//! granted (the grant is already in its channel) or cancelled.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::producer::Producer;

/// Identifies one queued acquirer.
pub(crate) type TicketId = u64;

/// What a woken waiter receives.
pub(crate) enum Grant<C> {
    /// A released producer, handed over without touching the idle list.
    Producer(Producer<C>),
    /// A reserved unit of capacity; the waiter creates its own producer.
    Slot,
}

struct Ticket<C> {
    id: TicketId,
    tx: oneshot::Sender<Grant<C>>,
    queued_at: Instant,
}

pub(crate) struct WaitQueue<C> {
    tickets: VecDeque<Ticket<C>>,
    next_id: TicketId,
}

impl<C> WaitQueue<C> {
    pub(crate) fn new() -> Self {
        Self {
            tickets: VecDeque::new(),
            next_id: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Queue a new waiter at the tail.
    pub(crate) fn enqueue(&mut self) -> (TicketId, oneshot::Receiver<Grant<C>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.tickets.push_back(Ticket {
            id,
            tx,
            queued_at: Instant::now(),
        });
        (id, rx)
    }

    /// Deliver `grant` to the oldest waiter still listening.
    ///
    /// Waiters whose receiver is gone are discarded. If nobody is left the
    /// grant comes back to the caller.
    pub(crate) fn grant(&mut self, mut grant: Grant<C>) -> Result<(), Grant<C>> {
        while let Some(ticket) = self.tickets.pop_front() {
            match ticket.tx.send(grant) {
                Ok(()) => {
                    tracing::trace!(
                        ticket = ticket.id,
                        waited = ?ticket.queued_at.elapsed(),
                        "granted queued acquirer"
                    );
                    return Ok(());
                }
                Err(returned) => grant = returned,
            }
        }
        Err(grant)
    }

    /// Remove a waiter that gave up. Returns `false` if it was already granted.
    pub(crate) fn cancel(&mut self, id: TicketId) -> bool {
        // Cancellations are usually near the front.
        match self.tickets.iter().position(|ticket| ticket.id == id) {
            Some(index) => {
                self.tickets.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every ticket, waking all waiters with a closed channel.
    pub(crate) fn close(&mut self) -> usize {
        let woken = self.tickets.len();
        self.tickets.clear();
        woken
    }
}
