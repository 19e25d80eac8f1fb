//! Producer pool: bounded, FIFO-fair hand-out of broker producers.
//!
//! All bookkeeping lives in one `PoolState` behind a single mutex that is
//! never held across an `.await`. Callers that find nothing idle and no
//! capacity left queue a oneshot ticket; `release` hands the producer
//! straight to the oldest ticket instead of parking it in the idle list.

mod state;
mod waiters;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::broker::{Broker, IdGenerator, RandomIds};
use crate::config::PoolConfig;
use crate::error::{Error, ReleaseError, Result};
use crate::guard::Lease;
use crate::producer::Producer;

use state::{CheckIn, Checkout, Counters, PoolState};
use waiters::{Grant, TicketId};

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Producers held by callers, including ones being created, handed off
    /// or closed as surplus.
    pub running: usize,
    /// Producers parked in the idle list.
    pub idling: usize,
    /// Callers blocked in `acquire`.
    pub waiting: usize,
    /// Total producers ever created.
    pub created: u64,
    /// Total producers ever closed.
    pub destroyed: u64,
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Releases handed directly to a waiter.
    pub handoffs: u64,
    /// Acquires that gave up at their deadline.
    pub timeouts: u64,
}

struct PoolInner<B: Broker> {
    id: Uuid,
    broker: B,
    ids: Box<dyn IdGenerator>,
    config: PoolConfig,
    state: Mutex<PoolState<B::Connection>>,
    counters: Counters,
}

impl<B: Broker> PoolInner<B> {
    async fn create_producer(&self) -> Result<Producer<B::Connection>> {
        let topic = self.config.topic.as_str();
        let id = self.ids.next_id().map_err(|e| {
            Error::creation(topic, "producer id generation failed").with_source(e)
        })?;
        let connection = self
            .broker
            .connect(&self.config.broker_address, topic)
            .await
            .map_err(|e| match e {
                Error::Creation { .. } => e,
                other => Error::creation(topic, "broker connect failed").with_source(other),
            })?;

        tracing::debug!(producer = %id, topic, "created producer");
        Ok(Producer::new(id, self.id, connection))
    }

    async fn destroy(&self, producer: Producer<B::Connection>) -> Result<()> {
        let id = producer.id();
        let result = self.broker.disconnect(producer.into_connection()).await;
        self.state.lock().totals.destroyed += 1;

        match result {
            Ok(()) => {
                tracing::debug!(producer = %id, "closed producer");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(producer = %id, error = %error, "failed to close producer");
                Err(match error {
                    Error::Cleanup { .. } => error,
                    other => Error::cleanup(id, "broker disconnect failed").with_source(other),
                })
            }
        }
    }

    /// Give back a slot held by a producer that was being created or closed.
    fn return_slot(&self) {
        let mut state = self.state.lock();
        let _ = state.restore(Grant::Slot, self.config.max_idle);
        self.counters.publish(&state);
    }
}

/// Bounded pool of broker producers.
///
/// Cloning is cheap; clones share the same producers, wait queue and counts.
pub struct Pool<B: Broker> {
    inner: Arc<PoolInner<B>>,
}

impl<B: Broker> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Broker> std::fmt::Debug for Pool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("topic", &self.inner.config.topic)
            .field("broker", &self.inner.config.broker_address)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<B: Broker> Pool<B> {
    /// Build a pool with random producer identities.
    ///
    /// See [`Pool::with_id_generator`].
    pub async fn new(broker: B, config: PoolConfig) -> Result<Self> {
        Self::with_id_generator(broker, RandomIds, config).await
    }

    /// Build a pool, verify its topic exists, and create `init_capacity`
    /// producers.
    ///
    /// # Errors
    /// - `Configuration` if `config` is invalid or the topic is unknown to
    ///   the broker; no producer is created.
    /// - `Broker` if the topic list cannot be fetched.
    /// - `Creation` if any initial producer fails; producers created before
    ///   the failure are closed again.
    pub async fn with_id_generator(
        broker: B,
        ids: impl IdGenerator,
        config: PoolConfig,
    ) -> Result<Self> {
        config.validate()?;

        // Topic registry is local to this call.
        let topics = broker
            .topics(&config.broker_address)
            .await
            .map_err(|e| match e {
                Error::Broker { .. } => e,
                other => Error::broker(config.broker_address.as_str(), "failed to list topics")
                    .with_source(other),
            })?;
        if !topics.contains(&config.topic) {
            return Err(Error::configuration(format!(
                "topic '{}' does not exist on broker '{}'",
                config.topic, config.broker_address
            )));
        }

        let inner = PoolInner {
            id: Uuid::new_v4(),
            broker,
            ids: Box::new(ids),
            state: Mutex::new(PoolState::new(config.max_capacity)),
            counters: Counters::default(),
            config,
        };

        let mut producers = Vec::with_capacity(inner.config.init_capacity);
        for _ in 0..inner.config.init_capacity {
            match inner.create_producer().await {
                Ok(producer) => producers.push(producer),
                Err(error) => {
                    tracing::warn!(
                        created = producers.len(),
                        error = %error,
                        "pool initialization failed; closing created producers"
                    );
                    for producer in producers {
                        let _ = inner.destroy(producer).await;
                    }
                    return Err(error);
                }
            }
        }

        {
            let mut state = inner.state.lock();
            state.seed(producers);
            inner.counters.publish(&state);
        }

        tracing::info!(
            topic = %inner.config.topic,
            broker = %inner.config.broker_address,
            init = inner.config.init_capacity,
            max = inner.config.max_capacity,
            max_idle = inner.config.max_idle,
            "producer pool ready"
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Acquire a producer, waiting as long as `config.acquire_timeout` allows
    /// (forever if unset).
    ///
    /// Idle producers are handed out oldest first. With nothing idle the pool
    /// grows up to `max_capacity`; past that, callers queue and are served in
    /// arrival order.
    ///
    /// Dropping the returned future while it waits is safe: the caller's
    /// place in the queue is released and nothing leaks.
    pub async fn acquire(&self) -> Result<Producer<B::Connection>> {
        self.checkout(self.inner.config.acquire_timeout).await
    }

    /// Acquire a producer, failing with `Error::Timeout` after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Producer<B::Connection>> {
        self.checkout(Some(timeout)).await
    }

    /// Acquire a producer wrapped in a [`Lease`] that returns it on drop.
    pub async fn lease(&self) -> Result<Lease<B>> {
        let producer = self.acquire().await?;
        Ok(Lease::new(producer, self.clone()))
    }

    async fn checkout(&self, timeout: Option<Duration>) -> Result<Producer<B::Connection>> {
        let inner = &self.inner;
        // A deadline past what `Instant` can represent means no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t).map(|at| (at, t)));

        // Until this caller holds a producer or a capacity reservation,
        // every wake-up goes back through the locked checkout.
        let grant = loop {
            let step = {
                let mut state = inner.state.lock();
                if state.is_closed() {
                    return Err(Error::Closed);
                }
                let step = state.checkout(inner.config.max_capacity);
                inner.counters.publish(&state);
                step
            };

            match step {
                Checkout::Ready(producer) => {
                    tracing::trace!(producer = %producer.id(), "acquired idle producer");
                    return Ok(producer);
                }
                Checkout::Grow => break Grant::Slot,
                Checkout::Wait(ticket, rx) => {
                    tracing::trace!(ticket, "pool exhausted; queued acquirer");
                    let wait = Wait {
                        pool: self,
                        ticket,
                        rx,
                        settled: false,
                    };
                    if let Some(grant) = wait.until(deadline).await? {
                        break grant;
                    }
                }
            }
        };

        match grant {
            Grant::Producer(producer) => Ok(producer),
            Grant::Slot => self.grow().await,
        }
    }

    /// Create a producer for a caller that holds a capacity reservation.
    async fn grow(&self) -> Result<Producer<B::Connection>> {
        let inner = &self.inner;
        let reservation = Reservation::new(inner);
        let created = inner.create_producer().await;
        reservation.disarm();

        let (result, orphan) = {
            let mut state = inner.state.lock();
            let outcome = match created {
                Ok(producer) if state.is_closed() => {
                    state.totals.created += 1;
                    state.forget_running();
                    (Err(Error::Closed), Some(producer))
                }
                Ok(producer) => {
                    state.record_created();
                    (Ok(producer), None)
                }
                Err(error) => {
                    // The reservation passes to the next waiter, if any.
                    let _ = state.restore(Grant::Slot, inner.config.max_idle);
                    (Err(error), None)
                }
            };
            inner.counters.publish(&state);
            outcome
        };

        if let Some(producer) = orphan {
            let _ = inner.destroy(producer).await;
        }
        if let Err(error) = &result {
            tracing::warn!(error = %error, "failed to grow producer pool");
        }
        result
    }

    /// Return a producer to the pool.
    ///
    /// The oldest waiter receives it directly; otherwise it is parked idle,
    /// or closed if `max_idle` producers are already idle or the pool is
    /// closed. A producer being closed keeps its capacity slot until the
    /// close finishes.
    ///
    /// # Errors
    /// - `ForeignProducer` if the producer came from another pool. The
    ///   producer is not taken; recover it with
    ///   [`ReleaseError::into_producer`].
    /// - `Cleanup` if closing a surplus producer failed.
    pub async fn release(
        &self,
        producer: Producer<B::Connection>,
    ) -> std::result::Result<(), ReleaseError<B::Connection>> {
        let Some(surplus) = self.check_in(producer)? else {
            return Ok(());
        };
        let _slot = Reservation::new(&self.inner);
        self.inner.destroy(surplus).await?;
        Ok(())
    }

    /// Synchronous half of `release`; returns the producer to close, if any.
    pub(crate) fn check_in(
        &self,
        producer: Producer<B::Connection>,
    ) -> std::result::Result<Option<Producer<B::Connection>>, ReleaseError<B::Connection>> {
        let inner = &self.inner;
        let id = producer.id();
        if producer.pool_id() != inner.id {
            tracing::warn!(producer = %id, "rejected producer from another pool");
            return Err(ReleaseError::rejected(producer));
        }

        let outcome = {
            let mut state = inner.state.lock();
            let outcome = state.restore(Grant::Producer(producer), inner.config.max_idle);
            inner.counters.publish(&state);
            outcome
        };

        match outcome {
            CheckIn::HandedOff => {
                tracing::debug!(producer = %id, "handed producer to waiter");
                Ok(None)
            }
            CheckIn::Evict(surplus) => {
                tracing::debug!(producer = %id, "closing surplus producer");
                Ok(Some(surplus))
            }
            CheckIn::Idled | CheckIn::Freed => {
                tracing::trace!(producer = %id, "producer returned to idle");
                Ok(None)
            }
        }
    }

    /// Close an evicted producer from a synchronous context, then give back
    /// its slot.
    pub(crate) fn dispose_detached(&self, producer: Producer<B::Connection>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                drop(runtime.spawn(async move {
                    let _slot = Reservation::new(&inner);
                    let _ = inner.destroy(producer).await;
                }));
            }
            Err(_) => {
                tracing::warn!(
                    producer = %producer.id(),
                    "no runtime to close producer; dropping its connection"
                );
                self.inner.state.lock().totals.destroyed += 1;
                drop(producer);
                self.inner.return_slot();
            }
        }
    }

    /// Withdraw a ticket whose acquirer went away before settling.
    fn abandon(&self, ticket: TicketId, rx: &mut oneshot::Receiver<Grant<B::Connection>>) {
        let inner = &self.inner;
        let outcome = {
            let mut state = inner.state.lock();
            if state.cancel_wait(ticket) {
                inner.counters.publish(&state);
                return;
            }
            // Already granted: the grant is sitting in the channel.
            let Ok(grant) = rx.try_recv() else {
                return;
            };
            let outcome = state.restore(grant, inner.config.max_idle);
            inner.counters.publish(&state);
            outcome
        };

        tracing::debug!(ticket, "acquirer went away; passed its grant on");
        if let CheckIn::Evict(producer) = outcome {
            self.dispose_detached(producer);
        }
    }

    /// Shut the pool down.
    ///
    /// Every queued acquirer wakes with `Error::Closed`, every idle producer
    /// is closed, and later `acquire` calls fail with `Error::Closed`.
    /// Producers still held by callers are closed when they are released.
    /// Calling `close` again is a no-op.
    ///
    /// # Errors
    /// `Shutdown` with one `Cleanup` error per producer that failed to close;
    /// the remaining producers are still closed.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        let drained = {
            let mut state = inner.state.lock();
            let drained = state.shutdown();
            inner.counters.publish(&state);
            drained
        };
        let Some((idle, woken)) = drained else {
            return Ok(());
        };

        tracing::info!(
            topic = %inner.config.topic,
            idle = idle.len(),
            woken,
            running = self.running(),
            "closing producer pool"
        );

        let attempted = idle.len();
        let mut errors = Vec::new();
        for producer in idle {
            if let Err(error) = inner.destroy(producer).await {
                errors.push(error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Shutdown { attempted, errors })
        }
    }

    /// Producers held by callers. Lock-free; may be momentarily stale.
    pub fn running(&self) -> usize {
        self.inner.counters.running()
    }

    /// Producers parked idle. Lock-free; may be momentarily stale.
    pub fn idling(&self) -> usize {
        self.inner.counters.idling()
    }

    /// Callers blocked in `acquire`. Lock-free; may be momentarily stale.
    pub fn waiting(&self) -> usize {
        self.inner.counters.waiting()
    }

    /// Consistent snapshot of counts and lifetime totals.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            running: state.running(),
            idling: state.idling(),
            waiting: state.waiting(),
            created: state.totals.created,
            destroyed: state.totals.destroyed,
            acquisitions: state.totals.acquisitions,
            handoffs: state.totals.handoffs,
            timeouts: state.totals.timeouts,
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().is_closed()
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

/// A capacity slot held across a connect or a close.
///
/// The slot goes back to the pool on drop, including when the owning future
/// is cancelled, unless it was disarmed.
struct Reservation<'a, B: Broker> {
    inner: &'a PoolInner<B>,
    armed: bool,
}

impl<'a, B: Broker> Reservation<'a, B> {
    fn new(inner: &'a PoolInner<B>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<B: Broker> Drop for Reservation<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.return_slot();
            tracing::trace!("returned reserved slot");
        }
    }
}

/// A queued acquirer. Withdraws its ticket if dropped before settling.
struct Wait<'a, B: Broker> {
    pool: &'a Pool<B>,
    ticket: TicketId,
    rx: oneshot::Receiver<Grant<B::Connection>>,
    settled: bool,
}

impl<B: Broker> Wait<'_, B> {
    /// `Ok(None)` means woken without a grant; the caller re-checks.
    async fn until(
        mut self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<Option<Grant<B::Connection>>> {
        let received = match deadline {
            None => (&mut self.rx).await,
            Some((at, timeout)) => match tokio::time::timeout_at(at, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => return self.expire(timeout),
            },
        };
        self.settled = true;

        match received {
            Ok(grant) => Ok(Some(grant)),
            Err(_) if self.pool.is_closed() => Err(Error::Closed),
            Err(_) => Ok(None),
        }
    }

    fn expire(&mut self, timeout: Duration) -> Result<Option<Grant<B::Connection>>> {
        self.settled = true;
        let inner = &self.pool.inner;
        {
            let mut state = inner.state.lock();
            if state.cancel_wait(self.ticket) {
                state.totals.timeouts += 1;
                inner.counters.publish(&state);
                return Err(Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                    waiting: state.waiting(),
                });
            }
        }

        // Granted before the deadline fired; the grant is already in the channel.
        match self.rx.try_recv() {
            Ok(grant) => Ok(Some(grant)),
            Err(_) if self.pool.is_closed() => Err(Error::Closed),
            Err(_) => Ok(None),
        }
    }
}

impl<B: Broker> Drop for Wait<'_, B> {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.abandon(self.ticket, &mut self.rx);
        }
    }
}
