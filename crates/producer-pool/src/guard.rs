//! RAII lease over a pooled producer

use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::producer::Producer;

/// A producer on loan from a [`Pool`].
///
/// Dropping the lease returns the producer to the pool: it goes to the
/// oldest waiter or back to the idle list. If it has to be closed (idle
/// limit reached, or the pool is shut down) the close runs on a spawned
/// task. Use [`Lease::release`] to await that close and see its error, or
/// [`Lease::detach`] to keep the producer.
pub struct Lease<B: Broker> {
    producer: Option<Producer<B::Connection>>,
    pool: Pool<B>,
}

impl<B: Broker> Lease<B> {
    pub(crate) fn new(producer: Producer<B::Connection>, pool: Pool<B>) -> Self {
        Self {
            producer: Some(producer),
            pool,
        }
    }

    /// Return the producer now, waiting for any close it triggers.
    pub async fn release(mut self) -> Result<()> {
        match self.producer.take() {
            Some(producer) => self.pool.release(producer).await.map_err(Error::from),
            None => Ok(()),
        }
    }

    /// Take the producer out of the lease without returning it.
    ///
    /// The pool keeps counting it as running until it is passed back to
    /// [`Pool::release`].
    #[must_use]
    pub fn detach(mut self) -> Producer<B::Connection> {
        self.producer.take().expect("lease used after detach")
    }
}

impl<B: Broker> std::ops::Deref for Lease<B> {
    type Target = Producer<B::Connection>;

    fn deref(&self) -> &Self::Target {
        self.producer.as_ref().expect("lease used after detach")
    }
}

impl<B: Broker> std::ops::DerefMut for Lease<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.producer.as_mut().expect("lease used after detach")
    }
}

impl<B: Broker> Drop for Lease<B> {
    fn drop(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };
        match self.pool.check_in(producer) {
            Ok(Some(surplus)) => self.pool.dispose_detached(surplus),
            Ok(None) => {}
            Err(error) => tracing::warn!(error = %error, "lease could not return its producer"),
        }
    }
}

impl<B: Broker> std::fmt::Debug for Lease<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("producer", &self.producer.as_ref().map(Producer::id))
            .finish_non_exhaustive()
    }
}
