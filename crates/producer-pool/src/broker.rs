//! Collaborators the pool drives: the broker transport and identity source
//!
//! The pool never talks to the network itself. It asks a [`Broker`] which
//! topics exist, to open a connection per producer, and to close it again.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::producer::ProducerId;

/// Transport to a message broker.
///
/// One `Connection` backs one pooled producer. Implementations are called
/// without the pool lock held, so they may block on I/O freely.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// The connection type wrapped by each producer.
    type Connection: Send + Sync + 'static;

    /// List the topics known to the broker at `address`.
    async fn topics(&self, address: &str) -> Result<HashSet<String>>;

    /// Open a producer connection writing to `topic`.
    async fn connect(&self, address: &str, topic: &str) -> Result<Self::Connection>;

    /// Close a connection permanently.
    async fn disconnect(&self, connection: Self::Connection) -> Result<()> {
        drop(connection);
        Ok(())
    }
}

/// Source of producer identities.
pub trait IdGenerator: Send + Sync + 'static {
    /// Produce an identity that has never been returned before.
    fn next_id(&self) -> Result<ProducerId>;
}

impl<F> IdGenerator for F
where
    F: Fn() -> Result<ProducerId> + Send + Sync + 'static,
{
    fn next_id(&self) -> Result<ProducerId> {
        self()
    }
}

/// Random (UUID v4) identities. The default generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> Result<ProducerId> {
        Ok(ProducerId::new_random())
    }
}
