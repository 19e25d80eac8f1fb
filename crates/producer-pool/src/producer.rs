//! Producer handles handed out by the pool

use std::fmt;
use std::time::Instant;

use uuid::Uuid;

/// Globally unique producer identity.
///
/// Assigned once when the producer is created and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProducerId(Uuid);

impl ProducerId {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a random (v4) identity.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An exclusively owned producer connection.
///
/// Obtained from [`Pool::acquire`](crate::Pool::acquire) and handed back with
/// [`Pool::release`](crate::Pool::release). Only the pool creates producers.
pub struct Producer<C> {
    id: ProducerId,
    pool_id: Uuid,
    connection: C,
    created_at: Instant,
}

impl<C> Producer<C> {
    pub(crate) fn new(id: ProducerId, pool_id: Uuid, connection: C) -> Self {
        Self {
            id,
            pool_id,
            connection,
            created_at: Instant::now(),
        }
    }

    /// This producer's identity.
    pub fn id(&self) -> ProducerId {
        self.id
    }

    /// The underlying broker connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Mutable access to the underlying broker connection.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// When the connection was established.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    pub(crate) fn into_connection(self) -> C {
        self.connection
    }
}

impl<C> fmt::Debug for Producer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id)
            .field("age", &self.created_at.elapsed())
            .finish_non_exhaustive()
    }
}
