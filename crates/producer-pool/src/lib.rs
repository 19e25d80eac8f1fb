//! # Nebula Producer Pool
//!
//! A bounded pool of message-broker producer connections for async services.
//!
//! - Up to `max_capacity` producers exist at once; `init_capacity` are
//!   created up front, the rest on demand.
//! - When none are available, `acquire` callers queue and are served in
//!   arrival order; a released producer goes straight to the oldest waiter.
//! - At most `max_idle` producers are kept idle; extras are closed on release.
//! - `close` wakes every waiter with [`Error::Closed`] and closes idle
//!   producers; producers still in use are closed when released.
//!
//! The transport is pluggable through the [`Broker`] trait. Enable the
//! `kafka` feature for [`KafkaBroker`].
//!
//! ```no_run
//! # use nebula_producer_pool::{Broker, Pool, PoolConfig};
//! # async fn run<B: Broker>(broker: B) -> nebula_producer_pool::Result<()> {
//! let pool = Pool::new(broker, PoolConfig::default().with_topic("orders")).await?;
//!
//! let producer = pool.acquire().await?;
//! // ... publish through producer.connection() ...
//! pool.release(producer).await?;
//!
//! pool.close().await
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod guard;
pub mod pool;
pub mod producer;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use broker::{Broker, IdGenerator, RandomIds};
pub use config::PoolConfig;
pub use error::{BoxError, Error, ReleaseError, Result};
pub use guard::Lease;
pub use pool::{Pool, PoolStats};
pub use producer::{Producer, ProducerId};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaConnection};
