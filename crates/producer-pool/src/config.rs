//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a producer pool.
///
/// Every field has a default; override the ones you need with the
/// `with_*` builders or struct update syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Producers created eagerly when the pool is built
    pub init_capacity: usize,
    /// Upper bound on producers in use plus producers idle
    pub max_capacity: usize,
    /// Upper bound on idle producers kept after release
    pub max_idle: usize,
    /// Broker endpoint every producer connects to
    pub broker_address: String,
    /// Topic every producer writes to
    pub topic: String,
    /// Deadline applied by [`Pool::acquire`](crate::Pool::acquire); `None` waits forever
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            init_capacity: 10,
            max_capacity: 100,
            max_idle: 50,
            broker_address: "localhost:9092".to_string(),
            topic: "bus_1".to_string(),
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Set the number of producers created at startup.
    pub fn with_init_capacity(mut self, init_capacity: usize) -> Self {
        self.init_capacity = init_capacity;
        self
    }

    /// Set the capacity bound.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Set the number of idle producers retained on release.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the broker address.
    pub fn with_broker_address(mut self, broker_address: impl Into<String>) -> Self {
        self.broker_address = broker_address.into();
        self
    }

    /// Set the target topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the default acquire deadline.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(Error::configuration("max_capacity must be greater than 0"));
        }
        if self.init_capacity > self.max_capacity {
            return Err(Error::configuration(format!(
                "init_capacity ({}) must not exceed max_capacity ({})",
                self.init_capacity, self.max_capacity
            )));
        }
        if self.broker_address.trim().is_empty() {
            return Err(Error::configuration("broker_address cannot be empty"));
        }
        if self.topic.trim().is_empty() {
            return Err(Error::configuration("topic cannot be empty"));
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
