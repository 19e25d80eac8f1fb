//! Shared test helpers: an in-memory broker with failure injection.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_producer_pool::{Broker, Error, Pool, PoolConfig, Result};
use parking_lot::Mutex;

/// Connection handed out by [`MockBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnection {
    pub serial: u64,
    pub topic: String,
}

#[derive(Default)]
struct MockState {
    topics: Mutex<HashSet<String>>,
    connects: AtomicU64,
    disconnects: AtomicU64,
    fail_connects_from: AtomicU64,
    fail_connect_serials: Mutex<HashSet<u64>>,
    fail_disconnect_serials: Mutex<HashSet<u64>>,
    fail_topics: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    disconnect_delay: Mutex<Option<Duration>>,
    closed_serials: Mutex<Vec<u64>>,
}

/// In-memory broker. Clones share state, so a test can keep a handle after
/// moving one into the pool.
#[derive(Clone)]
pub struct MockBroker {
    state: Arc<MockState>,
}

impl MockBroker {
    /// Broker knowing only `bus_1`.
    pub fn new() -> Self {
        Self::with_topics(["bus_1"])
    }

    pub fn with_topics<'a>(topics: impl IntoIterator<Item = &'a str>) -> Self {
        let state = MockState {
            fail_connects_from: AtomicU64::new(u64::MAX),
            ..Default::default()
        };
        *state.topics.lock() = topics.into_iter().map(str::to_string).collect();
        Self {
            state: Arc::new(state),
        }
    }

    /// Every connect attempt numbered `n` or later fails.
    pub fn fail_connects_from(&self, n: u64) {
        self.state.fail_connects_from.store(n, Ordering::SeqCst);
    }

    /// Only the connect attempt numbered `serial` fails.
    pub fn fail_connect_of(&self, serial: u64) {
        self.state.fail_connect_serials.lock().insert(serial);
    }

    pub fn heal_connects(&self) {
        self.state.fail_connects_from.store(u64::MAX, Ordering::SeqCst);
    }

    /// Closing the connection with this serial fails.
    pub fn fail_disconnect_of(&self, serial: u64) {
        self.state.fail_disconnect_serials.lock().insert(serial);
    }

    pub fn fail_topics(&self) {
        self.state.fail_topics.store(true, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = Some(delay);
    }

    pub fn set_disconnect_delay(&self, delay: Duration) {
        *self.state.disconnect_delay.lock() = Some(delay);
    }

    /// Connect attempts so far, successful or not.
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Disconnect calls finished so far, successful or not.
    pub fn disconnects(&self) -> u64 {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn closed_serials(&self) -> Vec<u64> {
        self.state.closed_serials.lock().clone()
    }
}

#[async_trait]
impl Broker for MockBroker {
    type Connection = MockConnection;

    async fn topics(&self, address: &str) -> Result<HashSet<String>> {
        if self.state.fail_topics.load(Ordering::SeqCst) {
            return Err(Error::broker(address, "metadata request refused"));
        }
        Ok(self.state.topics.lock().clone())
    }

    async fn connect(&self, _address: &str, topic: &str) -> Result<MockConnection> {
        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let serial = self.state.connects.fetch_add(1, Ordering::SeqCst);
        if serial >= self.state.fail_connects_from.load(Ordering::SeqCst)
            || self.state.fail_connect_serials.lock().contains(&serial)
        {
            return Err(Error::creation(topic, format!("connect #{serial} refused")));
        }
        Ok(MockConnection {
            serial,
            topic: topic.to_string(),
        })
    }

    async fn disconnect(&self, connection: MockConnection) -> Result<()> {
        let delay = *self.state.disconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if self
            .state
            .fail_disconnect_serials
            .lock()
            .contains(&connection.serial)
        {
            return Err(Error::broker("mock", format!("close #{} refused", connection.serial)));
        }
        self.state.closed_serials.lock().push(connection.serial);
        Ok(())
    }
}

pub fn config(init: usize, max: usize) -> PoolConfig {
    PoolConfig::default()
        .with_init_capacity(init)
        .with_max_capacity(max)
}

pub async fn pool(broker: &MockBroker, config: PoolConfig) -> Pool<MockBroker> {
    Pool::new(broker.clone(), config)
        .await
        .expect("pool should build")
}

/// Poll until `condition` holds. Panics after ~5s to surface hangs.
pub async fn settle(mut condition: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
