//! Error types for the producer pool
use thiserror::Error;

use crate::producer::{Producer, ProducerId};

/// Boxed cause carried by errors that wrap a collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the producer pool and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid, or the configured topic does not exist
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// A request to the broker failed (e.g. listing topics)
    #[error("Broker '{broker}' request failed: {reason}")]
    Broker {
        /// The broker address
        broker: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// A producer could not be created
    #[error("Failed to create producer for topic '{topic}': {reason}")]
    Creation {
        /// The topic the producer was meant to write to
        topic: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// A producer identity could not be generated
    #[error("Producer id generation failed: {reason}")]
    IdGeneration {
        /// The failure reason
        reason: String,
    },

    /// A producer failed to close
    #[error("Failed to close producer {producer_id}: {reason}")]
    Cleanup {
        /// The producer that failed to close
        producer_id: ProducerId,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// One or more producers failed to close during shutdown
    #[error("Shutdown failed to close {} of {attempted} producers", .errors.len())]
    Shutdown {
        /// Number of idle producers shutdown tried to close
        attempted: usize,
        /// One `Cleanup` error per producer that failed
        errors: Vec<Error>,
    },

    /// No producer became available before the deadline
    #[error("Timed out after {timeout_ms}ms waiting for a producer ({waiting} waiters queued)")]
    Timeout {
        /// The timeout in milliseconds
        timeout_ms: u64,
        /// Waiters still queued when the deadline expired
        waiting: usize,
    },

    /// The pool has been shut down
    #[error("Producer pool is closed")]
    Closed,

    /// A producer was released to a pool that did not create it
    #[error("Producer {producer_id} does not belong to this pool")]
    ForeignProducer {
        /// The rejected producer
        producer_id: ProducerId,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a broker error without an underlying cause
    pub fn broker(broker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Broker {
            broker: broker.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a producer creation error without an underlying cause
    pub fn creation(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Creation {
            topic: topic.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an id generation error
    pub fn id_generation(reason: impl Into<String>) -> Self {
        Self::IdGeneration {
            reason: reason.into(),
        }
    }

    /// Create a cleanup error without an underlying cause
    pub fn cleanup(producer_id: ProducerId, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            producer_id,
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach an underlying cause to a `Broker`, `Creation` or `Cleanup` error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::Broker { source, .. }
            | Self::Creation { source, .. }
            | Self::Cleanup { source, .. } => *source = Some(cause.into()),
            _ => {}
        }
        self
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Creation { .. } | Self::Broker { .. }
        )
    }

    /// Whether this error was caused by configuration rather than runtime state
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Error returned by [`Pool::release`](crate::Pool::release).
///
/// When the pool refuses the producer (`ForeignProducer`) the producer comes
/// back with the error, so it can still be released to the pool that
/// created it.
#[derive(Error)]
#[error("{error}")]
pub struct ReleaseError<C> {
    error: Error,
    producer: Option<Producer<C>>,
}

impl<C> ReleaseError<C> {
    pub(crate) fn rejected(producer: Producer<C>) -> Self {
        Self {
            error: Error::ForeignProducer {
                producer_id: producer.id(),
            },
            producer: Some(producer),
        }
    }

    /// The underlying pool error
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The refused producer, if the pool did not take it
    pub fn producer(&self) -> Option<&Producer<C>> {
        self.producer.as_ref()
    }

    /// Take the refused producer back
    #[must_use]
    pub fn into_producer(self) -> Option<Producer<C>> {
        self.producer
    }
}

impl<C> From<Error> for ReleaseError<C> {
    fn from(error: Error) -> Self {
        Self {
            error,
            producer: None,
        }
    }
}

impl<C> From<ReleaseError<C>> for Error {
    fn from(error: ReleaseError<C>) -> Self {
        error.error
    }
}

impl<C> std::fmt::Debug for ReleaseError<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseError")
            .field("error", &self.error)
            .field("producer", &self.producer.as_ref().map(Producer::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn timeout_is_retryable() {
        let err = Error::Timeout {
            timeout_ms: 50,
            waiting: 3,
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Timed out after 50ms waiting for a producer (3 waiters queued)"
        );
    }

    #[test]
    fn closed_and_configuration_are_terminal() {
        assert!(!Error::Closed.is_retryable());
        let err = Error::configuration("topic missing");
        assert!(!err.is_retryable());
        assert!(err.is_configuration());
    }

    #[test]
    fn with_source_chains_cause() {
        let err = Error::creation("bus_1", "connect refused")
            .with_source(Error::id_generation("clock moved backwards"));
        let source = err.source().expect("source attached");
        assert_eq!(
            source.to_string(),
            "Producer id generation failed: clock moved backwards"
        );
    }

    #[test]
    fn shutdown_reports_failure_count() {
        let id = ProducerId::new_random();
        let err = Error::Shutdown {
            attempted: 4,
            errors: vec![Error::cleanup(id, "flush failed")],
        };
        assert_eq!(err.to_string(), "Shutdown failed to close 1 of 4 producers");
    }

    #[test]
    fn rejected_release_hands_the_producer_back() {
        let producer = Producer::new(ProducerId::new_random(), uuid::Uuid::nil(), 7u32);
        let id = producer.id();

        let err = ReleaseError::rejected(producer);
        assert_eq!(err.to_string(), format!("Producer {id} does not belong to this pool"));
        assert!(matches!(err.error(), Error::ForeignProducer { producer_id } if *producer_id == id));
        let producer = err.into_producer().expect("producer returned");
        assert_eq!(*producer.connection(), 7);
    }

    #[test]
    fn release_error_converts_to_pool_error() {
        let err: ReleaseError<u32> = Error::Closed.into();
        assert!(err.producer().is_none());
        assert!(matches!(Error::from(err), Error::Closed));
    }
}
