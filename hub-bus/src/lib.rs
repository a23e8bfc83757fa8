//! Event publication for the hub.
//!
//! [`EventBus::publish`] fans an event out to two sinks at once: the broker
//! topic for the tenant and the tenant's append-only replay stream. Sink
//! failures are logged and absorbed; callers never fail because a sink was
//! down.

#![warn(missing_docs, clippy::pedantic)]

mod broker;
mod bus;
#[cfg(feature = "kafka")]
mod kafka;

use thiserror::Error;

pub use broker::{BrokerProducer, LocalBroker};
pub use bus::EventBus;
#[cfg(feature = "kafka")]
pub use kafka::KafkaProducer;

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors surfaced by the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker-level send failure.
    #[error("broker error: {reason}")]
    Broker {
        /// Human-readable context from the producer.
        reason: String,
    },

    /// A raw payload did not validate into a hub event.
    #[error(transparent)]
    Validation(#[from] hub_primitives::ValidationError),
}

impl BusError {
    /// Convenience helper to construct broker errors.
    #[must_use]
    pub fn broker(reason: impl Into<String>) -> Self {
        Self::Broker {
            reason: reason.into(),
        }
    }
}
