//! Transport seam between the publisher and an AMQP client library.
//!
//! [`BrokerPublisher`](crate::publisher::BrokerPublisher) only talks to
//! these traits, so the state machine can be driven by the `lapin`-based
//! [`AmqpConnector`](crate::amqp::AmqpConnector) in production and by
//! scripted fakes in tests.

use crate::config::BrokerConfig;

/// Typed failure reported by a broker transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// TCP/TLS/handshake level failure or a dropped connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker closed the connection or channel on purpose, e.g. after
    /// an exchange declaration was refused.
    #[error("closed by broker ({code}): {text}")]
    ClosedByBroker { code: u16, text: String },

    #[error("channel error: {0}")]
    Channel(String),

    /// Anything else; never retried.
    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Connection, channel and broker-close errors may clear up after a
    /// reconnect.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BrokerError::Other(_))
    }
}

/// Opens connections to the broker described by a [`BrokerConfig`].
pub trait BrokerConnector: Send + Sync {
    fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// One live connection.
pub trait BrokerConnection: Send {
    fn open_channel(&mut self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), BrokerError>;
}

/// One channel on a [`BrokerConnection`].
pub trait BrokerChannel: Send {
    fn declare_exchange(&mut self, name: &str, kind: &str, durable: bool) -> Result<(), BrokerError>;

    /// Fire-and-forget publish; no confirm is awaited.
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError>;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), BrokerError>;
}
