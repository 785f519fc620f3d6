//! The `transport` module holds what crosses the wire between the engines
//! and the broker: the inbound `Message`, the discovery envelope, and the
//! `Publisher` seam the engines send through.

pub mod discovery;
pub mod message;

use async_trait::async_trait;

use crate::utils::EngineError;

pub use discovery::{DISCOVERY_ADDRESS, DiscoveryMessage};
pub use message::{Acknowledger, Message};

/// Publishes raw bytes to a broker address.
///
/// The address is an exchange name for AMQP and a topic for MQTT. Engines
/// hold this as a trait object so tests can record publishes without a
/// broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, address: &str, payload: Vec<u8>) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests;
