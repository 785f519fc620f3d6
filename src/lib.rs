//! # msgflo
//!
//! `msgflo` runs a participant of a flow-based-programming network on top of
//! a message broker. A participant declares input and output ports; the
//! engine maps those onto broker addresses, announces the participant on the
//! discovery address, calls the application for every inbound message and
//! publishes whatever the application sends.
//!
//! AMQP (`amqp://`) and MQTT (`mqtt://`) brokers are supported behind one
//! `Engine` type, so application code does not depend on the transport.
//!
//! ## Core Modules
//!
//! - `participant`: the participant definition, its ports and the `Process` callback.
//! - `transport`: inbound messages, the discovery envelope and the publish seam.
//! - `engine`: broker URL parsing, the AMQP and MQTT engines and the factory.
//! - `config`: loading process settings from file and environment.
//! - `utils`: error types and logging setup.
//!
//! ```no_run
//! use std::sync::Arc;
//! use msgflo::engine::{EngineConfig, EngineFactory, Transport};
//! use msgflo::participant::{Participant, Repeat};
//!
//! # async fn run() -> Result<(), msgflo::utils::EngineError> {
//! let participant = Arc::new(Participant::new(Repeat::definition("repeat-1", "repeat"), Repeat));
//! let engine = EngineFactory::from_env().create(
//!     EngineConfig::new()
//!         .url("mqtt://localhost?keepAlive=60")
//!         .participant(participant),
//! )?;
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod participant;
pub mod transport;
pub mod utils;

pub use engine::{Engine, EngineConfig, EngineFactory, Transport, create_engine};
pub use participant::{Definition, Participant, Port, Process};
pub use transport::Message;
pub use utils::{ConfigurationError, EngineError};
