//! Error types shared by the participant runtime.
//!
//! Two layers are kept apart:
//! - `ConfigurationError` covers everything that is wrong with how an engine
//!   was asked to be built (missing participant, bad broker URL, bad ports).
//!   These are fatal and surface synchronously from the factory.
//! - `EngineError` is what engine operations return. It wraps configuration
//!   problems and adds port resolution, binding and transport failures.
//!
//! Connection drops are not errors here: they only flip `connected()`.

use thiserror::Error;

/// Fixed message for a rejected `keepAlive` query parameter.
pub const BAD_KEEP_ALIVE: &str = "Bad keepAlive argument, must be a number greater than zero.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Bad config: participant is not set.")]
    MissingParticipant,

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{}", BAD_KEEP_ALIVE)]
    BadKeepAlive,

    #[error("Bad port in broker URL: {0}")]
    BadPort(String),

    #[error("Bad percent-encoding in broker URL: {0}")]
    BadEncoding(String),

    #[error("Duplicate {direction} id '{id}' in participant definition")]
    DuplicatePort { direction: &'static str, id: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("No such port: {port}")]
    PortResolution { port: String },

    #[error("engine is not connected")]
    NotConnected,

    #[error("participant is not bound to an engine")]
    NotBound,

    #[error("participant is already bound to an engine")]
    AlreadyBound,

    #[error("amqp transport error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("mqtt transport error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn port_resolution(port: &str) -> Self {
        Self::PortResolution {
            port: port.to_string(),
        }
    }

    /// True for errors that stem from how the engine was configured.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
