//! The `utils` module holds the pieces every other module leans on:
//! the error types and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{ConfigurationError, EngineError};
