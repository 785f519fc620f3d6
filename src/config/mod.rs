//! Process configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional
//! `config/default.{toml,yaml,json}` file, then `MSGFLO_*` environment
//! variables. `MSGFLO_BROKER` maps to `broker`, nested keys use a double
//! underscore (`MSGFLO_PARTICIPANT__ROLE`).

mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{ParticipantSettings, Settings};

pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads settings from the default file location and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Loads settings from `path` (extension optional, file optional) and the
/// environment, merged over `Settings::default()`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("MSGFLO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
