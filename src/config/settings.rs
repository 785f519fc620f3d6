use serde::Deserialize;

/// Top-level configuration settings for a participant process.
///
/// `broker` is the fallback broker URL handed to the engine factory.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: String,
    pub participant: ParticipantSettings,
    pub log_level: String,
    pub debug_output: bool,
}

/// Identity of the participant this process runs.
///
/// An empty `id` is replaced with `<role>-<random suffix>` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ParticipantSettings {
    pub id: String,
    pub role: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<String>,
    pub participant: Option<PartialParticipantSettings>,
    pub log_level: Option<String>,
    pub debug_output: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialParticipantSettings {
    pub id: Option<String>,
    pub role: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: String::new(),
            participant: ParticipantSettings {
                id: String::new(),
                role: "repeat".to_string(),
            },
            log_level: "info".to_string(),
            debug_output: false,
        }
    }
}

impl PartialSettings {
    pub fn merge(self, default: Settings) -> Settings {
        let participant = self.participant;
        Settings {
            broker: self.broker.unwrap_or(default.broker),
            participant: ParticipantSettings {
                id: participant
                    .as_ref()
                    .and_then(|p| p.id.clone())
                    .unwrap_or(default.participant.id),
                role: participant
                    .as_ref()
                    .and_then(|p| p.role.clone())
                    .unwrap_or(default.participant.role),
            },
            log_level: self.log_level.unwrap_or(default.log_level),
            debug_output: self.debug_output.unwrap_or(default.debug_output),
        }
    }
}
