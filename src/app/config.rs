use serde::{Deserialize, Serialize};

/// A registered application (tenant). Immutable once loaded; the registry owns
/// the authoritative copy and lookups hand out clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub key: String,
    pub secret: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_enabled")]
    pub enable_client_messages: bool,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub max_channel_name_length: Option<u32>,
    #[serde(default)]
    pub max_event_name_length: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl Default for App {
    fn default() -> Self {
        Self {
            id: String::new(),
            key: String::new(),
            secret: String::new(),
            enabled: true,
            enable_client_messages: true,
            max_connections: None,
            max_channel_name_length: None,
            max_event_name_length: None,
        }
    }
}
