use crate::app::config::App;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncDriver {
    #[default]
    Local,
    Redis,
}

impl FromStr for SyncDriver {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(SyncDriver::Local),
            "redis" => Ok(SyncDriver::Redis),
            _ => Err(format!("Unknown sync driver: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    #[default]
    Memory,
    Redis,
}

impl FromStr for StoreDriver {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreDriver::Memory),
            "redis" => Ok(StoreDriver::Redis),
            _ => Err(format!("Unknown store driver: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConnection {
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisConnection {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            key_prefix: "gateway".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    pub driver: SyncDriver,
    pub redis: RedisConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: StoreDriver,
    pub redis: RedisConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origin: Vec<String>,
    pub methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: vec!["*".to_string()],
            methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![
                "Authorization".to_string(),
                "Content-Type".to_string(),
                "X-Requested-With".to_string(),
                "Accept".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub activity_timeout: u64,
    pub sync: SyncConfig,
    pub store: StoreConfig,
    pub cors: CorsConfig,
    /// Applications registered at startup.
    pub apps: Vec<App>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6001,
            debug: false,
            activity_timeout: crate::protocol::constants::ACTIVITY_TIMEOUT,
            sync: SyncConfig::default(),
            store: StoreConfig::default(),
            cors: CorsConfig::default(),
            apps: Vec::new(),
        }
    }
}

impl ServerOptions {
    /// Loads options from a JSON file, replacing the current values wholesale.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            Error::ConfigFile(format!(
                "Failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigFile(format!("Failed to parse config file: {e}")))
    }

    /// Environment variables override whatever the file provided.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = std::env::var("DEBUG") {
            self.debug = val == "1" || val.to_lowercase() == "true";
        }
        if let Ok(driver) = std::env::var("SYNC_DRIVER") {
            if let Ok(driver) = driver.parse() {
                self.sync.driver = driver;
            }
        }
        if let Ok(driver) = std::env::var("STORE_DRIVER") {
            if let Ok(driver) = driver.parse() {
                self.store.driver = driver;
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.sync.redis.url = url.clone();
            self.store.redis.url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_shape() {
        let raw = r#"{
            "port": 7001,
            "sync": { "driver": "redis", "redis": { "url": "redis://cache:6379/" } },
            "store": { "driver": "redis" },
            "apps": [{ "id": "1", "key": "k", "secret": "s" }]
        }"#;
        let options: ServerOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(options.port, 7001);
        assert_eq!(options.sync.driver, SyncDriver::Redis);
        assert_eq!(options.sync.redis.url, "redis://cache:6379/");
        assert_eq!(options.store.driver, StoreDriver::Redis);
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.apps.len(), 1);
        assert!(options.apps[0].enabled);
    }
}
