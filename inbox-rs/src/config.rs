use crate::error::{InboxError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Host (and optional port) used when building attachment URLs
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Retention window in seconds; messages older than this are purged
    pub expire_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_url() -> String {
    "sqlite://inbox.db".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InboxError::Config(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| InboxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INBOX_HOSTNAME` / `INBOX_DATABASE_URL` overrides
    pub fn apply_env(&mut self) {
        if let Ok(hostname) = std::env::var("INBOX_HOSTNAME") {
            self.server.hostname = hostname;
        }
        if let Ok(url) = std::env::var("INBOX_DATABASE_URL") {
            self.storage.database_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.expire_seconds == 0 {
            return Err(InboxError::Config(
                "storage.expire_seconds must be greater than zero".to_string(),
            ));
        }
        if self.storage.sweep_interval_seconds == 0 {
            return Err(InboxError::Config(
                "storage.sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.server.hostname.trim().is_empty() {
            return Err(InboxError::Config("server.hostname is empty".to_string()));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.expire_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.storage.sweep_interval_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: default_listen_addr(),
                hostname: "localhost:8080".to_string(),
            },
            storage: StorageConfig {
                database_url: default_database_url(),
                expire_seconds: 24 * 60 * 60, // 1 day
                sweep_interval_seconds: default_sweep_interval(),
                max_connections: default_max_connections(),
            },
            logging: LoggingConfig::default(),
        }
    }
}
