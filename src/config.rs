use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::{DEFAULT_PLACEHOLDER_NAME, SessionOptions};

pub const DEFAULT_CONFIG_PATH: &str = "config/skillswap.json";
pub const DEFAULT_DATABASE_PATH: &str = "data/skillswap.db";

pub const USER_ID_VAR: &str = "SKILLSWAP_USER_ID";
pub const API_KEY_VAR: &str = "SKILLSWAP_API_KEY";
pub const ACCESS_TOKEN_VAR: &str = "SKILLSWAP_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Local {
        #[serde(default = "default_database_path")]
        database_path: String,
    },
    Remote {
        url: String,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_placeholder_name() -> String {
    DEFAULT_PLACEHOLDER_NAME.to_string()
}

fn default_mark_read_on_live() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_placeholder_name")]
    pub placeholder_name: String,
    #[serde(default = "default_mark_read_on_live")]
    pub mark_read_on_live: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            placeholder_name: default_placeholder_name(),
            mark_read_on_live: default_mark_read_on_live(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            placeholder_name: self.placeholder_name.clone(),
            mark_read_on_live: self.mark_read_on_live,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Remote poll interval, never below 100ms.
pub fn poll_interval(poll_interval_ms: u64) -> Duration {
    Duration::from_millis(poll_interval_ms.max(100))
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

/// Reads `name`, treating unset and blank values alike.
pub fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        env::temp_dir()
            .join(format!("skillswap-config-{}-{name}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(&temp_path("does-not-exist.json"));
        assert_eq!(config.backend, BackendConfig::default());
        assert_eq!(config.placeholder_name, "Unknown User");
        assert!(config.mark_read_on_live);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let path = temp_path("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let config = load_config(&path);
        assert_eq!(config.channel_capacity, 100);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn remote_backend_round_trips_through_disk() {
        let path = temp_path("remote.json");
        let config = AppConfig {
            backend: BackendConfig::Remote {
                url: "https://project.example.co".to_string(),
                poll_interval_ms: 250,
            },
            mark_read_on_live: false,
            ..AppConfig::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = load_config(&path);
        assert_eq!(loaded.backend, config.backend);
        assert!(!loaded.mark_read_on_live);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"backend":{"kind":"local"},"placeholder_name":"?"}"#)
                .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Local {
                database_path: DEFAULT_DATABASE_PATH.to_string()
            }
        );
        assert_eq!(config.session_options().placeholder_name, "?");
    }

    #[test]
    fn poll_interval_has_a_floor() {
        assert_eq!(poll_interval(5), Duration::from_millis(100));
        assert_eq!(poll_interval(1500), Duration::from_millis(1500));
    }
}
