use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "tr-TR,tr;q=0.9,en;q=0.8";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub detail_delay_ms: u64,
    pub listing_delay_ms: u64,
    pub scroll_wait_ms: u64,
    pub overlay_passes: u32,
    pub run_timeout_secs: u64,
    pub error_tail: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            headless: true,
            sandbox: false,
            chrome_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            navigation_timeout_secs: 60,
            http_timeout_secs: 30,
            detail_delay_ms: 500,
            listing_delay_ms: 1000,
            scroll_wait_ms: 2000,
            overlay_passes: 2,
            run_timeout_secs: 30 * 60,
            error_tail: 10,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&utils::default_config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        utils::ensure_parent(path);
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("EVENT_RADAR_DB").filter(|v| !v.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("EVENT_RADAR_CHROME").filter(|v| !v.trim().is_empty()) {
            self.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("EVENT_RADAR_HEADLESS") {
            let normalized = value.trim().to_lowercase();
            self.headless = match normalized.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Env {
                        key: "EVENT_RADAR_HEADLESS",
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("EVENT_RADAR_RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = value.trim().parse().map_err(|_| ConfigError::Env {
                key: "EVENT_RADAR_RUN_TIMEOUT_SECS",
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::default_store_path)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::load_from(&dir.path().join("absent.json")).expect("load");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_remaining_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "headless": false, "detail_delay_ms": 50 }"#).expect("write");

        let config = AppConfig::load_from(&path).expect("load");
        assert!(!config.headless);
        assert_eq!(config.detail_delay_ms, 50);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            run_timeout_secs: 90,
            chrome_path: Some(PathBuf::from("/usr/bin/chromium")),
            ..AppConfig::default()
        };
        config.save_to(&path).expect("save");
        assert_eq!(AppConfig::load_from(&path).expect("load"), config);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EVENT_RADAR_DB", "/tmp/radar.sqlite"),
            ("EVENT_RADAR_HEADLESS", "false"),
            ("EVENT_RADAR_RUN_TIMEOUT_SECS", "120"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply env");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/radar.sqlite"));
        assert!(!config.headless);
        assert_eq!(config.run_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == "EVENT_RADAR_HEADLESS").then(|| "maybe".to_string()))
            .expect_err("should reject");
        assert!(err.to_string().contains("EVENT_RADAR_HEADLESS"));
    }
}
