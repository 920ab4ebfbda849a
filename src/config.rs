//! Process configuration.
//!
//! An optional JSON file (path from the command line or `WMODEM_CONFIG`)
//! is read first; environment overrides are applied on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use wmodem_serial::serial::config::ModemConfig;

pub const CONFIG_ENV: &str = "WMODEM_CONFIG";
pub const LOG_LEVEL_ENV: &str = "WMODEM_LOG";
pub const LOG_FORMAT_ENV: &str = "WMODEM_LOG_FORMAT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Seconds between background rescans; 0 scans once at startup.
    #[serde(default)]
    pub scan_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /// Queue depth of the process's own event log subscription.
    #[serde(default = "default_event_buffer")]
    pub buffer: usize,
}

fn default_event_buffer() -> usize {
    wmodem_events::DEFAULT_BUFFER
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(feature = "logs-json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `wmodem_serial=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// File from `cli_path` or `WMODEM_CONFIG` (defaults if neither),
    /// then environment overrides.
    pub fn resolve(cli_path: Option<PathBuf>) -> Result<Self> {
        let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.modem.apply_overrides(&lookup);
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|l| !l.trim().is_empty()) {
            self.logging.level = level.trim().to_string();
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            match format.parse() {
                Ok(f) => self.logging.format = f,
                Err(e) => eprintln!("ignoring {}: {}", LOG_FORMAT_ENV, e),
            }
        }
    }
}
