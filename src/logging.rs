//! Subscriber setup.
//!
//! The library crates write through the `log` facade; the fmt subscriber
//! picks those records up alongside native `tracing` events.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set.
pub fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(true);
    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("installing log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let cfg = LoggingConfig {
            level: "not a [valid directive".into(),
            format: LogFormat::Text,
        };
        // Must not panic whatever RUST_LOG holds.
        let _ = filter(&cfg);
    }

    #[test]
    fn test_init_twice_errors() {
        let cfg = LoggingConfig::default();
        let _ = init(&cfg);
        assert!(init(&cfg).is_err());
    }
}
