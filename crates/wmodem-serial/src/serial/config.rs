//! Modem configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Comma-separated port list that replaces discovery.
pub const PORT_ENV: &str = "MODEM_PORT";
/// Line speed override.
pub const BAUD_ENV: &str = "MODEM_BAUD";

/// Settings shared by discovery, the transport engine and devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModemConfig {
    /// Explicit ports or glob patterns. Empty selects the platform defaults.
    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Rolling inactivity window for ordinary commands.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Window for the liveness probe and the connect handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Window for the PDU upload step of a send.
    #[serde(default = "default_sms_send_timeout_ms")]
    pub sms_send_timeout_ms: u64,

    /// Consecutive command timeouts after which a device is closed.
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,

    /// Blocking read slice of the native port.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_command_timeout_ms() -> u64 {
    5_000
}
fn default_handshake_timeout_ms() -> u64 {
    2_000
}
fn default_sms_send_timeout_ms() -> u64 {
    60_000
}
fn default_max_consecutive_timeouts() -> u32 {
    3
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_read_buffer_size() -> usize {
    256
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            baud_rate: default_baud_rate(),
            command_timeout_ms: default_command_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            sms_send_timeout_ms: default_sms_send_timeout_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            read_timeout_ms: default_read_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ModemConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn sms_send_timeout(&self) -> Duration {
        Duration::from_millis(self.sms_send_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Apply `MODEM_PORT` / `MODEM_BAUD` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ports) = lookup(PORT_ENV) {
            let parsed = parse_port_list(&ports);
            if !parsed.is_empty() {
                self.ports = parsed;
            }
        }
        if let Some(baud) = lookup(BAUD_ENV) {
            match baud.trim().parse::<u32>() {
                Ok(v) if v > 0 => self.baud_rate = v,
                _ => log::warn!("ignoring invalid {}={:?}", BAUD_ENV, baud),
            }
        }
    }
}

/// Split a comma-separated port list, dropping blanks.
pub fn parse_port_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
