// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for vtr-server.
//!
//! Config is loaded from the `[vtr-server]` section of `vtr-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./vtr-rs.toml`
//! 3. `~/.config/vtr-rs/vtr-rs.toml`
//! 4. `/etc/vtr-rs/vtr-rs.toml`

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vtr_app::ConfigFile;
use vtr_core::deck::controller::{PollConfig, ReconnectConfig};
use vtr_core::deck::{DataBits, Parity, SerialSettings, StopBits};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Deck transport configuration
    pub deck: DeckConfig,
    /// Status and timecode polling behavior
    pub polling: PollingConfig,
    /// Reconnect behavior after open failures and transport faults
    pub reconnect: ReconnectSettings,
    /// TCP listener configuration
    pub listen: ListenConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Deck transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Transport backend name from the registry (e.g. "loopback")
    pub backend: String,
    /// Serial port path for the 9-pin remote connection
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Data bits: 7 or 8
    pub data_bits: DataBits,
    /// Parity: "none", "odd" or "even"
    pub parity: Parity,
    /// Stop bits: 1 or 2
    pub stop_bits: StopBits,
    /// Verbose logging of the transport exchange
    pub debug: bool,
}

impl Default for DeckConfig {
    fn default() -> Self {
        let serial = SerialSettings::default();
        Self {
            backend: "loopback".to_string(),
            port: serial.path,
            baud: serial.baud,
            data_bits: serial.data_bits,
            parity: serial.parity,
            stop_bits: serial.stop_bits,
            debug: false,
        }
    }
}

/// Polling configuration for the two independent read loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Whether the status read loop runs
    pub poll_status: bool,
    /// Status read interval in milliseconds (clamped to 100..=10000)
    pub poll_status_interval_ms: u64,
    /// Whether the timecode read loop runs
    pub poll_timecode: bool,
    /// Timecode read interval in milliseconds (clamped to 20..=5000)
    pub poll_timecode_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_status: true,
            poll_status_interval_ms: 500,
            poll_timecode: true,
            poll_timecode_interval_ms: 200,
        }
    }
}

/// Reconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Whether failed/closed connections are retried automatically
    pub enabled: bool,
    /// First retry delay in milliseconds (clamped to 250..=60000)
    pub initial_ms: u64,
    /// Retry delay ceiling in milliseconds (clamped to 1000..=120000,
    /// raised to at least initial_ms)
    pub max_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_ms: 1000,
            max_ms: 15000,
        }
    }
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whether the listener is enabled
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Authentication configuration
    pub auth: AuthConfig,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 4590,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration for the TCP listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Valid authentication tokens (empty = no auth required)
    pub tokens: Vec<String>,
}

impl ServerConfig {
    /// Validate hard errors and clamp the range-bound fields in place.
    pub fn validate(&mut self) -> Result<(), String> {
        if self.deck.backend.trim().is_empty() {
            return Err("deck backend must not be empty".to_string());
        }
        if self.deck.port.trim().is_empty() {
            return Err("deck port must not be empty".to_string());
        }
        if self.deck.baud == 0 {
            return Err("deck baud must be non-zero".to_string());
        }

        self.polling.poll_status_interval_ms =
            self.polling.poll_status_interval_ms.clamp(100, 10_000);
        self.polling.poll_timecode_interval_ms =
            self.polling.poll_timecode_interval_ms.clamp(20, 5_000);
        self.reconnect.initial_ms = self.reconnect.initial_ms.clamp(250, 60_000);
        self.reconnect.max_ms = self
            .reconnect
            .max_ms
            .clamp(1_000, 120_000)
            .max(self.reconnect.initial_ms);
        Ok(())
    }

    /// Serial line settings for the configured deck port.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            path: self.deck.port.clone(),
            baud: self.deck.baud,
            data_bits: self.deck.data_bits,
            parity: self.deck.parity,
            stop_bits: self.deck.stop_bits,
        }
    }

    /// Poll plan for the configured intervals.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            self.polling.poll_status,
            Duration::from_millis(self.polling.poll_status_interval_ms),
            self.polling.poll_timecode,
            Duration::from_millis(self.polling.poll_timecode_interval_ms),
        )
    }

    /// Reconnect policy for the configured delays.
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::new(
            self.reconnect.enabled,
            Duration::from_millis(self.reconnect.initial_ms),
            Duration::from_millis(self.reconnect.max_ms),
        )
    }

    /// Example configuration printed by `--print-config`.
    pub fn example_toml() -> String {
        r#"[vtr-server]

[vtr-server.general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[vtr-server.deck]
# Transport backend from the registry
backend = "loopback"
# Serial port for the 9-pin remote connection
port = "/dev/ttyUSB0"
baud = 38400
data_bits = 8
parity = "odd"
stop_bits = 1
debug = false

[vtr-server.polling]
poll_status = true
poll_status_interval_ms = 500
poll_timecode = true
poll_timecode_interval_ms = 200

[vtr-server.reconnect]
enabled = true
initial_ms = 1000
max_ms = 15000

[vtr-server.listen]
enabled = true
listen = "127.0.0.1"
port = 4590

[vtr-server.listen.auth]
# Empty list disables authentication
tokens = []
"#
        .to_string()
    }
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "vtr-server"
    }
}
