//! Configuration
//!
//! TOML file with serde defaults, layered with `OCPP_*` environment
//! overrides so container deployments can tune the gateway without a
//! config file at all.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub websocket: WebSocketSettings,
    #[serde(default)]
    pub commands: CommandSettings,
    #[serde(default)]
    pub services: ServiceSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// REST API bind address and protocol-level constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Interval reported to stations in BootNotification responses, seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u32,
}

impl ServerSettings {
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_host: default_host(),
            api_port: default_api_port(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

/// WebSocket endpoint and per-connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
    /// Server PING cadence, seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Idle close, seconds.
    #[serde(default = "default_read_deadline")]
    pub read_deadline_seconds: u64,
    /// Per-frame write deadline, seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
    /// Inbound frame cap, bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Per-connection application write buffer, frames.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Offered OCPP subprotocols, server preference first.
    #[serde(default = "default_subprotocols")]
    pub subprotocols: Vec<String>,
}

impl WebSocketSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(non_zero(self.ping_interval_seconds, default_ping_interval()))
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(non_zero(self.read_deadline_seconds, default_read_deadline()))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(non_zero(self.write_timeout_seconds, default_write_timeout()))
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_ws_port(),
            ping_interval_seconds: default_ping_interval(),
            read_deadline_seconds: default_read_deadline(),
            write_timeout_seconds: default_write_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_buffer: default_outbound_buffer(),
            subprotocols: default_subprotocols(),
        }
    }
}

/// Outbound command delivery knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Per-attempt CALLRESULT wait, seconds.
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_command_max_attempts")]
    pub max_attempts: u32,
    /// How long terminal commands stay queryable, seconds.
    #[serde(default = "default_command_retention")]
    pub retention_seconds: u64,
}

impl CommandSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(non_zero(self.timeout_seconds, default_command_timeout()))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(non_zero(self.retention_seconds, default_command_retention()))
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_command_timeout(),
            max_attempts: default_command_max_attempts(),
            retention_seconds: default_command_retention(),
        }
    }
}

/// Downstream service base URLs. Empty string disables a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub sessions_url: String,
    #[serde(default)]
    pub billing_url: String,
    #[serde(default)]
    pub telemetry_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Status event fan-out buffer, events.
    #[serde(default = "default_event_buffer")]
    pub buffer: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// error, warn, info, debug or trace; also accepts an EnvFilter directive string.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Read the TOML file, then layer environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse("OCPP_HTTP_PORT") {
            self.server.api_port = port;
        }
        if let Some(port) = env_parse("OCPP_WS_PORT") {
            self.websocket.port = port;
        }
        if let Some(interval) = env_parse("OCPP_HEARTBEAT_INTERVAL") {
            self.server.heartbeat_interval = interval;
        }
        if let Some(secs) = env_parse("OCPP_PING_INTERVAL") {
            self.websocket.ping_interval_seconds = secs;
        }
        if let Some(secs) = env_parse("OCPP_READ_DEADLINE") {
            self.websocket.read_deadline_seconds = secs;
        }
        if let Some(secs) = env_parse("OCPP_WRITE_TIMEOUT") {
            self.websocket.write_timeout_seconds = secs;
        }
        if let Some(bytes) = env_parse("OCPP_MAX_FRAME_BYTES") {
            self.websocket.max_frame_bytes = bytes;
        }
        if let Some(frames) = env_parse("OCPP_OUTBOUND_BUFFER") {
            self.websocket.outbound_buffer = frames;
        }
        if let Some(protocols) = std::env::var("OCPP_SUBPROTOCOLS").ok().filter(|v| !v.is_empty()) {
            self.websocket.subprotocols = protocols
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(secs) = env_parse("OCPP_COMMAND_TIMEOUT") {
            self.commands.timeout_seconds = secs;
        }
        if let Some(attempts) = env_parse("OCPP_COMMAND_MAX_ATTEMPTS") {
            self.commands.max_attempts = attempts;
        }
        if let Some(events) = env_parse("OCPP_EVENT_BUFFER") {
            self.events.buffer = events;
        }
        for (var, target) in [
            ("SESSIONS_SERVICE_URL", &mut self.services.sessions_url),
            ("BILLING_SERVICE_URL", &mut self.services.billing_url),
            ("TELEMETRY_SERVICE_URL", &mut self.services.telemetry_url),
        ] {
            if let Ok(url) = std::env::var(var) {
                if !url.is_empty() {
                    *target = url;
                }
            }
        }
    }
}

/// `~/.config/voltflow-csms/config.toml`
pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("voltflow-csms")
        .join("config.toml")
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn non_zero(value: u64, fallback: u64) -> u64 {
    if value == 0 {
        fallback
    } else {
        value
    }
}

// ── Default value helpers ──────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_api_port() -> u16 {
    8080
}
fn default_ws_port() -> u16 {
    9000
}
fn default_heartbeat_interval() -> u32 {
    10
}
fn default_ping_interval() -> u64 {
    30
}
fn default_read_deadline() -> u64 {
    60
}
fn default_write_timeout() -> u64 {
    15
}
fn default_max_frame_bytes() -> usize {
    1_048_576
}
fn default_outbound_buffer() -> usize {
    16
}
fn default_subprotocols() -> Vec<String> {
    vec!["ocpp2.0.1".into(), "ocpp1.6".into()]
}
fn default_command_timeout() -> u64 {
    15
}
fn default_command_max_attempts() -> u32 {
    3
}
fn default_command_retention() -> u64 {
    900
}
fn default_event_buffer() -> usize {
    64
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = AppConfig::default();
        assert_eq!(config.commands.timeout(), Duration::from_secs(15));
        assert_eq!(config.commands.max_attempts, 3);
        assert_eq!(config.websocket.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.websocket.read_deadline(), Duration::from_secs(60));
        assert_eq!(config.websocket.write_timeout(), Duration::from_secs(15));
        assert_eq!(config.websocket.max_frame_bytes, 1_048_576);
        assert_eq!(config.websocket.outbound_buffer, 16);
        assert_eq!(config.events.buffer, 64);
        assert_eq!(config.server.heartbeat_interval, 10);
        assert_eq!(
            config.websocket.subprotocols,
            vec!["ocpp2.0.1".to_string(), "ocpp1.6".to_string()]
        );
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [websocket]
            port = 9100
            ping_interval_seconds = 20

            [commands]
            max_attempts = 5

            [services]
            sessions_url = "http://sessions:8080"
            "#,
        )
        .unwrap();

        assert_eq!(config.websocket.port, 9100);
        assert_eq!(config.websocket.ping_interval(), Duration::from_secs(20));
        assert_eq!(config.commands.max_attempts, 5);
        assert_eq!(config.services.sessions_url, "http://sessions:8080");
        // untouched sections keep their defaults
        assert_eq!(config.commands.timeout(), Duration::from_secs(15));
        assert_eq!(config.server.api_port, 8080);
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let settings = WebSocketSettings {
            ping_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(settings.ping_interval(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("OCPP_PING_INTERVAL", "45");
        std::env::set_var("OCPP_COMMAND_MAX_ATTEMPTS", "7");
        std::env::set_var("SESSIONS_SERVICE_URL", "http://override:1234");

        let mut config = AppConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.websocket.ping_interval(), Duration::from_secs(45));
        assert_eq!(config.commands.max_attempts, 7);
        assert_eq!(config.services.sessions_url, "http://override:1234");

        std::env::remove_var("OCPP_PING_INTERVAL");
        std::env::remove_var("OCPP_COMMAND_MAX_ATTEMPTS");
        std::env::remove_var("SESSIONS_SERVICE_URL");
    }
}
