// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Layered configuration: defaults, overridden by an optional JSON file,
//! overridden again by `NEONLINK_`-prefixed environment variables.
//!
//! Generalizes the teacher's `ServerConfig::from_file` + CLI-override
//! pattern with an explicit env layer, since the spec requires
//! environment overrides the teacher's own config never needed.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::NeonLinkError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSection {
    pub port: u16,
    pub discovery_port: u16,
    pub polling_interval_ms: u64,
    pub max_connections: usize,
    pub heartbeat_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub bind_address: IpAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 9876,
            discovery_port: 9877,
            polling_interval_ms: 1000,
            max_connections: 64,
            heartbeat_interval_ms: 5_000,
            ping_timeout_ms: 15_000,
            bind_address: "0.0.0.0".parse().unwrap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySection {
    pub allow_external_ip: bool,
    pub rate_limit_per_minute: u32,
    pub dangerous_commands_enabled: bool,
    pub allowed_commands: HashSet<String>,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            allow_external_ip: false,
            rate_limit_per_minute: 100,
            dangerous_commands_enabled: false,
            allowed_commands: default_whitelist(),
        }
    }
}

/// Commands that never require `dangerousCommandsEnabled`.
pub const SAFE_COMMANDS: &[&str] = &[
    "get_status",
    "ping",
    "get_config",
    "set_polling_interval",
    "set_config",
    "get_scripts",
];

/// Commands gated on `adminLevel=Full` AND `dangerousCommandsEnabled=true`.
pub const DANGEROUS_COMMANDS: &[&str] =
    &["run_script", "stop_script", "rgb_effect", "set_fan_speed"];

fn default_whitelist() -> HashSet<String> {
    SAFE_COMMANDS
        .iter()
        .chain(DANGEROUS_COMMANDS.iter())
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HardwareSection {
    pub enable_cpu: bool,
    pub enable_gpu: bool,
    pub enable_ram: bool,
    pub enable_storage: bool,
    pub enable_network: bool,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            enable_cpu: true,
            enable_gpu: true,
            enable_ram: true,
            enable_storage: true,
            enable_network: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GamingSection {
    pub process_whitelist: HashSet<String>,
    pub gpu_usage_threshold: f32,
    pub cpu_usage_threshold: f32,
}

impl Default for GamingSection {
    fn default() -> Self {
        Self {
            process_whitelist: HashSet::new(),
            gpu_usage_threshold: 30.0,
            cpu_usage_threshold: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSection {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            console_enabled: true,
        }
    }
}

/// Immutable configuration snapshot. A new `Config` is built whenever a
/// command mutates it; readers always see a fully-formed value via
/// [`SharedConfig`]'s atomic swap, never a torn read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub server: ServerSection,
    pub security: SecuritySection,
    pub hardware: HardwareSection,
    pub gaming: GamingSection,
    pub logging: LoggingSection,
}

impl Config {
    /// Load defaults, then an optional JSON file, then environment
    /// variable overrides (`NEONLINK_SECTION__FIELD`, case-insensitive).
    pub fn load(file_path: Option<&Path>) -> Result<Self, NeonLinkError> {
        let mut config = Config::default();

        if let Some(path) = file_path {
            let text = std::fs::read_to_string(path)
                .map_err(|e| NeonLinkError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;
            config = serde_json::from_str(&text)
                .map_err(|e| NeonLinkError::ConfigInvalid(format!("invalid config JSON: {}", e)))?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix("NEONLINK_") else {
                continue;
            };
            let Some((section, field)) = rest.split_once("__") else {
                continue;
            };
            apply_one_override(self, &section.to_lowercase(), &field.to_lowercase(), &value);
        }
    }

    pub fn validate(&self) -> Result<(), NeonLinkError> {
        if self.server.port == 0 {
            return Err(NeonLinkError::ConfigInvalid("server.port cannot be 0".into()));
        }
        if !(50..=10_000).contains(&self.server.polling_interval_ms) {
            return Err(NeonLinkError::ConfigInvalid(
                "server.pollingIntervalMs must be in 50..=10000".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(NeonLinkError::ConfigInvalid(
                "server.maxConnections cannot be 0".into(),
            ));
        }
        if self.server.ping_timeout_ms == 0 {
            return Err(NeonLinkError::ConfigInvalid(
                "server.pingTimeoutMs cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

fn apply_one_override(config: &mut Config, section: &str, field: &str, value: &str) {
    macro_rules! parse_or_warn {
        ($ty:ty, $value:expr) => {
            match $value.parse::<$ty>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("ignoring malformed env override for {}", $value);
                    None
                }
            }
        };
    }

    match (section, field) {
        ("server", "port") => {
            if let Some(v) = parse_or_warn!(u16, value) {
                config.server.port = v;
            }
        }
        ("server", "discovery_port") => {
            if let Some(v) = parse_or_warn!(u16, value) {
                config.server.discovery_port = v;
            }
        }
        ("server", "polling_interval_ms") => {
            if let Some(v) = parse_or_warn!(u64, value) {
                config.server.polling_interval_ms = v;
            }
        }
        ("server", "max_connections") => {
            if let Some(v) = parse_or_warn!(usize, value) {
                config.server.max_connections = v;
            }
        }
        ("security", "allow_external_ip") => {
            if let Some(v) = parse_or_warn!(bool, value) {
                config.security.allow_external_ip = v;
            }
        }
        ("security", "rate_limit_per_minute") => {
            if let Some(v) = parse_or_warn!(u32, value) {
                config.security.rate_limit_per_minute = v;
            }
        }
        ("security", "dangerous_commands_enabled") => {
            if let Some(v) = parse_or_warn!(bool, value) {
                config.security.dangerous_commands_enabled = v;
            }
        }
        ("logging", "level") => {
            config.logging.level = value.to_string();
        }
        _ => {}
    }
}

/// Lock-free atomic-swap handle to the live config, shared by every task
/// that needs to read it. Mirrors the teacher's preference for `arc-swap`
/// over a `RwLock` on the hot read path.
#[derive(Clone)]
pub struct SharedConfig(Arc<ArcSwap<Config>>);

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(config)))
    }

    pub fn load(&self) -> Arc<Config> {
        self.0.load_full()
    }

    pub fn store(&self, config: Config) {
        self.0.store(Arc::new(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut c = Config::default();
        c.server.port = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_polling_interval() {
        let mut c = Config::default();
        c.server.polling_interval_ms = 20;
        assert!(c.validate().is_err());
        c.server.polling_interval_ms = 20_000;
        assert!(c.validate().is_err());
    }

    #[test]
    fn whitelist_defaults_include_all_named_commands() {
        let c = Config::default();
        for cmd in SAFE_COMMANDS.iter().chain(DANGEROUS_COMMANDS.iter()) {
            assert!(c.security.allowed_commands.contains(*cmd));
        }
    }

    #[test]
    fn shared_config_roundtrips() {
        let shared = SharedConfig::new(Config::default());
        let mut next = (*shared.load()).clone();
        next.server.polling_interval_ms = 2000;
        shared.store(next);
        assert_eq!(shared.load().server.polling_interval_ms, 2000);
    }
}
