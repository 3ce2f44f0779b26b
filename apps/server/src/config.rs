//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use aes67_core::config::{AudioConfig, DaemonConfig, RegistryConfig, RegistryMode};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub node_friendly_name: String,
    pub device_friendly_name: String,
    pub receiver_friendly_name: String,

    /// Port to bind the IS-04/IS-05 HTTP surfaces to.
    /// Override: `AES67_HTTP_PORT`
    pub http_port: u16,

    /// Network interface to advertise (falls back to `eth0`).
    pub interface_name: Option<String>,

    pub registry: RegistryConfig,
    pub daemon: DaemonConfig,
    pub audio: AudioConfig,

    /// Path to the persisted runtime state file.
    /// Override: `AES67_STATE_FILE`
    pub state_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core_defaults = aes67_core::AppConfig::default();
        Self {
            node_friendly_name: core_defaults.node_friendly_name,
            device_friendly_name: core_defaults.device_friendly_name,
            receiver_friendly_name: core_defaults.receiver_friendly_name,
            http_port: 8080,
            interface_name: core_defaults.interface_name,
            registry: core_defaults.registry,
            daemon: core_defaults.daemon,
            audio: core_defaults.audio,
            state_file: core_defaults.state_file,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AES67_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                self.http_port = port;
            }
        }
        if let Ok(val) = std::env::var("AES67_STATE_FILE") {
            self.state_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AES67_INTERFACE_NAME") {
            self.interface_name = Some(val);
        }
        if let Ok(val) = std::env::var("AES67_REGISTRY_MODE") {
            self.registry.mode = match val.as_str() {
                "static" => RegistryMode::Static,
                _ => RegistryMode::DnsSd,
            };
        }
        if let Ok(val) = std::env::var("AES67_DAEMON_BASE_URL") {
            self.daemon.base_url = val;
        }
    }

    /// Converts to aes67-core's validated domain config.
    pub fn to_core_config(&self) -> aes67_core::AppConfig {
        aes67_core::AppConfig {
            node_friendly_name: self.node_friendly_name.clone(),
            device_friendly_name: self.device_friendly_name.clone(),
            receiver_friendly_name: self.receiver_friendly_name.clone(),
            registry: self.registry.clone(),
            daemon: self.daemon.clone(),
            audio: self.audio.clone(),
            interface_name: self.interface_name.clone(),
            http_port: self.http_port,
            state_file: self.state_file.clone(),
        }
    }
}
