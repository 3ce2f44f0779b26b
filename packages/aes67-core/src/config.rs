//! Domain configuration for the control plane.
//!
//! This is the validated, library-owned configuration shape. The binary
//! crate loads YAML + environment overrides into its own wire-format
//! struct and converts into this one (see `apps/server/src/config.rs`).

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::state::StateStore;

/// Accepts either a bare string or a list of strings, so
/// `amixer_controls: "DAC LEFT LINEOUT"` and the list form both parse.
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Discovery strategy for locating an IS-04 registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    DnsSd,
    Static,
}

impl Default for RegistryMode {
    fn default() -> Self {
        RegistryMode::DnsSd
    }
}

/// Settings for NMOS registration discovery and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub mode: RegistryMode,
    pub static_urls: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub dns_sd_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: RegistryMode::DnsSd,
            static_urls: Vec::new(),
            heartbeat_interval_secs: 5,
            dns_sd_timeout_secs: 3,
        }
    }
}

/// Connection settings for the local aes67-linux-daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub base_url: String,
    pub sink_id: u32,
    pub status_poll_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            sink_id: 0,
            status_poll_interval_secs: 5,
        }
    }
}

pub const DEFAULT_MIXER_CONTROLS: &[&str] = &["DAC LEFT LINEOUT", "DAC RIGHT LINEOUT"];

/// Settings for the capture-to-playback audio bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub capture_device: String,
    pub playback_device: String,
    pub alsaloop_buffer_ms: u32,
    pub amixer_card: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub amixer_controls: Vec<String>,
    pub default_volume: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "hw:2,0".to_string(),
            playback_device: "hw:1,0".to_string(),
            alsaloop_buffer_ms: 50,
            amixer_card: "1".to_string(),
            amixer_controls: DEFAULT_MIXER_CONTROLS.iter().map(|s| s.to_string()).collect(),
            default_volume: 80,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node_friendly_name: String,
    pub device_friendly_name: String,
    pub receiver_friendly_name: String,
    pub registry: RegistryConfig,
    pub daemon: DaemonConfig,
    pub audio: AudioConfig,
    /// Network interface to advertise (falls back to `eth0` if unset).
    pub interface_name: Option<String>,
    pub http_port: u16,
    pub state_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_friendly_name: "AES67 Receiver".to_string(),
            device_friendly_name: "AES67 Device".to_string(),
            receiver_friendly_name: "AES67 Mono Receiver".to_string(),
            registry: RegistryConfig::default(),
            daemon: DaemonConfig::default(),
            audio: AudioConfig::default(),
            interface_name: None,
            http_port: 0,
            state_file: PathBuf::from("./state/runtime.json"),
        }
    }
}

/// Three UUIDs identifying this Node/Device/Receiver, stable across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub device_id: String,
    pub receiver_id: String,
}

/// Loads (or lazily creates) the stable Node/Device/Receiver identity.
pub fn ensure_identity(store: &StateStore) -> NodeIdentity {
    NodeIdentity {
        node_id: store.get_or_create_uuid("node_id"),
        device_id: store.get_or_create_uuid("device_id"),
        receiver_id: store.get_or_create_uuid("receiver_id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_mode_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RegistryMode::DnsSd).unwrap(),
            "\"dns-sd\""
        );
        assert_eq!(
            serde_json::to_string(&RegistryMode::Static).unwrap(),
            "\"static\""
        );
    }

    #[test]
    fn amixer_controls_accepts_bare_string() {
        let config: AudioConfig = serde_json::from_value(serde_json::json!({
            "amixer_controls": "Master"
        }))
        .unwrap();
        assert_eq!(config.amixer_controls, vec!["Master".to_string()]);
    }

    #[test]
    fn amixer_controls_accepts_list() {
        let config: AudioConfig = serde_json::from_value(serde_json::json!({
            "amixer_controls": ["Left", "Right"]
        }))
        .unwrap();
        assert_eq!(config.amixer_controls, vec!["Left".to_string(), "Right".to_string()]);
    }

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.audio.default_volume, 80);
        assert_eq!(config.daemon.sink_id, 0);
        assert_eq!(config.registry.mode, RegistryMode::DnsSd);
    }
}
