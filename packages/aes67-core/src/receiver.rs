//! IS-05 receiver state: staged/active transport parameters and the
//! activation protocol that commits a staged configuration to the
//! daemon and audio bridge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::BridgeError;

const STATE_NAMESPACE: &str = "receiver";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationParams {
    #[serde(default = "default_activation_mode")]
    pub mode: String,
    #[serde(default)]
    pub requested_time: Option<String>,
}

fn default_activation_mode() -> String {
    "activate_immediate".to_string()
}

impl Default for ActivationParams {
    fn default() -> Self {
        Self {
            mode: default_activation_mode(),
            requested_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioParams {
    #[serde(default = "default_volume_value")]
    pub volume: i64,
    #[serde(default)]
    pub mute: bool,
}

fn default_volume_value() -> i64 {
    80
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            volume: default_volume_value(),
            mute: false,
        }
    }
}

impl AudioParams {
    fn validate(&self) -> Result<(), BridgeError> {
        if !(0..=100).contains(&self.volume) {
            return Err(BridgeError::Validation(format!(
                "audio.volume must be 0-100, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportParams {
    #[serde(default = "default_destination_ip")]
    pub destination_ip: String,
    #[serde(default = "default_destination_port")]
    pub destination_port: i64,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub interface_ip: Option<String>,
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: i64,
    #[serde(default = "default_encoding_name")]
    pub encoding_name: String,
    #[serde(default = "default_payload_type")]
    pub payload_type: i64,
}

fn default_destination_ip() -> String {
    "239.0.0.1".to_string()
}
fn default_destination_port() -> i64 {
    5004
}
fn default_ttl() -> i64 {
    64
}
fn default_sample_rate() -> i64 {
    48000
}
fn default_encoding_name() -> String {
    "L24".to_string()
}
fn default_payload_type() -> i64 {
    96
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            destination_ip: default_destination_ip(),
            destination_port: default_destination_port(),
            source_ip: None,
            interface_ip: None,
            ttl: default_ttl(),
            sample_rate: default_sample_rate(),
            encoding_name: default_encoding_name(),
            payload_type: default_payload_type(),
        }
    }
}

impl TransportParams {
    fn validate(&self) -> Result<(), BridgeError> {
        if !(1..=65535).contains(&self.destination_port) {
            return Err(BridgeError::Validation(format!(
                "destination_port must be 1-65535, got {}",
                self.destination_port
            )));
        }
        if !(1..=255).contains(&self.ttl) {
            return Err(BridgeError::Validation(format!(
                "ttl must be 1-255, got {}",
                self.ttl
            )));
        }
        if !(8000..=192000).contains(&self.sample_rate) {
            return Err(BridgeError::Validation(format!(
                "sample_rate must be 8000-192000, got {}",
                self.sample_rate
            )));
        }
        if !(0..=127).contains(&self.payload_type) {
            return Err(BridgeError::Validation(format!(
                "payload_type must be 0-127, got {}",
                self.payload_type
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedState {
    #[serde(default)]
    pub master_enable: bool,
    #[serde(default = "default_transport_params_list")]
    pub transport_params: Vec<TransportParams>,
    #[serde(default)]
    pub activation: ActivationParams,
    #[serde(default)]
    pub audio: AudioParams,
}

fn default_transport_params_list() -> Vec<TransportParams> {
    vec![TransportParams::default()]
}

impl Default for StagedState {
    fn default() -> Self {
        Self {
            master_enable: false,
            transport_params: default_transport_params_list(),
            activation: ActivationParams::default(),
            audio: AudioParams::default(),
        }
    }
}

impl StagedState {
    fn validate(&self) -> Result<(), BridgeError> {
        if self.transport_params.is_empty() {
            return Err(BridgeError::Validation(
                "transport_params must not be empty".to_string(),
            ));
        }
        for params in &self.transport_params {
            params.validate()?;
        }
        self.audio.validate()
    }

    fn with_default_volume(default_volume: u8) -> Self {
        Self {
            audio: AudioParams {
                volume: default_volume as i64,
                ..AudioParams::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReceiverState {
    pub staged: StagedState,
    pub active: StagedState,
    pub last_activated: Option<String>,
    pub sink_active: bool,
}

/// Owns the receiver's staged/active transport state and performs the
/// atomic activation transaction: side effects against the daemon and
/// audio bridge happen strictly between a state snapshot and the final
/// commit, so a mid-transaction failure never leaves `active` pointing
/// at a configuration that was never applied.
pub struct ReceiverStateController {
    store: std::sync::Arc<crate::state::StateStore>,
    default_volume: u8,
    state: Mutex<ReceiverState>,
}

impl ReceiverStateController {
    pub fn new(store: std::sync::Arc<crate::state::StateStore>, default_volume: u8) -> Self {
        let state = load_state(&store, default_volume);
        Self {
            store,
            default_volume,
            state: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> ReceiverState {
        self.state.lock().await.clone()
    }

    /// Shallow-merges `patch` onto the current staged state's JSON
    /// representation, then re-validates the result as a whole. Any
    /// field not present in `patch` is left untouched.
    pub async fn update_staged(&self, patch: Map<String, Value>) -> Result<ReceiverState, BridgeError> {
        let mut guard = self.state.lock().await;
        let mut staged_value = serde_json::to_value(&guard.staged)
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        if let Value::Object(ref mut staged_map) = staged_value {
            for (key, value) in patch {
                staged_map.insert(key, value);
            }
        }
        let staged: StagedState = serde_json::from_value(staged_value)
            .map_err(|e| BridgeError::Validation(e.to_string()))?;
        staged.validate()?;

        guard.staged = staged;
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    /// Commits the current staged state as active and records the
    /// daemon/bridge connection outcome. Must only be called after the
    /// corresponding daemon and audio bridge side effects have already
    /// succeeded or been deliberately skipped (disconnect path).
    pub async fn commit_activation(&self, sink_active: bool) -> Result<ReceiverState, BridgeError> {
        let mut guard = self.state.lock().await;
        guard.active = guard.staged.clone();
        guard.last_activated = Some(utc_now_iso());
        guard.sink_active = sink_active;
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, state: &ReceiverState) -> Result<(), BridgeError> {
        let value = serde_json::to_value(state).map_err(|e| BridgeError::Internal(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(BridgeError::Internal("receiver state must serialize to an object".to_string()));
        };
        self.store
            .write_namespace(STATE_NAMESPACE, map)
            .map_err(|e| BridgeError::Internal(e.to_string()))
    }
}

fn load_state(store: &crate::state::StateStore, default_volume: u8) -> ReceiverState {
    let payload = store.read_namespace(STATE_NAMESPACE);
    if payload.is_empty() {
        let staged = StagedState::with_default_volume(default_volume);
        let state = ReceiverState {
            staged: staged.clone(),
            active: staged,
            last_activated: None,
            sink_active: false,
        };
        if let Ok(Value::Object(map)) = serde_json::to_value(&state) {
            if let Err(e) = store.write_namespace(STATE_NAMESPACE, map) {
                log::error!("[Receiver] failed to persist initial state: {e}");
            }
        }
        return state;
    }
    match serde_json::from_value(Value::Object(payload)) {
        Ok(state) => state,
        Err(e) => {
            log::warn!("[Receiver] stored receiver state was invalid ({e}), resetting to defaults");
            let staged = StagedState::with_default_volume(default_volume);
            ReceiverState {
                staged: staged.clone(),
                active: staged,
                last_activated: None,
                sink_active: false,
            }
        }
    }
}

fn utc_now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
