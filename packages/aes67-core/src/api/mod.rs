//! HTTP surface: IS-04 Node API, IS-05 Connection API, and health probes.

mod connection;
mod node;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::audio::{LoopController, MixerController};
use crate::config::{AppConfig, NodeIdentity};
use crate::daemon::DaemonClient;
use crate::ip_detect::IpDetector;
use crate::receiver::ReceiverStateController;
use crate::state::StateStore;

/// Shared application state reachable from every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<NodeIdentity>,
    pub store: Arc<StateStore>,
    pub daemon: Arc<DaemonClient>,
    pub receiver: Arc<ReceiverStateController>,
    pub loop_controller: Arc<LoopController>,
    pub mixer: Arc<MixerController>,
    pub ip_detector: Arc<dyn IpDetector>,
}

/// Builds the full axum router: IS-04 Node API, IS-05 Connection API,
/// and liveness/readiness probes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .merge(node::router())
        .merge(connection::router())
        .with_state(state)
}

async fn health_live() -> axum::Json<serde_json::Value> {
    axum::Json(json!({"ok": true}))
}

async fn health_ready(axum::extract::State(state): axum::extract::State<AppState>) -> axum::Json<serde_json::Value> {
    let daemon_ok = state.daemon.fetch_config().await.is_ok();
    axum::Json(json!({
        "ok": daemon_ok,
        "checks": {
            "daemon": daemon_ok,
        },
    }))
}

/// Builds a fully-wired `AppState` against a test daemon URL, shared by
/// the IS-04 Node API and IS-05 Connection API HTTP tests.
#[cfg(test)]
pub(crate) fn test_app_state(daemon_base_url: String, state_file: std::path::PathBuf) -> AppState {
    use crate::ip_detect::SystemIpDetector;

    let mut config = AppConfig::default();
    config.daemon.base_url = daemon_base_url;
    config.state_file = state_file;
    let config = Arc::new(config);

    let store = Arc::new(StateStore::new(config.state_file.clone()));
    let identity = Arc::new(NodeIdentity {
        node_id: "11111111-1111-1111-1111-111111111111".to_string(),
        device_id: "22222222-2222-2222-2222-222222222222".to_string(),
        receiver_id: "33333333-3333-3333-3333-333333333333".to_string(),
    });
    let daemon = Arc::new(DaemonClient::new(config.daemon.base_url.clone()));
    let receiver = Arc::new(ReceiverStateController::new(store.clone(), config.audio.default_volume));
    let loop_controller = Arc::new(LoopController::new(
        config.audio.capture_device.clone(),
        config.audio.playback_device.clone(),
        config.audio.alsaloop_buffer_ms,
        Vec::new(),
    ));
    let mixer = Arc::new(MixerController::new(
        config.audio.amixer_card.clone(),
        config.audio.amixer_controls.clone(),
    ));

    AppState {
        config,
        identity,
        store,
        daemon,
        receiver,
        loop_controller,
        mixer,
        ip_detector: Arc::new(SystemIpDetector),
    }
}
