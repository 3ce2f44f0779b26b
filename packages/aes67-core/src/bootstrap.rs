//! Composition root: wires the state store, daemon client, audio bridge,
//! receiver controller, IS-04 worker, and daemon monitor together in
//! dependency order.

use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;
use crate::audio::{LoopController, MixerController};
use crate::config::{ensure_identity, AppConfig, NodeIdentity};
use crate::daemon::DaemonClient;
use crate::daemon_monitor::DaemonMonitor;
use crate::ip_detect::{IpDetector, SystemIpDetector};
use crate::is04::Is04Worker;
use crate::receiver::ReceiverStateController;
use crate::state::StateStore;

/// Everything bootstrapped for a running node, including the two
/// long-lived background tasks callers are expected to spawn.
pub struct BootstrappedServices {
    pub config: Arc<AppConfig>,
    pub identity: Arc<NodeIdentity>,
    pub app_state: AppState,
    pub is04_worker: Arc<Is04Worker>,
    pub daemon_monitor: Arc<DaemonMonitor>,
}

/// Wires every service in dependency order:
/// 1. State store (everything else reads/writes through it)
/// 2. Stable Node/Device/Receiver identity
/// 3. Daemon client, audio bridge controllers
/// 4. Receiver state controller (depends on the store)
/// 5. IS-04 worker and daemon monitor (depend on everything above)
pub fn bootstrap(config: AppConfig, ip_detector: Option<Arc<dyn IpDetector>>) -> BootstrappedServices {
    let config = Arc::new(config);
    let store = Arc::new(StateStore::new(config.state_file.clone()));
    let identity = Arc::new(ensure_identity(&store));

    let daemon = Arc::new(DaemonClient::new(config.daemon.base_url.clone()));
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

    let receiver = Arc::new(ReceiverStateController::new(
        store.clone(),
        config.audio.default_volume,
    ));

    let ip_detector = ip_detector.unwrap_or_else(|| Arc::new(SystemIpDetector));

    let is04_worker = Arc::new(Is04Worker::new(
        config.clone(),
        (*identity).clone(),
        store.clone(),
        daemon.clone(),
        ip_detector.clone(),
    ));
    let daemon_monitor = Arc::new(DaemonMonitor::new(
        daemon.clone(),
        config.daemon.sink_id,
        Duration::from_secs(config.daemon.status_poll_interval_secs),
    ));

    let app_state = AppState {
        config: config.clone(),
        identity: identity.clone(),
        store,
        daemon,
        receiver,
        loop_controller,
        mixer,
        ip_detector,
    };

    BootstrappedServices {
        config,
        identity,
        app_state,
        is04_worker,
        daemon_monitor,
    }
}
