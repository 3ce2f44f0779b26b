//! IS-04 registration worker: discovers a registry, registers the
//! Node/Device/Receiver resources, and keeps them alive with heartbeats.
//!
//! Runs as a single cooperative loop rather than a supervised actor: one
//! `tick` per iteration, errors are logged and retried on the next tick,
//! and the loop exits only when asked to stop. A lost registry (404 on
//! heartbeat, or a rejected upsert) just drops back to the unregistered
//! state and rediscovers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mdns_sd::{ScopedIp, ServiceDaemon, ServiceEvent};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::config::{AppConfig, NodeIdentity, RegistryMode};
use crate::daemon::DaemonClient;
use crate::ip_detect::{detect_advertise_ip, IpDetector};
use crate::protocol_constants::{REGISTRATION_API_VERSION, REGISTRY_SERVICE_TYPE, SUPPORTED_VERSIONS};
use crate::state::StateStore;

/// A discovered (or statically configured) registry to register against.
#[derive(Debug, Clone)]
pub struct RegistryEndpoint {
    pub url: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerPhase {
    Unregistered,
    Registering,
    Registered,
}

struct WorkerState {
    phase: WorkerPhase,
    registry: Option<RegistryEndpoint>,
}

/// Runs the IS-04 registration state machine until `stop()` is called.
pub struct Is04Worker {
    config: Arc<AppConfig>,
    identity: NodeIdentity,
    store: Arc<StateStore>,
    daemon: Arc<DaemonClient>,
    http: reqwest::Client,
    ip_detector: Arc<dyn IpDetector>,
    state: Mutex<WorkerState>,
    stop_flag: AtomicBool,
    stop_notify: Notify,
}

impl Is04Worker {
    pub fn new(
        config: Arc<AppConfig>,
        identity: NodeIdentity,
        store: Arc<StateStore>,
        daemon: Arc<DaemonClient>,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Self {
        Self {
            config,
            identity,
            store,
            daemon,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("is04 http client"),
            ip_detector,
            state: Mutex::new(WorkerState {
                phase: WorkerPhase::Unregistered,
                registry: None,
            }),
            stop_flag: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Runs the registration loop. Returns once `stop()` has been called
    /// and the current tick has settled.
    pub async fn run(&self) {
        log::info!(
            "[IS-04] worker started (mode={:?})",
            self.config.registry.mode
        );
        while !self.stop_flag.load(Ordering::SeqCst) {
            if let Err(e) = self.tick().await {
                log::warn!("[IS-04] worker error: {e}");
            }
            let interval = Duration::from_secs(self.config.registry.heartbeat_interval_secs);
            let _ = timeout(interval, self.stop_notify.notified()).await;
        }
        log::info!("[IS-04] worker stopping");
        self.deregister_best_effort().await;
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    async fn tick(&self) -> Result<(), String> {
        let mut guard = self.state.lock().await;
        if guard.registry.is_none() {
            guard.phase = WorkerPhase::Unregistered;
            let discovered = self.discover_registry().await;
            let Some(endpoint) = discovered else {
                log::debug!("[IS-04] no registry discovered yet");
                return Ok(());
            };
            log::info!("[IS-04] using registry {}", endpoint.url);
            guard.registry = Some(endpoint);
            guard.phase = WorkerPhase::Registering;
        }
        let registry = guard.registry.clone().expect("registry set above");
        match guard.phase {
            WorkerPhase::Registered => {
                drop(guard);
                self.send_heartbeat(&registry).await
            }
            _ => {
                drop(guard);
                self.register_resources(&registry).await
            }
        }
    }

    async fn discover_registry(&self) -> Option<RegistryEndpoint> {
        if self.config.registry.mode == RegistryMode::Static {
            if let Some(url) = self.config.registry.static_urls.first() {
                return Some(RegistryEndpoint {
                    url: url.clone(),
                    priority: 0,
                });
            }
            return None;
        }

        if let Some(endpoint) = self.discover_via_dnssd().await {
            return Some(endpoint);
        }

        if let Some(url) = self.config.registry.static_urls.first() {
            log::info!("[IS-04] DNS-SD found nothing, falling back to static registry list");
            return Some(RegistryEndpoint {
                url: url.clone(),
                priority: 0,
            });
        }
        None
    }

    /// Browses for the registry service type and returns the first
    /// resolved instance, or `None` on timeout.
    async fn discover_via_dnssd(&self) -> Option<RegistryEndpoint> {
        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(e) => {
                log::warn!("[IS-04] failed to start mDNS daemon: {e}");
                return None;
            }
        };
        let receiver = match daemon.browse(REGISTRY_SERVICE_TYPE) {
            Ok(receiver) => receiver,
            Err(e) => {
                log::warn!("[IS-04] failed to browse for {REGISTRY_SERVICE_TYPE}: {e}");
                return None;
            }
        };

        let timeout_duration = Duration::from_secs(self.config.registry.dns_sd_timeout_secs);
        let deadline = tokio::time::Instant::now() + timeout_duration;
        let result = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break None;
            }
            match timeout(remaining, receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    let address = info.addresses.iter().find_map(|addr| match addr {
                        ScopedIp::V4(v4) => Some(v4.addr().to_string()),
                        other => Some(other.to_ip_addr().to_string()),
                    });
                    if let Some(addr) = address {
                        let port = info.port;
                        break Some(RegistryEndpoint {
                            url: format!(
                                "http://{addr}:{port}/x-nmos/registration/{REGISTRATION_API_VERSION}"
                            ),
                            priority: 0,
                        });
                    }
                }
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => break None,
                Err(_) => break None,
            }
        };

        if let Err(e) = daemon.stop_browse(REGISTRY_SERVICE_TYPE) {
            log::warn!("[IS-04] failed to stop mDNS browse: {e}");
        }
        result
    }

    async fn register_resources(&self, registry: &RegistryEndpoint) -> Result<(), String> {
        let version = tai_version();
        let node = self.build_node_resource(&version).await;
        let device = self.build_device_resource(&version);
        let receiver = self.build_receiver_resource(&version);

        let upserts = [
            ("nodes", self.identity.node_id.clone(), node),
            ("devices", self.identity.device_id.clone(), device),
            ("receivers", self.identity.receiver_id.clone(), receiver),
        ];
        for (collection, id, payload) in upserts {
            self.upsert_resource(registry, collection, &id, payload)
                .await
                .map_err(|e| format!("failed to register {collection}/{id}: {e}"))?;
        }

        let mut guard = self.state.lock().await;
        guard.phase = WorkerPhase::Registered;
        log::info!(
            "[IS-04] registered node {} / device {} / receiver {}",
            self.identity.node_id,
            self.identity.device_id,
            self.identity.receiver_id
        );
        Ok(())
    }

    /// Registers a single resource: POST to the collection, and on 409
    /// (already registered) delete the conflicting resource and re-POST,
    /// requiring a 2xx on the retry.
    async fn upsert_resource(
        &self,
        registry: &RegistryEndpoint,
        collection: &str,
        resource_id: &str,
        payload: Value,
    ) -> Result<(), String> {
        let envelope = json!({
            "type": collection.trim_end_matches('s'),
            "id": resource_id,
            "data": payload,
        });
        let collection_url = format!("{}/resource/{collection}", registry.url);
        let response = self
            .http
            .post(&collection_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status().as_u16() == 409 {
            log::info!("[IS-04] resource {resource_id} already registered, replacing");
            let resource_url = format!("{}/resource/{collection}/{resource_id}", registry.url);
            let delete_resp = self
                .http
                .delete(&resource_url)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !delete_resp.status().is_success() && delete_resp.status().as_u16() != 404 {
                return Err(format!("delete before re-register failed: {}", delete_resp.status()));
            }
            let retry = self
                .http
                .post(&collection_url)
                .json(&envelope)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if retry.status().is_success() {
                return Ok(());
            }
            return Err(format!("re-register failed: {}", retry.status()));
        }
        Err(format!("registry rejected resource: {}", response.status()))
    }

    async fn send_heartbeat(&self, registry: &RegistryEndpoint) -> Result<(), String> {
        let url = format!("{}/health/nodes/{}", registry.url, self.identity.node_id);
        let response = self
            .http
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().as_u16() == 404 {
            log::info!("[IS-04] registry lost our node, will re-register");
            let mut guard = self.state.lock().await;
            guard.registry = None;
            guard.phase = WorkerPhase::Unregistered;
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(format!("heartbeat rejected: {}", response.status()));
        }
        Ok(())
    }

    async fn deregister_best_effort(&self) {
        let registry = self.state.lock().await.registry.clone();
        let Some(registry) = registry else { return };
        for (collection, id) in [
            ("receivers", self.identity.receiver_id.clone()),
            ("devices", self.identity.device_id.clone()),
            ("nodes", self.identity.node_id.clone()),
        ] {
            let url = format!("{}/resource/{collection}/{id}", registry.url);
            if let Err(e) = self.http.delete(&url).send().await {
                log::debug!("[IS-04] best-effort deregister of {collection}/{id} failed: {e}");
            }
        }
    }

    async fn build_node_resource(&self, version: &str) -> Value {
        let hostname = hostname();
        let iface = self.interface_name();
        let advertise_ip = detect_advertise_ip(self.ip_detector.as_ref(), &self.config);
        let clock = self.ptp_clock().await;

        json!({
            "id": self.identity.node_id,
            "version": version,
            "label": self.config.node_friendly_name,
            "description": format!("AES67 receiver on {advertise_ip}"),
            "tags": {},
            "href": format!("http://{advertise_ip}:{}/x-nmos/node/{REGISTRATION_API_VERSION}/", self.config.http_port),
            "api": {
                "versions": SUPPORTED_VERSIONS,
                "endpoints": [{
                    "host": advertise_ip,
                    "port": self.config.http_port,
                    "protocol": "http",
                    "authorization": false,
                }],
            },
            "services": [],
            "controls": [],
            "caps": {},
            "clocks": [clock],
            "interfaces": [{
                "name": iface,
                "chassis_id": Value::Null,
                "port_id": read_interface_mac(&iface),
            }],
            "hostname": hostname,
        })
    }

    fn build_device_resource(&self, version: &str) -> Value {
        let advertise_ip = detect_advertise_ip(self.ip_detector.as_ref(), &self.config);
        let controls: Vec<Value> = SUPPORTED_VERSIONS
            .iter()
            .map(|conn_version| {
                json!({
                    "href": format!("http://{advertise_ip}:{}/x-nmos/connection/{conn_version}/", self.config.http_port),
                    "type": format!("urn:x-nmos:control:sr-ctrl/{conn_version}"),
                    "authorization": false,
                })
            })
            .collect();

        json!({
            "id": self.identity.device_id,
            "version": version,
            "label": self.config.device_friendly_name,
            "description": "AES67 mono receiver device",
            "type": "urn:x-nmos:device:generic",
            "node_id": self.identity.node_id,
            "controls": controls,
            "receivers": [self.identity.receiver_id],
            "senders": [],
            "tags": {},
        })
    }

    fn build_receiver_resource(&self, version: &str) -> Value {
        let iface = self.interface_name();
        let receiver_state = self.store.read_namespace("receiver");
        let sink_active = receiver_state
            .get("sink_active")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        json!({
            "id": self.identity.receiver_id,
            "version": version,
            "label": self.config.receiver_friendly_name,
            "description": "Mono AES67 RTP receiver",
            "format": "urn:x-nmos:format:audio",
            "caps": {"media_types": [crate::protocol_constants::DEFAULT_MEDIA_TYPE]},
            "transport": "urn:x-nmos:transport:rtp.mcast",
            "device_id": self.identity.device_id,
            "subscription": {"sender_id": Value::Null, "active": sink_active},
            "interface_bindings": [iface],
            "tags": {},
        })
    }

    fn interface_name(&self) -> String {
        self.config
            .interface_name
            .clone()
            .unwrap_or_else(|| "eth0".to_string())
    }

    async fn ptp_clock(&self) -> Value {
        crate::daemon::project_ptp_clock(&self.daemon).await
    }
}

/// TAI-like version string: `seconds:nanoseconds` since the Unix epoch.
/// Not true TAI (no leap-second table), matching the daemon's own
/// wall-clock-based versioning.
pub fn tai_version() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}:{}", now.as_secs(), now.subsec_nanos())
}

fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "aes67-node".to_string())
}

fn read_interface_mac(interface_name: &str) -> String {
    std::fs::read_to_string(format!("/sys/class/net/{interface_name}/address"))
        .map(|mac| mac.trim().to_lowercase().replace(':', "-"))
        .unwrap_or_else(|_| "00-00-00-00-00-00".to_string())
}

/// Validates and normalizes a grandmaster id reported by the daemon,
/// falling back to the unlocked placeholder on anything malformed.
pub fn coerce_ptp_gmid(value: Option<&str>) -> String {
    let Some(candidate) = value else {
        return crate::protocol_constants::UNLOCKED_GMID.to_string();
    };
    let candidate = candidate.trim().to_lowercase();
    let parts: Vec<&str> = candidate.split('-').collect();
    let valid = parts.len() == 8
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        candidate
    } else {
        crate::protocol_constants::UNLOCKED_GMID.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedIpDetector;
    impl IpDetector for FixedIpDetector {
        fn detect(&self, _host: &str, _port: u16) -> Result<String, String> {
            Ok("192.0.2.10".to_string())
        }
    }

    fn test_worker(registry_uri: &str) -> Is04Worker {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.registry.mode = RegistryMode::Static;
        config.registry.static_urls = vec![format!("{registry_uri}/x-nmos/registration/v1.3")];
        let config = Arc::new(config);
        let store = Arc::new(StateStore::new(dir.path().join("runtime.json")));
        let identity = NodeIdentity {
            node_id: "node-1".to_string(),
            device_id: "device-1".to_string(),
            receiver_id: "receiver-1".to_string(),
        };
        let daemon = Arc::new(DaemonClient::new("http://127.0.0.1:1".to_string()));
        Is04Worker::new(config, identity, store, daemon, Arc::new(FixedIpDetector))
    }

    #[tokio::test]
    async fn registration_recovers_from_409_conflict() {
        let registry = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resource/nodes"))
            .respond_with(ResponseTemplate::new(409))
            .up_to_n_times(1)
            .mount(&registry)
            .await;
        Mock::given(method("POST"))
            .and(path("/resource/nodes"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex("^/resource/nodes/.+$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&registry)
            .await;
        Mock::given(method("POST"))
            .and(path("/resource/devices"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;
        Mock::given(method("POST"))
            .and(path("/resource/receivers"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;

        let worker = test_worker(&registry.uri());
        worker.tick().await.expect("tick should recover from 409 and finish registering");

        let guard = worker.state.lock().await;
        assert_eq!(guard.phase, WorkerPhase::Registered);
    }

    #[tokio::test]
    async fn heartbeat_404_drops_back_to_unregistered_and_next_tick_reregisters() {
        let registry = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resource/nodes"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;
        Mock::given(method("POST"))
            .and(path("/resource/devices"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;
        Mock::given(method("POST"))
            .and(path("/resource/receivers"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&registry)
            .await;

        let worker = test_worker(&registry.uri());
        worker.tick().await.expect("initial registration should succeed");
        assert_eq!(worker.state.lock().await.phase, WorkerPhase::Registered);

        Mock::given(method("POST"))
            .and(path_regex("^/health/nodes/.+$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&registry)
            .await;

        worker.tick().await.expect("heartbeat tick should not surface an error on 404");
        {
            let guard = worker.state.lock().await;
            assert_eq!(guard.phase, WorkerPhase::Unregistered);
            assert!(guard.registry.is_none());
        }

        worker.tick().await.expect("follow-up tick should rediscover and reregister");
        assert_eq!(worker.state.lock().await.phase, WorkerPhase::Registered);
    }

    #[test]
    fn tai_version_has_seconds_colon_nanos_shape() {
        let version = tai_version();
        let parts: Vec<&str> = version.split(':').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].parse::<u64>().is_ok());
        assert!(parts[1].parse::<u32>().is_ok());
    }

    #[test]
    fn coerce_ptp_gmid_accepts_well_formed_id() {
        let gmid = "ab-cd-ef-01-23-45-67-89";
        assert_eq!(coerce_ptp_gmid(Some(gmid)), gmid);
    }

    #[test]
    fn coerce_ptp_gmid_rejects_malformed_id() {
        assert_eq!(
            coerce_ptp_gmid(Some("not-a-gmid")),
            crate::protocol_constants::UNLOCKED_GMID
        );
        assert_eq!(
            coerce_ptp_gmid(None),
            crate::protocol_constants::UNLOCKED_GMID
        );
    }
}
