//! IS-04 Node API: a read-only view of this node's own Node/Device/Receiver
//! resources, used by controllers that have discovered us via the registry.

use axum::extract::{Path, State};
use axum::routing::{get, options};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::is04::tai_version;
use crate::protocol_constants::{DEFAULT_MEDIA_TYPE, SUPPORTED_VERSIONS};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/x-nmos/node/{version}", get(get_base))
        .route("/x-nmos/node/{version}/", get(get_base))
        .route("/x-nmos/node/{version}/self", get(get_self))
        .route("/x-nmos/node/{version}/devices", get(list_devices))
        .route("/x-nmos/node/{version}/devices/{device_id}", get(get_device))
        .route("/x-nmos/node/{version}/sources", get(list_sources))
        .route("/x-nmos/node/{version}/sources/{source_id}", get(get_source))
        .route("/x-nmos/node/{version}/flows", get(list_flows))
        .route("/x-nmos/node/{version}/flows/{flow_id}", get(get_flow))
        .route("/x-nmos/node/{version}/senders", get(list_senders))
        .route("/x-nmos/node/{version}/senders/{sender_id}", get(get_sender))
        .route("/x-nmos/node/{version}/receivers", get(list_receivers))
        .route("/x-nmos/node/{version}/receivers/{receiver_id}", get(get_receiver))
        .route(
            "/x-nmos/node/{version}/receivers/{receiver_id}/target",
            options(options_receiver_target).put(put_receiver_target),
        )
}

fn require_version(version: &str) -> BridgeResult<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(BridgeError::NotFound(format!("unsupported IS-04 version {version}")))
    }
}

async fn get_base(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!(["self/", "sources/", "flows/", "devices/", "senders/", "receivers/"])))
}

async fn get_self(Path(version): Path<String>, State(state): State<AppState>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(build_node(&state).await))
}

async fn list_devices(Path(version): Path<String>, State(state): State<AppState>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([build_device(&state)])))
}

async fn get_device(
    Path((version, device_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    if device_id != state.identity.device_id {
        return Err(BridgeError::NotFound(format!("device {device_id} not found")));
    }
    Ok(Json(build_device(&state)))
}

async fn list_sources(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([])))
}

async fn get_source(Path((version, source_id)): Path<(String, String)>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Err(BridgeError::NotFound(format!("source {source_id} not found")))
}

async fn list_flows(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([])))
}

async fn get_flow(Path((version, flow_id)): Path<(String, String)>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Err(BridgeError::NotFound(format!("flow {flow_id} not found")))
}

async fn list_senders(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([])))
}

async fn get_sender(Path((version, sender_id)): Path<(String, String)>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Err(BridgeError::NotFound(format!("sender {sender_id} not found")))
}

async fn list_receivers(Path(version): Path<String>, State(state): State<AppState>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([build_receiver(&state).await])))
}

async fn get_receiver(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    if receiver_id != state.identity.receiver_id {
        return Err(BridgeError::NotFound(format!("receiver {receiver_id} not found")));
    }
    Ok(Json(build_receiver(&state).await))
}

async fn options_receiver_target(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    if receiver_id != state.identity.receiver_id {
        return Err(BridgeError::NotFound(format!("receiver {receiver_id} not found")));
    }
    Ok(Json(json!({})))
}

async fn put_receiver_target(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(_payload): Json<Value>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    if receiver_id != state.identity.receiver_id {
        return Err(BridgeError::NotFound(format!("receiver {receiver_id} not found")));
    }
    Err(BridgeError::NotImplemented(
        "receiver target subscription (deprecated IS-04 sender/receiver pairing) is not implemented".to_string(),
    ))
}

async fn build_node(state: &AppState) -> Value {
    let advertise_ip = crate::ip_detect::detect_advertise_ip(state.ip_detector.as_ref(), &state.config);
    let iface = state
        .config
        .interface_name
        .clone()
        .unwrap_or_else(|| "eth0".to_string());
    let clock = ptp_clock(state).await;

    json!({
        "id": state.identity.node_id,
        "version": tai_version(),
        "label": state.config.node_friendly_name,
        "description": format!("AES67 receiver on {advertise_ip}"),
        "tags": {},
        "href": format!("http://{advertise_ip}:{}/x-nmos/node/v1.3/", state.config.http_port),
        "api": {
            "versions": SUPPORTED_VERSIONS,
            "endpoints": [{
                "host": advertise_ip,
                "port": state.config.http_port,
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
            "port_id": Value::Null,
        }],
        "hostname": advertise_ip,
    })
}

fn build_device(state: &AppState) -> Value {
    let advertise_ip = crate::ip_detect::detect_advertise_ip(state.ip_detector.as_ref(), &state.config);
    let controls: Vec<Value> = SUPPORTED_VERSIONS
        .iter()
        .map(|version| {
            json!({
                "href": format!("http://{advertise_ip}:{}/x-nmos/connection/{version}/", state.config.http_port),
                "type": format!("urn:x-nmos:control:sr-ctrl/{version}"),
                "authorization": false,
            })
        })
        .collect();

    json!({
        "id": state.identity.device_id,
        "version": tai_version(),
        "label": state.config.device_friendly_name,
        "description": "AES67 mono receiver device",
        "type": "urn:x-nmos:device:generic",
        "node_id": state.identity.node_id,
        "controls": controls,
        "receivers": [state.identity.receiver_id],
        "senders": [],
        "tags": {},
    })
}

async fn build_receiver(state: &AppState) -> Value {
    let iface = state
        .config
        .interface_name
        .clone()
        .unwrap_or_else(|| "eth0".to_string());
    let receiver_state = state.receiver.snapshot().await;

    json!({
        "id": state.identity.receiver_id,
        "version": tai_version(),
        "label": state.config.receiver_friendly_name,
        "description": "Mono AES67 RTP receiver",
        "format": "urn:x-nmos:format:audio",
        "caps": {"media_types": [DEFAULT_MEDIA_TYPE]},
        "transport": "urn:x-nmos:transport:rtp.mcast",
        "device_id": state.identity.device_id,
        "subscription": {"sender_id": Value::Null, "active": receiver_state.sink_active},
        "interface_bindings": [iface],
        "tags": {},
    })
}

async fn ptp_clock(state: &AppState) -> Value {
    crate::daemon::project_ptp_clock(&state.daemon).await
}
