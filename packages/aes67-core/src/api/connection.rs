//! IS-05 Connection API for the single receiver this node exposes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use super::AppState;
use crate::daemon::SinkUpsert;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol_constants::SUPPORTED_VERSIONS;
use crate::sdp;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/x-nmos/connection/{version}", get(get_base))
        .route("/x-nmos/connection/{version}/", get(get_base))
        .route("/x-nmos/connection/{version}/single", get(get_single_base))
        .route("/x-nmos/connection/{version}/single/", get(get_single_base))
        .route(
            "/x-nmos/connection/{version}/single/receivers",
            get(list_single_receivers),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/",
            get(list_single_receivers),
        )
        .route(
            "/x-nmos/connection/{version}/single/senders",
            get(list_single_senders),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}",
            get(get_single_receiver),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/",
            get(get_single_receiver),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/transporttype",
            get(get_transport_type),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/constraints",
            get(get_constraints),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/staged",
            get(get_staged).patch(patch_staged),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/active",
            get(get_active),
        )
        .route(
            "/x-nmos/connection/{version}/single/receivers/{receiver_id}/staged/activation",
            post(activate),
        )
        .route(
            "/x-nmos/connection/{version}/bulk/receivers",
            post(bulk_not_supported).options(bulk_options),
        )
        .route(
            "/x-nmos/connection/{version}/bulk/senders",
            post(bulk_not_supported).options(bulk_options),
        )
}

fn require_version(version: &str) -> BridgeResult<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(BridgeError::NotFound(format!("unsupported IS-05 version {version}")))
    }
}

fn require_receiver(state: &AppState, receiver_id: &str) -> BridgeResult<()> {
    if receiver_id == state.identity.receiver_id {
        Ok(())
    } else {
        Err(BridgeError::NotFound(format!("receiver {receiver_id} not found")))
    }
}

async fn get_base(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!(["bulk/", "single/"])))
}

async fn get_single_base(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!(["receivers/", "senders/"])))
}

/// This node is receive-only; it advertises no senders.
async fn list_single_senders(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([])))
}

async fn list_single_receivers(
    Path(version): Path<String>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!([format!("{}/", state.identity.receiver_id)])))
}

async fn get_single_receiver(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    Ok(Json(json!([
        "constraints/",
        "staged/",
        "active/",
        "transporttype/"
    ])))
}

async fn get_transport_type(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    Ok(Json(json!({"type": "urn:x-nmos:transport:rtp.mcast"})))
}

async fn get_constraints(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    Ok(Json(json!({
        "sample_rates": [48000],
        "channels": [1],
        "encodings": ["L24"],
        "destination_modes": ["multicast", "unicast"],
    })))
}

async fn get_staged(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    let snapshot = state.receiver.snapshot().await;
    Ok(Json(serde_json::to_value(&snapshot.staged).map_err(|e| BridgeError::Internal(e.to_string()))?))
}

async fn patch_staged(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(patch): Json<Map<String, Value>>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    let updated = state.receiver.update_staged(patch).await?;
    Ok(Json(serde_json::to_value(&updated.staged).map_err(|e| BridgeError::Internal(e.to_string()))?))
}

async fn get_active(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;
    let snapshot = state.receiver.snapshot().await;
    Ok(Json(serde_json::to_value(&snapshot.active).map_err(|e| BridgeError::Internal(e.to_string()))?))
}

/// Runs the four-step activation transaction: snapshot staged state,
/// apply it (or tear it down) against the daemon and audio bridge, then
/// commit. A failed daemon upsert returns before the loop is started and
/// before `commit_activation` runs, so `active` never reflects a
/// configuration that was never actually applied.
async fn activate(
    Path((version, receiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> BridgeResult<(StatusCode, Json<Value>)> {
    require_version(&version)?;
    require_receiver(&state, &receiver_id)?;

    let snapshot = state.receiver.snapshot().await;
    let staged = snapshot.staged;

    if staged.activation.mode != "activate_immediate" {
        return Err(BridgeError::NotImplemented(format!(
            "activation mode {:?} is not implemented, only activate_immediate",
            staged.activation.mode
        )));
    }

    if !staged.master_enable {
        state.daemon.delete_sink(state.config.daemon.sink_id).await?;
        state.loop_controller.stop().await;
        let committed = state.receiver.commit_activation(false).await?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({"state": "disconnected", "receiver": committed.active})),
        ));
    }

    let Some(params) = staged.transport_params.first() else {
        return Err(BridgeError::Validation("staged transport_params is empty".to_string()));
    };
    let sdp_text = sdp::build(params, &state.config.receiver_friendly_name);
    let upsert = SinkUpsert {
        use_sdp: true,
        sdp: sdp_text,
        map: vec![0, 0],
        delay: 0,
    };
    state.daemon.upsert_sink(state.config.daemon.sink_id, &upsert).await?;

    state.loop_controller.ensure_running();
    state.mixer.set_volume(staged.audio.volume.clamp(0, 100) as u8).await;
    state.mixer.set_mute(staged.audio.mute).await;

    let committed = state.receiver.commit_activation(true).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"state": "connected", "receiver": committed.active})),
    ))
}

/// This node exposes exactly one receiver and implements no sender role;
/// bulk operations (multi-resource activation in a single request) are
/// out of scope, matching IS-05's allowance for a 405 on unsupported
/// bulk resource types.
async fn bulk_not_supported(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Err(BridgeError::NotImplemented("bulk connection operations are not supported".to_string()))
}

async fn bulk_options(Path(version): Path<String>) -> BridgeResult<Json<Value>> {
    require_version(&version)?;
    Ok(Json(json!({})))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::api::{create_router, test_app_state};

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn activation_connects_and_commits_staged_params() {
        let daemon = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&daemon)
            .await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let patch_body = json!({
            "master_enable": true,
            "transport_params": [{
                "destination_ip": "239.1.2.3",
                "destination_port": 5004,
                "ttl": 32,
                "sample_rate": 48000,
                "encoding_name": "L24",
                "payload_type": 97
            }],
            "audio": {"volume": 50, "mute": false}
        });
        let patch_req = Request::builder()
            .method(Method::PATCH)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged")
            .header("content-type", "application/json")
            .body(Body::from(patch_body.to_string()))
            .unwrap();
        let patch_resp = router.clone().oneshot(patch_req).await.unwrap();
        assert_eq!(patch_resp.status(), StatusCode::OK);

        let activate_req = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged/activation")
            .body(Body::empty())
            .unwrap();
        let activate_resp = router.clone().oneshot(activate_req).await.unwrap();
        assert_eq!(activate_resp.status(), StatusCode::ACCEPTED);
        let body = json_body(activate_resp).await;
        assert_eq!(body["state"], "connected");
        assert_eq!(body["receiver"]["transport_params"][0]["destination_ip"], "239.1.2.3");

        let active_req = Request::builder()
            .method(Method::GET)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/active")
            .body(Body::empty())
            .unwrap();
        let active_resp = router.oneshot(active_req).await.unwrap();
        let active = json_body(active_resp).await;
        assert!(active["master_enable"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn deactivation_deletes_sink_and_clears_sink_active() {
        let daemon = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&daemon)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&daemon)
            .await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let enable_req = Request::builder()
            .method(Method::PATCH)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged")
            .header("content-type", "application/json")
            .body(Body::from(json!({"master_enable": true}).to_string()))
            .unwrap();
        router.clone().oneshot(enable_req).await.unwrap();
        let first_activation = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged/activation")
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(first_activation).await.unwrap();

        let disable_req = Request::builder()
            .method(Method::PATCH)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged")
            .header("content-type", "application/json")
            .body(Body::from(json!({"master_enable": false}).to_string()))
            .unwrap();
        router.clone().oneshot(disable_req).await.unwrap();

        let second_activation = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged/activation")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(second_activation).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = json_body(resp).await;
        assert_eq!(body["state"], "disconnected");
    }

    #[tokio::test]
    async fn activation_rejects_non_immediate_mode() {
        let daemon = MockServer::start().await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let patch_req = Request::builder()
            .method(Method::PATCH)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"activation": {"mode": "activate_scheduled_absolute"}}).to_string(),
            ))
            .unwrap();
        router.clone().oneshot(patch_req).await.unwrap();

        let activate_req = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged/activation")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(activate_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn daemon_rejection_does_not_commit_active() {
        let daemon = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&daemon)
            .await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let patch_req = Request::builder()
            .method(Method::PATCH)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged")
            .header("content-type", "application/json")
            .body(Body::from(json!({"master_enable": true}).to_string()))
            .unwrap();
        router.clone().oneshot(patch_req).await.unwrap();

        let activate_req = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/staged/activation")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(activate_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let active_req = Request::builder()
            .method(Method::GET)
            .uri("/x-nmos/connection/v1.3/single/receivers/33333333-3333-3333-3333-333333333333/active")
            .body(Body::empty())
            .unwrap();
        let active = json_body(router.oneshot(active_req).await.unwrap()).await;
        assert!(!active["master_enable"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn bulk_endpoints_return_405_on_get_and_501_on_post() {
        let daemon = MockServer::start().await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let get_req = Request::builder()
            .method(Method::GET)
            .uri("/x-nmos/connection/v1.3/bulk/receivers")
            .body(Body::empty())
            .unwrap();
        let get_resp = router.clone().oneshot(get_req).await.unwrap();
        assert_eq!(get_resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let post_req = Request::builder()
            .method(Method::POST)
            .uri("/x-nmos/connection/v1.3/bulk/receivers")
            .body(Body::empty())
            .unwrap();
        let post_resp = router.oneshot(post_req).await.unwrap();
        assert_eq!(post_resp.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn base_traversal_lists_resources_and_single_receiver() {
        let daemon = MockServer::start().await;
        let dir = tempdir().unwrap();
        let state = test_app_state(daemon.uri(), dir.path().join("runtime.json"));
        let router = create_router(state);

        let root_req = Request::builder()
            .uri("/x-nmos/connection/v1.3/")
            .body(Body::empty())
            .unwrap();
        let root = json_body(router.clone().oneshot(root_req).await.unwrap()).await;
        assert_eq!(root, json!(["bulk/", "single/"]));

        let receivers_req = Request::builder()
            .uri("/x-nmos/connection/v1.3/single/receivers")
            .body(Body::empty())
            .unwrap();
        let receivers = json_body(router.clone().oneshot(receivers_req).await.unwrap()).await;
        assert_eq!(
            receivers,
            json!(["33333333-3333-3333-3333-333333333333/"])
        );

        let senders_req = Request::builder()
            .uri("/x-nmos/connection/v1.3/single/senders")
            .body(Body::empty())
            .unwrap();
        let senders = json_body(router.oneshot(senders_req).await.unwrap()).await;
        assert_eq!(senders, json!([]));
    }
}
