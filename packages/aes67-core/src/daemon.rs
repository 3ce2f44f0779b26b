//! Client for the local AES67 audio daemon's REST API.
//!
//! All operations serialize through a single async mutex: the daemon's
//! sink configuration is a shared mutable resource and two concurrent
//! upserts racing would leave it in an ambiguous state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::DaemonError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters for creating or replacing a daemon sink.
#[derive(Debug, Clone, Serialize)]
pub struct SinkUpsert {
    pub use_sdp: bool,
    pub sdp: String,
    pub map: Vec<u32>,
    pub delay: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkStatus {
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PtpStatus {
    #[serde(flatten)]
    pub raw: Value,
}

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
    lock: Mutex<()>,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("daemon http client"),
            lock: Mutex::new(()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Creates or replaces the sink's transport configuration.
    pub async fn upsert_sink(&self, sink_id: u32, params: &SinkUpsert) -> Result<(), DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .http
            .put(self.url(&format!("/api/sink/{sink_id}")))
            .json(params)
            .send()
            .await?;
        ensure_success(resp).await.map(|_| ())
    }

    /// Removes a sink. Tolerates 200/204/404. Deleting an absent sink is a no-op.
    pub async fn delete_sink(&self, sink_id: u32) -> Result<(), DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .http
            .delete(self.url(&format!("/api/sink/{sink_id}")))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DaemonError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn list_sinks(&self) -> Result<Value, DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self.http.get(self.url("/api/sinks")).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetches the sink's live status. `None` means the sink hasn't been
    /// configured on the daemon yet (400/404), not a transport failure.
    pub async fn fetch_sink_status(&self, sink_id: u32) -> Result<Option<SinkStatus>, DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .http
            .get(self.url(&format!("/api/sink/status/{sink_id}")))
            .send()
            .await?;
        let status = resp.status();
        if status.as_u16() == 400 || status.as_u16() == 404 {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        Ok(Some(resp.json().await?))
    }

    pub async fn fetch_config(&self) -> Result<Value, DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self.http.get(self.url("/api/config")).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_ptp_status(&self) -> Result<PtpStatus, DaemonError> {
        let _guard = self.lock.lock().await;
        let resp = self.http.get(self.url("/api/ptp/status")).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }
}

/// Projects the daemon's raw PTP status into the NMOS clock shape shared
/// by the Node API and the IS-04 registration worker. Best-effort: any
/// daemon failure or malformed gmid degrades to the unlocked placeholder
/// rather than propagating, since an NMOS resource must always be served.
pub async fn project_ptp_clock(daemon: &DaemonClient) -> Value {
    let (locked, gmid) = match daemon.fetch_ptp_status().await {
        Ok(status) => {
            let locked = status.raw.get("status").and_then(Value::as_str) == Some("locked");
            let gmid = crate::is04::coerce_ptp_gmid(status.raw.get("gmid").and_then(Value::as_str));
            (locked, gmid)
        }
        Err(_) => (false, crate::is04::coerce_ptp_gmid(None)),
    };
    serde_json::json!({
        "name": "clk0",
        "ref_type": "ptp",
        "traceable": locked,
        "version": "IEEE1588-2008",
        "gmid": gmid,
        "locked": locked,
    })
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, DaemonError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DaemonError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn url_joins_base_and_path() {
        let client = DaemonClient::new("http://127.0.0.1:8080/");
        assert_eq!(client.url("/api/sink/0"), "http://127.0.0.1:8080/api/sink/0");
    }

    #[tokio::test]
    async fn upsert_sink_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = DaemonClient::new(server.uri());
        let result = client
            .upsert_sink(
                0,
                &SinkUpsert {
                    use_sdp: true,
                    sdp: "v=0\r\n".to_string(),
                    map: vec![0, 0],
                    delay: 0,
                },
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn upsert_sink_fails_on_rejection_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(500).set_body_string("daemon busy"))
            .expect(1)
            .mount(&server)
            .await;
        let client = DaemonClient::new(server.uri());
        let result = client
            .upsert_sink(
                0,
                &SinkUpsert {
                    use_sdp: true,
                    sdp: "v=0\r\n".to_string(),
                    map: vec![0, 0],
                    delay: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(DaemonError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn delete_sink_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/sink/0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = DaemonClient::new(server.uri());
        assert!(client.delete_sink(0).await.is_ok());
    }

    #[tokio::test]
    async fn fetch_sink_status_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sink/status/0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = DaemonClient::new(server.uri());
        assert!(client.fetch_sink_status(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_sink_status_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sink/status/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sink_flags": {"active": true}
            })))
            .mount(&server)
            .await;
        let client = DaemonClient::new(server.uri());
        let status = client.fetch_sink_status(0).await.unwrap().unwrap();
        assert_eq!(status.raw["sink_flags"]["active"], serde_json::json!(true));
    }
}
