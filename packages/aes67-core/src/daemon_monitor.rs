//! Background poller that watches the audio daemon's sink presence, sink
//! status flags, and PTP lock state, logging transitions only, without
//! surfacing transient failures to any HTTP caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::daemon::DaemonClient;

const WARN_AT_FAILURE_COUNTS: [u32; 3] = [1, 5, 20];

struct MonitorState {
    sink_present: Option<bool>,
    sink_flags: Option<Value>,
    ptp_status: Option<Value>,
}

pub struct DaemonMonitor {
    daemon: Arc<DaemonClient>,
    sink_id: u32,
    poll_interval: Duration,
    stop_flag: AtomicBool,
    stop_notify: Notify,
    last: Mutex<MonitorState>,
    consecutive_failures: Mutex<u32>,
}

impl DaemonMonitor {
    pub fn new(daemon: Arc<DaemonClient>, sink_id: u32, poll_interval: Duration) -> Self {
        Self {
            daemon,
            sink_id,
            poll_interval,
            stop_flag: AtomicBool::new(false),
            stop_notify: Notify::new(),
            last: Mutex::new(MonitorState {
                sink_present: None,
                sink_flags: None,
                ptp_status: None,
            }),
            consecutive_failures: Mutex::new(0),
        }
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    pub async fn run(&self) {
        log::info!("[Daemon] monitor started, polling every {:?}", self.poll_interval);
        while !self.stop_flag.load(Ordering::SeqCst) {
            self.poll_once().await;
            let _ = tokio::time::timeout(self.poll_interval, self.stop_notify.notified()).await;
        }
        log::info!("[Daemon] monitor stopping");
    }

    async fn poll_once(&self) {
        match self.poll_fallible().await {
            Ok(()) => {
                let mut failures = self.consecutive_failures.lock().await;
                if *failures > 0 {
                    log::info!("[Daemon] recovered after {failures} consecutive failure(s)");
                }
                *failures = 0;
            }
            Err(e) => {
                let mut failures = self.consecutive_failures.lock().await;
                *failures += 1;
                if WARN_AT_FAILURE_COUNTS.contains(&*failures) {
                    log::warn!("[Daemon] poll failed ({} consecutive): {e}", *failures);
                }
            }
        }
    }

    async fn poll_fallible(&self) -> Result<(), crate::error::DaemonError> {
        let sinks = self.daemon.list_sinks().await?;
        let present = sink_present(&sinks, self.sink_id);

        let mut last = self.last.lock().await;
        if last.sink_present != Some(present) {
            log::info!("[Daemon] sink {} presence changed: {}", self.sink_id, present);
            last.sink_present = Some(present);
        }

        if present {
            if let Some(status) = self.daemon.fetch_sink_status(self.sink_id).await? {
                let flags = status.raw.get("sink_flags").cloned().unwrap_or(Value::Null);
                if last.sink_flags.as_ref() != Some(&flags) {
                    log::info!("[Daemon] sink {} flags changed: {flags}", self.sink_id);
                    last.sink_flags = Some(flags);
                }
            }
        }
        drop(last);

        let ptp = self.daemon.fetch_ptp_status().await?;
        let mut last = self.last.lock().await;
        if last.ptp_status.as_ref() != Some(&ptp.raw) {
            log::info!("[Daemon] PTP status changed: {}", ptp.raw);
            last.ptp_status = Some(ptp.raw);
        }
        Ok(())
    }
}

fn sink_present(sinks: &Value, sink_id: u32) -> bool {
    sinks
        .get("sinks")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter().any(|sink| {
                sink.get("id")
                    .and_then(Value::as_u64)
                    .map(|id| id == sink_id as u64)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn warn_thresholds_are_1_5_20() {
        assert_eq!(WARN_AT_FAILURE_COUNTS, [1, 5, 20]);
    }

    #[test]
    fn sink_present_matches_by_id() {
        let sinks = json!({"sinks": [{"id": 0}, {"id": 2}]});
        assert!(sink_present(&sinks, 0));
        assert!(sink_present(&sinks, 2));
        assert!(!sink_present(&sinks, 1));
    }

    #[test]
    fn sink_present_is_false_on_malformed_payload() {
        assert!(!sink_present(&json!({}), 0));
    }
}
