use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use super::find_on_path;

const LOOP_BINARY: &str = "alsaloop";
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Owns the lifetime of the `alsaloop` subprocess bridging capture and
/// playback devices.
pub struct LoopController {
    capture_device: String,
    playback_device: String,
    buffer_ms: u32,
    extra_args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl LoopController {
    pub fn new(
        capture_device: impl Into<String>,
        playback_device: impl Into<String>,
        buffer_ms: u32,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            capture_device: capture_device.into(),
            playback_device: playback_device.into(),
            buffer_ms,
            extra_args,
            child: Mutex::new(None),
        }
    }

    /// Starts the loop process if it isn't already running. Logs and
    /// returns without error if the binary is missing from `PATH`.
    pub fn ensure_running(&self) {
        {
            let mut guard = self.child.lock();
            if let Some(child) = guard.as_mut() {
                if matches!(child.try_wait(), Ok(None)) {
                    return;
                }
                *guard = None;
            }
        }

        if find_on_path(LOOP_BINARY).is_none() {
            log::warn!("[Audio] {LOOP_BINARY} not found on PATH, audio bridge disabled");
            return;
        }

        let mut command = Command::new(LOOP_BINARY);
        command
            .arg("-C")
            .arg(&self.capture_device)
            .arg("-P")
            .arg(&self.playback_device)
            .arg("-t")
            .arg(self.buffer_ms.to_string())
            .args(&self.extra_args)
            .kill_on_drop(true);

        match command.spawn() {
            Ok(child) => {
                log::info!(
                    "[Audio] started {LOOP_BINARY}: {} -> {}",
                    self.capture_device,
                    self.playback_device
                );
                *self.child.lock() = Some(child);
            }
            Err(e) => log::error!("[Audio] failed to spawn {LOOP_BINARY}: {e}"),
        }
    }

    /// Stops the loop process if running: SIGTERM, then SIGKILL after a
    /// grace period.
    pub async fn stop(&self) {
        let child = self.child.lock().take();
        let Some(mut child) = child else {
            return;
        };

        if let Some(pid) = child.id() {
            // SAFETY: pid is the child's own pid, owned exclusively by us.
            let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if result != 0 {
                log::warn!(
                    "[Audio] failed to send SIGTERM to {LOOP_BINARY} (pid {pid}): {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        if timeout(STOP_GRACE, child.wait()).await.is_err() {
            log::warn!("[Audio] {LOOP_BINARY} did not exit in time, killing");
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}
