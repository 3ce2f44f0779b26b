//! Best-effort detection of the IP address to advertise in NMOS resources.
//!
//! Opens a UDP socket, "connects" it toward the registry's host (UDP
//! connect never sends a packet, it just picks a route), then reads back
//! which local address the kernel would use to get there. Falls back to
//! loopback on any failure rather than propagating an error: an isolated
//! host still deserves a registrable (if unreachable) receiver.

use std::net::UdpSocket;

use crate::config::AppConfig;

/// Detects the local IP address the kernel would use to reach
/// `target_host:target_port`. Abstracted behind a trait so the IS-04
/// worker and Node API can be tested without touching real sockets.
pub trait IpDetector: Send + Sync {
    fn detect(&self, target_host: &str, target_port: u16) -> Result<String, String>;
}

/// Detector backed by a real UDP socket.
#[derive(Debug, Clone, Default)]
pub struct SystemIpDetector;

impl IpDetector for SystemIpDetector {
    fn detect(&self, target_host: &str, target_port: u16) -> Result<String, String> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| e.to_string())?;
        socket
            .connect((target_host, target_port))
            .map_err(|e| e.to_string())?;
        socket
            .local_addr()
            .map(|addr| addr.ip().to_string())
            .map_err(|e| e.to_string())
    }
}

/// Picks a detection target from the first configured static registry
/// URL, falling back to this host's own hostname.
fn detection_target(config: &AppConfig) -> (String, u16) {
    if let Some(raw) = config.registry.static_urls.first() {
        if let Ok(parsed) = url::Url::parse(raw) {
            if let Some(host) = parsed.host_str() {
                let port = parsed
                    .port_or_known_default()
                    .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
                return (host.to_string(), port);
            }
        }
    }
    (hostname_or_fallback(), 80)
}

fn hostname_or_fallback() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Detects the advertise IP for this config, logging and falling back to
/// `127.0.0.1` rather than failing.
pub fn detect_advertise_ip(detector: &dyn IpDetector, config: &AppConfig) -> String {
    let (host, port) = detection_target(config);
    match detector.detect(&host, port) {
        Ok(ip) => ip,
        Err(e) => {
            log::warn!("[IS-04] failed to detect advertise ip via {host}:{port} ({e}), falling back to 127.0.0.1");
            "127.0.0.1".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockIpDetector {
        result: Result<String, String>,
    }

    impl IpDetector for MockIpDetector {
        fn detect(&self, _target_host: &str, _target_port: u16) -> Result<String, String> {
            self.result.clone()
        }
    }

    #[test]
    fn falls_back_to_loopback_on_detection_failure() {
        let detector = MockIpDetector {
            result: Err("no interfaces".to_string()),
        };
        let config = AppConfig::default();
        assert_eq!(detect_advertise_ip(&detector, &config), "127.0.0.1");
    }

    #[test]
    fn returns_detected_ip_on_success() {
        let detector = MockIpDetector {
            result: Ok("192.168.1.50".to_string()),
        };
        let config = AppConfig::default();
        assert_eq!(detect_advertise_ip(&detector, &config), "192.168.1.50");
    }

    #[test]
    fn detection_target_prefers_static_registry_host() {
        let mut config = AppConfig::default();
        config.registry.static_urls.push("http://registry.local:8010/x-nmos/registration/v1.3".to_string());
        let (host, port) = detection_target(&config);
        assert_eq!(host, "registry.local");
        assert_eq!(port, 8010);
    }
}
