//! Protocol-level constants shared across the control-plane surfaces.

/// DNS-SD service type advertised by NMOS registries.
pub const REGISTRY_SERVICE_TYPE: &str = "_nmos-registration._tcp.local.";

/// IS-04/IS-05 API versions this node understands, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["v1.3", "v1.2", "v1.1"];

/// Registration API version assumed when a registry is discovered via DNS-SD.
///
/// Controllers that need a different version are expected to redirect;
/// multi-version registry negotiation is out of scope here.
pub const REGISTRATION_API_VERSION: &str = "v1.3";

/// Default receiver caps media type, matching the Constraints response.
pub const DEFAULT_MEDIA_TYPE: &str = "audio/L24";

/// Placeholder PTP grandmaster id used when the daemon hasn't reported one.
pub const UNLOCKED_GMID: &str = "00-00-00-00-00-00-00-00";
