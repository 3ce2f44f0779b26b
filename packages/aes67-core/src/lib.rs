//! Core control-plane library: bridges a local AES67 audio daemon into
//! NMOS IS-04 discovery/registration and IS-05 connection management.

pub mod api;
pub mod audio;
pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod daemon_monitor;
pub mod error;
pub mod ip_detect;
pub mod is04;
pub mod protocol_constants;
pub mod receiver;
pub mod runtime;
pub mod sdp;
pub mod state;

pub use api::{create_router, AppState};
pub use bootstrap::{bootstrap, BootstrappedServices};
pub use config::AppConfig;
pub use error::{BridgeError, BridgeResult};
