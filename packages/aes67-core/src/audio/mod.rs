//! Capture-to-playback audio bridge: a looped subprocess copying audio
//! between ALSA devices, plus a mixer controller for volume/mute.
//!
//! Both controllers degrade gracefully when their binary isn't on PATH:
//! they log a warning and no-op rather than failing the activation that
//! called them. A bridge with no loop binary installed is a degraded but
//! still-registrable receiver.

mod loop_controller;
mod mixer;

pub use loop_controller::LoopController;
pub use mixer::MixerController;

/// Searches `PATH` for an executable of the given name.
fn find_on_path(binary: &str) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_on_path_returns_none_for_nonexistent_binary() {
        assert!(find_on_path("definitely-not-a-real-binary-xyz").is_none());
    }
}
