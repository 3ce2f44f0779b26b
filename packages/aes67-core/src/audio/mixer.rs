use tokio::process::Command;

use super::find_on_path;

const MIXER_BINARY: &str = "amixer";

/// Drives `amixer` to adjust volume and mute state on a set of named
/// mixer controls. Never fails the caller: a missing binary or a
/// nonzero exit is logged and swallowed.
pub struct MixerController {
    card: String,
    controls: Vec<String>,
}

impl MixerController {
    pub fn new(card: impl Into<String>, controls: Vec<String>) -> Self {
        Self {
            card: card.into(),
            controls,
        }
    }

    pub async fn set_volume(&self, percent: u8) {
        let percent = percent.min(100);
        for control in &self.controls {
            self.run(&[
                "-c",
                &self.card,
                "set",
                control,
                &format!("{percent}%"),
            ])
            .await;
        }
    }

    pub async fn set_mute(&self, mute: bool) {
        let action = if mute { "mute" } else { "unmute" };
        for control in &self.controls {
            self.run(&["-c", &self.card, "set", control, action]).await;
        }
    }

    async fn run(&self, args: &[&str]) {
        if find_on_path(MIXER_BINARY).is_none() {
            log::warn!("[Audio] {MIXER_BINARY} not found on PATH, skipping mixer control");
            return;
        }
        match Command::new(MIXER_BINARY).args(args).output().await {
            Ok(output) if output.status.success() => {}
            Ok(output) => log::error!(
                "[Audio] {MIXER_BINARY} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
            Err(e) => log::error!("[Audio] failed to run {MIXER_BINARY}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_volume_clamps_above_100() {
        let mixer = MixerController::new("1", vec!["DAC LEFT LINEOUT".to_string()]);
        // Exercised only for the clamp; no real amixer binary in CI sandboxes.
        mixer.set_volume(255).await;
    }
}
