use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("failed to launch player '{0}': {1}")]
    LaunchError(String, std::io::Error),
    #[error("player exited with status {0}")]
    Exited(i32),
}

/// Blocking media playback. Returns once the player has exited.
#[allow(async_fn_in_trait)]
pub trait Player {
    async fn play(&mut self, locator: &str, title: &str) -> Result<(), PlayerError>;
}

pub struct CommandPlayer {
    command: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    fn build_command(&self, locator: &str, title: &str) -> Command {
        let mut cmd = Command::new(&self.command);

        // Only add mpv-specific args if using mpv
        if self.command.contains("mpv") {
            cmd.arg(format!("--force-media-title={}", title));
        }

        if self.command.contains("vlc") {
            cmd.arg(format!("--meta-title={}", title));
            cmd.arg("--play-and-exit");
        }

        cmd.args(&self.args);
        cmd.arg(locator);
        cmd
    }
}

impl Player for CommandPlayer {
    async fn play(&mut self, locator: &str, title: &str) -> Result<(), PlayerError> {
        info!(player = %self.command, title, "launching player");

        // The player keeps the terminal so audio-only playback stays controllable
        let status = self
            .build_command(locator, title)
            .status()
            .await
            .map_err(|e| PlayerError::LaunchError(self.command.clone(), e))?;

        info!(title, "player exited");
        if status.success() {
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            warn!(code, "player reported failure");
            Err(PlayerError::Exited(code))
        }
    }
}
