//! Local player launch - mpv/VLC playback support
//!
//! The player is always pointed at the proxy's local URL, never upstream; any
//! referer/user-agent an origin needs travels inside proxy tokens, so the
//! player itself needs no header flags for the stream. Subtitle tracks are
//! passed as staged files.

use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Supported local players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    /// mpv media player (default)
    #[default]
    Mpv,
    /// VLC media player
    Vlc,
}

impl PlayerType {
    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Mpv => "mpv",
            PlayerType::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Mpv => "mpv",
            PlayerType::Vlc => "VLC",
        }
    }

    /// Parse a config/CLI player name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mpv" => Some(PlayerType::Mpv),
            "vlc" => Some(PlayerType::Vlc),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Errors from local player operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
}

/// What to play and how
#[derive(Debug, Clone, Default)]
pub struct PlayRequest {
    /// The local proxy URL to stream.
    pub stream_url: String,
    /// Window/OSD title.
    pub title: Option<String>,
    /// Staged subtitle files to load.
    pub subtitle_paths: Vec<PathBuf>,
    /// Extra player arguments from config.
    pub extra_args: Vec<String>,
}

/// Local player for streaming content
pub struct LocalPlayer {
    player_type: PlayerType,
}

impl LocalPlayer {
    pub fn new(player_type: PlayerType) -> Self {
        Self { player_type }
    }

    pub fn mpv() -> Self {
        Self::new(PlayerType::Mpv)
    }

    pub fn vlc() -> Self {
        Self::new(PlayerType::Vlc)
    }

    pub fn player_type(&self) -> PlayerType {
        self.player_type
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let cmd = self.player_type.command();

        // Full path (macOS app bundle): check it exists directly
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build the argument list for a request (separated out for testing)
    pub fn build_args(&self, request: &PlayRequest) -> Vec<String> {
        let mut args = vec![request.stream_url.clone()];
        match self.player_type {
            PlayerType::Mpv => {
                args.push("--force-window=immediate".to_string());
                if let Some(title) = &request.title {
                    args.push(format!("--title={title}"));
                }
                for path in &request.subtitle_paths {
                    args.push(format!("--sub-file={}", path.display()));
                }
                if !request.subtitle_paths.is_empty() {
                    args.push("--sid=1".to_string());
                }
            }
            PlayerType::Vlc => {
                args.push("--no-video-title-show".to_string());
                if let Some(title) = &request.title {
                    args.push("--meta-title".to_string());
                    args.push(title.clone());
                }
                for path in &request.subtitle_paths {
                    args.push("--sub-file".to_string());
                    args.push(path.display().to_string());
                }
            }
        }
        args.extend(request.extra_args.iter().cloned());
        args
    }

    /// Spawn the player on a request
    pub async fn play(&self, request: &PlayRequest) -> Result<Child, PlayerError> {
        let mut cmd = Command::new(self.player_type.command());
        cmd.args(self.build_args(request));
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.player_type.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })
    }

    /// Play and wait for the player to close
    pub async fn play_and_wait(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        let mut child = self.play(request).await?;
        let _ = child.wait().await;
        Ok(())
    }
}
