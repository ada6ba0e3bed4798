//! Playback collaborators
//!
//! - Player: mpv/VLC launch against the proxy's local URL
//! - Subtitles: WebVTT normalization and on-disk staging

pub mod player;
pub mod subtitles;

pub use player::{LocalPlayer, PlayRequest, PlayerError, PlayerType};
pub use subtitles::SubtitleStore;
