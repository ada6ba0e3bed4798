//! Data structures and types shared across tvproxy
//!
//! Contains the models used across the application organized by domain:
//! - **Playlist**: HLS variant metadata extracted from master playlists
//! - **Title**: seasons, episodes and subtitle tracks gathered before playback

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Playlist Models (HLS)
// =============================================================================

/// One variant entry from a master playlist.
///
/// `id` is the zero-based position of the entry in the source playlist and is
/// stable for the lifetime of one parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: usize,
    /// Absolute or relative URL of the media playlist for this variant.
    pub uri: String,
    /// Advertised bandwidth in bits per second, when present.
    pub bandwidth: Option<u64>,
    /// Advertised resolution string, e.g. "1920x1080".
    pub resolution: Option<String>,
    /// Audio rendition group id, when present.
    pub audio_group: Option<String>,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bw = self
            .bandwidth
            .map(|b| format!("{:.1} Mbps", b as f64 / 1_000_000.0))
            .unwrap_or_else(|| "unknown bitrate".to_string());
        match &self.resolution {
            Some(res) => write!(f, "{} ({})", res, bw),
            None => write!(f, "{}", bw),
        }
    }
}

// =============================================================================
// Title Models (metadata gathered at open time)
// =============================================================================

/// One episode of a season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub season: u32,
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub overview: String,
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02} {}", self.season, self.number, self.title)
    }
}

/// A season with its gathered episode list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub number: u32,
    pub episodes: Vec<Episode>,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Season {} ({} episodes)", self.number, self.episodes.len())
    }
}

/// A subtitle track fetched and normalized to WebVTT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// 3-letter language code, e.g. "eng".
    pub language: String,
    /// Human-readable language name for menus.
    pub label: String,
    /// WebVTT body, ready to hand to a player.
    pub body: String,
}

/// Everything gathered for a title before playback starts.
///
/// Partial success is normal: `failures` lists the tasks that failed or timed
/// out, and the caller proceeds with whatever seasons/subtitles arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TitleBundle {
    pub title: String,
    pub seasons: Vec<Season>,
    pub subtitles: Vec<SubtitleTrack>,
    /// Task id → failure reason for every task that did not succeed.
    pub failures: Vec<(String, String)>,
}

impl TitleBundle {
    /// True when nothing at all was gathered.
    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty() && self.subtitles.is_empty()
    }
}
