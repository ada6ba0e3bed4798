//! Subtitle normalization and on-disk staging
//!
//! Upstream tracks usually arrive as SRT; local players are happiest with
//! WebVTT, so everything is normalized on the way through. Tracks handed to a
//! player need to exist as files, staged under ~/.cache/tvproxy/subtitles/.

use std::path::PathBuf;

use anyhow::Result;

use crate::models::SubtitleTrack;

/// Convert SRT content to WebVTT format.
///
/// Converts SRT timestamps (00:00:00,000) to WebVTT form (00:00:00.000) and
/// adds the required WEBVTT header. Dialogue lines pass through untouched.
pub fn srt_to_webvtt(srt: &str) -> String {
    let mut webvtt = String::from("WEBVTT\n\n");
    for line in srt.lines() {
        if line.contains(" --> ") {
            webvtt.push_str(&line.replace(',', "."));
        } else {
            webvtt.push_str(line);
        }
        webvtt.push('\n');
    }
    webvtt
}

/// Normalize a fetched subtitle body to WebVTT, passing through bodies that
/// already are
pub fn normalize_to_vtt(body: &str) -> String {
    if body.trim_start().starts_with("WEBVTT") {
        body.to_string()
    } else {
        srt_to_webvtt(body)
    }
}

/// Convert a 3-letter language code to a display name
pub fn lang_code_to_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "eng" => "English".to_string(),
        "spa" => "Spanish".to_string(),
        "fre" | "fra" => "French".to_string(),
        "ger" | "deu" => "German".to_string(),
        "ita" => "Italian".to_string(),
        "por" | "pob" => "Portuguese".to_string(),
        "rus" => "Russian".to_string(),
        "jpn" => "Japanese".to_string(),
        "kor" => "Korean".to_string(),
        "chi" | "zho" => "Chinese".to_string(),
        "ara" => "Arabic".to_string(),
        "hin" => "Hindi".to_string(),
        "dut" | "nld" => "Dutch".to_string(),
        "pol" => "Polish".to_string(),
        "tur" => "Turkish".to_string(),
        "swe" => "Swedish".to_string(),
        "vie" => "Vietnamese".to_string(),
        "tha" => "Thai".to_string(),
        "ind" => "Indonesian".to_string(),
        _ => code.to_uppercase(),
    }
}

/// Stages gathered subtitle tracks as files a player can load
pub struct SubtitleStore {
    cache_dir: PathBuf,
}

impl SubtitleStore {
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("tvproxy")
            .join("subtitles");
        Self { cache_dir }
    }

    /// Create with a custom directory (for testing)
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Write one track to disk, returning the path to hand to the player
    pub fn stage(&self, track: &SubtitleTrack) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_dir.join(format!("{}.vtt", track.language));
        std::fs::write(&path, &track.body)?;
        Ok(path)
    }

    /// Stage every track, skipping ones that fail to write
    pub fn stage_all(&self, tracks: &[SubtitleTrack]) -> Vec<PathBuf> {
        tracks
            .iter()
            .filter_map(|track| self.stage(track).ok())
            .collect()
    }
}

impl Default for SubtitleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srt_to_webvtt_converts_timestamps_only() {
        let srt = "1\n00:00:01,000 --> 00:00:04,000\nHello, world\n";
        let vtt = srt_to_webvtt(srt);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:04.000"));
        // Dialogue commas untouched.
        assert!(vtt.contains("Hello, world"));
    }

    #[test]
    fn test_normalize_passes_vtt_through() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHi\n";
        assert_eq!(normalize_to_vtt(vtt), vtt);
    }

    #[test]
    fn test_lang_code_to_name() {
        assert_eq!(lang_code_to_name("eng"), "English");
        assert_eq!(lang_code_to_name("SPA"), "Spanish");
        assert_eq!(lang_code_to_name("xyz"), "XYZ");
    }
}
