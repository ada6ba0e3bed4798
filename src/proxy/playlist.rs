//! HLS playlist parsing and variant filtering
//!
//! The playlist model is deliberately line-preserving: players parse manifests
//! strictly, so the rewriter downstream must be able to emit every non-URI
//! line byte-for-byte. Only `#EXT-X-STREAM-INF` entries get structured
//! attribute parsing, since variant selection needs their bandwidth.

use thiserror::Error;

use crate::models::Variant;

/// How many variants of a master playlist are exposed downstream by default.
///
/// Upstream manifests can list 8-12 renditions; players probing all of them
/// multiplies startup latency roughly linearly in variant count.
pub const DEFAULT_VARIANT_LIMIT: usize = 3;

/// Playlist parse failures
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("not an HLS playlist: missing #EXTM3U header")]
    MissingHeader,

    #[error("master playlist entry at line {line} has no URI")]
    DanglingVariant { line: usize },
}

/// Master playlists list variants; media playlists list segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Master,
    Media,
}

/// One master-playlist entry with the line positions it occupies
#[derive(Debug, Clone)]
pub(crate) struct VariantEntry {
    pub variant: Variant,
    /// Index of the `#EXT-X-STREAM-INF` line.
    pub tag_line: usize,
    /// Index of the URI line that follows it.
    pub uri_line: usize,
}

/// Line-preserving view of an HLS playlist
#[derive(Debug, Clone)]
pub struct Playlist {
    kind: PlaylistKind,
    lines: Vec<String>,
    entries: Vec<VariantEntry>,
}

impl Playlist {
    /// Parse playlist text, classifying it as master or media
    pub fn parse(text: &str) -> Result<Self, PlaylistError> {
        if !text.trim_start().starts_with("#EXTM3U") {
            return Err(PlaylistError::MissingHeader);
        }

        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let kind = if lines.iter().any(|l| l.starts_with("#EXT-X-STREAM-INF")) {
            PlaylistKind::Master
        } else {
            PlaylistKind::Media
        };

        let mut entries = Vec::new();
        if kind == PlaylistKind::Master {
            let mut idx = 0;
            while idx < lines.len() {
                if lines[idx].starts_with("#EXT-X-STREAM-INF") {
                    let uri_line = next_uri_line(&lines, idx + 1)
                        .ok_or(PlaylistError::DanglingVariant { line: idx + 1 })?;
                    let attrs = parse_attribute_list(
                        lines[idx].splitn(2, ':').nth(1).unwrap_or_default(),
                    );
                    entries.push(VariantEntry {
                        variant: Variant {
                            id: entries.len(),
                            uri: lines[uri_line].trim().to_string(),
                            bandwidth: attr(&attrs, "BANDWIDTH").and_then(|v| v.parse().ok()),
                            resolution: attr(&attrs, "RESOLUTION").map(str::to_string),
                            audio_group: attr(&attrs, "AUDIO").map(str::to_string),
                        },
                        tag_line: idx,
                        uri_line,
                    });
                    idx = uri_line + 1;
                } else {
                    idx += 1;
                }
            }
        }

        Ok(Self {
            kind,
            lines,
            entries,
        })
    }

    pub fn kind(&self) -> PlaylistKind {
        self.kind
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Variants listed by a master playlist (empty for media playlists)
    pub fn variants(&self) -> Vec<Variant> {
        self.entries.iter().map(|e| e.variant.clone()).collect()
    }

    pub(crate) fn entries(&self) -> &[VariantEntry] {
        &self.entries
    }
}

/// Select the variants worth exposing downstream.
///
/// Sorts by bandwidth descending (stable, so ties keep their original relative
/// order; entries without a bandwidth rank last) and keeps the top `limit`.
/// Selection only: kept entries are returned untouched, because the player
/// uses their metadata for adaptive switching among the retained set.
pub fn filter_variants(variants: &[Variant], limit: usize) -> Vec<Variant> {
    let mut ranked: Vec<&Variant> = variants.iter().collect();
    ranked.sort_by(|a, b| match (a.bandwidth, b.bandwidth) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked.into_iter().take(limit).cloned().collect()
}

/// Find the next non-blank, non-tag line at or after `start`
fn next_uri_line(lines: &[String], start: usize) -> Option<usize> {
    (start..lines.len()).find(|&i| {
        let line = lines[i].trim();
        !line.is_empty() && !line.starts_with('#')
    })
}

/// Split an HLS attribute list into key/value pairs.
///
/// Commas inside quoted values (CODECS="avc1.64001f,mp4a.40.2") do not split.
fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        let value_rest = &rest[eq + 1..];
        let (value, remaining) = if let Some(stripped) = value_rest.strip_prefix('"') {
            match stripped.find('"') {
                Some(close) => (
                    stripped[..close].to_string(),
                    stripped[close + 1..].trim_start_matches(','),
                ),
                None => (stripped.to_string(), ""),
            }
        } else {
            match value_rest.find(',') {
                Some(comma) => (value_rest[..comma].to_string(), &value_rest[comma + 1..]),
                None => (value_rest.to_string(), ""),
            }
        };
        pairs.push((key, value));
        rest = remaining.trim_start();
    }
    pairs
}

fn attr<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
