//! Playlist URL rewriting
//!
//! Rewrites every URI-bearing line and attribute of an HLS playlist into a
//! proxy-local `/hls/{token}` path, so the player only ever talks to
//! localhost. Non-URI syntax is preserved byte-for-byte: players parse
//! strictly and any tampering with tag ordering or attribute lists breaks
//! them. Master playlists are additionally variant-filtered on the way
//! through.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::proxy::playlist::{filter_variants, Playlist, PlaylistError, PlaylistKind};
use crate::proxy::token::ProxyToken;

/// Rewrite failures
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("malformed playlist: {0}")]
    MalformedPlaylist(#[from] PlaylistError),

    #[error("invalid playlist base URL: {0}")]
    InvalidBase(#[from] url::ParseError),
}

/// Matches `URI="..."` attributes in tag lines (#EXT-X-KEY, #EXT-X-MEDIA,
/// #EXT-X-MAP, #EXT-X-I-FRAME-STREAM-INF all carry one).
fn uri_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)([A-Z0-9-]*URI)="([^"]+)""#).expect("static regex"))
}

/// Resolve a playlist reference against the playlist's own URL.
///
/// Handles the authority-less `https:///path` URLs some origins emit by
/// re-attaching the base URL's authority.
pub fn resolve_reference(base: &Url, reference: &str) -> String {
    let reference = reference.trim();

    if let Some(rest) = reference.strip_prefix("https:///") {
        return format!("{}://{}/{}", base.scheme(), base.authority(), rest);
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    base.join(reference)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| reference.to_string())
}

/// Local proxy path for one upstream reference, carrying over the header
/// context of the playlist's own token
fn local_path(base: &Url, reference: &str, context: &ProxyToken) -> String {
    let absolute = resolve_reference(base, reference);
    format!("/hls/{}", context.rebase(absolute).encode())
}

/// Rewrite a fetched playlist for local serving.
///
/// `context` is the token the playlist itself was fetched through; its URL is
/// the resolution base and its header context is inherited by every rewritten
/// reference. Master playlists keep only the top `limit` variants.
pub fn rewrite_playlist(
    text: &str,
    context: &ProxyToken,
    limit: usize,
) -> Result<String, RewriteError> {
    let playlist = Playlist::parse(text)?;
    let base = Url::parse(&context.url)?;

    // Line indices belonging to variants the filter dropped.
    let dropped: HashSet<usize> = match playlist.kind() {
        PlaylistKind::Master => {
            let kept: HashSet<usize> = filter_variants(&playlist.variants(), limit)
                .into_iter()
                .map(|v| v.id)
                .collect();
            playlist
                .entries()
                .iter()
                .filter(|e| !kept.contains(&e.variant.id))
                .flat_map(|e| [e.tag_line, e.uri_line])
                .collect()
        }
        PlaylistKind::Media => HashSet::new(),
    };

    let mut out = Vec::with_capacity(playlist.lines().len());
    for (idx, line) in playlist.lines().iter().enumerate() {
        if dropped.contains(&idx) {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push(line.clone());
        } else if trimmed.starts_with('#') {
            out.push(rewrite_tag_line(line, &base, context));
        } else {
            out.push(local_path(&base, trimmed, context));
        }
    }

    let mut rewritten = out.join("\n");
    if text.ends_with('\n') {
        rewritten.push('\n');
    }
    Ok(rewritten)
}

/// Rewrite `URI="..."` attributes inside a tag line, leaving everything else
/// untouched
fn rewrite_tag_line(line: &str, base: &Url, context: &ProxyToken) -> String {
    uri_attr_regex()
        .replace_all(line, |caps: &regex::Captures<'_>| {
            format!(r#"{}="{}""#, &caps[1], local_path(base, &caps[2], context))
        })
        .into_owned()
}
