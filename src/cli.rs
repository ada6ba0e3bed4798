//! CLI - command line interface for tvproxy
//!
//! Every operation is scriptable and all output is JSON-parseable with
//! `--json`, so the proxy can sit under a TUI or any other front end.
//!
//! # Examples
//!
//! ```bash
//! # Inspect which variants the proxy would expose
//! tvproxy probe https://cdn.example.com/master.m3u8
//!
//! # Serve a stream and print the local playback URL
//! tvproxy proxy https://cdn.example.com/master.m3u8 --referer https://watch.example.com/
//!
//! # Proxy and launch the local player in one go
//! tvproxy play https://cdn.example.com/master.m3u8 --sub eng=https://subs.example.com/eng.srt
//! ```

use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network / upstream error
    NetworkError = 3,
    /// Requested player not installed
    PlayerNotFound = 4,
    /// Master playlist listed no variants
    NoVariants = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Local HLS proxy and metadata orchestrator for mpv/VLC playback
#[derive(Parser, Debug)]
#[command(
    name = "tvproxy",
    version,
    about = "Local HLS proxy for streaming through mpv/VLC",
    long_about = "Rewrites HLS manifests so your player only talks to localhost, \
                  bounds upstream connections per host, and fetches a title's \
                  metadata and subtitles in parallel before playback."
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the variants the proxy would expose for a master playlist
    Probe(StreamArgs),

    /// Start the proxy for a stream and print the local playback URL
    Proxy(StreamArgs),

    /// Proxy a stream and launch the local player on it
    Play(PlayArgs),
}

/// Arguments identifying one upstream stream
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Upstream master playlist URL
    pub url: String,

    /// Referer header the origin requires
    #[arg(long)]
    pub referer: Option<String>,

    /// Cookie header the origin requires
    #[arg(long)]
    pub cookie: Option<String>,

    /// Maximum variants exposed to the player
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Player to launch (mpv or vlc)
    #[arg(long, short = 'p')]
    pub player: Option<String>,

    /// Window title for the player
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Subtitle track as lang=url (repeatable)
    #[arg(long = "sub", value_name = "LANG=URL")]
    pub subtitles: Vec<String>,
}

/// Parse a `lang=url` subtitle spec
pub fn parse_subtitle_spec(spec: &str) -> Result<(String, String), String> {
    match spec.split_once('=') {
        Some((lang, url)) if !lang.is_empty() && !url.is_empty() => {
            Ok((lang.to_string(), url.to_string()))
        }
        _ => Err(format!("invalid subtitle spec '{spec}', expected LANG=URL")),
    }
}

// =============================================================================
// Output helper
// =============================================================================

/// Routes human-readable vs JSON output
pub struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Emit a result in the selected format
    pub fn emit(&self, human: &str, json: &serde_json::Value) {
        if self.json {
            println!("{json}");
        } else if !self.quiet {
            println!("{human}");
        }
    }

    /// Always-printed line (e.g. the playback URL) regardless of quiet
    pub fn essential(&self, human: &str, json: &serde_json::Value) {
        if self.json {
            println!("{json}");
        } else {
            println!("{human}");
        }
    }

    /// Report an error and hand back the exit code
    pub fn error(&self, message: impl std::fmt::Display, code: ExitCode) -> ExitCode {
        if self.json {
            println!("{}", serde_json::json!({ "error": message.to_string() }));
        } else {
            eprintln!("error: {message}");
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subtitle_spec() {
        assert_eq!(
            parse_subtitle_spec("eng=https://subs.example.com/eng.srt").unwrap(),
            (
                "eng".to_string(),
                "https://subs.example.com/eng.srt".to_string()
            )
        );
        assert!(parse_subtitle_spec("eng").is_err());
        assert!(parse_subtitle_spec("=url").is_err());
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::NetworkError), 3);
    }
}
