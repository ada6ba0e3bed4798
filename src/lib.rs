//! tvproxy - local HLS proxy and metadata orchestrator
//!
//! Sits between a media player and an upstream HLS origin: rewrites manifests
//! so the player only ever talks to localhost, bounds upstream concurrency
//! per host, and scatter-gathers a title's metadata and subtitles before
//! playback starts.
//!
//! # Modules
//!
//! - `models` - shared domain models (variants, titles, subtitle tracks)
//! - `proxy` - token scheme, playlist filter/rewrite, governor, HTTP server
//! - `orchestrate` - parallel metadata/subtitle fetch with a gather deadline
//! - `stream` - local player launch and subtitle staging
//! - `config` - TOML configuration

pub mod config;
pub mod models;
pub mod orchestrate;
pub mod proxy;
pub mod stream;

// Re-export commonly used types
pub use config::Config;
pub use models::{Episode, Season, SubtitleTrack, TitleBundle, Variant};
pub use orchestrate::{AggregateResult, FetchTask, Orchestrator, TaskKind, TaskOutcome, TitleRequest};
pub use proxy::{Fetcher, Governor, Playlist, ProxyServer, ProxyToken};
pub use stream::{LocalPlayer, PlayRequest, PlayerType, SubtitleStore};
