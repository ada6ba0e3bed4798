//! Local HLS proxy
//!
//! - Token: stateless encoding of upstream URLs into proxy-local paths
//! - Playlist: master/media parsing and variant filtering
//! - Rewrite: manifest rewriting toward localhost
//! - Fetch: upstream HTTP with a typed error taxonomy
//! - Governor: bounded per-host upstream concurrency
//! - Server: the axum front the player talks to

pub mod fetch;
pub mod governor;
pub mod playlist;
pub mod rewrite;
pub mod server;
pub mod token;

pub use fetch::{FetchError, Fetcher};
pub use governor::{Governor, GovernorError, Slot, DEFAULT_HOST_CAPACITY};
pub use playlist::{filter_variants, Playlist, PlaylistError, PlaylistKind, DEFAULT_VARIANT_LIMIT};
pub use rewrite::{resolve_reference, rewrite_playlist, RewriteError};
pub use server::{ProxyError, ProxyServer, ProxyState, HLS_CONTENT_TYPE};
pub use token::{ProxyToken, TokenError};
