//! CLI command implementations

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use tvproxy::config::Config;
use tvproxy::orchestrate::{Orchestrator, TitleRequest};
use tvproxy::proxy::playlist::{filter_variants, Playlist, PlaylistKind};
use tvproxy::proxy::{Fetcher, Governor, ProxyServer, ProxyToken};
use tvproxy::stream::{LocalPlayer, PlayRequest, PlayerType, SubtitleStore};

use crate::cli::{parse_subtitle_spec, ExitCode, Output, PlayArgs, StreamArgs};

fn token_for(args: &StreamArgs) -> ProxyToken {
    ProxyToken::with_headers(args.url.clone(), args.referer.clone(), args.cookie.clone())
}

/// `probe` - show the variants the proxy would expose
pub async fn probe_cmd(args: StreamArgs, config: &Config, output: &Output) -> ExitCode {
    let fetcher = Fetcher::new(config.fetch_timeout());
    let token = token_for(&args);

    let (body, _content_type) = match fetcher.fetch(&token).await {
        Ok(ok) => ok,
        Err(e) => return output.error(e, ExitCode::NetworkError),
    };
    let playlist = match Playlist::parse(&String::from_utf8_lossy(&body)) {
        Ok(playlist) => playlist,
        Err(e) => return output.error(e, ExitCode::Error),
    };

    if playlist.kind() == PlaylistKind::Media {
        output.emit(
            "media playlist (no variants to filter)",
            &json!({ "kind": "media", "variants": [] }),
        );
        return ExitCode::Success;
    }

    let limit = args.limit.unwrap_or_else(|| config.variant_limit());
    let kept = filter_variants(&playlist.variants(), limit);
    if kept.is_empty() {
        return output.error("master playlist listed no variants", ExitCode::NoVariants);
    }

    let human = kept
        .iter()
        .map(|v| format!("  {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    output.emit(
        &format!("exposing {} of {} variants:\n{}", kept.len(), playlist.variants().len(), human),
        &json!({ "kind": "master", "total": playlist.variants().len(), "variants": kept }),
    );
    ExitCode::Success
}

/// `proxy` - serve a stream locally until interrupted
pub async fn proxy_cmd(args: StreamArgs, config: &Config, output: &Output) -> ExitCode {
    let limit = args.limit.unwrap_or_else(|| config.variant_limit());
    let token = token_for(&args);

    let server = match start_server(config, limit).await {
        Ok(server) => server,
        Err(e) => return output.error(e, ExitCode::Error),
    };

    let local = server.local_url(&token);
    output.essential(
        &format!("serving {}\n  play: {}", args.url, local),
        &json!({ "upstream": args.url, "local_url": local, "port": server.port() }),
    );

    // Serve until Ctrl-C; the player polls playlists and segments live.
    if tokio::signal::ctrl_c().await.is_err() {
        return ExitCode::Error;
    }
    info!("shutting down");
    ExitCode::Success
}

/// `play` - proxy a stream and launch the local player on it
pub async fn play_cmd(args: PlayArgs, config: &Config, output: &Output) -> ExitCode {
    let mut subtitle_urls = Vec::new();
    for spec in &args.subtitles {
        match parse_subtitle_spec(spec) {
            Ok(pair) => subtitle_urls.push(pair),
            Err(e) => return output.error(e, ExitCode::InvalidArgs),
        }
    }

    let player_type = match &args.player {
        Some(name) => match PlayerType::from_name(name) {
            Some(p) => p,
            None => {
                return output.error(
                    format!("unknown player '{name}' (expected mpv or vlc)"),
                    ExitCode::InvalidArgs,
                )
            }
        },
        None => config
            .preferred_player
            .as_deref()
            .and_then(PlayerType::from_name)
            .unwrap_or_default(),
    };

    let player = LocalPlayer::new(player_type);
    if !player.is_available().await {
        return output.error(
            format!("{player_type} not found in PATH"),
            ExitCode::PlayerNotFound,
        );
    }

    let limit = args.stream.limit.unwrap_or_else(|| config.variant_limit());
    let token = token_for(&args.stream);

    let fetcher = Arc::new(Fetcher::new(config.fetch_timeout()));
    let governor = Arc::new(Governor::new(config.host_capacity, config.acquire_timeout()));
    let server = match ProxyServer::start(Arc::clone(&fetcher), Arc::clone(&governor), limit).await
    {
        Ok(server) => server,
        Err(e) => return output.error(e, ExitCode::Error),
    };

    // Gather subtitles up front; partial failure just means fewer tracks.
    let mut subtitle_paths = Vec::new();
    if !subtitle_urls.is_empty() {
        let orchestrator = Orchestrator::new(fetcher, governor);
        let bundle = orchestrator
            .open_title(
                TitleRequest {
                    title: args.title.clone().unwrap_or_default(),
                    context: token.clone(),
                    season_urls: Vec::new(),
                    subtitle_urls,
                },
                config.gather_deadline(),
            )
            .await;
        for (id, reason) in &bundle.failures {
            output.emit(
                &format!("warning: {id} unavailable ({reason})"),
                &json!({ "warning": { "task": id, "reason": reason } }),
            );
        }
        subtitle_paths = SubtitleStore::new().stage_all(&bundle.subtitles);
    }

    let local = server.local_url(&token);
    output.emit(
        &format!("launching {player_type} on {local}"),
        &json!({ "player": player_type.to_string(), "local_url": local }),
    );

    let request = PlayRequest {
        stream_url: local,
        title: args.title,
        subtitle_paths,
        extra_args: config.player_args.clone(),
    };
    match player.play_and_wait(&request).await {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(e, ExitCode::Error),
    }
}

async fn start_server(config: &Config, limit: usize) -> std::io::Result<ProxyServer> {
    let fetcher = Arc::new(Fetcher::new(config.fetch_timeout()));
    let governor = Arc::new(Governor::new(config.host_capacity, config.acquire_timeout()));
    ProxyServer::start(fetcher, governor, limit).await
}
