//! tvproxy - local HLS proxy for streaming through mpv/VLC
//!
//! # Usage
//!
//! ```bash
//! # Show the variants the proxy would expose
//! tvproxy probe https://cdn.example.com/master.m3u8
//!
//! # Serve a stream locally, point any player at the printed URL
//! tvproxy proxy https://cdn.example.com/master.m3u8
//!
//! # Proxy and launch mpv, with a subtitle track gathered up front
//! tvproxy play https://cdn.example.com/master.m3u8 \
//!     --sub eng=https://subs.example.com/eng.srt
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tvproxy::config::Config;

use crate::cli::{Cli, Command, Output};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::new(&cli);
    let config = Config::load();

    let exit_code = match cli.command {
        Command::Probe(args) => commands::probe_cmd(args, &config, &output).await,
        Command::Proxy(args) => commands::proxy_cmd(args, &config, &output).await,
        Command::Play(args) => commands::play_cmd(args, &config, &output).await,
    };
    std::process::exit(exit_code.into());
}
