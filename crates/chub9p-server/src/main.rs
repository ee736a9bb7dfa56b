//! chub9p server binary
//!
//! Serves the Chub content API as a 9P filesystem.
//!
//! ## Usage
//!
//! ```bash
//! # Remote API on the standard 9P port
//! CHUB_API_KEY=... chub9p
//!
//! # Offline, from a fixture file, on an unprivileged port
//! chub9p --fixtures fixtures.json --bind 127.0.0.1 --port 5640
//!
//! # Mount it (Linux v9fs)
//! mount -t 9p -o trans=tcp,port=5640 127.0.0.1 /mnt/chub
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chub9p_server::constants::API_KEY_ENV;
use chub9p_server::{build_fetcher, NinepServer, Overrides, ServerConfig};

/// 9P gateway for the Chub content API.
#[derive(Parser, Debug)]
#[command(name = "chub9p")]
#[command(about = "Serve Chub characters, lorebooks, and chats over 9P")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (default 0.0.0.0)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// TCP port to listen on (default 564)
    #[arg(short, long)]
    port: Option<u16>,

    /// Base URL of the content API
    #[arg(long)]
    api_base: Option<String>,

    /// Serve records from a JSON fixture file instead of the API
    #[arg(long)]
    fixtures: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let overrides = Overrides {
        bind: args.bind,
        port: args.port,
        api_base: args.api_base,
        fixtures: args.fixtures,
    };

    let config = match ServerConfig::load(
        args.config.as_deref(),
        std::env::var(API_KEY_ENV).ok(),
        &overrides,
    ) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "loaded configuration");

    let fetcher = match build_fetcher(&config) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            tracing::error!("Failed to set up fetcher: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = NinepServer::new(config, fetcher).run().await {
        tracing::error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
