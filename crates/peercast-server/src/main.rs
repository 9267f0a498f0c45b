//! # Peercast Server
//!
//! WebRTC signaling and chat relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! peercast
//!
//! # Run with custom config
//! peercast --config /path/to/peercast.toml
//!
//! # Run with environment variables
//! PEERCAST_PORT=8080 PEERCAST_ROOM_SECRET=changeme peercast
//!
//! # Issue a room token for local testing
//! peercast issue-token --room 3b9f4a1e-2c1d-4c55-8a9b-7e0a6f2d9c10 --user-id 1 --name Alice
//! ```

mod auth;
mod config;
mod handlers;
mod metrics;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use peercast_core::Account;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "peercast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "WebRTC signaling and chat relay")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay (default)
    Serve,
    /// Print a signed room token
    IssueToken {
        /// Room id (UUID)
        #[arg(long)]
        room: Uuid,
        /// Account id
        #[arg(long)]
        user_id: i64,
        /// Display name
        #[arg(long)]
        name: String,
        /// Avatar URL
        #[arg(long, default_value = "")]
        avatar: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peercast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };
    ensure!(
        !config.auth.room_secret.is_empty(),
        "Room secret is not configured (set [auth].room_secret or PEERCAST_ROOM_SECRET)"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("Starting Peercast server on {}:{}", config.host, config.port);

            // Initialize metrics
            metrics::init_metrics();

            handlers::run_server(config).await?;
        }
        Command::IssueToken {
            room,
            user_id,
            name,
            avatar,
        } => {
            let tokens = auth::RoomTokens::new(
                config.auth.room_secret.as_bytes(),
                Duration::from_secs(config.auth.token_ttl_secs),
            );
            let token = tokens
                .issue(&Account::new(user_id, name, avatar), &room.to_string())
                .context("Failed to issue room token")?;
            println!("{token}");
        }
    }

    Ok(())
}
