//! ImageFeed auth - OAuth2 login for the ImageFeed photo client
//!
//! Exchanges an Unsplash authorization code for a bearer token and keeps
//! it in the local credentials store.

mod auth;
mod config;
mod context;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{Session, TokenStore};
use crate::config::{Config, FileStore};
use crate::context::MainContext;

#[derive(Parser)]
#[command(name = "imagefeed-auth")]
#[command(about = "OAuth2 login for the ImageFeed photo client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "IMAGEFEED_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the consent page URL
    AuthorizeUrl,

    /// Exchange an authorization code for an access token
    Login {
        /// Authorization code, or the full redirect URL carrying it
        #[arg(short, long)]
        code: String,
    },

    /// Log out and clear the stored token
    Logout,

    /// Show current authentication status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    run(cli, Config::credentials_path()?).await
}

/// Dispatch a parsed command. Only the commands that talk to the
/// authorization server read the config file.
async fn run(cli: Cli, credentials: PathBuf) -> Result<()> {
    // This thread is the main context: exchange results are delivered here.
    let mut main_context = MainContext::new();
    let store = TokenStore::new(Arc::new(FileStore::new(credentials)));
    let session = Session::new(store.clone());

    match cli.command {
        Commands::AuthorizeUrl => {
            let settings = Config::load(cli.config.as_deref())?;
            auth::print_authorize_url(&settings)?;
        }
        Commands::Login { code } => {
            let settings = Config::load(cli.config.as_deref())?;
            tracing::info!("Starting authentication flow...");
            auth::login(&settings, store, &mut main_context, &code).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&session);
        }
        Commands::Status => {
            auth::status(&session);
        }
    }

    // Deliver anything still queued before the process exits.
    let late = main_context.run_pending();
    if late > 0 {
        tracing::debug!("Delivered {} queued callback(s) at shutdown", late);
    }

    Ok(())
}
