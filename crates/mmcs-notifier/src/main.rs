// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMCS notifier - marketplace watch notifications over Discord webhooks.
//!
//! This is the binary entry point for the notifier daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use mmcs_config::{load_config, resolve_store_key};
use mmcs_core::NotifierError;
use mmcs_discord::WebhookClient;
use mmcs_engine::Engine;
use mmcs_sendico::SendicoClient;
use mmcs_supabase::StoreClient;
use tracing::{error, info, warn};

/// MMCS notifier - marketplace watch notifications over Discord webhooks.
#[derive(Parser, Debug)]
#[command(name = "mmcs-notifier", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the notifier daemon (the default).
    Serve,
    /// Run startup diagnostics and exit.
    Doctor,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Doctor => doctor::run_doctor().await,
    };

    if let Err(e) = result {
        error!(error = %e, "fatal error, exiting");
        std::process::exit(1);
    }
}

/// Startup sequence: config, store key, schema verification, signing-secret
/// discovery, then the daemon loop. Any failure before the loop is fatal.
async fn serve() -> Result<(), NotifierError> {
    let config = load_config().map_err(|e| NotifierError::Config(e.to_string()))?;
    let api_key = resolve_store_key(&config)?;

    info!(store = %config.store.url, "starting MMCS notifier");

    let store = StoreClient::new(&config.store.url, &api_key)?;
    info!("verifying store schema");
    store.verify_schema().await?;
    match store.active_subscriber_count().await {
        Ok(count) => info!(count, "active subscribers with webhooks configured"),
        Err(e) => warn!(error = %e, "subscriber count probe failed"),
    }

    info!(aggregator = %config.sendico.base_url, "initializing aggregator client");
    let sendico = Arc::new(SendicoClient::new(&config.sendico.base_url).await?);

    let webhooks = WebhookClient::new()?;
    let engine = Arc::new(Engine::new(store, sendico, webhooks));

    tokio::select! {
        _ = Arc::clone(&engine).run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
