//! One-shot sync from the external event provider.
//!
//! Usage:
//!   sync-events [--all]

use std::process::ExitCode;

use clap::Parser;

use courier_db::{init_database, CatalogStore, SyncStore};
use courier_server::{init_tracing, Config};
use courier_sync::{HttpProviderClient, SyncService};

#[derive(Parser, Debug)]
#[command(name = "sync-events")]
#[command(about = "Sync events from the external provider")]
struct Args {
    /// Ignore the last sync date and pull everything
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pool = match init_database(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let provider = match HttpProviderClient::new(config.provider_url, config.provider_timeout) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Provider client error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = SyncService::new(
        provider,
        CatalogStore::new(pool.clone()),
        SyncStore::new(pool),
    );

    if args.all {
        println!("Starting full sync...");
    } else {
        println!("Starting incremental sync...");
    }

    match service.perform_sync(args.all).await {
        Ok(result) if result.is_success => {
            println!(
                "Sync completed: {} new events, {} updated events",
                result.new_events_count, result.updated_events_count
            );
            ExitCode::SUCCESS
        }
        Ok(result) => {
            eprintln!("Sync failed: {}", result.error_message);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Sync failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
