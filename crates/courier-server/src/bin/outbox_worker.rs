//! Long-running outbox delivery worker.
//!
//! Usage:
//!   outbox-worker --batch-size 100 --poll-interval 1

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use courier_db::{init_database, OutboxStore};
use courier_outbox::{LogSink, OutboxWorker, WorkerConfig};
use courier_server::{init_tracing, shutdown_signal, Config};

#[derive(Parser, Debug)]
#[command(name = "outbox-worker")]
#[command(about = "Deliver pending outbox messages until stopped")]
struct Args {
    /// Messages claimed per batch
    #[arg(long)]
    batch_size: Option<u32>,

    /// Seconds to wait when the outbox is empty
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Delivery attempts before a message is left as failed
    #[arg(long)]
    max_retries: Option<u32>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let batch_size = args.batch_size.unwrap_or(config.outbox_batch_size);
    if batch_size == 0 {
        eprintln!("--batch-size must be greater than zero");
        std::process::exit(2);
    }

    let pool = match init_database(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let worker = OutboxWorker::new(
        OutboxStore::new(pool),
        Arc::new(LogSink),
        WorkerConfig {
            batch_size,
            poll_interval: args
                .poll_interval
                .map(Duration::from_secs)
                .unwrap_or(config.outbox_poll_interval),
            max_retries: args.max_retries.unwrap_or(config.outbox_max_retries),
            ..WorkerConfig::default()
        },
    );

    let handle = worker.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.stop();
    });

    worker.run().await;
}
