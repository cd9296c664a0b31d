use std::sync::Arc;

use tokio::sync::watch;

use courier_db::{init_database, CatalogStore, OutboxStore, SyncStore};
use courier_outbox::{LogSink, OutboxWorker, WorkerConfig};
use courier_server::{create_router, init_tracing, shutdown_signal, AppState, Config};
use courier_sync::{HttpProviderClient, SyncService};

#[tokio::main]
async fn main() {
    init_tracing();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: COURIER_DATABASE_URL, COURIER_LISTEN_ADDR, COURIER_PROVIDER_URL");
            eprintln!("Optional: COURIER_RUN_WORKER, COURIER_SYNC_INTERVAL_SECS");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Courier server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database: {}", config.database_url);

    let pool = match init_database(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Database migrations completed");

    // Embedded outbox worker
    let worker = if config.run_worker {
        let worker = Arc::new(OutboxWorker::new(
            OutboxStore::new(pool.clone()),
            Arc::new(LogSink),
            WorkerConfig {
                batch_size: config.outbox_batch_size,
                poll_interval: config.outbox_poll_interval,
                max_retries: config.outbox_max_retries,
                ..WorkerConfig::default()
            },
        ));
        let handle = worker.handle();
        let task = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });
        Some((handle, task))
    } else {
        None
    };

    // Periodic sync
    let (sync_stop_tx, sync_stop_rx) = watch::channel(false);
    let sync_task = match config.sync_interval {
        Some(interval) => {
            let provider =
                match HttpProviderClient::new(config.provider_url.clone(), config.provider_timeout) {
                    Ok(provider) => provider,
                    Err(e) => {
                        eprintln!("Provider client error: {}", e);
                        std::process::exit(1);
                    }
                };
            tracing::info!(
                "Syncing from {} every {}s",
                config.provider_url,
                interval.as_secs()
            );
            let service = SyncService::new(
                provider,
                CatalogStore::new(pool.clone()),
                SyncStore::new(pool.clone()),
            );
            Some(tokio::spawn(async move {
                service.run_periodic(interval, sync_stop_rx).await
            }))
        }
        None => None,
    };

    let state = AppState::new(pool, config.outbox_max_retries);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Background loops finish their current iteration before exiting
    sync_stop_tx.send_replace(true);
    if let Some((handle, task)) = worker {
        handle.stop();
        if let Err(e) = task.await {
            tracing::error!("Outbox worker task failed: {}", e);
        }
    }
    if let Some(task) = sync_task {
        if let Err(e) = task.await {
            tracing::error!("Sync task failed: {}", e);
        }
    }

    tracing::info!("Courier server stopped");
}
