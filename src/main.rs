use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use xkcd_search::api::auth::Aaa;
use xkcd_search::api::{self, Pinger};
use xkcd_search::config;
use xkcd_search::events::{run_db_updated_subscriber, BusPublisher, EventBus};
use xkcd_search::search::{indexer, SearchService};
use xkcd_search::storage::Storage;
use xkcd_search::update::{UpdateService, XkcdClient};
use xkcd_search::words::WordsService;

/// Grace period between the shutdown signal and the hard stop.
const MAX_SHUTDOWN_TIME: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(about = "xkcd full-text search service")]
struct Args {
    /// Path to the YAML config file
    #[arg(long = "config", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("starting xkcd-search on {}", cfg.http.address);

    // Storage
    let storage = Arc::new(Storage::connect(&cfg.db.address).await?);
    storage.init_schema().await?;

    // Internal services
    let words = Arc::new(WordsService::new());
    let bus = EventBus::new();

    let updater = UpdateService::new(
        storage.clone(),
        Arc::new(XkcdClient::new(&cfg.xkcd.base_url, cfg.xkcd_timeout())?),
        words.clone(),
        BusPublisher::new(bus.clone()),
        cfg.xkcd.concurrency,
    )?;
    let searcher = SearchService::new(storage.clone(), words.clone());

    // Shutdown signal shared by the server, the indexer, and the subscriber
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Index rebuild triggers: ttl ticker and db.updated events
    tokio::spawn(indexer::run(
        searcher.clone(),
        cfg.index_ttl(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(run_db_updated_subscriber(
        bus.clone(),
        searcher.clone(),
        shutdown_rx.clone(),
    ));

    // REST gateway
    let aaa = Arc::new(Aaa::from_env(cfg.token_ttl())?);

    let mut pingers: HashMap<String, Arc<dyn Pinger>> = HashMap::new();
    pingers.insert("words".to_string(), words.clone());
    pingers.insert("update".to_string(), updater.clone());
    pingers.insert("search".to_string(), searcher.clone());

    let app = api::router(api::Dependencies {
        updater,
        searcher,
        authenticator: aaa.clone(),
        verifier: aaa,
        pingers,
        cancel: shutdown_rx.clone(),
        concurrency_limit: cfg.limits.concurrency,
        rps_limit: cfg.limits.rps,
        request_timeout: cfg.http_timeout(),
    });

    // Flip the shutdown signal on SIGINT/SIGTERM
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let listener = tokio::net::TcpListener::bind(&cfg.http.address).await?;
    tracing::info!("listening on {}", cfg.http.address);

    let mut graceful = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = graceful.changed().await;

            // Hard-stop watchdog in case in-flight requests never finish
            tokio::spawn(async {
                tokio::time::sleep(MAX_SHUTDOWN_TIME).await;
                tracing::warn!("graceful stop timed out, forcing exit");
                std::process::exit(1);
            });
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("cannot install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
