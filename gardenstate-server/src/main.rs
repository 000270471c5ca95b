use clap::Parser;
use gardenstate_core::config::StoreBackend;
use gardenstate_core::{
    db, DocumentStore, GardenConfig, GardenError, GeminiConfig, GeminiGenerationClient,
    GenerationBackend, MemoryStore, PgStore,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use gardenstate_server::router::RouterState;
use gardenstate_server::server;
use gardenstate_server::subsystems::enrich::{EnrichmentPipeline, PipelineSettings};
use gardenstate_server::subsystems::listener;
use gardenstate_server::subsystems::media::HttpImageSource;
use gardenstate_server::subsystems::queue::{self, TriggerQueue};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "gardenstate.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

/// Store for the configured backend, plus the pool when it is Postgres.
async fn build_store(
    config: &GardenConfig,
) -> Result<(Arc<dyn DocumentStore>, Option<PgPool>), GardenError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on exit");
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
            Ok((store, None))
        }
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::ensure_schema(&pool).await?;
            let store: Arc<dyn DocumentStore> = Arc::new(PgStore::new(pool.clone()));
            Ok((store, Some(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match GardenConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let (store, pool) = match build_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open {:?} store: {}", config.store.backend, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health_check().await {
            Ok(v) => println!("✅ {} store connected: {}", store.name(), v),
            Err(e) => {
                println!("❌ {} store check failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        println!("✅ GardenState health check passed");
        return Ok(());
    }

    let backend: Arc<dyn GenerationBackend> =
        match GeminiGenerationClient::new(GeminiConfig::from_settings(&config.generation)) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("Failed to create generation client: {}", e);
                std::process::exit(1);
            }
        };
    tracing::info!(backend = backend.name(), model = %config.generation.model, "Generation backend ready");

    let images = Arc::new(HttpImageSource::new(Duration::from_secs(
        config.media.fetch_timeout_seconds,
    ))?);

    let pipeline = EnrichmentPipeline::new(
        store.clone(),
        backend,
        images,
        PipelineSettings::from(&config),
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Worker pool
    let (trigger_queue, trigger_rx) = TriggerQueue::channel(config.pipeline.queue_capacity);
    let dispatcher = tokio::spawn(queue::run_dispatcher(
        pipeline.clone(),
        trigger_rx,
        config.pipeline.clone(),
        tx.subscribe(),
    ));

    // Database-driven triggers (Postgres only)
    if let Some(pool) = pool {
        let listener_store = store.clone();
        let listener_queue = trigger_queue.clone();
        let listener_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                listener::run_notify_listener(pool, listener_store, listener_queue, listener_shutdown)
                    .await
            {
                tracing::error!("Notify listener stopped: {}", e);
            }
        });
    }

    let state = RouterState::new(pipeline, trigger_queue);

    // HTTP REST API if enabled
    if config.http.enabled {
        let http_state = state.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                gardenstate_server::http::start_http_server(http_state, http_config, http_shutdown)
                    .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    // Let in-flight invocations finish before the runtime goes away
    match dispatcher.await {
        Ok(report) => tracing::info!(
            abandoned = report.abandoned,
            not_started = report.not_started,
            "GardenState stopped"
        ),
        Err(e) => tracing::error!("Trigger dispatcher failed: {}", e),
    }

    Ok(())
}
