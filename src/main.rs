use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use vaultsync::datasource::RpcSettings;
use vaultsync::{
    api, config::Config, db::init_db, Fetcher, JsonRpcDataSource, Repository, Scheduler,
    SyncEngine, SyncSettings, SystemClock, TransactionService, VaultDataSource,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let repo = Repository::new(pool);

    let source: Arc<dyn VaultDataSource> = Arc::new(JsonRpcDataSource::new(RpcSettings {
        rpc_url: config.rpc_url.clone(),
        core_vault: config.core_vault_address.clone(),
        vault_extension: config.vault_extension_address.clone(),
        poll_interval: Duration::from_millis(config.tx_poll_interval_ms),
        settlement_timeout: Duration::from_millis(config.tx_timeout_ms),
    }));

    let fetcher = Fetcher::new(Arc::clone(&source), config.max_reward_epochs);
    let settings = SyncSettings {
        freshness_ms: config.cache_freshness_ms,
        optimistic_expiry_ms: config.optimistic_expiry_ms,
    };
    let engine = Arc::new(
        SyncEngine::new(fetcher, Arc::new(SystemClock), settings).with_repository(repo),
    );
    match engine.load_persisted().await {
        Ok(n) => tracing::info!("Loaded {} persisted cache entries", n),
        Err(e) => tracing::warn!("Starting with an empty cache: {}", e),
    }

    let transactions = TransactionService::new(
        Arc::clone(&engine),
        source,
        config.native_asset_symbol.clone(),
    );
    let scheduler = Scheduler::new(Arc::clone(&engine), config.refresh_interval())
        .spawn(config.account.clone());

    let app = api::create_router(api::AppState::new(engine, transactions));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    scheduler.shutdown().await;

    if let Err(e) = served {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
