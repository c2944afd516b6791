//! Certgate Server Binary
//!
//! Runs the mutual-TLS identity gateway.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use certgate_server::{
    create_router, transport, AppState, GatewayConfig, MemoryStore, TlsSetup, UserDirectory,
    UserStore,
};

#[tokio::main]
async fn main() {
    let config = GatewayConfig::from_env();

    // Initialize logging
    if config.zone.logs_enabled() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(config.log_level)
            .with_target(true)
            .with_thread_ids(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }

    // Initialize storage
    let store = open_store(&config).await;
    let directory = UserDirectory::new(store).with_patch_attempts(config.patch_retries);

    let tls = TlsSetup::from_paths(&config.tls).expect("Failed to load TLS material");

    info!(
        zone = %config.zone,
        port = config.port,
        client_ca = %config.tls.client_ca.display(),
        "Starting certgate"
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState { directory, config });
    let app = create_router(state);

    transport::run(&addr, tls, app)
        .await
        .expect("Server error");
}

#[cfg(feature = "postgres")]
async fn open_store(config: &GatewayConfig) -> Arc<dyn UserStore> {
    match &config.database_url {
        Some(url) => Arc::new(
            certgate_server::storage::PostgresStore::new(url)
                .await
                .expect("Failed to connect to PostgreSQL"),
        ),
        None => Arc::new(MemoryStore::new()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &GatewayConfig) -> Arc<dyn UserStore> {
    if config.database_url.is_some() {
        tracing::warn!(
            "CERTGATE_DATABASE_URL is set but the postgres feature is disabled; using in-memory store"
        );
    }
    Arc::new(MemoryStore::new())
}
