//! Multi-device WhatsApp gateway (`wasrv`)
//!
//! Runs one protocol-client session per device behind an HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;
#[cfg(feature = "swagger-ui")]
use utoipa_swagger_ui::SwaggerUi;

use common::service_bootstrap::ServiceInfo;
use common::shutdown::wait_for_shutdown;
#[cfg(feature = "swagger-ui")]
use wasrv::routes::WaSrvApiDoc;
use wasrv::{
    app_state::AppState,
    client::{ProtocolClient, VirtualClient},
    core::{
        bootstrap::{self, Args},
        config::{AppConfig, ClientDriver, DEFAULT_PORT},
        sessions::{DeviceLifecycleManager, ReconnectPolicy},
    },
    credentials::FileCredentialStore,
    routes::create_routes,
    store::Store,
    webhook::WebhookForwarder,
};

fn build_client(config: &AppConfig) -> Arc<dyn ProtocolClient> {
    match config.client.driver {
        ClientDriver::Virtual => Arc::new(VirtualClient::new(
            config.sessions.root.clone(),
            config.client.pair_after_secs.map(Duration::from_secs),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let service_info = ServiceInfo::new(
        "wasrv",
        env!("CARGO_PKG_VERSION"),
        "Multi-device WhatsApp Gateway",
        DEFAULT_PORT,
    );

    let config = AppConfig::load(&args.config)?;

    bootstrap::initialize_logging(&args, &service_info, &config.logging)?;
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    config.validate()?;
    if args.validate {
        info!("Configuration {} is valid", args.config.display());
        return Ok(());
    }
    let config = Arc::new(config);

    for dir in [&config.sessions.root, &config.media.dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let store = Store::connect(&config.database).await?;
    store.init_schema().await?;
    info!("Database ready at {}", config.database.url);

    let client = build_client(&config);
    info!("Protocol client: {}", client.name());

    let forwarder = WebhookForwarder::new(&config.webhook, &config.media)?;
    if !forwarder.is_enabled() {
        warn!("No webhook URL configured; inbound messages are only logged");
    }

    let manager = DeviceLifecycleManager::builder(
        client,
        Arc::new(FileCredentialStore::new(config.sessions.root.clone())),
    )
    .policy(ReconnectPolicy::from_config(&config.sessions))
    .inbound_handler(Arc::new(forwarder))
    .event_buffer(config.sessions.event_buffer)
    .build();

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        manager.clone(),
        store,
    ));
    let app = create_routes(state);

    #[cfg(feature = "swagger-ui")]
    let app = {
        info!("Swagger UI feature ENABLED - initializing at /docs");
        app.merge(SwaggerUi::new("/docs").url("/openapi.json", WaSrvApiDoc::openapi()))
    };

    #[cfg(not(feature = "swagger-ui"))]
    info!("Swagger UI feature DISABLED");

    let bind_address = bootstrap::determine_bind_address(
        args.bind_address.clone(),
        &config.api.host,
        config.api.port,
    );
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind_address))?;

    let socket = tokio::net::TcpSocket::new_v4().context("Failed to create socket")?;
    socket
        .set_reuseaddr(true)
        .context("Failed to set SO_REUSEADDR")?;
    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let listener = socket.listen(1024).context("Failed to listen")?;

    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();
    let server_handle = tokio::spawn(async move {
        let shutdown = async move { server_token.cancelled().await };
        if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("Server error: {}", e);
        }
    });

    let signal = wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);

    manager.shutdown().await;
    shutdown_token.cancel();
    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
