//! Server mode
//!
//! Builds the engine, starts the report queue scheduler and serves the
//! tracking routes until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::AppState;
use crate::api::middleware::RequestIdMiddleware;
use crate::api::services::{consent_rate_limit_config, health_routes, tracking_routes};
use crate::config::StaticConfig;
use crate::runtime::lifetime;

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server(config: Arc<StaticConfig>) -> Result<()> {
    let startup = lifetime::startup::prepare_server_startup(&config)
        .await
        .inspect_err(|e| tracing::error!("Server startup failed: {:#}", e))?;

    let engine = startup.engine;
    let scheduler = engine.spawn_scheduler();

    let state = AppState::new(Arc::clone(&engine), &config.server.trusted_proxies);
    if state.trusted_proxies.is_empty() {
        warn!(
            "No trusted proxies configured; client IPs come from the socket peer address. \
             Configure server.trusted_proxies when running behind a reverse proxy."
        );
    }

    // 限流器在 worker 间共享，必须在闭包外构建
    let consent_limit = consent_rate_limit_config(
        config.tracking.consent_rate_limit_per_minute,
        Arc::clone(&state.trusted_proxies),
    )
    .context("Failed to build consent rate limiter")?;
    let prefix = engine.settings.prefix.clone();

    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-store")))
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().limit(16 * 1024))
            .service(health_routes())
            .service(tracking_routes(&prefix, &consent_limit))
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .workers(cpu_count)
    .disable_signals()
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();
    info!("Starting server at http://{}", bind_address);

    let handle = server.handle();
    tokio::select! {
        res = server => {
            res.context("HTTP server error")?;
        }
        _ = lifetime::shutdown::listen_for_shutdown() => {
            handle.stop(true).await;
        }
    }

    lifetime::shutdown::perform_shutdown_tasks(scheduler).await;
    warn!("Graceful shutdown: all tasks completed");
    Ok(())
}
