use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::StaticConfig;
use crate::engine::Engine;
use crate::storage::StorageFactory;

pub struct StartupContext {
    pub engine: Arc<Engine>,
}

/// 准备服务器启动：存储、引擎组件、队列恢复
pub async fn prepare_server_startup(config: &StaticConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let storage = StorageFactory::create(&config.database)
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let engine = Engine::from_config(config, storage).context("Failed to assemble engine")?;

    // 上次进程退出时仍处于 processing 的任务放回队列
    let released = engine
        .queue
        .release_stale(Utc::now())
        .await
        .context("Failed to release stale queue claims")?;
    if released > 0 {
        warn!("Recovered {} report jobs left in processing", released);
    }

    let names = engine.reporters.names();
    if names.is_empty() {
        info!("No reporters registered; conversions are recorded without downstream delivery");
    } else {
        info!("Reporters registered: {}", names.join(", "));
    }

    info!(
        "Tracking routes under {} (consent default: {}, weighting: {})",
        engine.settings.prefix,
        config.tracking.default_consent,
        config.tracking.weighting.as_ref()
    );
    debug!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        engine: Arc::new(engine),
    })
}
