use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::queue::QueueScheduler;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C
pub async fn listen_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 停止队列处理任务；超时后放弃等待，未完成的任务会在下次启动时被放回队列
pub async fn perform_shutdown_tasks(scheduler: QueueScheduler) {
    match timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        scheduler.shutdown(),
    )
    .await
    {
        Ok(()) => info!("All shutdown tasks completed successfully"),
        Err(_) => error!(
            "Queue scheduler did not stop within {} seconds",
            SHUTDOWN_TIMEOUT_SECS
        ),
    }
}
