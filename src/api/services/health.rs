use std::time::{Duration, Instant};

use actix_web::{HttpResponse, web};
use serde::Serialize;
use tracing::{error, trace};

use crate::api::AppState;
use crate::storage::QueueStats;

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub status: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: u64,
    pub storage: StorageHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
    pub response_time_ms: u64,
}

pub struct HealthService;

impl HealthService {
    /// `GET /health`
    pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
        let start = Instant::now();
        let storage = &state.engine.storage;
        trace!("Received health check request");

        let (status, error) =
            match tokio::time::timeout(Duration::from_secs(5), storage.ping()).await {
                Ok(Ok(())) => ("healthy", None),
                Ok(Err(e)) => {
                    error!("Storage health check failed: {}", e);
                    ("unhealthy", Some(format!("database error: {}", e)))
                }
                Err(_) => {
                    error!("Storage health check timeout");
                    ("unhealthy", Some("timeout".to_string()))
                }
            };

        let queue = if error.is_none() {
            state.engine.queue.stats().await.ok()
        } else {
            None
        };

        let now = chrono::Utc::now();
        let body = HealthResponse {
            status,
            timestamp: now.to_rfc3339(),
            uptime: (now - state.started_at).num_seconds().max(0) as u64,
            storage: StorageHealth {
                status,
                backend: storage.backend_name().to_string(),
                error,
            },
            queue,
            response_time_ms: start.elapsed().as_millis() as u64,
        };

        if status == "healthy" {
            HttpResponse::Ok().json(body)
        } else {
            HttpResponse::ServiceUnavailable().json(body)
        }
    }
}
