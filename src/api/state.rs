use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::Engine;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// 可信反向代理（IP 或 CIDR）
    pub trusted_proxies: Arc<[String]>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, trusted_proxies: &[String]) -> Self {
        Self {
            engine,
            trusted_proxies: trusted_proxies.into(),
            started_at: Utc::now(),
        }
    }
}
