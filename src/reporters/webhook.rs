//! JSON webhook reporter
//!
//! ureq 为同步客户端，投递放在 spawn_blocking 中执行。

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use ureq::Agent;

use super::{ConversionReport, Reporter};
use crate::config::WebhookConfig;

pub struct WebhookReporter {
    name: String,
    url: String,
    agent: Agent,
}

impl WebhookReporter {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            name: name.into(),
            url: url.into(),
            agent,
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.url.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    fn post_sync(agent: Agent, url: String, payload: Value) -> anyhow::Result<u16> {
        let response = agent
            .post(&url)
            .send_json(&payload)
            .with_context(|| format!("POST {} failed", url))?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl Reporter for WebhookReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_payload(&self, report: &ConversionReport) -> Option<Value> {
        // 没有正权重的点击时不投递
        let clicks: Vec<&super::AttributedClick> = report.attributed().collect();
        if clicks.is_empty() {
            return None;
        }
        Some(json!({
            "event": "conversion",
            "converted_at": report.converted_at,
            "clicks": clicks,
            "context": {
                "ip": report.ip,
                "user_agent": report.user_agent,
                "landing_path": report.landing_path,
            },
        }))
    }

    async fn deliver(&self, payload: &Value) -> anyhow::Result<()> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let payload = payload.clone();
        let status = tokio::task::spawn_blocking(move || Self::post_sync(agent, url, payload))
            .await
            .context("webhook task join failed")??;
        debug!("Webhook {} accepted conversion (HTTP {})", self.name, status);
        Ok(())
    }
}

impl std::fmt::Debug for WebhookReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReporter")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}
