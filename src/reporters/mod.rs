//! Downstream conversion reporters
//!
//! 报告器在请求路径上只负责构造 payload，真正的投递在队列处理任务中完成。

mod log;
mod webhook;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::ReportersConfig;
use crate::storage::{CampaignDimensions, RetryPolicy};
use crate::tracking::HookRegistry;

pub use log::LogReporter;
pub use webhook::WebhookReporter;

/// One surviving tracking id of a conversion, with its most recent click.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedClick {
    pub tracking_id: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicked_at: Option<DateTime<Utc>>,
    pub dimensions: CampaignDimensions,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_ids: BTreeMap<String, String>,
}

/// Everything a reporter gets to see about one attributed conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub converted_at: DateTime<Utc>,
    pub clicks: Vec<AttributedClick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub landing_path: String,
}

impl ConversionReport {
    pub fn weights(&self) -> Vec<(String, f64)> {
        self.clicks
            .iter()
            .map(|c| (c.tracking_id.clone(), c.weight))
            .collect()
    }

    /// 权重 > 0 的点击
    pub fn attributed(&self) -> impl Iterator<Item = &AttributedClick> {
        self.clicks.iter().filter(|c| c.weight > 0.0)
    }
}

#[async_trait]
pub trait Reporter: Send + Sync {
    fn name(&self) -> &str;

    /// 在转化请求中调用；返回 None 表示不入队
    fn build_payload(&self, report: &ConversionReport) -> Option<Value>;

    /// 在队列处理任务中调用；重试时收到同一份 payload
    async fn deliver(&self, payload: &Value) -> anyhow::Result<()>;

    /// 覆盖全局重试参数
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    fn label(&self, _report: &ConversionReport) -> Option<String> {
        None
    }
}

pub type ReporterRegistry = HookRegistry<dyn Reporter>;

/// 以报告器自身名称注册
pub fn register_reporter(registry: &ReporterRegistry, reporter: Arc<dyn Reporter>) {
    let name = reporter.name().to_string();
    registry.register(name, reporter);
}

/// Built-in reporters enabled by `[reporters]`.
pub fn build_reporters(config: &ReportersConfig) -> ReporterRegistry {
    let registry = ReporterRegistry::new();
    if config.log {
        register_reporter(&registry, Arc::new(LogReporter));
    }
    for webhook in &config.webhooks {
        register_reporter(&registry, Arc::new(WebhookReporter::from_config(webhook)));
    }
    registry
}
