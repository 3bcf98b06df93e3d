use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{ConversionReport, Reporter};

/// Writes each attributed conversion to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    fn build_payload(&self, report: &ConversionReport) -> Option<Value> {
        serde_json::to_value(report).ok()
    }

    async fn deliver(&self, payload: &Value) -> anyhow::Result<()> {
        info!(target: "clicktrail::conversion", "{}", payload);
        Ok(())
    }
}
