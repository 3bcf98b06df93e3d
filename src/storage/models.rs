use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// 活动维度（source / medium / campaign / content / term）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

/// 追踪定义（创建后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDefinition {
    pub id: String,
    pub destination_url: Option<String>,
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub content: Option<String>,
    pub term: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl TrackingDefinition {
    /// 定义自身携带的维度（空字符串视为缺失，交由点击时回填）
    pub fn dimensions(&self) -> CampaignDimensions {
        fn non_empty(s: &str) -> Option<String> {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        CampaignDimensions {
            source: non_empty(&self.source),
            medium: non_empty(&self.medium),
            campaign: non_empty(&self.campaign),
            content: self.content.as_deref().and_then(non_empty),
            term: self.term.as_deref().and_then(non_empty),
        }
    }
}

/// 待写入的点击记录
#[derive(Debug, Clone)]
pub struct NewClick {
    pub tracking_id: String,
    pub clicked_at: DateTime<Utc>,
    pub dimensions: CampaignDimensions,
    pub platform_ids: BTreeMap<String, String>,
}

/// 已持久化的点击记录
#[derive(Debug, Clone, PartialEq)]
pub struct ClickRecord {
    pub id: i64,
    pub tracking_id: String,
    pub clicked_at: DateTime<Utc>,
    pub dimensions: CampaignDimensions,
    pub platform_ids: BTreeMap<String, String>,
}

/// 已持久化的转化归因记录
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRecord {
    pub id: i64,
    pub click_id: i64,
    pub tracking_id: String,
    pub value: f64,
    pub converted_at: DateTime<Utc>,
}

/// 队列任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// 单个任务的重试参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts_per_round: u32,
    pub attempt_delay_secs: u64,
    pub max_rounds: u32,
    pub round_delay_secs: u64,
}

/// 队列任务
#[derive(Debug, Clone, PartialEq)]
pub struct QueueJob {
    pub id: i64,
    pub reporter: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub label: Option<String>,
    pub policy: RetryPolicy,
    pub retry_after: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新任务
#[derive(Debug, Clone)]
pub struct NewJob {
    pub reporter: String,
    pub payload: serde_json::Value,
    pub label: Option<String>,
    pub policy: RetryPolicy,
}

/// 队列各状态计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

/// 待处理任务的调度视图：已就绪数量与最早的未来重试时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOutlook {
    pub ready: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_job_status_strings() {
        assert_eq!(JobStatus::Processing.as_ref(), "processing");
        assert_eq!(JobStatus::from_str("failed").unwrap(), JobStatus::Failed);
        assert!(JobStatus::from_str("unknown").is_err());
    }

    #[test]
    fn test_definition_dimensions_treat_blank_as_missing() {
        let def = TrackingDefinition {
            id: "a".repeat(64),
            destination_url: Some("/landing".to_string()),
            source: "newsletter".to_string(),
            medium: "  ".to_string(),
            campaign: String::new(),
            content: Some("hero".to_string()),
            term: Some(String::new()),
            active: true,
            created_at: Utc::now(),
        };
        let dims = def.dimensions();
        assert_eq!(dims.source.as_deref(), Some("newsletter"));
        assert_eq!(dims.medium, None);
        assert_eq!(dims.campaign, None);
        assert_eq!(dims.content.as_deref(), Some("hero"));
        assert_eq!(dims.term, None);
    }
}
