use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::policy::{RetryDecision, decide};
use crate::errors::{ClicktrailError, Result};
use crate::storage::{
    JobStatus, NewJob, PendingOutlook, QueueJob, QueueStats, RetryPolicy, SeaOrmStorage,
};

/// Job store facade with the retry rules applied.
///
/// 状态流转：pending → processing → done | pending（带 retry_after）| failed
#[derive(Debug, Clone)]
pub struct ReportQueue {
    storage: Arc<SeaOrmStorage>,
    default_policy: RetryPolicy,
}

impl ReportQueue {
    pub fn new(storage: Arc<SeaOrmStorage>, default_policy: RetryPolicy) -> Self {
        Self {
            storage,
            default_policy,
        }
    }

    pub fn default_policy(&self) -> RetryPolicy {
        self.default_policy
    }

    /// 入队；`policy` 为空时使用全局重试参数
    pub async fn enqueue(
        &self,
        reporter: &str,
        payload: Value,
        label: Option<String>,
        policy: Option<RetryPolicy>,
    ) -> Result<i64> {
        let job = NewJob {
            reporter: reporter.to_string(),
            payload,
            label,
            policy: policy.unwrap_or(self.default_policy),
        };
        let id = self.storage.insert_job(&job, Utc::now()).await?;
        debug!("Enqueued job {} for reporter {}", id, reporter);
        Ok(id)
    }

    pub async fn dequeue(&self, limit: u64) -> Result<Vec<QueueJob>> {
        self.dequeue_at(limit, Utc::now()).await
    }

    /// 原子认领至多 `limit` 个已就绪任务
    pub async fn dequeue_at(&self, limit: u64, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.storage.claim_jobs(limit, now).await
    }

    pub async fn complete(&self, id: i64) -> Result<()> {
        let job = self.load(id).await?;
        self.storage
            .update_job_state(id, JobStatus::Done, job.attempts, None, None, Utc::now())
            .await
    }

    pub async fn fail(&self, id: i64, message: &str) -> Result<JobStatus> {
        self.fail_at(id, message, Utc::now()).await
    }

    /// 记录一次失败并按重试策略安排下一次尝试
    pub async fn fail_at(&self, id: i64, message: &str, now: DateTime<Utc>) -> Result<JobStatus> {
        let job = self.load(id).await?;
        let (status, attempts, retry_after) = match decide(job.attempts, &job.policy, now) {
            RetryDecision::Retry {
                attempts,
                retry_after,
            } => (JobStatus::Pending, attempts, Some(retry_after)),
            RetryDecision::GiveUp { attempts } => {
                warn!(
                    "Job {} for reporter {} failed permanently after {} attempts: {}",
                    id, job.reporter, attempts, message
                );
                (JobStatus::Failed, attempts, None)
            }
        };
        self.storage
            .update_job_state(id, status, attempts, retry_after, Some(message.to_string()), now)
            .await?;
        Ok(status)
    }

    /// 将 failed 任务放回队列，返回是否有任务被重置
    pub async fn requeue(&self, id: i64) -> Result<bool> {
        self.storage.requeue_job(id, Utc::now()).await
    }

    pub async fn purge_finished(&self, before: DateTime<Utc>) -> Result<u64> {
        self.storage.purge_finished_jobs(before).await
    }

    pub async fn release_stale(&self, before: DateTime<Utc>) -> Result<u64> {
        self.storage.release_stale_claims(before).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.storage.job_stats().await
    }

    pub async fn outlook(&self, now: DateTime<Utc>) -> Result<PendingOutlook> {
        self.storage.pending_outlook(now).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueueJob>> {
        self.storage.get_job(id).await
    }

    async fn load(&self, id: i64) -> Result<QueueJob> {
        self.storage
            .get_job(id)
            .await?
            .ok_or_else(|| ClicktrailError::not_found(format!("queue job {}", id)))
    }
}
