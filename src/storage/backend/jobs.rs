//! Report queue persistence
//!
//! 出队采用 claim 模式：先选出候选 id，再以 `status = 'pending'` 为条件
//! 批量改写为 processing 并写入本次 claim token，最后按 token 读回。
//! 条件更新由数据库保证原子性，并发的两次出队不会拿到同一任务。

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, NullOrdering, Order};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{debug, info};

use super::converters::{model_to_job, new_job_to_active_model};
use super::{SeaOrmStorage, retry};
use crate::errors::{ClicktrailError, Result};
use crate::storage::models::{JobStatus, NewJob, PendingOutlook, QueueJob, QueueStats};

use migration::entities::report_job;

fn ready_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(report_job::Column::Status.eq(JobStatus::Pending.as_ref()))
        .add(
            Condition::any()
                .add(report_job::Column::RetryAfter.is_null())
                .add(report_job::Column::RetryAfter.lte(now)),
        )
}

impl SeaOrmStorage {
    /// 写入新任务，返回任务 id
    pub async fn insert_job(&self, job: &NewJob, now: DateTime<Utc>) -> Result<i64> {
        let db = &self.db;
        let inserted = retry::with_retry("insert_job", self.retry_config, || async {
            report_job::Entity::insert(new_job_to_active_model(job, now))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("写入队列任务失败: {}", e)))?;

        Ok(inserted.last_insert_id)
    }

    /// 原子地认领至多 `limit` 个已就绪的 pending 任务并转为 processing
    pub async fn claim_jobs(&self, limit: u64, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = &self.db;

        let candidate_ids: Vec<i64> = report_job::Entity::find()
            .select_only()
            .column(report_job::Column::Id)
            .filter(ready_condition(now))
            .order_by_with_nulls(report_job::Column::RetryAfter, Order::Asc, NullOrdering::First)
            .order_by_asc(report_job::Column::CreatedAt)
            .order_by_asc(report_job::Column::Id)
            .limit(limit)
            .into_tuple()
            .all(db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("查询待处理任务失败: {}", e)))?;

        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let claim_token = uuid::Uuid::new_v4().to_string();
        let claimed = retry::with_retry("claim_jobs", self.retry_config, || async {
            report_job::Entity::update_many()
                .col_expr(
                    report_job::Column::Status,
                    Expr::value(JobStatus::Processing.as_ref()),
                )
                .col_expr(report_job::Column::ClaimToken, Expr::value(claim_token.clone()))
                .col_expr(report_job::Column::UpdatedAt, Expr::value(now))
                .filter(report_job::Column::Id.is_in(candidate_ids.iter().copied()))
                .filter(report_job::Column::Status.eq(JobStatus::Pending.as_ref()))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("认领任务失败: {}", e)))?;

        if claimed.rows_affected == 0 {
            debug!("All {} candidate jobs were claimed elsewhere", candidate_ids.len());
            return Ok(Vec::new());
        }

        let models = report_job::Entity::find()
            .filter(report_job::Column::ClaimToken.eq(claim_token.as_str()))
            .filter(report_job::Column::Status.eq(JobStatus::Processing.as_ref()))
            .order_by_asc(report_job::Column::CreatedAt)
            .order_by_asc(report_job::Column::Id)
            .all(db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("读取已认领任务失败: {}", e)))?;

        Ok(models.into_iter().map(model_to_job).collect())
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<QueueJob>> {
        report_job::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map(|m| m.map(model_to_job))
            .map_err(|e| ClicktrailError::database_operation(format!("查询任务失败: {}", e)))
    }

    /// 写回任务的新状态（完成、重试或终止失败）
    pub async fn update_job_state(
        &self,
        id: i64,
        status: JobStatus,
        attempts: u32,
        retry_after: Option<DateTime<Utc>>,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = &self.db;
        let model = report_job::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("查询任务失败: {}", e)))?
            .ok_or_else(|| ClicktrailError::not_found(format!("队列任务不存在: {}", id)))?;

        let mut active = model.into_active_model();
        active.status = sea_orm::Set(status.as_ref().to_string());
        active.attempts = sea_orm::Set(attempts as i32);
        active.retry_after = sea_orm::Set(retry_after);
        if last_error.is_some() {
            active.last_error = sea_orm::Set(last_error);
        }
        active.claim_token = sea_orm::Set(None);
        active.updated_at = sea_orm::Set(now);

        retry::with_retry("update_job_state", self.retry_config, || {
            let active = active.clone();
            async move { active.update(db).await }
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("更新任务状态失败: {}", e)))?;

        Ok(())
    }

    /// 将 failed 任务重置为 pending（attempts 清零）
    pub async fn requeue_job(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = report_job::Entity::update_many()
            .col_expr(report_job::Column::Status, Expr::value(JobStatus::Pending.as_ref()))
            .col_expr(report_job::Column::Attempts, Expr::value(0))
            .col_expr(
                report_job::Column::RetryAfter,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(report_job::Column::UpdatedAt, Expr::value(now))
            .filter(report_job::Column::Id.eq(id))
            .filter(report_job::Column::Status.eq(JobStatus::Failed.as_ref()))
            .exec(&self.db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("重置任务失败: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    /// 将 `before` 之前就停留在 processing 的任务放回 pending（进程崩溃后的恢复）
    pub async fn release_stale_claims(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = report_job::Entity::update_many()
            .col_expr(report_job::Column::Status, Expr::value(JobStatus::Pending.as_ref()))
            .col_expr(
                report_job::Column::ClaimToken,
                Expr::value(Option::<String>::None),
            )
            .filter(report_job::Column::Status.eq(JobStatus::Processing.as_ref()))
            .filter(report_job::Column::UpdatedAt.lt(before))
            .exec(&self.db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("释放任务失败: {}", e)))?;

        if result.rows_affected > 0 {
            info!("Released {} stale queue claims", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    /// 删除 `before` 之前结束（done / failed）的任务
    pub async fn purge_finished_jobs(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = report_job::Entity::delete_many()
            .filter(
                report_job::Column::Status
                    .is_in([JobStatus::Done.as_ref(), JobStatus::Failed.as_ref()]),
            )
            .filter(report_job::Column::UpdatedAt.lt(before))
            .exec(&self.db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("清理任务失败: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// 各状态任务数
    pub async fn job_stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for (status, slot) in [
            (JobStatus::Pending, &mut stats.pending),
            (JobStatus::Processing, &mut stats.processing),
            (JobStatus::Done, &mut stats.done),
            (JobStatus::Failed, &mut stats.failed),
        ] {
            *slot = report_job::Entity::find()
                .filter(report_job::Column::Status.eq(status.as_ref()))
                .count(&self.db)
                .await
                .map_err(|e| ClicktrailError::database_operation(format!("统计任务失败: {}", e)))?;
        }
        Ok(stats)
    }

    /// 剩余 pending 任务的调度视图
    pub async fn pending_outlook(&self, now: DateTime<Utc>) -> Result<PendingOutlook> {
        let db = &self.db;
        let ready = report_job::Entity::find()
            .filter(ready_condition(now))
            .count(db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("统计待处理任务失败: {}", e)))?;

        let next_retry_at = if ready > 0 {
            None
        } else {
            report_job::Entity::find()
                .filter(report_job::Column::Status.eq(JobStatus::Pending.as_ref()))
                .filter(report_job::Column::RetryAfter.gt(now))
                .order_by_asc(report_job::Column::RetryAfter)
                .one(db)
                .await
                .map_err(|e| {
                    ClicktrailError::database_operation(format!("查询下次重试时间失败: {}", e))
                })?
                .and_then(|m| m.retry_after)
        };

        Ok(PendingOutlook {
            ready,
            next_retry_at,
        })
    }
}
