//! 报告队列集成测试

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use clicktrail::queue::{NextRun, QueueProcessor, QueueScheduler, QueueTrigger, ReportQueue};
use clicktrail::reporters::{ConversionReport, Reporter, ReporterRegistry};
use clicktrail::storage::{JobStatus, RetryPolicy};

use common::*;

fn policy() -> RetryPolicy {
    RetryPolicy {
        attempts_per_round: 3,
        attempt_delay_secs: 60,
        max_rounds: 2,
        round_delay_secs: 3600,
    }
}

/// 整秒时间，避免数据库精度影响比较
fn whole_second(offset_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp() + offset_secs, 0).expect("valid timestamp")
}

struct CountingReporter {
    name: &'static str,
    delivered: AtomicUsize,
}

#[async_trait]
impl Reporter for CountingReporter {
    fn name(&self) -> &str {
        self.name
    }

    fn build_payload(&self, _report: &ConversionReport) -> Option<Value> {
        Some(json!({}))
    }

    async fn deliver(&self, _payload: &Value) -> anyhow::Result<()> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingReporter;

#[async_trait]
impl Reporter for FailingReporter {
    fn name(&self) -> &str {
        "failing"
    }

    fn build_payload(&self, _report: &ConversionReport) -> Option<Value> {
        Some(json!({}))
    }

    async fn deliver(&self, _payload: &Value) -> anyhow::Result<()> {
        anyhow::bail!("downstream returned 503")
    }
}

struct PanickingReporter;

#[async_trait]
impl Reporter for PanickingReporter {
    fn name(&self) -> &str {
        "panics"
    }

    fn build_payload(&self, _report: &ConversionReport) -> Option<Value> {
        Some(json!({}))
    }

    async fn deliver(&self, payload: &Value) -> anyhow::Result<()> {
        if payload.get("explode").is_some() {
            panic!("reporter blew up");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_round_based_retry_schedule() {
    let db = test_db().await;
    let queue = ReportQueue::new(Arc::clone(&db.storage), policy());
    let id = queue
        .enqueue("crm", json!({"n": 1}), Some("order-1".to_string()), None)
        .await
        .unwrap();

    let mut now = whole_second(1);
    let expected_delays = [60, 60, 3600, 60, 60];
    for (attempt, delay) in expected_delays.iter().enumerate() {
        let jobs = queue.dequeue_at(10, now).await.unwrap();
        assert_eq!(jobs.len(), 1, "attempt {} should claim the job", attempt + 1);
        assert_eq!(jobs[0].status, JobStatus::Processing);

        let status = queue.fail_at(id, "timeout", now).await.unwrap();
        assert_eq!(status, JobStatus::Pending);

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, attempt as u32 + 1);
        let retry_after = job.retry_after.expect("retry scheduled");
        assert_eq!((retry_after - now).num_seconds(), *delay);

        // 重试时间之前不可认领
        assert!(queue.dequeue_at(10, now).await.unwrap().is_empty());
        now = retry_after;
    }

    assert_eq!(queue.dequeue_at(10, now).await.unwrap().len(), 1);
    let status = queue.fail_at(id, "timeout", now).await.unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = queue.get(id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 6);
    assert_eq!(job.retry_after, None);
    assert_eq!(job.last_error.as_deref(), Some("timeout"));
    assert_eq!(job.label.as_deref(), Some("order-1"));
    assert!(queue.dequeue_at(10, now + Duration::days(1)).await.unwrap().is_empty());

    // 手动重置后重新进入队列
    assert!(queue.requeue(id).await.unwrap());
    let job = queue.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert!(!queue.requeue(id).await.unwrap());
}

#[tokio::test]
async fn test_per_job_policy_overrides_default() {
    let db = test_db().await;
    let queue = ReportQueue::new(Arc::clone(&db.storage), policy());
    let single_shot = RetryPolicy {
        attempts_per_round: 1,
        attempt_delay_secs: 1,
        max_rounds: 1,
        round_delay_secs: 1,
    };
    let id = queue
        .enqueue("crm", json!({}), None, Some(single_shot))
        .await
        .unwrap();

    let now = whole_second(1);
    assert_eq!(queue.dequeue_at(1, now).await.unwrap().len(), 1);
    assert_eq!(
        queue.fail_at(id, "rejected", now).await.unwrap(),
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_concurrent_dequeue_never_double_claims() {
    let db = test_db().await;
    let queue = Arc::new(ReportQueue::new(Arc::clone(&db.storage), policy()));
    for n in 0..20 {
        queue.enqueue("crm", json!({ "n": n }), None, None).await.unwrap();
    }

    let mut workers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        workers.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            for _ in 0..20 {
                let jobs = queue.dequeue(3).await.unwrap();
                claimed.extend(jobs.into_iter().map(|j| j.id));
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for worker in workers {
        all.extend(worker.await.unwrap());
    }
    let unique: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "a job was claimed twice");
    assert_eq!(all.len(), 20);
    assert_eq!(queue.stats().await.unwrap().processing, 20);
}

#[tokio::test]
async fn test_processor_isolates_reporter_failures() {
    let db = test_db().await;
    let queue = Arc::new(ReportQueue::new(Arc::clone(&db.storage), policy()));
    let ok = Arc::new(CountingReporter {
        name: "ok",
        delivered: AtomicUsize::new(0),
    });
    let reporters = Arc::new(ReporterRegistry::new());
    reporters.register("ok", ok.clone());
    reporters.register("failing", Arc::new(FailingReporter));
    reporters.register("panics", Arc::new(PanickingReporter));

    let ok_job = queue.enqueue("ok", json!({}), None, None).await.unwrap();
    let failing_job = queue.enqueue("failing", json!({}), None, None).await.unwrap();
    let panic_job = queue
        .enqueue("panics", json!({"explode": true}), None, None)
        .await
        .unwrap();
    let ghost_job = queue.enqueue("ghost", json!({}), None, None).await.unwrap();

    let processor = QueueProcessor::new(Arc::clone(&queue), reporters, 10);
    let report = processor.drain_once().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 3);
    assert!(matches!(report.next_run, NextRun::At(_)));
    assert_eq!(ok.delivered.load(Ordering::SeqCst), 1);

    let done = queue.get(ok_job).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Done);

    for (id, fragment) in [
        (failing_job, "503"),
        (panic_job, "panicked"),
        (ghost_job, "not registered"),
    ] {
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.retry_after.is_some());
        let error = job.last_error.unwrap_or_default();
        assert!(error.contains(fragment), "job {} error was {:?}", id, error);
    }

    // 全部等待重试时队列处于空转
    let report = processor.drain_once().await.unwrap();
    assert_eq!(report.delivered + report.failed, 0);
}

#[tokio::test]
async fn test_scheduler_drains_after_trigger_and_stops() {
    let db = test_db().await;
    let queue = Arc::new(ReportQueue::new(Arc::clone(&db.storage), policy()));
    let ok = Arc::new(CountingReporter {
        name: "ok",
        delivered: AtomicUsize::new(0),
    });
    let reporters = Arc::new(ReporterRegistry::new());
    reporters.register("ok", ok.clone());

    let trigger = QueueTrigger::new();
    let scheduler = QueueScheduler::spawn(
        QueueProcessor::new(Arc::clone(&queue), reporters, 10),
        trigger.clone(),
        StdDuration::from_secs(3600),
    );

    queue.enqueue("ok", json!({}), None, None).await.unwrap();
    trigger.schedule();

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
    while queue.stats().await.unwrap().done < 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "scheduler did not deliver the job"
        );
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert_eq!(ok.delivered.load(Ordering::SeqCst), 1);

    tokio::time::timeout(StdDuration::from_secs(5), scheduler.shutdown())
        .await
        .expect("scheduler shut down");
}

#[tokio::test]
async fn test_stale_claims_are_released_and_finished_jobs_purged() {
    let db = test_db().await;
    let queue = ReportQueue::new(Arc::clone(&db.storage), policy());
    let stale = queue.enqueue("crm", json!({}), None, None).await.unwrap();
    let finished = queue.enqueue("crm", json!({}), None, None).await.unwrap();

    let claimed = queue.dequeue(10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    queue.complete(finished).await.unwrap();

    let released = queue
        .release_stale(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(released, 1);
    let job = queue.get(stale).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let purged = queue
        .purge_finished(Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(queue.get(finished).await.unwrap().is_none());

    let stats = queue.stats().await.unwrap();
    assert_eq!((stats.pending, stats.processing, stats.done, stats.failed), (1, 0, 0, 0));
}
