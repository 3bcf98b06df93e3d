//! Queue draining and background scheduling

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::report_queue::ReportQueue;
use crate::errors::Result;
use crate::reporters::ReporterRegistry;
use crate::storage::QueueJob;

/// When the next drain pass should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// 仍有就绪任务
    Immediately,
    At(DateTime<Utc>),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub next_run: NextRun,
}

pub struct QueueProcessor {
    queue: Arc<ReportQueue>,
    reporters: Arc<ReporterRegistry>,
    batch_size: u64,
}

impl QueueProcessor {
    pub fn new(queue: Arc<ReportQueue>, reporters: Arc<ReporterRegistry>, batch_size: u64) -> Self {
        Self {
            queue,
            reporters,
            batch_size: batch_size.max(1),
        }
    }

    /// Claim one batch, dispatch it, and report when to run next.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let jobs = self.queue.dequeue(self.batch_size).await?;
        let mut delivered = 0;
        let mut failed = 0;

        for job in jobs {
            match self.dispatch(&job).await {
                Ok(()) => match self.queue.complete(job.id).await {
                    Ok(()) => delivered += 1,
                    Err(e) => error!("Failed to mark job {} done: {}", job.id, e),
                },
                Err(message) => {
                    failed += 1;
                    debug!("Job {} ({}) failed: {}", job.id, job.reporter, message);
                    if let Err(e) = self.queue.fail(job.id, &message).await {
                        error!("Failed to record failure for job {}: {}", job.id, e);
                    }
                }
            }
        }

        let now = Utc::now();
        let outlook = self.queue.outlook(now).await?;
        let next_run = if outlook.ready > 0 {
            NextRun::Immediately
        } else {
            outlook.next_retry_at.map_or(NextRun::Idle, NextRun::At)
        };

        Ok(DrainReport {
            delivered,
            failed,
            next_run,
        })
    }

    async fn dispatch(&self, job: &QueueJob) -> std::result::Result<(), String> {
        let Some(reporter) = self.reporters.get(&job.reporter) else {
            return Err(format!("reporter '{}' is not registered", job.reporter));
        };

        match AssertUnwindSafe(reporter.deliver(&job.payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Reporter {} panicked on job {}: {}", job.reporter, job.id, message);
                Err(format!("reporter panicked: {}", message))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Wakes the scheduler; cheap to clone into request handlers.
#[derive(Debug, Clone, Default)]
pub struct QueueTrigger {
    notify: Arc<Notify>,
}

impl QueueTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求尽快执行一次处理
    pub fn schedule(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Background task that drains the queue.
///
/// Runs after every [`QueueTrigger::schedule`], at the earliest future
/// `retry_after`, or after `idle_poll` otherwise.
pub struct QueueScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl QueueScheduler {
    pub fn spawn(processor: QueueProcessor, trigger: QueueTrigger, idle_poll: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Report queue scheduler started");
            loop {
                let wait = match processor.drain_once().await {
                    Ok(report) => {
                        if report.delivered + report.failed > 0 {
                            debug!(
                                "Queue pass: {} delivered, {} failed",
                                report.delivered, report.failed
                            );
                        }
                        match report.next_run {
                            NextRun::Immediately => Duration::ZERO,
                            NextRun::At(at) => (at - Utc::now())
                                .to_std()
                                .unwrap_or(Duration::ZERO)
                                .min(idle_poll),
                            NextRun::Idle => idle_poll,
                        }
                    }
                    Err(e) => {
                        warn!("Queue pass failed: {}", e);
                        idle_poll
                    }
                };

                if *shutdown_rx.borrow() {
                    break;
                }
                if wait.is_zero() {
                    continue;
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = trigger.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            info!("Report queue scheduler stopped");
        });

        Self { handle, shutdown }
    }

    /// 通知任务退出并等待当前批次结束
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("Report queue scheduler ended abnormally: {}", e);
        }
    }
}
