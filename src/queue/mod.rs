//! Durable report queue
//!
//! - `report_queue`: job store operations ([`ReportQueue`])
//! - `policy`: round-based retry decisions
//! - `processor`: drains jobs to reporters ([`QueueProcessor`], [`QueueScheduler`])

pub mod policy;
pub mod processor;
pub mod report_queue;

use std::time::Duration;

use crate::config::QueueConfig;
use crate::storage::RetryPolicy;

pub use policy::{RetryDecision, decide};
pub use processor::{DrainReport, NextRun, QueueProcessor, QueueScheduler, QueueTrigger};
pub use report_queue::ReportQueue;

/// Queue settings, derived once from `[queue]` at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub batch_size: u64,
    pub default_policy: RetryPolicy,
    pub idle_poll: Duration,
}

impl QueueSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            default_policy: RetryPolicy {
                attempts_per_round: config.attempts_per_round.max(1),
                attempt_delay_secs: config.attempt_delay_secs,
                max_rounds: config.max_rounds.max(1),
                round_delay_secs: config.round_delay_secs,
            },
            idle_poll: Duration::from_secs(config.idle_poll_secs.max(1)),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
