//! Round-based retry scheduling

use chrono::{DateTime, Duration, Utc};

use crate::storage::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 回到 pending，等待 `retry_after`
    Retry {
        attempts: u32,
        retry_after: DateTime<Utc>,
    },
    /// 达到总次数上限，标记 failed
    GiveUp { attempts: u32 },
}

impl RetryDecision {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryDecision::Retry { attempts, .. } | RetryDecision::GiveUp { attempts } => *attempts,
        }
    }
}

/// Decide what a failed delivery turns into.
///
/// `previous_attempts` is the counter before this failure. Once the total
/// reaches `attempts_per_round * max_rounds` the job gives up; a failure that
/// closes a round waits the round delay, any other the attempt delay.
pub fn decide(previous_attempts: u32, policy: &RetryPolicy, now: DateTime<Utc>) -> RetryDecision {
    let attempts = previous_attempts.saturating_add(1);
    let per_round = policy.attempts_per_round.max(1);
    let limit = per_round.saturating_mul(policy.max_rounds.max(1));

    if attempts >= limit {
        return RetryDecision::GiveUp { attempts };
    }

    let delay_secs = if attempts % per_round == 0 {
        policy.round_delay_secs
    } else {
        policy.attempt_delay_secs
    };
    RetryDecision::Retry {
        attempts,
        retry_after: now + Duration::seconds(delay_secs.min(i64::MAX as u64) as i64),
    }
}
