//! Attribution weighting strategies
//!
//! Contract: given the surviving `(tracking id, click timestamp)` pairs, return
//! one weight per id, each in `[0, 1]`, summing to 1.0.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::config::WeightingModel;

/// 权重和的容差
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

pub trait WeightingStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn weights(&self, clicks: &[(String, i64)], now: i64) -> Vec<(String, f64)>;
}

/// Most recent click gets 1.0, everything else 0.0.
///
/// Equal timestamps go to the entry that appears later in the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastClick;

impl WeightingStrategy for LastClick {
    fn name(&self) -> &str {
        "last_click"
    }

    fn weights(&self, clicks: &[(String, i64)], _now: i64) -> Vec<(String, f64)> {
        let winner = clicks
            .iter()
            .enumerate()
            .max_by_key(|(index, (_, ts))| (*ts, *index))
            .map(|(index, _)| index);
        clicks
            .iter()
            .enumerate()
            .map(|(index, (id, _))| {
                let weight = if Some(index) == winner { 1.0 } else { 0.0 };
                (id.clone(), weight)
            })
            .collect()
    }
}

/// Even split.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl WeightingStrategy for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn weights(&self, clicks: &[(String, i64)], _now: i64) -> Vec<(String, f64)> {
        if clicks.is_empty() {
            return Vec::new();
        }
        let share = 1.0 / clicks.len() as f64;
        clicks.iter().map(|(id, _)| (id.clone(), share)).collect()
    }
}

/// Exponential decay by click age, normalized.
///
/// Ages are measured from the newest click rather than from `now`, which
/// leaves the normalized result unchanged and keeps the largest raw weight at 1.
#[derive(Debug, Clone, Copy)]
pub struct TimeDecay {
    pub half_life_secs: u64,
}

impl WeightingStrategy for TimeDecay {
    fn name(&self) -> &str {
        "time_decay"
    }

    fn weights(&self, clicks: &[(String, i64)], _now: i64) -> Vec<(String, f64)> {
        let half_life = self.half_life_secs.max(1) as f64;
        let newest = clicks.iter().map(|(_, ts)| *ts).max().unwrap_or_default();
        let raw: Vec<f64> = clicks
            .iter()
            .map(|(_, ts)| {
                let age = (newest - ts).max(0) as f64;
                (-age / half_life).exp2()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        clicks
            .iter()
            .zip(raw)
            .map(|((id, _), w)| (id.clone(), if total > 0.0 { w / total } else { 0.0 }))
            .collect()
    }
}

pub fn strategy_for(model: WeightingModel, half_life_secs: u64) -> Arc<dyn WeightingStrategy> {
    match model {
        WeightingModel::LastClick => Arc::new(LastClick),
        WeightingModel::Linear => Arc::new(Linear),
        WeightingModel::TimeDecay => Arc::new(TimeDecay { half_life_secs }),
    }
}

/// 检查策略输出是否满足契约
pub fn satisfies_contract(clicks: &[(String, i64)], weights: &[(String, f64)]) -> bool {
    if clicks.len() != weights.len() {
        return false;
    }
    let expected: HashSet<&str> = clicks.iter().map(|(id, _)| id.as_str()).collect();
    let actual: HashSet<&str> = weights.iter().map(|(id, _)| id.as_str()).collect();
    if expected != actual {
        return false;
    }
    if weights
        .iter()
        .any(|(_, w)| !w.is_finite() || *w < 0.0 || *w > 1.0 + WEIGHT_TOLERANCE)
    {
        return false;
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    (sum - 1.0).abs() <= WEIGHT_TOLERANCE
}

/// 计算权重；策略输出不合约时记录日志并回退到 last-click
pub fn compute_weights(
    strategy: &dyn WeightingStrategy,
    clicks: &[(String, i64)],
    now: i64,
) -> Vec<(String, f64)> {
    let weights = strategy.weights(clicks, now);
    if satisfies_contract(clicks, &weights) {
        return weights;
    }
    warn!(
        "Weighting strategy '{}' returned weights violating the sum-to-one contract; falling back to last click",
        strategy.name()
    );
    LastClick.weights(clicks, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks() -> Vec<(String, i64)> {
        vec![
            ("a".repeat(64), 1_000),
            ("b".repeat(64), 4_600),
            ("c".repeat(64), 2_000),
        ]
    }

    fn sum(weights: &[(String, f64)]) -> f64 {
        weights.iter().map(|(_, w)| w).sum()
    }

    #[test]
    fn test_last_click_picks_most_recent() {
        let weights = LastClick.weights(&clicks(), 7_200);
        assert_eq!(weights[1], ("b".repeat(64), 1.0));
        assert_eq!(weights[0].1, 0.0);
        assert_eq!(weights[2].1, 0.0);
    }

    #[test]
    fn test_last_click_tie_goes_to_later_entry() {
        let tied = vec![("a".repeat(64), 5), ("b".repeat(64), 5)];
        let weights = LastClick.weights(&tied, 10);
        assert_eq!(weights[1].1, 1.0);
    }

    #[test]
    fn test_all_strategies_sum_to_one() {
        let strategies: Vec<Box<dyn WeightingStrategy>> = vec![
            Box::new(LastClick),
            Box::new(Linear),
            Box::new(TimeDecay {
                half_life_secs: 3_600,
            }),
        ];
        for n in 1..=12 {
            let input: Vec<(String, i64)> = (0..n)
                .map(|i| (format!("{:064x}", i), 1_000 + i as i64 * 977))
                .collect();
            for strategy in &strategies {
                let weights = strategy.weights(&input, 50_000);
                assert!(
                    (sum(&weights) - 1.0).abs() < WEIGHT_TOLERANCE,
                    "{} with {} clicks",
                    strategy.name(),
                    n
                );
                assert!(satisfies_contract(&input, &weights));
            }
        }
    }

    #[test]
    fn test_time_decay_favours_recent_clicks() {
        let weights = TimeDecay {
            half_life_secs: 3_600,
        }
        .weights(&clicks(), 8_200);
        assert!(weights[1].1 > weights[2].1);
        assert!(weights[2].1 > weights[0].1);
    }

    #[test]
    fn test_time_decay_handles_ancient_clicks() {
        let old = vec![("a".repeat(64), 0), ("b".repeat(64), 0)];
        let weights = TimeDecay { half_life_secs: 1 }.weights(&old, i64::from(u32::MAX));
        assert_eq!(weights[0].1, 0.5);
        assert_eq!(weights[1].1, 0.5);
    }

    struct Broken;

    impl WeightingStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn weights(&self, clicks: &[(String, i64)], _now: i64) -> Vec<(String, f64)> {
            clicks.iter().map(|(id, _)| (id.clone(), 0.7)).collect()
        }
    }

    #[test]
    fn test_contract_violation_falls_back_to_last_click() {
        let weights = compute_weights(&Broken, &clicks(), 7_200);
        assert_eq!(weights, LastClick.weights(&clicks(), 7_200));
    }

    #[test]
    fn test_contract_rejects_missing_ids() {
        let input = clicks();
        let partial = vec![("a".repeat(64), 1.0)];
        assert!(!satisfies_contract(&input, &partial));
    }
}
