//! Bounded exponential backoff and per-fault-class retry budgets.

use crate::error::FaultClass;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts for transient/topology faults.
    pub transient_attempts: u32,
    /// Maximum fresh-snapshot attempts for snapshot-lifecycle faults.
    pub snapshot_attempts: u32,
    /// Maximum attempts for lock-acquisition faults.
    pub lock_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_attempts: 5,
            snapshot_attempts: 3,
            lock_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The attempt cap for a fault class. Classes with no retry policy
    /// (precondition, unrecoverable, schema divergence beyond its single
    /// restore retry) cap at zero.
    pub fn attempts_for(&self, class: FaultClass) -> u32 {
        match class {
            FaultClass::Transient => self.transient_attempts,
            FaultClass::SnapshotLifecycle => self.snapshot_attempts,
            FaultClass::Lock => self.lock_attempts,
            FaultClass::SchemaDivergence => 1,
            FaultClass::BinlogWindow => 0,
            FaultClass::Precondition => 0,
            FaultClass::Unrecoverable => 0,
        }
    }

    /// Compute the backoff before attempt `attempt` (zero-based).
    ///
    /// `initial_backoff * multiplier^attempt`, capped at `max_backoff`,
    /// with up to 50% random jitter added when enabled.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as f64;
        let max_ms = self.max_backoff.as_millis() as f64;
        let computed = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = computed.min(max_ms) as u64;

        if self.jitter && capped > 1 {
            let jitter_ms = rand::random::<u64>() % (capped / 2);
            Duration::from_millis(capped.saturating_add(jitter_ms))
        } else {
            Duration::from_millis(capped)
        }
    }
}

/// Per-fault-class attempt counters, reset on any success.
#[derive(Debug, Default)]
pub struct RetryBudget {
    attempts: HashMap<FaultClass, u32>,
}

impl RetryBudget {
    /// Create an empty budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of the given class; returns the attempt count so far.
    pub fn record_failure(&mut self, class: FaultClass) -> u32 {
        let count = self.attempts.entry(class).or_insert(0);
        *count += 1;
        *count
    }

    /// Attempts recorded for a class since the last success.
    pub fn attempts(&self, class: FaultClass) -> u32 {
        self.attempts.get(&class).copied().unwrap_or(0)
    }

    /// True if another retry of this class is within budget.
    pub fn within_budget(&self, class: FaultClass, config: &RetryConfig) -> bool {
        self.attempts(class) < config.attempts_for(class)
    }

    /// A success resets every counter.
    pub fn record_success(&mut self) {
        self.attempts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod backoff {
        use super::*;

        fn no_jitter() -> RetryConfig {
            RetryConfig { jitter: false, ..Default::default() }
        }

        #[test]
        fn test_exponential_growth() {
            let config = no_jitter();
            assert_eq!(config.compute_backoff(0), Duration::from_millis(100));
            assert_eq!(config.compute_backoff(1), Duration::from_millis(200));
            assert_eq!(config.compute_backoff(2), Duration::from_millis(400));
        }

        #[test]
        fn test_capped_at_max() {
            let config = no_jitter();
            assert_eq!(config.compute_backoff(20), Duration::from_secs(10));
        }

        #[test]
        fn test_jitter_bounded() {
            let config = RetryConfig::default();
            for attempt in 0..5 {
                let d = config.compute_backoff(attempt);
                let base = no_jitter().compute_backoff(attempt);
                assert!(d >= base);
                assert!(d <= base + base / 2 + Duration::from_millis(1));
            }
        }
    }

    mod attempt_caps {
        use super::*;

        #[test]
        fn test_caps_per_class() {
            let config = RetryConfig::default();
            assert_eq!(config.attempts_for(FaultClass::Transient), 5);
            assert_eq!(config.attempts_for(FaultClass::SnapshotLifecycle), 3);
            assert_eq!(config.attempts_for(FaultClass::Lock), 3);
            assert_eq!(config.attempts_for(FaultClass::SchemaDivergence), 1);
        }

        #[test]
        fn test_non_retryable_classes_cap_zero() {
            let config = RetryConfig::default();
            assert_eq!(config.attempts_for(FaultClass::Precondition), 0);
            assert_eq!(config.attempts_for(FaultClass::BinlogWindow), 0);
            assert_eq!(config.attempts_for(FaultClass::Unrecoverable), 0);
        }
    }

    mod budget {
        use super::*;

        #[test]
        fn test_within_budget_until_cap() {
            let config = RetryConfig::default();
            let mut budget = RetryBudget::new();
            for _ in 0..5 {
                assert!(budget.within_budget(FaultClass::Transient, &config));
                budget.record_failure(FaultClass::Transient);
            }
            assert!(!budget.within_budget(FaultClass::Transient, &config));
        }

        #[test]
        fn test_success_resets_all_counters() {
            let config = RetryConfig::default();
            let mut budget = RetryBudget::new();
            budget.record_failure(FaultClass::Transient);
            budget.record_failure(FaultClass::Lock);
            budget.record_success();
            assert_eq!(budget.attempts(FaultClass::Transient), 0);
            assert_eq!(budget.attempts(FaultClass::Lock), 0);
            assert!(budget.within_budget(FaultClass::Transient, &config));
        }

        #[test]
        fn test_classes_tracked_independently() {
            let mut budget = RetryBudget::new();
            budget.record_failure(FaultClass::Transient);
            budget.record_failure(FaultClass::Transient);
            budget.record_failure(FaultClass::Lock);
            assert_eq!(budget.attempts(FaultClass::Transient), 2);
            assert_eq!(budget.attempts(FaultClass::Lock), 1);
            assert_eq!(budget.attempts(FaultClass::SnapshotLifecycle), 0);
        }

        #[test]
        fn test_unrecoverable_never_within_budget() {
            let config = RetryConfig::default();
            let budget = RetryBudget::new();
            assert!(!budget.within_budget(FaultClass::Unrecoverable, &config));
            assert!(!budget.within_budget(FaultClass::Precondition, &config));
        }
    }
}
