//! Reconnection policy
//!
//! Decides, after a channel failure, whether another `connect` should be
//! scheduled and how long to wait before it. The delay schedule comes from
//! [`ReconnectConfig::delay_for`]; no jitter is applied so the total retry
//! time stays bounded by [`ReconnectConfig::max_total_retry_time`].

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Attempts made against a configured maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts_made: u32,
    max_attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_made)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Consume one attempt, returning its 1-based number
    fn take(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts_made += 1;
        Some(self.attempts_made)
    }

    pub fn reset(&mut self) {
        self.attempts_made = 0;
    }
}

/// Outcome of consulting the policy after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule attempt number `attempt` after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Every attempt has been used
    Exhausted { attempts: u32 },
    /// Automatic reconnection is off
    Disabled,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    budget: RetryBudget,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let budget = RetryBudget::new(config.max_attempts);
        Self { config, budget }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Called on every channel failure
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if !self.config.auto_reconnect {
            return ReconnectDecision::Disabled;
        }
        match self.budget.take() {
            Some(attempt) => ReconnectDecision::Retry {
                attempt,
                delay: self.config.delay_for(attempt),
            },
            None => ReconnectDecision::Exhausted {
                attempts: self.budget.attempts_made(),
            },
        }
    }

    /// Called on every transition to `connected`
    pub fn on_connected(&mut self) {
        self.budget.reset();
    }

    /// Called on `disconnect()` and on an explicit caller `connect()`
    pub fn reset(&mut self) {
        self.budget.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backoff;
    use proptest::prelude::*;

    fn policy(max_attempts: u32, interval_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            max_attempts,
            interval_ms,
            ..Default::default()
        })
    }

    #[test]
    fn test_policy_exposes_its_config() {
        let policy = policy(4, 250);
        assert_eq!(policy.config().max_attempts, 4);
        assert_eq!(policy.config().interval_ms, 250);
        assert_eq!(policy.budget().max_attempts(), 4);
    }

    #[test]
    fn test_disabled_never_retries() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            auto_reconnect: false,
            ..Default::default()
        });
        for _ in 0..10 {
            assert_eq!(policy.on_failure(), ReconnectDecision::Disabled);
        }
        assert_eq!(policy.budget().attempts_made(), 0);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut policy = policy(3, 50);
        for expected in 1..=3 {
            assert_eq!(
                policy.on_failure(),
                ReconnectDecision::Retry {
                    attempt: expected,
                    delay: Duration::from_millis(50)
                }
            );
        }
        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Exhausted { attempts: 3 }
        );
        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Exhausted { attempts: 3 }
        );
        assert!(policy.budget().is_exhausted());
    }

    #[test]
    fn test_reset_on_connected() {
        let mut policy = policy(3, 50);
        policy.on_failure();
        policy.on_failure();
        assert_eq!(policy.budget().attempts_made(), 2);

        policy.on_connected();
        assert_eq!(policy.budget().remaining(), 3);
        assert!(matches!(
            policy.on_failure(),
            ReconnectDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_zero_attempts_is_immediately_exhausted() {
        let mut policy = policy(0, 50);
        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Exhausted { attempts: 0 }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]
        #[test]
        fn property_scheduled_delays_fit_the_bound(
            max_attempts in 0u32..12,
            interval_ms in 1u64..5000,
            extra in 0u64..60000,
            exponential in any::<bool>(),
        ) {
            let config = ReconnectConfig {
                max_attempts,
                interval_ms,
                max_interval_ms: interval_ms + extra,
                backoff: if exponential { Backoff::Exponential } else { Backoff::Fixed },
                ..Default::default()
            };
            let bound = config.max_total_retry_time();
            let mut policy = ReconnectPolicy::new(config);

            let mut total = Duration::ZERO;
            let mut retries = 0;
            while let ReconnectDecision::Retry { delay, .. } = policy.on_failure() {
                total += delay;
                retries += 1;
            }
            prop_assert_eq!(retries, max_attempts);
            prop_assert!(total <= bound);
        }
    }
}
