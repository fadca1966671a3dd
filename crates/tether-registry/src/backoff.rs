// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect delay policy.

use std::time::Duration;

use tether_config::model::RegistryConfig;

/// Exponential backoff: `base * factor^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    /// Reconnects allowed before giving up until the next explicit connect.
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor,
            max: Duration::from_millis(config.backoff_max_ms),
            max_retries: config.max_retries,
        }
    }

    /// Delay before reconnect number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * self.factor.max(1.0).powi(exponent);
        let max_millis = self.max.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(2000),
            factor: 2.0,
            max: Duration::from_secs(300),
            max_retries: 10,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_secs(2));
        assert_eq!(p.delay(1), Duration::from_secs(4));
        assert_eq!(p.delay(3), Duration::from_secs(16));
        assert_eq!(p.delay(8), Duration::from_secs(300));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn retry_budget() {
        let p = policy();
        assert!(p.should_retry(9));
        assert!(!p.should_retry(10));
    }

    #[test]
    fn defaults_follow_registry_config() {
        let p = BackoffPolicy::default();
        assert_eq!(p.base, Duration::from_millis(2000));
        assert_eq!(p.max, Duration::from_millis(300_000));
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_and_bounded(
            base_ms in 1u64..10_000,
            factor in 1.0f64..4.0,
            max_ms in 1u64..1_000_000,
            attempt in 0u32..200,
        ) {
            let p = BackoffPolicy {
                base: Duration::from_millis(base_ms),
                factor,
                max: Duration::from_millis(max_ms),
                max_retries: 10,
            };
            prop_assert!(p.delay(attempt) <= p.max);
            prop_assert!(p.delay(attempt) <= p.delay(attempt + 1));
        }
    }
}
