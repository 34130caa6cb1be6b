//! Exponential reconnect backoff with an upper bound.

use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub multiplier: u32,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            multiplier: 2,
            max_ms: 30_000,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    current_ms: u64,
}

impl From<BackoffPolicy> for BackoffState {
    fn from(policy: BackoffPolicy) -> Self {
        Self {
            current_ms: policy.initial_ms,
            policy,
        }
    }
}

impl BackoffState {
    pub fn reset(&mut self) {
        self.current_ms = self.policy.initial_ms;
    }

    /// Current backoff duration with full jitter applied, then advance the
    /// underlying duration towards `max_ms`.
    pub fn next_delay(&mut self) -> Duration {
        let jittered = rand::random::<f64>() * self.current_ms as f64;
        let delay = Duration::from_millis(jittered as u64);
        let advanced = self.current_ms.saturating_mul(self.policy.multiplier as u64);
        self.current_ms = advanced.min(self.policy.max_ms);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_max_ms() {
        let policy = BackoffPolicy {
            initial_ms: 100,
            multiplier: 10,
            max_ms: 1_000,
        };
        let mut state = BackoffState::from(policy);
        for _ in 0..10 {
            let delay = state.next_delay();
            assert!(delay.as_millis() <= 1_000);
        }
    }

    #[test]
    fn reset_returns_to_initial() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::from(policy);
        let _ = state.next_delay();
        state.reset();
        assert_eq!(state.current_ms, policy.initial_ms);
    }
}
