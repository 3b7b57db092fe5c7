//! Retry budget and linear backoff schedule for completion calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds the completion retries made against a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Calls made against one model before moving to the next.
    pub max_retries_per_model: u32,
    /// Delay before the second call to a model, in seconds.
    pub base_delay_secs: u64,
    /// Added to the delay after every further failure, in seconds.
    pub increment_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries_per_model: 3,
            base_delay_secs: 7,
            increment_secs: 5,
        }
    }
}

impl RetryPolicy {
    /// Linear delays `base, base + inc, base + 2 * inc, ...` (unbounded).
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: Duration::from_secs(self.base_delay_secs),
            increment: Duration::from_secs(self.increment_secs),
        }
    }
}

/// Lazy linear backoff sequence. Reset by calling [`RetryPolicy::delays`] again.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    increment: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.next.saturating_add(self.increment);
        Some(current)
    }
}

/// Monotonic attempt counter with a fixed ceiling.
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

    /// Consume one attempt. Returns the 1-indexed attempt number, or `None`
    /// once the budget is spent.
    pub fn take(&mut self) -> Option<u32> {
        if self.attempts_made >= self.max_attempts {
            return None;
        }
        self.attempts_made += 1;
        Some(self.attempts_made)
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts - self.attempts_made
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_seven_twelve_seventeen() {
        let delays: Vec<u64> = RetryPolicy::default()
            .delays()
            .take(3)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![7, 12, 17]);
    }

    #[test]
    fn budget_stops_at_ceiling() {
        let mut budget = RetryBudget::new(2);
        assert_eq!(budget.take(), Some(1));
        assert_eq!(budget.take(), Some(2));
        assert_eq!(budget.take(), None);
        assert_eq!(budget.attempts_made(), 2);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn zero_budget_never_yields() {
        let mut budget = RetryBudget::new(0);
        assert_eq!(budget.take(), None);
    }
}
