// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::StrategyError;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Window fields carried across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub daily_limit: U256,
    pub daily_used: U256,
    pub window_start: u64,
}

/// Rolling swap-volume budget.
///
/// Reservations are consumed, never refunded: a failed swap still spends its
/// share of the window so a flapping router cannot be retried without bound.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    daily_limit: U256,
    daily_used: U256,
    window_start: u64,
    window_duration: u64,
}

impl RateLimiter {
    pub fn new(daily_limit: U256, window_duration: u64, now: u64) -> Self {
        Self {
            daily_limit,
            daily_used: U256::ZERO,
            window_start: now,
            window_duration,
        }
    }

    fn window_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) >= self.window_duration
    }

    /// Starts a fresh window once the current one has run its course.
    pub fn roll(&mut self, now: u64) {
        if self.window_expired(now) {
            if !self.daily_used.is_zero() {
                tracing::debug!(
                    target: "rate_limit",
                    used = %self.daily_used,
                    limit = %self.daily_limit,
                    "Daily swap window rolled over"
                );
            }
            self.daily_used = U256::ZERO;
            self.window_start = now;
        }
    }

    pub fn try_reserve(&mut self, amount: U256, now: u64) -> Result<(), StrategyError> {
        self.roll(now);
        let remaining = self.daily_limit.saturating_sub(self.daily_used);
        if amount > remaining {
            return Err(StrategyError::DailyLimitExceeded {
                requested: amount,
                remaining,
            });
        }
        self.daily_used += amount;
        Ok(())
    }

    /// Budget left in the window as it would be seen at `now`.
    pub fn remaining(&self, now: u64) -> U256 {
        if self.window_expired(now) {
            return self.daily_limit;
        }
        self.daily_limit.saturating_sub(self.daily_used)
    }

    pub fn daily_limit(&self) -> U256 {
        self.daily_limit
    }

    /// Usage as it would be seen at `now`, i.e. zero once the window expired.
    pub fn daily_used(&self, now: u64) -> U256 {
        if self.window_expired(now) {
            U256::ZERO
        } else {
            self.daily_used
        }
    }

    /// Replaces the limit. Usage above a lowered limit is capped so that
    /// `daily_used <= daily_limit` keeps holding.
    pub fn set_daily_limit(&mut self, limit: U256) {
        self.daily_limit = limit;
        if self.daily_used > limit {
            self.daily_used = limit;
        }
    }

    pub fn time_until_reset(&self, now: u64) -> u64 {
        self.window_duration
            .saturating_sub(now.saturating_sub(self.window_start))
    }

    pub fn window_duration(&self) -> u64 {
        self.window_duration
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            daily_limit: self.daily_limit,
            daily_used: self.daily_used,
            window_start: self.window_start,
        }
    }

    /// Usage is capped at the restored limit.
    pub fn restore(&mut self, snapshot: WindowSnapshot) {
        self.window_start = snapshot.window_start;
        self.daily_used = snapshot.daily_used;
        self.set_daily_limit(snapshot.daily_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;

    #[test]
    fn reserves_until_budget_exhausted() {
        let mut limiter = RateLimiter::new(U256::from(100u64), DAY, 0);
        assert!(limiter.try_reserve(U256::from(60u64), 10).is_ok());
        assert!(limiter.try_reserve(U256::from(40u64), 20).is_ok());
        let err = limiter.try_reserve(U256::from(1u64), 30).unwrap_err();
        assert_eq!(
            err,
            StrategyError::DailyLimitExceeded {
                requested: U256::from(1u64),
                remaining: U256::ZERO
            }
        );
        assert_eq!(limiter.daily_used(30), U256::from(100u64));
    }

    #[test]
    fn window_resets_after_duration() {
        let mut limiter = RateLimiter::new(U256::from(100u64), DAY, 1_000);
        limiter.try_reserve(U256::from(100u64), 1_000).unwrap();
        assert_eq!(limiter.remaining(1_000 + DAY - 1), U256::ZERO);
        assert_eq!(limiter.remaining(1_000 + DAY), U256::from(100u64));

        limiter.try_reserve(U256::from(30u64), 1_000 + DAY).unwrap();
        assert_eq!(limiter.daily_used(1_000 + DAY), U256::from(30u64));
        assert_eq!(limiter.time_until_reset(1_000 + DAY), DAY);
    }

    #[test]
    fn lowering_limit_caps_usage() {
        let mut limiter = RateLimiter::new(U256::from(100u64), DAY, 0);
        limiter.try_reserve(U256::from(80u64), 0).unwrap();
        limiter.set_daily_limit(U256::from(10u64));
        assert_eq!(limiter.daily_used(0), U256::from(10u64));
        assert_eq!(limiter.remaining(0), U256::ZERO);

        limiter.set_daily_limit(U256::from(50u64));
        assert_eq!(limiter.remaining(0), U256::from(40u64));
    }

    #[test]
    fn restored_window_keeps_spent_budget() {
        let mut limiter = RateLimiter::new(U256::from(100u64), DAY, 500);
        limiter.try_reserve(U256::from(70u64), 600).unwrap();
        let snapshot = limiter.snapshot();

        let mut fresh = RateLimiter::new(U256::from(100u64), DAY, 5_000);
        fresh.restore(snapshot);
        assert_eq!(fresh.remaining(5_000), U256::from(30u64));
        assert_eq!(fresh.time_until_reset(5_000), DAY - 4_500);
        assert_eq!(fresh.remaining(500 + DAY), U256::from(100u64));
    }
}
