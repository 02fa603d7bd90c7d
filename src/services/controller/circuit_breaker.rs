// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::services::controller::rate_limit::RateLimiter;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub trip_threshold: u32,
    pub trip_duration_secs: u64,
    /// Successful rebalances needed to ramp back to the full limit.
    pub recovery_steps: u32,
    pub recovery_floor: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BreakerState {
    Closed { fail_count: u32 },
    Open { since: u64 },
    Recovering { step: u32 },
}

/// Breaker fields carried across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub last_failure_at: Option<u64>,
    pub pre_recovery_daily_limit: U256,
}

/// Consecutive-failure breaker with a gradual, success-driven recovery ramp.
///
/// While open or recovering the breaker owns the rate limiter's daily limit:
/// it is pinned to the recovery floor on trip and raised one step per
/// successful rebalance until the pre-trip limit is restored.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: BreakerState,
    last_failure_at: Option<u64>,
    pre_recovery_daily_limit: U256,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed { fail_count: 0 },
            last_failure_at: None,
            pre_recovery_daily_limit: U256::ZERO,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            last_failure_at: self.last_failure_at,
            pre_recovery_daily_limit: self.pre_recovery_daily_limit,
        }
    }

    pub fn restore(&mut self, snapshot: BreakerSnapshot) {
        self.state = snapshot.state;
        self.last_failure_at = snapshot.last_failure_at;
        self.pre_recovery_daily_limit = snapshot.pre_recovery_daily_limit;
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Moves an expired `Open` breaker into `Recovering`.
    pub fn poll(&mut self, now: u64) {
        if let BreakerState::Open { since } = self.state
            && now.saturating_sub(since) >= self.config.trip_duration_secs
        {
            self.state = BreakerState::Recovering { step: 0 };
            tracing::info!(
                target: "circuit_breaker",
                steps = self.config.recovery_steps,
                "Circuit breaker cooled down; gradual recovery started"
            );
        }
    }

    pub fn record_success(&mut self, limiter: &mut RateLimiter) {
        match self.state {
            BreakerState::Closed { .. } => {
                self.state = BreakerState::Closed { fail_count: 0 };
            }
            BreakerState::Recovering { step } => {
                let next = step.saturating_add(1);
                if next >= self.config.recovery_steps {
                    limiter.set_daily_limit(self.pre_recovery_daily_limit);
                    self.state = BreakerState::Closed { fail_count: 0 };
                    tracing::info!(
                        target: "circuit_breaker",
                        limit = %self.pre_recovery_daily_limit,
                        "Gradual recovery complete; daily limit restored"
                    );
                } else {
                    let limit = self.ramp_limit(next);
                    limiter.set_daily_limit(limit);
                    self.state = BreakerState::Recovering { step: next };
                    tracing::info!(
                        target: "circuit_breaker",
                        step = next,
                        steps = self.config.recovery_steps,
                        limit = %limit,
                        "Gradual recovery advanced"
                    );
                }
            }
            // the engine never executes while open
            BreakerState::Open { .. } => {}
        }
    }

    pub fn record_failure(&mut self, now: u64, limiter: &mut RateLimiter) {
        self.last_failure_at = Some(now);
        match self.state {
            BreakerState::Closed { fail_count } => {
                let fail_count = fail_count.saturating_add(1);
                if fail_count >= self.config.trip_threshold {
                    self.pre_recovery_daily_limit = limiter.daily_limit();
                    self.trip(now, limiter);
                } else {
                    self.state = BreakerState::Closed { fail_count };
                    tracing::warn!(
                        target: "circuit_breaker",
                        fail_count,
                        threshold = self.config.trip_threshold,
                        "Rebalance failure recorded"
                    );
                }
            }
            // keep the limit snapshot from the original trip
            BreakerState::Recovering { .. } => self.trip(now, limiter),
            BreakerState::Open { .. } => {
                self.state = BreakerState::Open { since: now };
            }
        }
    }

    fn trip(&mut self, now: u64, limiter: &mut RateLimiter) {
        let floor = self.floor();
        limiter.set_daily_limit(floor);
        self.state = BreakerState::Open { since: now };
        tracing::error!(
            target: "circuit_breaker",
            threshold = self.config.trip_threshold,
            cooldown_secs = self.config.trip_duration_secs,
            floor = %floor,
            pre_recovery_limit = %self.pre_recovery_daily_limit,
            "CIRCUIT BREAKER TRIPPED"
        );
    }

    fn floor(&self) -> U256 {
        self.config.recovery_floor.min(self.pre_recovery_daily_limit)
    }

    fn ramp_limit(&self, step: u32) -> U256 {
        let floor = self.floor();
        let span = self.pre_recovery_daily_limit.saturating_sub(floor);
        let steps = U256::from(self.config.recovery_steps.max(1));
        floor + span * U256::from(step) / steps
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open { .. })
    }

    /// `true` exactly while `fail_count() >= trip_threshold`.
    pub fn tripped(&self) -> bool {
        self.is_open()
    }

    pub fn gradual_recovery_active(&self) -> bool {
        matches!(self.state, BreakerState::Recovering { .. })
    }

    pub fn fail_count(&self) -> u32 {
        match self.state {
            BreakerState::Closed { fail_count } => fail_count,
            BreakerState::Open { .. } => self.config.trip_threshold,
            BreakerState::Recovering { .. } => 0,
        }
    }

    pub fn last_failure_at(&self) -> Option<u64> {
        self.last_failure_at
    }

    pub fn pre_recovery_daily_limit(&self) -> U256 {
        self.pre_recovery_daily_limit
    }

    pub fn time_since_last_failure(&self, now: u64) -> u64 {
        self.last_failure_at
            .map(|ts| now.saturating_sub(ts))
            .unwrap_or(0)
    }

    pub fn time_until_reset(&self, now: u64) -> u64 {
        match self.state {
            BreakerState::Open { since } => self
                .config
                .trip_duration_secs
                .saturating_sub(now.saturating_sub(since)),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;

    fn setup() -> (CircuitBreaker, RateLimiter) {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            trip_threshold: 3,
            trip_duration_secs: 3_600,
            recovery_steps: 4,
            recovery_floor: U256::from(100u64),
        });
        let limiter = RateLimiter::new(U256::from(1_000u64), DAY, 0);
        (breaker, limiter)
    }

    #[test]
    fn success_resets_failure_count() {
        let (mut breaker, mut limiter) = setup();
        breaker.record_failure(10, &mut limiter);
        breaker.record_failure(20, &mut limiter);
        assert_eq!(breaker.fail_count(), 2);
        breaker.record_success(&mut limiter);
        assert_eq!(breaker.fail_count(), 0);
        assert!(!breaker.tripped());
    }

    #[test]
    fn trips_at_threshold_and_pins_limit_to_floor() {
        let (mut breaker, mut limiter) = setup();
        for ts in [10, 20, 30] {
            breaker.record_failure(ts, &mut limiter);
        }
        assert!(breaker.tripped());
        assert_eq!(breaker.fail_count(), 3);
        assert_eq!(breaker.pre_recovery_daily_limit(), U256::from(1_000u64));
        assert_eq!(limiter.daily_limit(), U256::from(100u64));
        assert_eq!(breaker.time_until_reset(30 + 600), 3_000);
    }

    #[test]
    fn recovers_linearly_after_cooldown() {
        let (mut breaker, mut limiter) = setup();
        for ts in [10, 20, 30] {
            breaker.record_failure(ts, &mut limiter);
        }

        breaker.poll(30 + 3_599);
        assert!(breaker.is_open());
        breaker.poll(30 + 3_600);
        assert!(breaker.gradual_recovery_active());
        assert!(!breaker.tripped());
        assert_eq!(breaker.fail_count(), 0);

        // floor 100, target 1000, four steps of 225
        let expected = [325u64, 550, 775];
        for limit in expected {
            breaker.record_success(&mut limiter);
            assert_eq!(limiter.daily_limit(), U256::from(limit));
            assert!(breaker.gradual_recovery_active());
        }
        breaker.record_success(&mut limiter);
        assert_eq!(breaker.state(), BreakerState::Closed { fail_count: 0 });
        assert_eq!(limiter.daily_limit(), U256::from(1_000u64));
    }

    #[test]
    fn failure_while_recovering_retrips_with_original_snapshot() {
        let (mut breaker, mut limiter) = setup();
        for ts in [10, 20, 30] {
            breaker.record_failure(ts, &mut limiter);
        }
        breaker.poll(10_000);
        breaker.record_success(&mut limiter);
        assert_eq!(limiter.daily_limit(), U256::from(325u64));

        breaker.record_failure(10_100, &mut limiter);
        assert!(breaker.tripped());
        assert_eq!(limiter.daily_limit(), U256::from(100u64));
        assert_eq!(breaker.pre_recovery_daily_limit(), U256::from(1_000u64));
        assert_eq!(breaker.time_until_reset(10_100), 3_600);
    }

    #[test]
    fn restored_open_breaker_keeps_cooling_down() {
        let (mut breaker, mut limiter) = setup();
        for ts in [10, 20, 30] {
            breaker.record_failure(ts, &mut limiter);
        }
        let json = serde_json::to_string(&breaker.snapshot()).unwrap();
        assert!(json.contains("\"kind\":\"open\""));

        let (mut restored, _) = setup();
        restored.restore(serde_json::from_str(&json).unwrap());
        assert!(restored.tripped());
        assert_eq!(restored.time_until_reset(630), 3_000);
        assert_eq!(restored.pre_recovery_daily_limit(), U256::from(1_000u64));
        restored.poll(3_630);
        assert!(restored.gradual_recovery_active());
    }

    #[test]
    fn floor_never_exceeds_pre_trip_limit() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
            trip_threshold: 1,
            trip_duration_secs: 300,
            recovery_steps: 2,
            recovery_floor: U256::from(5_000u64),
        });
        let mut limiter = RateLimiter::new(U256::from(1_000u64), DAY, 0);
        breaker.record_failure(1, &mut limiter);
        assert_eq!(limiter.daily_limit(), U256::from(1_000u64));
    }
}
