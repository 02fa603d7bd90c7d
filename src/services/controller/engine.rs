// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::ATTEMPT_LOG_CAPACITY;
use crate::common::constants::{RATE_LIMIT_WINDOW_SECS, SKIP_LOG_EVERY};
use crate::common::error::StrategyError;
use crate::domain::types::{AssetId, Direction, FeedSource};
use crate::services::controller::allocation::AllocationSnapshot;
use crate::services::controller::circuit_breaker::CircuitBreaker;
use crate::services::controller::clock::Clock;
use crate::services::controller::config::ControllerConfig;
use crate::services::controller::oracle::{OracleReading, PriceOracleService};
use crate::services::controller::rate_limit::RateLimiter;
use crate::services::controller::status::StatusSnapshot;
use crate::services::controller::swap_executor::{SwapExecutor, SwapRouter};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptOutcome {
    Success,
    Reverted,
    SlippageExceeded,
    LimitExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceAttempt {
    pub timestamp: u64,
    pub direction: Direction,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub amount_out: U256,
    pub slippage_bps: u64,
    pub fee_bps: u64,
    pub outcome: AttemptOutcome,
    pub gas_cost: U256,
    pub router: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    Shutdown,
    CircuitBreakerOpen { retry_in_secs: u64 },
    OracleFailureMode,
    Oracle(StrategyError),
    MinIntervalNotElapsed { remaining_secs: u64 },
    EmptyBasket,
    WithinThreshold { drift_bps: u64 },
    BelowMinPosition { amount: U256 },
    LimitExceeded(StrategyError),
    CycleInProgress,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Paused => "paused",
            SkipReason::Shutdown => "shutdown",
            SkipReason::CircuitBreakerOpen { .. } => "circuit_breaker_open",
            SkipReason::OracleFailureMode => "oracle_failure_mode",
            SkipReason::Oracle(_) => "oracle_failure",
            SkipReason::MinIntervalNotElapsed { .. } => "min_interval",
            SkipReason::EmptyBasket => "empty_basket",
            SkipReason::WithinThreshold { .. } => "within_threshold",
            SkipReason::BelowMinPosition { .. } => "below_min_position",
            SkipReason::LimitExceeded(_) => "daily_limit",
            SkipReason::CycleInProgress => "cycle_in_progress",
        }
    }

    /// Error a direct caller would have received, `None` for benign skips.
    pub fn to_error(&self) -> Option<StrategyError> {
        match self {
            SkipReason::Paused => Some(StrategyError::StrategyPaused),
            SkipReason::Shutdown => Some(StrategyError::StrategyShutdown),
            SkipReason::CircuitBreakerOpen { retry_in_secs } => {
                Some(StrategyError::CircuitBreakerOpen {
                    retry_in_secs: *retry_in_secs,
                })
            }
            SkipReason::OracleFailureMode => Some(StrategyError::OracleFailureMode),
            SkipReason::MinIntervalNotElapsed { remaining_secs } => {
                Some(StrategyError::MinIntervalNotElapsed {
                    remaining_secs: *remaining_secs,
                })
            }
            SkipReason::Oracle(err) | SkipReason::LimitExceeded(err) => Some(err.clone()),
            SkipReason::EmptyBasket
            | SkipReason::WithinThreshold { .. }
            | SkipReason::BelowMinPosition { .. }
            | SkipReason::CycleInProgress => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Executed(RebalanceAttempt),
    Failed(RebalanceAttempt),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped(reason) => reason.label(),
            CycleOutcome::Executed(_) => "executed",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

/// Lock-free cycle counters shared with the status server.
#[derive(Debug, Default)]
pub struct ControllerStats {
    pub cycles: AtomicU64,
    pub executed: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub skip_halted: AtomicU64,
    pub skip_circuit_breaker: AtomicU64,
    pub skip_oracle: AtomicU64,
    pub skip_interval: AtomicU64,
    pub skip_threshold: AtomicU64,
    pub skip_rate_limit: AtomicU64,
    pub skip_position_size: AtomicU64,
    pub skip_busy: AtomicU64,
}

impl ControllerStats {
    pub fn record(&self, outcome: &CycleOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CycleOutcome::Executed(_) => &self.executed,
            CycleOutcome::Failed(_) => &self.failed,
            CycleOutcome::Skipped(reason) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                match reason {
                    SkipReason::Paused | SkipReason::Shutdown => &self.skip_halted,
                    SkipReason::CircuitBreakerOpen { .. } => &self.skip_circuit_breaker,
                    SkipReason::OracleFailureMode | SkipReason::Oracle(_) => &self.skip_oracle,
                    SkipReason::MinIntervalNotElapsed { .. } => &self.skip_interval,
                    SkipReason::EmptyBasket | SkipReason::WithinThreshold { .. } => {
                        &self.skip_threshold
                    }
                    SkipReason::BelowMinPosition { .. } => &self.skip_position_size,
                    SkipReason::LimitExceeded(_) => &self.skip_rate_limit,
                    SkipReason::CycleInProgress => &self.skip_busy,
                }
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub rebalances_executed: u64,
    pub rebalances_failed: u64,
    pub swaps_executed: u64,
    pub swaps_failed: u64,
}

/// Last known state of one reference-asset oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleHealth {
    /// Last validated price; kept while the feed is unhealthy.
    pub price: U256,
    pub healthy: bool,
    pub updated_at: u64,
    pub source: Option<FeedSource>,
    pub last_error: Option<StrategyError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyWithdrawal {
    pub from_a: U256,
    pub from_b: U256,
}

/// Two-asset rebalancing controller.
///
/// One call to [`Controller::run_cycle`] is one decision cycle. Everything a
/// cycle mutates lives here; collaborators (feeds, pools, routers) are only
/// read or invoked. Budget reservation and `last_rebalance_time` are written
/// before the router is called.
pub struct Controller {
    pub(super) config: ControllerConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) oracle: PriceOracleService,
    pub(super) limiter: RateLimiter,
    pub(super) breaker: CircuitBreaker,
    pub(super) executor: SwapExecutor,
    pub(super) holdings: [U256; 2],
    pub(super) paused: bool,
    pub(super) shutdown: bool,
    pub(super) manual_oracle_failure: bool,
    pub(super) oracle_failure: bool,
    pub(super) last_rebalance_time: u64,
    pub(super) counters: Counters,
    pub(super) last_gas_cost: U256,
    pub(super) oracle_health: [OracleHealth; 2],
    pub(super) attempts: VecDeque<RebalanceAttempt>,
    pub(super) stats: Arc<ControllerStats>,
    pub(super) status_tx: watch::Sender<StatusSnapshot>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
        oracle: PriceOracleService,
        routers: Vec<Arc<dyn SwapRouter>>,
    ) -> Result<Self, StrategyError> {
        config.validate()?;
        let executor = SwapExecutor::new(
            routers,
            config.swap_bounds,
            config.max_slippage_bps,
            config.swap_fee_bps,
        )?;
        let now = clock.now();
        let limiter = RateLimiter::new(config.daily_swap_limit, RATE_LIMIT_WINDOW_SECS, now);
        let breaker = CircuitBreaker::new(config.breaker);
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let ctrl = Self {
            config,
            clock,
            oracle,
            limiter,
            breaker,
            executor,
            holdings: [U256::ZERO; 2],
            paused: false,
            shutdown: false,
            manual_oracle_failure: false,
            oracle_failure: false,
            last_rebalance_time: 0,
            counters: Counters::default(),
            last_gas_cost: U256::ZERO,
            oracle_health: Default::default(),
            attempts: VecDeque::with_capacity(ATTEMPT_LOG_CAPACITY),
            stats: Arc::new(ControllerStats::default()),
            status_tx,
        };
        ctrl.publish();
        Ok(ctrl)
    }

    pub fn stats(&self) -> Arc<ControllerStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Runs one decision cycle. Never returns an error: every failure ends
    /// as a skip or as a recorded failed attempt.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.cycle().await;
        self.stats.record(&outcome);
        match &outcome {
            CycleOutcome::Skipped(reason) => {
                let count = self.stats.skipped.load(Ordering::Relaxed);
                let error = reason.to_error().map(|e| e.to_string());
                let error = error.as_deref().unwrap_or("");
                if count % SKIP_LOG_EVERY == 0 {
                    tracing::info!(
                        target: "rebalance",
                        reason = reason.label(),
                        detail = ?reason,
                        error,
                        count,
                        "Rebalance skipped"
                    );
                } else {
                    tracing::debug!(
                        target: "rebalance",
                        reason = reason.label(),
                        detail = ?reason,
                        error,
                        count,
                        "Rebalance skipped"
                    );
                }
            }
            CycleOutcome::Executed(attempt) => tracing::info!(
                target: "rebalance",
                direction = %attempt.direction,
                amount_in = %attempt.amount_in,
                amount_out = %attempt.amount_out,
                "Rebalance executed"
            ),
            CycleOutcome::Failed(attempt) => tracing::warn!(
                target: "rebalance",
                direction = %attempt.direction,
                amount_in = %attempt.amount_in,
                outcome = ?attempt.outcome,
                error = attempt.error.as_deref().unwrap_or(""),
                fail_count = self.breaker.fail_count(),
                "Rebalance failed"
            ),
        }
        self.publish();
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let now = self.clock.now();
        self.breaker.poll(now);
        self.limiter.roll(now);

        if self.shutdown {
            return CycleOutcome::Skipped(SkipReason::Shutdown);
        }
        if self.paused {
            return CycleOutcome::Skipped(SkipReason::Paused);
        }
        if self.breaker.is_open() {
            return CycleOutcome::Skipped(SkipReason::CircuitBreakerOpen {
                retry_in_secs: self.breaker.time_until_reset(now),
            });
        }
        if self.manual_oracle_failure {
            return CycleOutcome::Skipped(SkipReason::OracleFailureMode);
        }
        let prices = match self.query_prices(now).await {
            Ok(prices) => prices,
            Err(err) => return CycleOutcome::Skipped(SkipReason::Oracle(err)),
        };

        let elapsed = now.saturating_sub(self.last_rebalance_time);
        if elapsed < self.config.min_rebalance_interval_secs {
            return CycleOutcome::Skipped(SkipReason::MinIntervalNotElapsed {
                remaining_secs: self.config.min_rebalance_interval_secs - elapsed,
            });
        }

        let snapshot = self.allocation();
        if snapshot.is_empty() {
            return CycleOutcome::Skipped(SkipReason::EmptyBasket);
        }
        let target = self.config.target_alloc_bps;
        let drift_bps = snapshot.drift_bps(target);
        let Some(overweight) = snapshot
            .overweight(target)
            .filter(|_| drift_bps >= self.config.rebalance_threshold_bps)
        else {
            return CycleOutcome::Skipped(SkipReason::WithinThreshold { drift_bps });
        };

        let direction = Direction::selling(overweight);
        let min_size = self.config.min_position_size;
        let mut amount_in = snapshot
            .excess(target)
            .max(min_size)
            .min(self.config.max_position_size)
            .min(snapshot.balance(direction.input()));
        let remaining = self.limiter.remaining(now);
        if amount_in > remaining && remaining >= min_size {
            amount_in = remaining;
        }
        if amount_in < min_size {
            return CycleOutcome::Skipped(SkipReason::BelowMinPosition { amount: amount_in });
        }

        let expected_out = self.expected_out(direction, amount_in, &prices);
        let min_amount_out = self.executor.min_amount_out(expected_out);
        let fee_bps = self.executor.swap_fee_bps();
        let mut attempt = RebalanceAttempt {
            timestamp: now,
            direction,
            amount_in,
            min_amount_out,
            amount_out: U256::ZERO,
            slippage_bps: self.executor.max_slippage_bps(),
            fee_bps,
            outcome: AttemptOutcome::LimitExceeded,
            gas_cost: U256::ZERO,
            router: None,
            error: None,
        };

        if let Err(err) = self.limiter.try_reserve(amount_in, now) {
            attempt.error = Some(err.to_string());
            self.push_attempt(attempt);
            return CycleOutcome::Skipped(SkipReason::LimitExceeded(err));
        }
        self.last_rebalance_time = now;

        tracing::info!(
            target: "rebalance",
            %direction,
            drift_bps,
            amount_in = %amount_in,
            min_amount_out = %min_amount_out,
            "Submitting rebalance swap"
        );
        let deadline = now.saturating_add(self.config.swap_deadline_secs);
        let result = self
            .executor
            .execute(direction, amount_in, min_amount_out, fee_bps, deadline)
            .await;

        match result {
            Ok(done) => {
                self.breaker.record_success(&mut self.limiter);
                self.counters.rebalances_executed += 1;
                self.counters.swaps_executed += 1;
                self.last_gas_cost = done.gas_cost;
                let input = direction.input().index();
                let output = direction.output().index();
                self.holdings[input] = self.holdings[input].saturating_sub(amount_in);
                self.holdings[output] = self.holdings[output].saturating_add(done.amount_out);

                attempt.outcome = AttemptOutcome::Success;
                attempt.amount_out = done.amount_out;
                attempt.gas_cost = done.gas_cost;
                attempt.router = Some(done.router);
                self.push_attempt(attempt.clone());
                CycleOutcome::Executed(attempt)
            }
            Err(failure) => {
                self.breaker.record_failure(now, &mut self.limiter);
                self.counters.rebalances_failed += 1;
                if failure.submitted {
                    self.counters.swaps_failed += 1;
                    self.last_gas_cost = failure.gas_cost;
                }

                attempt.outcome = match failure.error {
                    StrategyError::SlippageExceeded { .. } => AttemptOutcome::SlippageExceeded,
                    _ => AttemptOutcome::Reverted,
                };
                attempt.gas_cost = failure.gas_cost;
                attempt.error = Some(failure.error.to_string());
                self.push_attempt(attempt.clone());
                CycleOutcome::Failed(attempt)
            }
        }
    }

    /// Converts `amount_in` of the sold asset into the bought asset at
    /// oracle prices.
    fn expected_out(&self, direction: Direction, amount_in: U256, prices: &[U256; 2]) -> U256 {
        let price_in = prices[self.price_asset(direction.input()).index()];
        let price_out = prices[self.price_asset(direction.output()).index()];
        if price_in == price_out || price_out.is_zero() {
            return amount_in;
        }
        amount_in.saturating_mul(price_in) / price_out
    }

    fn price_asset(&self, slot: AssetId) -> AssetId {
        match slot {
            AssetId::A => self.config.price_asset_for_a,
            AssetId::B => self.config.price_asset_for_b,
        }
    }

    /// Validates both reference prices and updates cached oracle health.
    /// Any failure puts the controller in (automatic) oracle failure mode;
    /// a fully healthy query clears it.
    async fn query_prices(&mut self, now: u64) -> Result<[U256; 2], StrategyError> {
        let mut prices = [U256::ZERO; 2];
        let mut failure = None;
        for asset in AssetId::ALL {
            let result = self.oracle.get_validated_price(asset, now).await;
            let health = &mut self.oracle_health[asset.index()];
            match result {
                Ok(reading) => {
                    prices[asset.index()] = reading.price;
                    apply_reading(health, reading);
                }
                Err(err) => {
                    health.healthy = false;
                    health.last_error = Some(err.clone());
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            if !self.oracle_failure {
                tracing::error!(
                    target: "oracle",
                    reason = err.label(),
                    error = %err,
                    "Entering oracle failure mode"
                );
            }
            self.oracle_failure = true;
            return Err(err);
        }
        if self.oracle_failure {
            tracing::info!(target: "oracle", "Oracles healthy again; failure mode cleared");
        }
        self.oracle_failure = false;
        Ok(prices)
    }

    /// Queries both reference assets outside a cycle.
    pub async fn refresh_oracles(&mut self) -> Result<[U256; 2], StrategyError> {
        let now = self.clock.now();
        let prices = self.query_prices(now).await;
        self.publish();
        prices
    }

    fn push_attempt(&mut self, attempt: RebalanceAttempt) {
        if self.attempts.len() == ATTEMPT_LOG_CAPACITY {
            self.attempts.pop_front();
        }
        self.attempts.push_back(attempt);
    }

    pub fn allocation(&self) -> AllocationSnapshot {
        AllocationSnapshot::compute(self.holdings[0], self.holdings[1])
    }

    // ----- admin -----

    pub fn pause(&mut self) {
        if !self.paused {
            tracing::warn!(target: "rebalance", "Rebalancing paused");
        }
        self.paused = true;
        self.publish();
    }

    pub fn unpause(&mut self) -> Result<(), StrategyError> {
        if self.shutdown {
            return Err(StrategyError::StrategyShutdown);
        }
        if self.paused {
            tracing::info!(target: "rebalance", "Rebalancing resumed");
        }
        self.paused = false;
        self.publish();
        Ok(())
    }

    pub fn enable_oracle_failure_mode(&mut self) {
        tracing::warn!(target: "oracle", "Oracle failure mode enabled manually");
        self.manual_oracle_failure = true;
        self.publish();
    }

    /// Clears both the manual override and any automatic failure state.
    pub fn disable_oracle_failure_mode(&mut self) {
        tracing::info!(target: "oracle", "Oracle failure mode disabled");
        self.manual_oracle_failure = false;
        self.oracle_failure = false;
        self.publish();
    }

    pub fn set_max_slippage(&mut self, bps: u64) -> Result<(), StrategyError> {
        self.executor.set_max_slippage(bps)?;
        tracing::info!(target: "config", max_slippage_bps = bps, "Max slippage updated");
        self.publish();
        Ok(())
    }

    pub fn set_swap_fee(&mut self, bps: u64) -> Result<(), StrategyError> {
        self.executor.set_swap_fee(bps)?;
        tracing::info!(target: "config", swap_fee_bps = bps, "Swap fee updated");
        self.publish();
        Ok(())
    }

    /// Permanently stops rebalancing.
    pub fn shutdown(&mut self) {
        if !self.shutdown {
            tracing::error!(target: "rebalance", "Strategy shut down");
        }
        self.shutdown = true;
        self.publish();
    }

    /// Releases `amount` from tracked holdings, base asset (B) first.
    pub fn emergency_withdraw(&mut self, amount: U256) -> Result<EmergencyWithdrawal, StrategyError> {
        if !self.paused && !self.shutdown {
            return Err(StrategyError::NotHalted);
        }
        let available = self.holdings[0].saturating_add(self.holdings[1]);
        if amount > available {
            return Err(StrategyError::InsufficientHoldings {
                requested: amount,
                available,
            });
        }
        let from_b = amount.min(self.holdings[AssetId::B.index()]);
        let from_a = amount - from_b;
        self.holdings[AssetId::B.index()] -= from_b;
        self.holdings[AssetId::A.index()] -= from_a;
        tracing::warn!(
            target: "rebalance",
            amount = %amount,
            from_a = %from_a,
            from_b = %from_b,
            "Emergency withdraw"
        );
        self.publish();
        Ok(EmergencyWithdrawal { from_a, from_b })
    }

    // ----- vault boundary -----

    /// Room left under the deposit cap; zero while halted.
    pub fn available_deposit_limit(&self) -> U256 {
        if self.paused || self.shutdown {
            return U256::ZERO;
        }
        let total = self.holdings[0].saturating_add(self.holdings[1]);
        self.config.deposit_cap.saturating_sub(total)
    }

    pub fn record_deposit(&mut self, asset: AssetId, amount: U256) -> Result<(), StrategyError> {
        let available = self.available_deposit_limit();
        if amount > available {
            return Err(StrategyError::DepositCapExceeded {
                requested: amount,
                available,
            });
        }
        let slot = &mut self.holdings[asset.index()];
        *slot = slot.saturating_add(amount);
        tracing::debug!(target: "rebalance", %asset, amount = %amount, "Deposit credited");
        self.publish();
        Ok(())
    }

    pub fn record_withdrawal(&mut self, asset: AssetId, amount: U256) -> Result<(), StrategyError> {
        let slot = &mut self.holdings[asset.index()];
        if amount > *slot {
            return Err(StrategyError::InsufficientHoldings {
                requested: amount,
                available: *slot,
            });
        }
        *slot -= amount;
        tracing::debug!(target: "rebalance", %asset, amount = %amount, "Withdrawal debited");
        self.publish();
        Ok(())
    }

    /// Replaces tracked holdings with balances read from chain.
    pub fn sync_holdings(&mut self, balance_a: U256, balance_b: U256) {
        self.holdings = [balance_a, balance_b];
        self.publish();
    }
}

fn apply_reading(health: &mut OracleHealth, reading: OracleReading) {
    health.price = reading.price;
    health.healthy = true;
    health.updated_at = reading.updated_at;
    health.source = Some(reading.source);
    health.last_error = None;
}
