// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::{
    STATUS_CIRCUIT_BREAKER, STATUS_HEALTHY, STATUS_ORACLE_FAILURE, STATUS_PAUSED,
    STATUS_RECOVERING, STATUS_SHUTDOWN, STATUS_UNHEALTHY,
};
use crate::domain::types::AssetId;
use crate::services::controller::circuit_breaker::BreakerState;
use crate::services::controller::engine::{Controller, Counters, OracleHealth, RebalanceAttempt};
use alloy::primitives::U256;
use serde::Serialize;
use tokio::sync::watch;

// Field order of the payloads below is part of the read surface.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStatus {
    pub is_paused: bool,
    pub is_circuit_breaker_triggered: bool,
    pub is_in_oracle_failure_mode: bool,
    pub total_holdings: U256,
    pub daily_swap_used: U256,
    pub daily_swap_limit: U256,
    pub last_gas_cost: U256,
    pub rebalances_executed: u64,
    pub rebalances_failed: u64,
    pub swaps_executed: u64,
    pub swaps_failed: u64,
    pub asset_a_alloc_bps: u64,
    pub asset_b_alloc_bps: u64,
    pub fail_count: u32,
    pub time_until_reset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationDetails {
    pub asset_a_balance: U256,
    pub asset_b_balance: U256,
    /// Always zero: no third balance is ever folded into the basket.
    pub third_balance: U256,
    pub total_balance: U256,
    pub asset_a_percent_bps: u64,
    pub asset_b_percent_bps: u64,
    pub asset_c_percent_bps: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub tripped: bool,
    pub fail_count: u32,
    pub time_since_last_failure: u64,
    pub time_until_reset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleStatus {
    pub price_a: U256,
    pub price_b: U256,
    pub healthy_a: bool,
    pub healthy_b: bool,
    pub in_failure_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub daily_used: U256,
    pub daily_limit: U256,
    pub time_until_window_reset: u64,
    pub time_since_last_rebalance: u64,
    pub min_rebalance_interval: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDiagnostics {
    pub system_healthy: bool,
    pub oracles_operational: bool,
    pub router_operational: bool,
    pub config_valid: bool,
    pub position_size_valid: bool,
    pub status_text: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StrategyMode {
    #[default]
    Normal,
    Paused,
    OracleFailureMode,
    CircuitBreakerTripped,
    GradualRecovery,
    Shutdown,
}

impl StrategyMode {
    pub fn status_text(self) -> &'static str {
        match self {
            StrategyMode::Normal => STATUS_HEALTHY,
            StrategyMode::Paused => STATUS_PAUSED,
            StrategyMode::OracleFailureMode => STATUS_ORACLE_FAILURE,
            StrategyMode::CircuitBreakerTripped => STATUS_CIRCUIT_BREAKER,
            StrategyMode::GradualRecovery => STATUS_RECOVERING,
            StrategyMode::Shutdown => STATUS_SHUTDOWN,
        }
    }
}

/// Everything the status server renders, captured at `taken_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub taken_at: u64,
    pub strategy: StrategyStatus,
    pub allocation: AllocationDetails,
    pub circuit_breaker: CircuitBreakerStatus,
    pub oracle: OracleStatus,
    pub rate_limit: RateLimitStatus,
    pub diagnostics: SystemDiagnostics,
    pub mode: StrategyMode,
    pub pre_recovery_daily_limit: U256,
    pub available_deposit_limit: U256,
    pub routers: Vec<String>,
    /// Newest first.
    pub attempts: Vec<RebalanceAttempt>,
}

/// Read-only views. None of these mutate state or fail.
impl Controller {
    pub fn strategy_status(&self) -> StrategyStatus {
        let now = self.clock.now();
        let snapshot = self.allocation();
        StrategyStatus {
            is_paused: self.paused,
            is_circuit_breaker_triggered: self.breaker.tripped(),
            is_in_oracle_failure_mode: self.in_oracle_failure_mode(),
            total_holdings: snapshot.total_holdings,
            daily_swap_used: self.limiter.daily_used(now),
            daily_swap_limit: self.limiter.daily_limit(),
            last_gas_cost: self.last_gas_cost,
            rebalances_executed: self.counters.rebalances_executed,
            rebalances_failed: self.counters.rebalances_failed,
            swaps_executed: self.counters.swaps_executed,
            swaps_failed: self.counters.swaps_failed,
            asset_a_alloc_bps: snapshot.asset_a_percent_bps,
            asset_b_alloc_bps: snapshot.asset_b_percent_bps,
            fail_count: self.breaker.fail_count(),
            time_until_reset: self.breaker.time_until_reset(now),
        }
    }

    pub fn allocation_details(&self) -> AllocationDetails {
        let snapshot = self.allocation();
        AllocationDetails {
            asset_a_balance: snapshot.asset_a_balance,
            asset_b_balance: snapshot.asset_b_balance,
            third_balance: U256::ZERO,
            total_balance: snapshot.total_holdings,
            asset_a_percent_bps: snapshot.asset_a_percent_bps,
            asset_b_percent_bps: snapshot.asset_b_percent_bps,
            asset_c_percent_bps: 0,
        }
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        CircuitBreakerStatus {
            tripped: self.breaker.tripped(),
            fail_count: self.breaker.fail_count(),
            time_since_last_failure: self.breaker.time_since_last_failure(now),
            time_until_reset: self.breaker.time_until_reset(now),
        }
    }

    pub fn oracle_status(&self) -> OracleStatus {
        let [a, b] = &self.oracle_health;
        OracleStatus {
            price_a: a.price,
            price_b: b.price,
            healthy_a: a.healthy,
            healthy_b: b.healthy,
            in_failure_mode: self.in_oracle_failure_mode(),
        }
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        let now = self.clock.now();
        RateLimitStatus {
            daily_used: self.limiter.daily_used(now),
            daily_limit: self.limiter.daily_limit(),
            time_until_window_reset: self.limiter.time_until_reset(now),
            time_since_last_rebalance: self.time_since_last_rebalance(now),
            min_rebalance_interval: self.config.min_rebalance_interval_secs,
        }
    }

    pub fn system_diagnostics(&self) -> SystemDiagnostics {
        let mode = self.strategy_mode();
        let oracles_operational = self.oracle_health.iter().all(|h| h.healthy);
        let router_operational = self.executor.router_operational();
        let config_valid = self.config.validate().is_ok()
            && self
                .executor
                .bounds()
                .check_slippage(self.executor.max_slippage_bps())
                .is_ok()
            && self
                .executor
                .bounds()
                .check_fee(self.executor.swap_fee_bps())
                .is_ok();
        let position_size_valid = !self.config.min_position_size.is_zero()
            && self.config.min_position_size <= self.config.max_position_size;
        let system_healthy = mode == StrategyMode::Normal
            && oracles_operational
            && router_operational
            && config_valid
            && position_size_valid;

        let status_text = match mode {
            StrategyMode::Normal if !system_healthy => STATUS_UNHEALTHY,
            other => other.status_text(),
        };
        SystemDiagnostics {
            system_healthy,
            oracles_operational,
            router_operational,
            config_valid,
            position_size_valid,
            status_text,
        }
    }

    /// Most restrictive mode wins.
    pub fn strategy_mode(&self) -> StrategyMode {
        if self.shutdown {
            StrategyMode::Shutdown
        } else if self.paused {
            StrategyMode::Paused
        } else if self.breaker.tripped() {
            StrategyMode::CircuitBreakerTripped
        } else if self.in_oracle_failure_mode() {
            StrategyMode::OracleFailureMode
        } else if self.breaker.gradual_recovery_active() {
            StrategyMode::GradualRecovery
        } else {
            StrategyMode::Normal
        }
    }

    pub fn in_oracle_failure_mode(&self) -> bool {
        self.manual_oracle_failure || self.oracle_failure
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    fn time_since_last_rebalance(&self, now: u64) -> u64 {
        if self.last_rebalance_time == 0 {
            return 0;
        }
        now.saturating_sub(self.last_rebalance_time)
    }

    pub fn last_rebalance_time(&self) -> u64 {
        self.last_rebalance_time
    }

    pub fn min_rebalance_interval(&self) -> u64 {
        self.config.min_rebalance_interval_secs
    }

    pub fn rebalance_threshold(&self) -> u64 {
        self.config.rebalance_threshold_bps
    }

    pub fn max_slippage(&self) -> u64 {
        self.executor.max_slippage_bps()
    }

    pub fn swap_fee(&self) -> u64 {
        self.executor.swap_fee_bps()
    }

    pub fn deposit_cap(&self) -> U256 {
        self.config.deposit_cap
    }

    pub fn daily_swap_limit(&self) -> U256 {
        self.limiter.daily_limit()
    }

    pub fn pre_recovery_daily_limit(&self) -> U256 {
        self.breaker.pre_recovery_daily_limit()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn holdings(&self, asset: AssetId) -> U256 {
        self.holdings[asset.index()]
    }

    pub fn oracle_health(&self, asset: AssetId) -> &OracleHealth {
        &self.oracle_health[asset.index()]
    }

    pub fn router_names(&self) -> Vec<String> {
        self.executor.router_names()
    }

    pub fn last_attempt(&self) -> Option<&RebalanceAttempt> {
        self.attempts.back()
    }

    /// Newest first.
    pub fn recent_attempts(&self) -> Vec<RebalanceAttempt> {
        self.attempts.iter().rev().cloned().collect()
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            taken_at: self.clock.now(),
            strategy: self.strategy_status(),
            allocation: self.allocation_details(),
            circuit_breaker: self.circuit_breaker_status(),
            oracle: self.oracle_status(),
            rate_limit: self.rate_limit_status(),
            diagnostics: self.system_diagnostics(),
            mode: self.strategy_mode(),
            pre_recovery_daily_limit: self.pre_recovery_daily_limit(),
            available_deposit_limit: self.available_deposit_limit(),
            routers: self.router_names(),
            attempts: self.recent_attempts(),
        }
    }

    /// Replaces the snapshot seen by status readers.
    pub(super) fn publish(&self) {
        self.status_tx.send_replace(self.status_snapshot());
    }

    /// Receiver that always holds the latest published snapshot.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }
}
