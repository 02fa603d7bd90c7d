// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::U256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Transaction failed: {hash:?}, reason: {reason}")]
    Transaction { hash: String, reason: String },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Failures the controller reports while deciding or administering a rebalance.
///
/// Inside a decision cycle these are folded into counters and mode flags;
/// only admin calls and setters hand them back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Oracle reading is stale: age {age_secs}s exceeds heartbeat {heartbeat_secs}s")]
    OracleStale { age_secs: u64, heartbeat_secs: u64 },

    #[error("Oracle price {price} outside bounds [{min}, {max}]")]
    OracleOutOfBounds { price: U256, min: U256, max: U256 },

    #[error("Oracle round {round_id} does not advance past {last_round_id}")]
    OracleRoundRegressed { round_id: u128, last_round_id: u128 },

    #[error("Oracle deviates {deviation_bps} bps from TWAP (max {max_bps} bps)")]
    OracleDeviationExceeded { deviation_bps: u64, max_bps: u64 },

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle failure mode is active")]
    OracleFailureMode,

    #[error("Slippage exceeded: best output {quoted} below minimum {min_amount_out}")]
    SlippageExceeded { quoted: U256, min_amount_out: U256 },

    #[error("Daily swap limit exceeded: requested {requested}, remaining {remaining}")]
    DailyLimitExceeded { requested: U256, remaining: U256 },

    #[error("Minimum rebalance interval not elapsed: {remaining_secs}s remaining")]
    MinIntervalNotElapsed { remaining_secs: u64 },

    #[error("Circuit breaker open: resets in {retry_in_secs}s")]
    CircuitBreakerOpen { retry_in_secs: u64 },

    #[error("Strategy is paused")]
    StrategyPaused,

    #[error("Strategy is shut down")]
    StrategyShutdown,

    #[error("{field} = {value} outside bounds [{min}, {max}]")]
    ConfigOutOfBounds {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("Router error: {0}")]
    RouterError(String),

    #[error("Insufficient holdings: requested {requested}, available {available}")]
    InsufficientHoldings { requested: U256, available: U256 },

    #[error("Deposit cap exceeded: requested {requested}, available {available}")]
    DepositCapExceeded { requested: U256, available: U256 },

    #[error("Emergency withdraw requires the strategy to be paused or shut down")]
    NotHalted,
}

impl StrategyError {
    /// Short label used in metrics and skip logs.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyError::OracleStale { .. } => "oracle_stale",
            StrategyError::OracleOutOfBounds { .. } => "oracle_out_of_bounds",
            StrategyError::OracleRoundRegressed { .. } => "oracle_round_regressed",
            StrategyError::OracleDeviationExceeded { .. } => "oracle_deviation_exceeded",
            StrategyError::OracleUnavailable(_) => "oracle_unavailable",
            StrategyError::OracleFailureMode => "oracle_failure_mode",
            StrategyError::SlippageExceeded { .. } => "slippage_exceeded",
            StrategyError::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            StrategyError::MinIntervalNotElapsed { .. } => "min_interval_not_elapsed",
            StrategyError::CircuitBreakerOpen { .. } => "circuit_breaker_open",
            StrategyError::StrategyPaused => "strategy_paused",
            StrategyError::StrategyShutdown => "strategy_shutdown",
            StrategyError::ConfigOutOfBounds { .. } => "config_out_of_bounds",
            StrategyError::InvalidConfig { .. } => "invalid_config",
            StrategyError::RouterError(_) => "router_error",
            StrategyError::InsufficientHoldings { .. } => "insufficient_holdings",
            StrategyError::DepositCapExceeded { .. } => "deposit_cap_exceeded",
            StrategyError::NotHalted => "not_halted",
        }
    }
}
