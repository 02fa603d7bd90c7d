// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::*;
use crate::common::error::StrategyError;
use crate::domain::types::AssetId;
use crate::services::controller::circuit_breaker::CircuitBreakerConfig;
use crate::services::controller::oracle::{OracleAssetConfig, TwapConfig};
use crate::services::controller::swap_executor::SwapBounds;
use alloy::primitives::U256;

/// Tunables of one controller instance. Amounts are in base units of the
/// basket assets; prices are 8-decimal USD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub target_alloc_bps: u64,
    pub rebalance_threshold_bps: u64,
    pub min_rebalance_interval_secs: u64,
    pub min_position_size: U256,
    pub max_position_size: U256,
    pub daily_swap_limit: U256,
    pub deposit_cap: U256,
    pub swap_deadline_secs: u64,
    pub swap_bounds: SwapBounds,
    pub max_slippage_bps: u64,
    pub swap_fee_bps: u64,
    pub breaker: CircuitBreakerConfig,
    pub oracle_a: OracleAssetConfig,
    pub oracle_b: OracleAssetConfig,
    /// TWAP check applied to reference asset A when a pool is wired.
    pub twap_a: TwapConfig,
    pub twap_b: TwapConfig,
    /// Reference asset that prices each basket slot; both default to A.
    pub price_asset_for_a: AssetId,
    pub price_asset_for_b: AssetId,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let twap = TwapConfig {
            window_secs: DEFAULT_TWAP_WINDOW_SECS,
            max_deviation_bps: DEFAULT_MAX_TWAP_DEVIATION_BPS,
            decimals_adjust: 0,
            invert: false,
        };
        Self {
            target_alloc_bps: DEFAULT_TARGET_ALLOC_BPS,
            rebalance_threshold_bps: DEFAULT_REBALANCE_THRESHOLD_BPS,
            min_rebalance_interval_secs: DEFAULT_MIN_REBALANCE_INTERVAL_SECS,
            min_position_size: U256::from(DEFAULT_MIN_POSITION_SIZE),
            max_position_size: U256::from(DEFAULT_MAX_POSITION_SIZE),
            daily_swap_limit: U256::from(DEFAULT_DAILY_SWAP_LIMIT),
            deposit_cap: U256::from(DEFAULT_DEPOSIT_CAP),
            swap_deadline_secs: DEFAULT_SWAP_DEADLINE_SECS,
            swap_bounds: SwapBounds {
                min_slippage_bps: DEFAULT_MIN_SLIPPAGE_BOUND_BPS,
                max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BOUND_BPS,
                min_fee_bps: DEFAULT_MIN_FEE_BOUND_BPS,
                max_fee_bps: DEFAULT_MAX_FEE_BOUND_BPS,
            },
            max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            swap_fee_bps: DEFAULT_SWAP_FEE_BPS,
            breaker: CircuitBreakerConfig {
                trip_threshold: DEFAULT_TRIP_THRESHOLD,
                trip_duration_secs: DEFAULT_TRIP_DURATION_SECS,
                recovery_steps: DEFAULT_RECOVERY_STEPS,
                recovery_floor: U256::from(DEFAULT_RECOVERY_FLOOR),
            },
            oracle_a: OracleAssetConfig {
                heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
                min_price: U256::from(DEFAULT_MIN_PRICE_A),
                max_price: U256::from(DEFAULT_MAX_PRICE_A),
            },
            oracle_b: OracleAssetConfig {
                heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
                min_price: U256::from(DEFAULT_MIN_PRICE_B),
                max_price: U256::from(DEFAULT_MAX_PRICE_B),
            },
            twap_a: twap,
            twap_b: twap,
            price_asset_for_a: AssetId::A,
            price_asset_for_b: AssetId::A,
        }
    }
}

fn bounded(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), StrategyError> {
    if value < min || value > max {
        return Err(StrategyError::ConfigOutOfBounds {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn invalid(field: &'static str, message: impl Into<String>) -> StrategyError {
    StrategyError::InvalidConfig {
        field,
        message: message.into(),
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        bounded("target_alloc_bps", self.target_alloc_bps, 1, BPS_DENOMINATOR - 1)?;
        bounded(
            "rebalance_threshold_bps",
            self.rebalance_threshold_bps,
            1,
            BPS_DENOMINATOR,
        )?;

        if self.min_position_size.is_zero() {
            return Err(invalid("min_position_size", "must be non-zero"));
        }
        if self.min_position_size > self.max_position_size {
            return Err(invalid(
                "max_position_size",
                format!(
                    "{} below min_position_size {}",
                    self.max_position_size, self.min_position_size
                ),
            ));
        }
        if self.daily_swap_limit < self.min_position_size {
            return Err(invalid(
                "daily_swap_limit",
                "cannot fit a single minimum-size swap",
            ));
        }
        if self.breaker.recovery_floor.is_zero() {
            return Err(invalid("recovery_floor", "must be non-zero"));
        }

        let unit = U256::from(ASSET_UNIT);
        if self.deposit_cap < U256::from(MIN_DEPOSIT_CAP)
            || self.deposit_cap > U256::from(MAX_DEPOSIT_CAP)
        {
            return Err(invalid(
                "deposit_cap",
                format!(
                    "{} outside [{}, {}] units",
                    self.deposit_cap,
                    U256::from(MIN_DEPOSIT_CAP) / unit,
                    U256::from(MAX_DEPOSIT_CAP) / unit
                ),
            ));
        }

        let b = &self.swap_bounds;
        if b.min_slippage_bps > b.max_slippage_bps || b.max_slippage_bps >= BPS_DENOMINATOR {
            return Err(invalid("swap_bounds", "slippage bounds out of order"));
        }
        if b.min_fee_bps > b.max_fee_bps || b.max_fee_bps >= BPS_DENOMINATOR {
            return Err(invalid("swap_bounds", "fee bounds out of order"));
        }
        b.check_slippage(self.max_slippage_bps)?;
        b.check_fee(self.swap_fee_bps)?;

        bounded(
            "trip_threshold",
            u64::from(self.breaker.trip_threshold),
            u64::from(MIN_TRIP_THRESHOLD),
            u64::from(MAX_TRIP_THRESHOLD),
        )?;
        bounded(
            "trip_duration_secs",
            self.breaker.trip_duration_secs,
            MIN_TRIP_DURATION_SECS,
            MAX_TRIP_DURATION_SECS,
        )?;
        bounded(
            "recovery_steps",
            u64::from(self.breaker.recovery_steps),
            u64::from(MIN_RECOVERY_STEPS),
            u64::from(MAX_RECOVERY_STEPS),
        )?;

        for (field, oracle) in [("oracle_a", &self.oracle_a), ("oracle_b", &self.oracle_b)] {
            if oracle.heartbeat_secs == 0 {
                return Err(invalid(field, "heartbeat must be non-zero"));
            }
            if oracle.min_price.is_zero() || oracle.min_price >= oracle.max_price {
                return Err(invalid(field, "price bounds out of order"));
            }
        }
        for (field, twap) in [("twap_a", &self.twap_a), ("twap_b", &self.twap_b)] {
            if twap.window_secs == 0 {
                return Err(invalid(field, "window must be non-zero"));
            }
            if twap.max_deviation_bps == 0 || twap.max_deviation_bps >= BPS_DENOMINATOR {
                return Err(invalid(field, "deviation bound out of range"));
            }
        }
        Ok(())
    }
}
