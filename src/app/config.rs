// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants;
use crate::domain::error::AppError;
use crate::domain::types::AssetId;
use crate::services::controller::circuit_breaker::CircuitBreakerConfig;
use crate::services::controller::config::ControllerConfig;
use crate::services::controller::oracle::{OracleAssetConfig, TwapConfig};
use crate::services::controller::swap_executor::SwapBounds;
use alloy::primitives::{Address, U256};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_false")]
    pub log_json: bool,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub http_provider: Option<String>,

    // Identity
    /// Signing key for swap transactions; only needed outside dry-run.
    pub wallet_key: Option<String>,
    /// Account holding the basket.
    pub wallet_address: Address,

    // Basket tokens
    pub asset_a_token: Address,
    pub asset_b_token: Address,

    // Oracles (Chainlink-style aggregators)
    pub oracle_a_primary: Address,
    pub oracle_a_fallback: Option<Address>,
    pub oracle_b_primary: Address,
    pub oracle_b_fallback: Option<Address>,
    #[serde(default = "default_heartbeat_secs")]
    pub oracle_heartbeat_secs: u64,
    /// Whole-dollar bounds; scaled to 8 decimals on load.
    #[serde(default = "default_min_price_a_usd")]
    pub min_price_a_usd: u64,
    #[serde(default = "default_max_price_a_usd")]
    pub max_price_a_usd: u64,
    #[serde(default = "default_min_price_b_usd")]
    pub min_price_b_usd: u64,
    #[serde(default = "default_max_price_b_usd")]
    pub max_price_b_usd: u64,

    // TWAP reference pools (Uniswap V3 style); both required unless allow_no_twap
    pub twap_pool_a: Option<Address>,
    pub twap_pool_b: Option<Address>,
    #[serde(default = "default_false")]
    pub allow_no_twap: bool,
    #[serde(default = "default_twap_window_secs")]
    pub twap_window_secs: u32,
    #[serde(default = "default_max_twap_deviation_bps")]
    pub max_twap_deviation_bps: u64,
    #[serde(default)]
    pub twap_decimals_adjust_a: i32,
    #[serde(default)]
    pub twap_decimals_adjust_b: i32,
    #[serde(default = "default_false")]
    pub twap_invert_a: bool,
    #[serde(default = "default_false")]
    pub twap_invert_b: bool,

    // Routers
    pub primary_router: Address,
    pub fallback_router: Option<Address>,

    // Rebalancing (amounts in 8-decimal base units)
    #[serde(default = "default_target_alloc_bps")]
    pub target_alloc_bps: u64,
    #[serde(default = "default_rebalance_threshold_bps")]
    pub rebalance_threshold_bps: u64,
    #[serde(default = "default_min_rebalance_interval_secs")]
    pub min_rebalance_interval_secs: u64,
    #[serde(default = "default_min_position_size")]
    pub min_position_size: u64,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: u64,
    #[serde(default = "default_daily_swap_limit")]
    pub daily_swap_limit: u64,
    #[serde(default = "default_recovery_floor")]
    pub recovery_floor: u64,
    #[serde(default = "default_deposit_cap")]
    pub deposit_cap: u64,

    // Swap bounds
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u64,
    #[serde(default = "default_min_slippage_bound_bps")]
    pub min_slippage_bound_bps: u64,
    #[serde(default = "default_max_slippage_bound_bps")]
    pub max_slippage_bound_bps: u64,
    #[serde(default = "default_swap_fee_bps")]
    pub swap_fee_bps: u64,
    #[serde(default = "default_min_fee_bound_bps")]
    pub min_fee_bound_bps: u64,
    #[serde(default = "default_max_fee_bound_bps")]
    pub max_fee_bound_bps: u64,
    #[serde(default = "default_swap_deadline_secs")]
    pub swap_deadline_secs: u64,

    // Circuit breaker
    #[serde(default = "default_trip_threshold")]
    pub trip_threshold: u32,
    #[serde(default = "default_trip_duration_secs")]
    pub trip_duration_secs: u64,
    #[serde(default = "default_recovery_steps")]
    pub recovery_steps: u32,

    // Keeper & status server
    #[serde(default = "default_keeper_interval_secs")]
    pub keeper_interval_secs: u64,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    pub metrics_bind: Option<String>,
    /// JSON file carrying breaker, budget and round marks across restarts.
    pub state_path: Option<String>,
}

fn default_false() -> bool {
    false
}
fn default_chain_id() -> u64 {
    8453
}
fn default_heartbeat_secs() -> u64 {
    constants::DEFAULT_HEARTBEAT_SECS
}
fn default_min_price_a_usd() -> u64 {
    constants::DEFAULT_MIN_PRICE_A / constants::ASSET_UNIT
}
fn default_max_price_a_usd() -> u64 {
    constants::DEFAULT_MAX_PRICE_A / constants::ASSET_UNIT
}
fn default_min_price_b_usd() -> u64 {
    constants::DEFAULT_MIN_PRICE_B / constants::ASSET_UNIT
}
fn default_max_price_b_usd() -> u64 {
    constants::DEFAULT_MAX_PRICE_B / constants::ASSET_UNIT
}
fn default_twap_window_secs() -> u32 {
    constants::DEFAULT_TWAP_WINDOW_SECS
}
fn default_max_twap_deviation_bps() -> u64 {
    constants::DEFAULT_MAX_TWAP_DEVIATION_BPS
}
fn default_target_alloc_bps() -> u64 {
    constants::DEFAULT_TARGET_ALLOC_BPS
}
fn default_rebalance_threshold_bps() -> u64 {
    constants::DEFAULT_REBALANCE_THRESHOLD_BPS
}
fn default_min_rebalance_interval_secs() -> u64 {
    constants::DEFAULT_MIN_REBALANCE_INTERVAL_SECS
}
fn default_min_position_size() -> u64 {
    constants::DEFAULT_MIN_POSITION_SIZE
}
fn default_max_position_size() -> u64 {
    constants::DEFAULT_MAX_POSITION_SIZE
}
fn default_daily_swap_limit() -> u64 {
    constants::DEFAULT_DAILY_SWAP_LIMIT
}
fn default_recovery_floor() -> u64 {
    constants::DEFAULT_RECOVERY_FLOOR
}
fn default_deposit_cap() -> u64 {
    constants::DEFAULT_DEPOSIT_CAP
}
fn default_max_slippage_bps() -> u64 {
    constants::DEFAULT_MAX_SLIPPAGE_BPS
}
fn default_min_slippage_bound_bps() -> u64 {
    constants::DEFAULT_MIN_SLIPPAGE_BOUND_BPS
}
fn default_max_slippage_bound_bps() -> u64 {
    constants::DEFAULT_MAX_SLIPPAGE_BOUND_BPS
}
fn default_swap_fee_bps() -> u64 {
    constants::DEFAULT_SWAP_FEE_BPS
}
fn default_min_fee_bound_bps() -> u64 {
    constants::DEFAULT_MIN_FEE_BOUND_BPS
}
fn default_max_fee_bound_bps() -> u64 {
    constants::DEFAULT_MAX_FEE_BOUND_BPS
}
fn default_swap_deadline_secs() -> u64 {
    constants::DEFAULT_SWAP_DEADLINE_SECS
}
fn default_trip_threshold() -> u32 {
    constants::DEFAULT_TRIP_THRESHOLD
}
fn default_trip_duration_secs() -> u64 {
    constants::DEFAULT_TRIP_DURATION_SECS
}
fn default_recovery_steps() -> u32 {
    constants::DEFAULT_RECOVERY_STEPS
}
fn default_keeper_interval_secs() -> u64 {
    300
}
fn default_metrics_port() -> u16 {
    9000
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // env/.env > config file; CLI flags are applied in main
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        if settings.keeper_interval_secs == 0 {
            return Err(AppError::Config(
                "KEEPER_INTERVAL_SECS must be non-zero".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    /// RPC URL from config, else `http_provider_<chain>` / `http_provider` env.
    pub fn get_http_provider(&self) -> Result<String, AppError> {
        if let Some(url) = self
            .http_provider
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Ok(url.to_string());
        }
        let candidates = [
            format!("http_provider_{}", self.chain_id),
            "http_provider".to_string(),
        ];
        for key in candidates {
            if let Ok(v) = std::env::var(&key) {
                let trimmed = v.trim();
                if !trimmed.is_empty() {
                    return Ok(trimmed.to_string());
                }
            }
        }
        Err(AppError::Config(format!(
            "No RPC URL found for chain {}",
            self.chain_id
        )))
    }

    pub fn wallet_key(&self) -> Result<String, AppError> {
        self.wallet_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| AppError::Config("WALLET_KEY is missing".to_string()))
    }

    pub fn keeper_interval(&self) -> Duration {
        Duration::from_secs(self.keeper_interval_secs)
    }

    pub fn metrics_bind_value(&self) -> Option<String> {
        self.metrics_bind
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    }

    pub fn state_path_value(&self) -> String {
        self.state_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(constants::DEFAULT_STATE_PATH)
            .to_string()
    }

    /// Config keys of the TWAP pools left unset.
    pub fn missing_twap_pools(&self) -> Vec<&'static str> {
        [("twap_pool_a", self.twap_pool_a), ("twap_pool_b", self.twap_pool_b)]
            .into_iter()
            .filter(|(_, pool)| pool.is_none())
            .map(|(key, _)| key)
            .collect()
    }

    pub fn routers(&self) -> Vec<(&'static str, Address)> {
        let mut routers = vec![("primary", self.primary_router)];
        if let Some(fallback) = self.fallback_router {
            routers.push(("fallback", fallback));
        }
        routers
    }

    /// Builds and validates the controller configuration.
    pub fn controller_config(&self) -> Result<ControllerConfig, AppError> {
        let missing = self.missing_twap_pools();
        if !missing.is_empty() && !self.allow_no_twap {
            return Err(AppError::Config(format!(
                "{} not set; configure the pools or set allow_no_twap = true",
                missing.join(", ")
            )));
        }
        let usd = |whole: u64| U256::from(whole) * U256::from(constants::ASSET_UNIT);
        let twap = |decimals_adjust: i32, invert: bool| TwapConfig {
            window_secs: self.twap_window_secs,
            max_deviation_bps: self.max_twap_deviation_bps,
            decimals_adjust,
            invert,
        };
        let oracle = |min: u64, max: u64| OracleAssetConfig {
            heartbeat_secs: self.oracle_heartbeat_secs,
            min_price: usd(min),
            max_price: usd(max),
        };

        let config = ControllerConfig {
            target_alloc_bps: self.target_alloc_bps,
            rebalance_threshold_bps: self.rebalance_threshold_bps,
            min_rebalance_interval_secs: self.min_rebalance_interval_secs,
            min_position_size: U256::from(self.min_position_size),
            max_position_size: U256::from(self.max_position_size),
            daily_swap_limit: U256::from(self.daily_swap_limit),
            deposit_cap: U256::from(self.deposit_cap),
            swap_deadline_secs: self.swap_deadline_secs,
            swap_bounds: SwapBounds {
                min_slippage_bps: self.min_slippage_bound_bps,
                max_slippage_bps: self.max_slippage_bound_bps,
                min_fee_bps: self.min_fee_bound_bps,
                max_fee_bps: self.max_fee_bound_bps,
            },
            max_slippage_bps: self.max_slippage_bps,
            swap_fee_bps: self.swap_fee_bps,
            breaker: CircuitBreakerConfig {
                trip_threshold: self.trip_threshold,
                trip_duration_secs: self.trip_duration_secs,
                recovery_steps: self.recovery_steps,
                recovery_floor: U256::from(self.recovery_floor),
            },
            oracle_a: oracle(self.min_price_a_usd, self.max_price_a_usd),
            oracle_b: oracle(self.min_price_b_usd, self.max_price_b_usd),
            twap_a: twap(self.twap_decimals_adjust_a, self.twap_invert_a),
            twap_b: twap(self.twap_decimals_adjust_b, self.twap_invert_b),
            price_asset_for_a: AssetId::A,
            price_asset_for_b: AssetId::A,
        };
        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }
}
