// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// FIXED POINT
// =============================================================================

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Oracle prices are normalized to 8 decimals regardless of feed precision.
pub const PRICE_DECIMALS: u8 = 8;

/// One whole unit of an 8-decimal wrapped asset.
pub const ASSET_UNIT: u64 = 100_000_000;

// =============================================================================
// ALLOCATION & REBALANCING DEFAULTS
// =============================================================================

pub const DEFAULT_TARGET_ALLOC_BPS: u64 = 5_000;
pub const DEFAULT_REBALANCE_THRESHOLD_BPS: u64 = 200;
pub const DEFAULT_MIN_REBALANCE_INTERVAL_SECS: u64 = 3_600;

// 0.01 / 5 / 10 / 1 / 100 units of the basket asset
pub const DEFAULT_MIN_POSITION_SIZE: u64 = ASSET_UNIT / 100;
pub const DEFAULT_MAX_POSITION_SIZE: u64 = 5 * ASSET_UNIT;
pub const DEFAULT_DAILY_SWAP_LIMIT: u64 = 10 * ASSET_UNIT;
pub const DEFAULT_RECOVERY_FLOOR: u64 = ASSET_UNIT;
pub const DEFAULT_DEPOSIT_CAP: u64 = 100 * ASSET_UNIT;

pub const MIN_DEPOSIT_CAP: u64 = ASSET_UNIT;
pub const MAX_DEPOSIT_CAP: u64 = 1_000 * ASSET_UNIT;

// =============================================================================
// SWAP BOUNDS
// =============================================================================

pub const DEFAULT_MAX_SLIPPAGE_BPS: u64 = 100;
pub const DEFAULT_MIN_SLIPPAGE_BOUND_BPS: u64 = 10;
pub const DEFAULT_MAX_SLIPPAGE_BOUND_BPS: u64 = 1_000;

pub const DEFAULT_SWAP_FEE_BPS: u64 = 5;
pub const DEFAULT_MIN_FEE_BOUND_BPS: u64 = 5;
pub const DEFAULT_MAX_FEE_BOUND_BPS: u64 = 100;

pub const DEFAULT_SWAP_DEADLINE_SECS: u64 = 300;

// =============================================================================
// ORACLE
// =============================================================================

pub const DEFAULT_HEARTBEAT_SECS: u64 = 3_600;
pub const DEFAULT_TWAP_WINDOW_SECS: u32 = 1_800;
pub const DEFAULT_MAX_TWAP_DEVIATION_BPS: u64 = 300;

// $10,000 .. $10,000,000 at 8 decimals
pub const DEFAULT_MIN_PRICE_A: u64 = 10_000 * ASSET_UNIT;
pub const DEFAULT_MAX_PRICE_A: u64 = 10_000_000 * ASSET_UNIT;
// $100 .. $100,000 at 8 decimals
pub const DEFAULT_MIN_PRICE_B: u64 = 100 * ASSET_UNIT;
pub const DEFAULT_MAX_PRICE_B: u64 = 100_000 * ASSET_UNIT;

// =============================================================================
// CIRCUIT BREAKER
// =============================================================================

pub const DEFAULT_TRIP_THRESHOLD: u32 = 3;
pub const DEFAULT_TRIP_DURATION_SECS: u64 = 3_600;
pub const DEFAULT_RECOVERY_STEPS: u32 = 4;

pub const MIN_TRIP_THRESHOLD: u32 = 1;
pub const MAX_TRIP_THRESHOLD: u32 = 10;
pub const MIN_TRIP_DURATION_SECS: u64 = 300;
pub const MAX_TRIP_DURATION_SECS: u64 = 7 * 86_400;
pub const MIN_RECOVERY_STEPS: u32 = 1;
pub const MAX_RECOVERY_STEPS: u32 = 24;

// =============================================================================
// RATE LIMIT & DIAGNOSTICS
// =============================================================================

pub const RATE_LIMIT_WINDOW_SECS: u64 = 86_400;

/// Attempts kept for diagnostics.
pub const ATTEMPT_LOG_CAPACITY: usize = 32;

/// Controller state file used when `state_path` is unset.
pub const DEFAULT_STATE_PATH: &str = "keeper_state.json";

/// Every n-th skipped cycle is logged at `info`, the rest at `debug`.
pub const SKIP_LOG_EVERY: u64 = 12;

pub const STATUS_HEALTHY: &str = "HEALTHY";
pub const STATUS_PAUSED: &str = "PAUSED";
pub const STATUS_SHUTDOWN: &str = "SHUTDOWN";
pub const STATUS_CIRCUIT_BREAKER: &str = "CIRCUIT_BREAKER";
pub const STATUS_RECOVERING: &str = "RECOVERING";
pub const STATUS_ORACLE_FAILURE: &str = "ORACLE_FAILURE";
pub const STATUS_UNHEALTHY: &str = "UNHEALTHY";
