// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! In-memory collaborators for driving a [`Controller`] without a node.

use crate::common::constants::{ASSET_UNIT, BPS_DENOMINATOR};
use crate::common::error::AppError;
use crate::domain::types::Direction;
use crate::services::controller::clock::{Clock, ManualClock};
use crate::services::controller::config::ControllerConfig;
use crate::services::controller::engine::Controller;
use crate::services::controller::oracle::{
    AssetOracle, PriceFeed, PriceOracleService, RoundData, TwapSource,
};
use crate::services::controller::swap_executor::{SwapReceipt, SwapRequest, SwapRouter};
use alloy::primitives::{I256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const MOCK_START: u64 = 1_750_000_000;
pub const MOCK_GAS_COST: u64 = 42_000_000_000_000;

/// `n` whole units of an 8-decimal asset.
pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(ASSET_UNIT)
}

fn usd_answer(usd: u64) -> I256 {
    I256::from_raw(units(usd))
}

#[derive(Debug, Clone)]
struct FeedState {
    answer: I256,
    updated_at: u64,
    round_id: u128,
    error: Option<String>,
}

/// 8-decimal feed whose answer is set by the test.
#[derive(Debug)]
pub struct StaticFeed {
    state: Mutex<FeedState>,
}

impl StaticFeed {
    pub fn healthy(price_usd: u64, updated_at: u64) -> Self {
        Self {
            state: Mutex::new(FeedState {
                answer: usd_answer(price_usd),
                updated_at,
                round_id: 1,
                error: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_price(&self, price_usd: u64) {
        self.state().answer = usd_answer(price_usd);
    }

    pub fn set_answer(&self, answer: I256) {
        self.state().answer = answer;
    }

    pub fn set_round(&self, round_id: u128) {
        self.state().round_id = round_id;
    }

    pub fn set_updated_at(&self, updated_at: u64) {
        self.state().updated_at = updated_at;
    }

    /// Publishes a new round at `updated_at`.
    pub fn tick(&self, updated_at: u64) {
        let mut state = self.state();
        state.updated_at = updated_at;
        state.round_id += 1;
    }

    pub fn set_error(&self, error: Option<&str>) {
        self.state().error = error.map(str::to_string);
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    fn decimals(&self) -> u8 {
        8
    }

    async fn latest_round_data(&self) -> Result<RoundData, AppError> {
        let state = self.state().clone();
        if let Some(err) = state.error {
            return Err(AppError::Connection(err));
        }
        Ok(RoundData {
            round_id: state.round_id,
            answer: state.answer,
            started_at: state.updated_at,
            updated_at: state.updated_at,
            answered_in_round: state.round_id,
        })
    }
}

/// Pool whose average tick is constant over any window.
#[derive(Debug)]
pub struct FixedTwap {
    tick: i64,
    failing: AtomicBool,
}

impl FixedTwap {
    pub fn at_tick(tick: i64) -> Self {
        Self {
            tick,
            failing: AtomicBool::new(false),
        }
    }

    /// Tick whose price (no decimal adjustment) is closest to `price`.
    pub fn at_price(price: f64) -> Self {
        Self::at_tick((price.ln() / 1.0001f64.ln()).round() as i64)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TwapSource for FixedTwap {
    async fn observe(&self, seconds_agos: &[u32]) -> Result<Vec<i64>, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Connection("observe reverted: OLD".into()));
        }
        const HORIZON: i64 = 10_000_000;
        Ok(seconds_agos
            .iter()
            .map(|ago| self.tick * (HORIZON - i64::from(*ago)))
            .collect())
    }
}

/// Router quoting and filling at a fixed output ratio.
#[derive(Debug)]
pub struct ScriptedRouter {
    name: String,
    ratio_bps: AtomicU64,
    fill_ratio_bps: AtomicU64,
    revert: AtomicBool,
    quote_error: AtomicBool,
    quote_calls: AtomicU64,
    swap_calls: AtomicU64,
    swap_delay_ms: AtomicU64,
}

impl ScriptedRouter {
    pub fn with_ratio_bps(name: &str, ratio_bps: u64) -> Self {
        Self {
            name: name.to_string(),
            ratio_bps: AtomicU64::new(ratio_bps),
            fill_ratio_bps: AtomicU64::new(ratio_bps),
            revert: AtomicBool::new(false),
            quote_error: AtomicBool::new(false),
            quote_calls: AtomicU64::new(0),
            swap_calls: AtomicU64::new(0),
            swap_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn one_to_one(name: &str) -> Self {
        Self::with_ratio_bps(name, BPS_DENOMINATOR)
    }

    pub fn set_ratio_bps(&self, ratio_bps: u64) {
        self.ratio_bps.store(ratio_bps, Ordering::SeqCst);
        self.fill_ratio_bps.store(ratio_bps, Ordering::SeqCst);
    }

    /// Fill at a different ratio than quoted, e.g. a sandwiched swap.
    pub fn set_fill_ratio_bps(&self, ratio_bps: u64) {
        self.fill_ratio_bps.store(ratio_bps, Ordering::SeqCst);
    }

    pub fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    pub fn set_quote_error(&self, fail: bool) {
        self.quote_error.store(fail, Ordering::SeqCst);
    }

    /// Holds every swap for `delay` before it settles.
    pub fn set_swap_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.swap_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn quote_calls(&self) -> u64 {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> u64 {
        self.swap_calls.load(Ordering::SeqCst)
    }

    fn apply(amount_in: U256, ratio_bps: u64) -> U256 {
        amount_in * U256::from(ratio_bps) / U256::from(BPS_DENOMINATOR)
    }
}

#[async_trait]
impl SwapRouter for ScriptedRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_amounts_out(
        &self,
        amount_in: U256,
        _direction: Direction,
        _fee_bps: u64,
    ) -> Result<U256, AppError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.quote_error.load(Ordering::SeqCst) {
            return Err(AppError::Connection(format!("{}: quote unavailable", self.name)));
        }
        Ok(Self::apply(amount_in, self.ratio_bps.load(Ordering::SeqCst)))
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapReceipt, AppError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.swap_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.revert.load(Ordering::SeqCst) {
            return Err(AppError::Transaction {
                hash: String::new(),
                reason: "execution reverted".into(),
            });
        }
        Ok(SwapReceipt {
            amount_out: Self::apply(request.amount_in, self.fill_ratio_bps.load(Ordering::SeqCst)),
            gas_cost: U256::from(MOCK_GAS_COST),
        })
    }
}

/// A clock, healthy feeds for both reference assets and a 1:1 router.
pub struct MockSetup {
    pub clock: Arc<ManualClock>,
    pub feed_a: Arc<StaticFeed>,
    pub fallback_a: Arc<StaticFeed>,
    pub feed_b: Arc<StaticFeed>,
    pub fallback_b: Arc<StaticFeed>,
    pub router: Arc<ScriptedRouter>,
}

impl Default for MockSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSetup {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(MOCK_START)),
            feed_a: Arc::new(StaticFeed::healthy(91_000, MOCK_START)),
            fallback_a: Arc::new(StaticFeed::healthy(90_900, MOCK_START)),
            feed_b: Arc::new(StaticFeed::healthy(3_000, MOCK_START)),
            fallback_b: Arc::new(StaticFeed::healthy(2_995, MOCK_START)),
            router: Arc::new(ScriptedRouter::one_to_one("primary")),
        }
    }

    pub fn oracle(&self, config: &ControllerConfig) -> PriceOracleService {
        PriceOracleService::new(
            AssetOracle::new(config.oracle_a, self.feed_a.clone())
                .with_fallback(self.fallback_a.clone()),
            AssetOracle::new(config.oracle_b, self.feed_b.clone())
                .with_fallback(self.fallback_b.clone()),
        )
    }

    pub fn controller(&self) -> Controller {
        self.controller_with(ControllerConfig::default())
    }

    /// # Panics
    /// When `config` does not validate.
    pub fn controller_with(&self, config: ControllerConfig) -> Controller {
        let oracle = self.oracle(&config);
        let clock: Arc<dyn Clock> = self.clock.clone();
        match Controller::new(config, clock, oracle, vec![self.router.clone()]) {
            Ok(ctrl) => ctrl,
            Err(err) => panic!("mock controller config rejected: {err}"),
        }
    }

    /// Advances the clock and publishes a fresh round on every feed.
    pub fn advance(&self, secs: u64) -> u64 {
        let now = self.clock.advance(secs);
        for feed in [&self.feed_a, &self.fallback_a, &self.feed_b, &self.fallback_b] {
            feed.tick(now);
        }
        now
    }
}
