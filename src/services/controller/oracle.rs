// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::{BPS_DENOMINATOR, PRICE_DECIMALS};
use crate::common::error::{AppError, StrategyError};
use crate::domain::types::{AssetId, FeedSource};
use alloy::primitives::{I256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Raw answer of an aggregator-style price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: I256,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u128,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Decimals of `RoundData::answer`.
    fn decimals(&self) -> u8;

    async fn latest_round_data(&self) -> Result<RoundData, AppError>;
}

/// Pool exposing cumulative tick observations (`observe(secondsAgos)`).
#[async_trait]
pub trait TwapSource: Send + Sync {
    async fn observe(&self, seconds_agos: &[u32]) -> Result<Vec<i64>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OracleReading {
    /// Price at 8 decimals.
    pub price: U256,
    pub updated_at: u64,
    pub round_id: u128,
    pub source: FeedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleAssetConfig {
    pub heartbeat_secs: u64,
    pub min_price: U256,
    pub max_price: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapConfig {
    pub window_secs: u32,
    pub max_deviation_bps: u64,
    /// `decimals(token0) - decimals(token1)` of the reference pool.
    pub decimals_adjust: i32,
    /// Set when the pool quotes the reference asset as token1.
    pub invert: bool,
}

pub struct AssetOracle {
    config: OracleAssetConfig,
    primary: Arc<dyn PriceFeed>,
    fallback: Option<Arc<dyn PriceFeed>>,
    twap: Option<(Arc<dyn TwapSource>, TwapConfig)>,
}

impl AssetOracle {
    pub fn new(config: OracleAssetConfig, primary: Arc<dyn PriceFeed>) -> Self {
        Self {
            config,
            primary,
            fallback: None,
            twap: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn PriceFeed>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_twap(mut self, pool: Arc<dyn TwapSource>, config: TwapConfig) -> Self {
        self.twap = Some((pool, config));
        self
    }

    pub fn config(&self) -> &OracleAssetConfig {
        &self.config
    }

    fn feeds(&self) -> impl Iterator<Item = (FeedSource, &Arc<dyn PriceFeed>)> {
        std::iter::once((FeedSource::Primary, &self.primary))
            .chain(self.fallback.iter().map(|f| (FeedSource::Fallback, f)))
    }
}

/// Highest round id accepted so far from one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMark {
    pub asset: AssetId,
    pub source: FeedSource,
    pub round_id: u128,
}

/// Validated prices for the two reference assets.
///
/// Each query walks primary then fallback; a reading must be fresh, inside
/// its price bounds, not behind the last accepted round of that feed, and
/// close to the reference pool TWAP. The only state kept between queries is
/// the per-feed round-id high-water mark.
pub struct PriceOracleService {
    assets: [AssetOracle; 2],
    round_marks: HashMap<(AssetId, FeedSource), u128>,
}

impl PriceOracleService {
    pub fn new(asset_a: AssetOracle, asset_b: AssetOracle) -> Self {
        Self {
            assets: [asset_a, asset_b],
            round_marks: HashMap::new(),
        }
    }

    pub fn asset(&self, asset: AssetId) -> &AssetOracle {
        &self.assets[asset.index()]
    }

    /// Round high-water marks, sorted so the export is stable.
    pub fn round_marks(&self) -> Vec<RoundMark> {
        let mut marks: Vec<RoundMark> = self
            .round_marks
            .iter()
            .map(|(&(asset, source), &round_id)| RoundMark {
                asset,
                source,
                round_id,
            })
            .collect();
        marks.sort_by_key(|m| (m.asset.index(), m.source == FeedSource::Fallback));
        marks
    }

    /// Seeds marks from an earlier run. A mark never moves backwards.
    pub fn restore_round_marks(&mut self, marks: &[RoundMark]) {
        for mark in marks {
            let slot = self.round_marks.entry((mark.asset, mark.source)).or_insert(0);
            *slot = (*slot).max(mark.round_id);
        }
    }

    pub async fn get_validated_price(
        &mut self,
        asset: AssetId,
        now: u64,
    ) -> Result<OracleReading, StrategyError> {
        let oracle = &self.assets[asset.index()];
        let mut twap_price: Option<Result<U256, StrategyError>> = None;
        let mut last_err = None;

        for (source, feed) in oracle.feeds() {
            let last_round = self.round_marks.get(&(asset, source)).copied();
            let checked =
                validate_feed(oracle, feed.as_ref(), source, now, last_round, &mut twap_price)
                    .await;
            match checked {
                Ok(reading) => {
                    if source == FeedSource::Fallback {
                        tracing::warn!(
                            target: "oracle",
                            %asset,
                            price = %reading.price,
                            "Serving fallback oracle price"
                        );
                    }
                    self.round_marks.insert((asset, source), reading.round_id);
                    return Ok(reading);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "oracle",
                        %asset,
                        source = ?source,
                        reason = err.label(),
                        error = %err,
                        "Oracle reading rejected"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| StrategyError::OracleUnavailable("no feeds".into())))
    }
}

async fn validate_feed(
    oracle: &AssetOracle,
    feed: &dyn PriceFeed,
    source: FeedSource,
    now: u64,
    last_round: Option<u128>,
    twap_price: &mut Option<Result<U256, StrategyError>>,
) -> Result<OracleReading, StrategyError> {
    let cfg = &oracle.config;
    let round = feed
        .latest_round_data()
        .await
        .map_err(|e| StrategyError::OracleUnavailable(format!("{source:?} feed: {e}")))?;

    let age_secs = now.saturating_sub(round.updated_at);
    if round.updated_at == 0 || age_secs > cfg.heartbeat_secs {
        return Err(StrategyError::OracleStale {
            age_secs,
            heartbeat_secs: cfg.heartbeat_secs,
        });
    }
    // answer carried over from an unfinished round
    if round.answered_in_round < round.round_id {
        return Err(StrategyError::OracleStale {
            age_secs,
            heartbeat_secs: cfg.heartbeat_secs,
        });
    }
    // equal ids are re-reads of the same round; only a regression is rejected
    if let Some(last_round_id) = last_round
        && round.round_id < last_round_id
    {
        return Err(StrategyError::OracleRoundRegressed {
            round_id: round.round_id,
            last_round_id,
        });
    }

    let price = normalize_answer(round.answer, feed.decimals());
    if price.is_zero() || price < cfg.min_price || price > cfg.max_price {
        return Err(StrategyError::OracleOutOfBounds {
            price,
            min: cfg.min_price,
            max: cfg.max_price,
        });
    }

    if let Some((pool, twap_cfg)) = &oracle.twap {
        if twap_price.is_none() {
            *twap_price = Some(fetch_twap_price(pool.as_ref(), twap_cfg).await);
        }
        if let Some(twap) = twap_price.as_ref() {
            let reference = twap.clone()?;
            let deviation_bps = deviation_bps(price, reference);
            if deviation_bps > twap_cfg.max_deviation_bps {
                return Err(StrategyError::OracleDeviationExceeded {
                    deviation_bps,
                    max_bps: twap_cfg.max_deviation_bps,
                });
            }
        }
    }

    Ok(OracleReading {
        price,
        updated_at: round.updated_at,
        round_id: round.round_id,
        source,
    })
}

/// Scales a feed answer to 8 decimals; non-positive answers map to zero.
pub fn normalize_answer(answer: I256, decimals: u8) -> U256 {
    if answer.is_negative() || answer.is_zero() {
        return U256::ZERO;
    }
    let raw = answer.into_raw();
    if decimals >= PRICE_DECIMALS {
        raw / U256::from(10u64).pow(U256::from(decimals - PRICE_DECIMALS))
    } else {
        raw.saturating_mul(U256::from(10u64).pow(U256::from(PRICE_DECIMALS - decimals)))
    }
}

async fn fetch_twap_price(pool: &dyn TwapSource, cfg: &TwapConfig) -> Result<U256, StrategyError> {
    let window = cfg.window_secs.max(1);
    let cumulatives = pool
        .observe(&[window, 0])
        .await
        .map_err(|e| StrategyError::OracleUnavailable(format!("TWAP observe failed: {e}")))?;
    let [then, latest] = cumulatives[..] else {
        return Err(StrategyError::OracleUnavailable(format!(
            "TWAP observe returned {} points",
            cumulatives.len()
        )));
    };
    let tick = average_tick(then, latest, window);
    price_from_tick(tick, cfg.decimals_adjust, cfg.invert)
        .ok_or_else(|| StrategyError::OracleUnavailable(format!("TWAP tick {tick} unpriceable")))
}

/// Arithmetic-mean tick over `window` seconds, rounded toward negative infinity.
pub fn average_tick(tick_cumulative_then: i64, tick_cumulative_now: i64, window: u32) -> i64 {
    let delta = tick_cumulative_now.saturating_sub(tick_cumulative_then);
    let window = i64::from(window.max(1));
    let mut tick = delta / window;
    if delta < 0 && delta % window != 0 {
        tick -= 1;
    }
    tick
}

/// `1.0001^tick`, decimal-adjusted and expressed at 8 decimals.
pub fn price_from_tick(tick: i64, decimals_adjust: i32, invert: bool) -> Option<U256> {
    let mut price = 1.0001f64.powf(tick as f64) * 10f64.powi(decimals_adjust);
    if invert {
        if price <= 0.0 {
            return None;
        }
        price = 1.0 / price;
    }
    let scaled = price * 10f64.powi(i32::from(PRICE_DECIMALS));
    if !scaled.is_finite() || scaled < 1.0 || scaled >= u128::MAX as f64 {
        return None;
    }
    Some(U256::from(scaled.round() as u128))
}

/// Relative distance of `price` from `reference`, in basis points.
pub fn deviation_bps(price: U256, reference: U256) -> u64 {
    if reference.is_zero() {
        return u64::MAX;
    }
    let diff = if price > reference {
        price - reference
    } else {
        reference - price
    };
    let bps = diff.saturating_mul(U256::from(BPS_DENOMINATOR)) / reference;
    u64::try_from(bps).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::controller::mocks::{FixedTwap, StaticFeed};

    const NOW: u64 = 1_700_000_000;

    fn usd(n: u64) -> U256 {
        U256::from(n) * U256::from(100_000_000u64)
    }

    fn btc_config() -> OracleAssetConfig {
        OracleAssetConfig {
            heartbeat_secs: 3_600,
            min_price: usd(10_000),
            max_price: usd(10_000_000),
        }
    }

    fn eth_config() -> OracleAssetConfig {
        OracleAssetConfig {
            heartbeat_secs: 3_600,
            min_price: usd(100),
            max_price: usd(100_000),
        }
    }

    fn service(a: AssetOracle) -> PriceOracleService {
        let eth = AssetOracle::new(eth_config(), Arc::new(StaticFeed::healthy(3_000, NOW)));
        PriceOracleService::new(a, eth)
    }

    #[tokio::test]
    async fn accepts_fresh_in_bounds_primary() {
        let mut oracle = service(AssetOracle::new(
            btc_config(),
            Arc::new(StaticFeed::healthy(91_000, NOW - 60)),
        ));
        let reading = oracle.get_validated_price(AssetId::A, NOW).await.unwrap();
        assert_eq!(reading.price, usd(91_000));
        assert_eq!(reading.source, FeedSource::Primary);
    }

    #[tokio::test]
    async fn stale_primary_falls_back() {
        let mut oracle = service(
            AssetOracle::new(
                btc_config(),
                Arc::new(StaticFeed::healthy(91_000, NOW - 7_200)),
            )
            .with_fallback(Arc::new(StaticFeed::healthy(90_500, NOW - 30))),
        );
        let reading = oracle.get_validated_price(AssetId::A, NOW).await.unwrap();
        assert_eq!(reading.source, FeedSource::Fallback);
        assert_eq!(reading.price, usd(90_500));
    }

    #[tokio::test]
    async fn both_feeds_failing_reports_last_reason() {
        let mut oracle = service(
            AssetOracle::new(btc_config(), Arc::new(StaticFeed::healthy(5, NOW)))
                .with_fallback(Arc::new(StaticFeed::healthy(91_000, NOW - 10_000))),
        );
        let err = oracle.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert!(matches!(err, StrategyError::OracleStale { .. }));
    }

    #[tokio::test]
    async fn rejects_out_of_bounds_and_negative_answers() {
        let feed = Arc::new(StaticFeed::healthy(91_000, NOW));
        let mut oracle = service(AssetOracle::new(btc_config(), feed.clone()));

        feed.set_answer(I256::try_from(-1i64).unwrap());
        let err = oracle.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert!(matches!(err, StrategyError::OracleOutOfBounds { .. }));

        feed.set_price(20_000_000);
        let err = oracle.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert!(matches!(err, StrategyError::OracleOutOfBounds { .. }));
    }

    #[tokio::test]
    async fn rejects_round_regression() {
        let feed = Arc::new(StaticFeed::healthy(91_000, NOW));
        let mut oracle = service(AssetOracle::new(btc_config(), feed.clone()));
        feed.set_round(10);
        oracle.get_validated_price(AssetId::A, NOW).await.unwrap();
        // same round re-read is fine
        oracle.get_validated_price(AssetId::A, NOW).await.unwrap();

        feed.set_round(9);
        let err = oracle.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert_eq!(
            err,
            StrategyError::OracleRoundRegressed {
                round_id: 9,
                last_round_id: 10
            }
        );
    }

    #[tokio::test]
    async fn twap_deviation_invalidates_reading() {
        let cfg = TwapConfig {
            window_secs: 1_800,
            max_deviation_bps: 300,
            decimals_adjust: 0,
            invert: false,
        };
        let mut close = service(
            AssetOracle::new(btc_config(), Arc::new(StaticFeed::healthy(91_000, NOW)))
                .with_twap(Arc::new(FixedTwap::at_price(90_000.0)), cfg),
        );
        assert!(close.get_validated_price(AssetId::A, NOW).await.is_ok());

        let mut manipulated = service(
            AssetOracle::new(btc_config(), Arc::new(StaticFeed::healthy(91_000, NOW)))
                .with_twap(Arc::new(FixedTwap::at_price(80_000.0)), cfg),
        );
        let err = manipulated
            .get_validated_price(AssetId::A, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::OracleDeviationExceeded { .. }));
    }

    fn twap_cfg() -> TwapConfig {
        TwapConfig {
            window_secs: 1_800,
            max_deviation_bps: 300,
            decimals_adjust: 0,
            invert: false,
        }
    }

    #[tokio::test]
    async fn twap_deviation_on_primary_serves_fallback() {
        let mut oracle = service(
            AssetOracle::new(btc_config(), Arc::new(StaticFeed::healthy(91_000, NOW)))
                .with_fallback(Arc::new(StaticFeed::healthy(80_500, NOW)))
                .with_twap(Arc::new(FixedTwap::at_price(80_000.0)), twap_cfg()),
        );
        let reading = oracle.get_validated_price(AssetId::A, NOW).await.unwrap();
        assert_eq!(reading.source, FeedSource::Fallback);
        assert_eq!(reading.price, usd(80_500));
    }

    #[tokio::test]
    async fn twap_deviation_on_both_feeds_fails() {
        let mut oracle = service(
            AssetOracle::new(btc_config(), Arc::new(StaticFeed::healthy(91_000, NOW)))
                .with_fallback(Arc::new(StaticFeed::healthy(85_000, NOW)))
                .with_twap(Arc::new(FixedTwap::at_price(80_000.0)), twap_cfg()),
        );
        let err = oracle.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            StrategyError::OracleDeviationExceeded { max_bps: 300, .. }
        ));
    }

    #[tokio::test]
    async fn restored_round_marks_reject_older_rounds() {
        let feed = Arc::new(StaticFeed::healthy(91_000, NOW));
        let mut first = service(AssetOracle::new(btc_config(), feed.clone()));
        feed.set_round(42);
        first.get_validated_price(AssetId::A, NOW).await.unwrap();
        let marks = first.round_marks();
        assert_eq!(
            marks[0],
            RoundMark {
                asset: AssetId::A,
                source: FeedSource::Primary,
                round_id: 42
            }
        );

        let mut second = service(AssetOracle::new(btc_config(), feed.clone()));
        second.restore_round_marks(&marks);
        feed.set_round(41);
        let err = second.get_validated_price(AssetId::A, NOW).await.unwrap_err();
        assert!(matches!(err, StrategyError::OracleRoundRegressed { .. }));
    }

    #[test]
    fn normalizes_feed_decimals() {
        let answer = I256::try_from(91_000_000_000_000_000_000_000i128).unwrap();
        assert_eq!(normalize_answer(answer, 18), usd(91_000));
        let answer = I256::try_from(9_100_000i64).unwrap();
        assert_eq!(normalize_answer(answer, 2), usd(91_000));
    }

    #[test]
    fn average_tick_rounds_toward_negative_infinity() {
        assert_eq!(average_tick(0, 1_800 * 10, 1_800), 10);
        assert_eq!(average_tick(0, -1_801, 1_800), -2);
        assert_eq!(average_tick(100, -1_700, 1_800), -1);
    }

    #[test]
    fn tick_price_conversion() {
        assert_eq!(price_from_tick(0, 0, false), Some(usd(1)));
        // 8-decimal / 6-decimal pool around $95k
        let price = price_from_tick(68_568, 2, false).unwrap();
        assert!(deviation_bps(price, usd(95_000)) < 10);
        assert_eq!(price_from_tick(0, 0, true), Some(usd(1)));
    }

    #[test]
    fn deviation_is_symmetric_in_bps() {
        assert_eq!(deviation_bps(usd(103), usd(100)), 300);
        assert_eq!(deviation_bps(usd(97), usd(100)), 300);
        assert_eq!(deviation_bps(usd(1), U256::ZERO), u64::MAX);
    }
}
