// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::BPS_DENOMINATOR;
use crate::common::error::{AppError, StrategyError};
use crate::domain::types::Direction;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub direction: Direction,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub fee_bps: u64,
    pub deadline: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReceipt {
    pub amount_out: U256,
    /// Native-token cost of the transaction, zero for simulated swaps.
    pub gas_cost: U256,
}

/// Exchange venue for the two basket assets.
#[async_trait]
pub trait SwapRouter: Send + Sync {
    fn name(&self) -> &str;

    async fn get_amounts_out(
        &self,
        amount_in: U256,
        direction: Direction,
        fee_bps: u64,
    ) -> Result<U256, AppError>;

    async fn swap(&self, request: &SwapRequest) -> Result<SwapReceipt, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapBounds {
    pub min_slippage_bps: u64,
    pub max_slippage_bps: u64,
    pub min_fee_bps: u64,
    pub max_fee_bps: u64,
}

impl SwapBounds {
    pub fn check_slippage(&self, bps: u64) -> Result<(), StrategyError> {
        check_range("max_slippage_bps", bps, self.min_slippage_bps, self.max_slippage_bps)
    }

    pub fn check_fee(&self, bps: u64) -> Result<(), StrategyError> {
        check_range("swap_fee_bps", bps, self.min_fee_bps, self.max_fee_bps)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), StrategyError> {
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapExecution {
    pub amount_out: U256,
    pub gas_cost: U256,
    pub router: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapFailure {
    pub error: StrategyError,
    /// Whether a swap transaction reached a router.
    pub submitted: bool,
    pub gas_cost: U256,
}

impl SwapFailure {
    fn before_submit(error: StrategyError) -> Self {
        Self {
            error,
            submitted: false,
            gas_cost: U256::ZERO,
        }
    }
}

pub struct SwapExecutor {
    routers: Vec<Arc<dyn SwapRouter>>,
    router_healthy: Vec<bool>,
    bounds: SwapBounds,
    max_slippage_bps: u64,
    swap_fee_bps: u64,
}

impl SwapExecutor {
    /// Routers are listed in preference order; on equal quotes the earlier one wins.
    pub fn new(
        routers: Vec<Arc<dyn SwapRouter>>,
        bounds: SwapBounds,
        max_slippage_bps: u64,
        swap_fee_bps: u64,
    ) -> Result<Self, StrategyError> {
        bounds.check_slippage(max_slippage_bps)?;
        bounds.check_fee(swap_fee_bps)?;
        if routers.is_empty() {
            return Err(StrategyError::InvalidConfig {
                field: "routers",
                message: "at least one router is required".into(),
            });
        }
        let router_healthy = vec![true; routers.len()];
        Ok(Self {
            routers,
            router_healthy,
            bounds,
            max_slippage_bps,
            swap_fee_bps,
        })
    }

    pub fn bounds(&self) -> &SwapBounds {
        &self.bounds
    }

    pub fn max_slippage_bps(&self) -> u64 {
        self.max_slippage_bps
    }

    pub fn swap_fee_bps(&self) -> u64 {
        self.swap_fee_bps
    }

    pub fn set_max_slippage(&mut self, bps: u64) -> Result<(), StrategyError> {
        self.bounds.check_slippage(bps)?;
        self.max_slippage_bps = bps;
        Ok(())
    }

    pub fn set_swap_fee(&mut self, bps: u64) -> Result<(), StrategyError> {
        self.bounds.check_fee(bps)?;
        self.swap_fee_bps = bps;
        Ok(())
    }

    /// `expected_out` less the configured slippage tolerance.
    pub fn min_amount_out(&self, expected_out: U256) -> U256 {
        let keep = BPS_DENOMINATOR.saturating_sub(self.max_slippage_bps);
        expected_out.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
    }

    /// `true` while at least one router answered its last call.
    pub fn router_operational(&self) -> bool {
        self.router_healthy.iter().any(|ok| *ok)
    }

    pub fn router_names(&self) -> Vec<String> {
        self.routers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Quotes every router once and swaps through the best quote that clears
    /// `min_amount_out`. A single swap is submitted per call.
    pub async fn execute(
        &mut self,
        direction: Direction,
        amount_in: U256,
        min_amount_out: U256,
        fee_bps: u64,
        deadline: u64,
    ) -> Result<SwapExecution, SwapFailure> {
        self.bounds
            .check_fee(fee_bps)
            .map_err(SwapFailure::before_submit)?;

        let mut best: Option<(usize, U256)> = None;
        let mut last_quote_err = None;
        for (idx, router) in self.routers.iter().enumerate() {
            match router.get_amounts_out(amount_in, direction, fee_bps).await {
                Ok(quoted) => {
                    self.router_healthy[idx] = true;
                    tracing::debug!(
                        target: "swap",
                        router = router.name(),
                        %direction,
                        amount_in = %amount_in,
                        quoted = %quoted,
                        "Router quote"
                    );
                    if best.is_none_or(|(_, b)| quoted > b) {
                        best = Some((idx, quoted));
                    }
                }
                Err(e) => {
                    self.router_healthy[idx] = false;
                    tracing::warn!(
                        target: "swap",
                        router = router.name(),
                        error = %e,
                        "Router quote failed"
                    );
                    last_quote_err = Some(e.to_string());
                }
            }
        }

        let Some((idx, quoted)) = best else {
            let reason = last_quote_err.unwrap_or_else(|| "no routers".into());
            return Err(SwapFailure::before_submit(StrategyError::RouterError(
                format!("no router quoted: {reason}"),
            )));
        };
        if quoted < min_amount_out {
            return Err(SwapFailure::before_submit(StrategyError::SlippageExceeded {
                quoted,
                min_amount_out,
            }));
        }

        let router = Arc::clone(&self.routers[idx]);
        let request = SwapRequest {
            direction,
            amount_in,
            min_amount_out,
            fee_bps,
            deadline,
        };
        match router.swap(&request).await {
            Ok(receipt) if receipt.amount_out < min_amount_out => {
                self.router_healthy[idx] = false;
                tracing::warn!(
                    target: "swap",
                    router = router.name(),
                    %direction,
                    quoted = %quoted,
                    amount_out = %receipt.amount_out,
                    min_amount_out = %min_amount_out,
                    "Swap filled below minimum"
                );
                Err(SwapFailure {
                    error: StrategyError::SlippageExceeded {
                        quoted: receipt.amount_out,
                        min_amount_out,
                    },
                    submitted: true,
                    gas_cost: receipt.gas_cost,
                })
            }
            Ok(receipt) => {
                self.router_healthy[idx] = true;
                tracing::info!(
                    target: "swap",
                    router = router.name(),
                    %direction,
                    amount_in = %amount_in,
                    amount_out = %receipt.amount_out,
                    gas_cost = %receipt.gas_cost,
                    "Swap executed"
                );
                Ok(SwapExecution {
                    amount_out: receipt.amount_out,
                    gas_cost: receipt.gas_cost,
                    router: router.name().to_string(),
                })
            }
            Err(e) => {
                self.router_healthy[idx] = false;
                tracing::error!(
                    target: "swap",
                    router = router.name(),
                    error = %e,
                    "Swap reverted"
                );
                Err(SwapFailure {
                    error: StrategyError::RouterError(e.to_string()),
                    submitted: true,
                    gas_cost: U256::ZERO,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::controller::mocks::ScriptedRouter;

    fn bounds() -> SwapBounds {
        SwapBounds {
            min_slippage_bps: 10,
            max_slippage_bps: 1_000,
            min_fee_bps: 5,
            max_fee_bps: 100,
        }
    }

    fn executor(routers: Vec<Arc<dyn SwapRouter>>) -> SwapExecutor {
        SwapExecutor::new(routers, bounds(), 100, 5).unwrap()
    }

    #[test]
    fn setters_reject_out_of_bounds_values() {
        let mut exec = executor(vec![Arc::new(ScriptedRouter::one_to_one("r"))]);
        assert_eq!(
            exec.set_swap_fee(200),
            Err(StrategyError::ConfigOutOfBounds {
                field: "swap_fee_bps",
                value: 200,
                min: 5,
                max: 100
            })
        );
        assert_eq!(exec.swap_fee_bps(), 5);
        assert!(exec.set_max_slippage(50).is_ok());
        assert_eq!(exec.max_slippage_bps(), 50);
        assert!(exec.set_max_slippage(5).is_err());
        assert!(exec.set_max_slippage(1_001).is_err());
        assert_eq!(exec.max_slippage_bps(), 50);
    }

    #[test]
    fn min_amount_out_applies_slippage() {
        let exec = executor(vec![Arc::new(ScriptedRouter::one_to_one("r"))]);
        assert_eq!(
            exec.min_amount_out(U256::from(1_000_000u64)),
            U256::from(990_000u64)
        );
    }

    #[tokio::test]
    async fn one_to_one_router_round_trips_unchanged() {
        let router = Arc::new(ScriptedRouter::one_to_one("primary"));
        let mut exec = executor(vec![router.clone()]);
        let amount = U256::from(50_000_000u64);
        let min_out = exec.min_amount_out(amount);
        let done = exec
            .execute(Direction::AToB, amount, min_out, 5, 0)
            .await
            .unwrap();
        assert_eq!(done.amount_out, amount);
        assert_eq!(router.swap_calls(), 1);
    }

    #[tokio::test]
    async fn picks_best_quote_across_routers() {
        let primary = Arc::new(ScriptedRouter::with_ratio_bps("primary", 9_950));
        let fallback = Arc::new(ScriptedRouter::with_ratio_bps("fallback", 9_980));
        let mut exec = executor(vec![primary.clone(), fallback.clone()]);
        let amount = U256::from(1_000_000u64);
        let done = exec
            .execute(Direction::BToA, amount, exec.min_amount_out(amount), 5, 0)
            .await
            .unwrap();
        assert_eq!(done.router, "fallback");
        assert_eq!(primary.swap_calls(), 0);
        assert_eq!(fallback.swap_calls(), 1);
    }

    #[tokio::test]
    async fn quote_below_minimum_is_not_submitted() {
        let router = Arc::new(ScriptedRouter::with_ratio_bps("thin", 9_000));
        let mut exec = executor(vec![router.clone()]);
        let amount = U256::from(1_000_000u64);
        let err = exec
            .execute(Direction::AToB, amount, exec.min_amount_out(amount), 5, 0)
            .await
            .unwrap_err();
        assert!(matches!(err.error, StrategyError::SlippageExceeded { .. }));
        assert!(!err.submitted);
        assert_eq!(router.swap_calls(), 0);
    }

    #[tokio::test]
    async fn revert_marks_router_unhealthy() {
        let router = Arc::new(ScriptedRouter::one_to_one("flaky"));
        router.set_revert(true);
        let mut exec = executor(vec![router.clone()]);
        let amount = U256::from(1_000u64);
        let err = exec
            .execute(Direction::AToB, amount, amount, 5, 0)
            .await
            .unwrap_err();
        assert!(matches!(err.error, StrategyError::RouterError(_)));
        assert!(err.submitted);
        assert!(!exec.router_operational());
    }

    #[tokio::test]
    async fn fill_below_minimum_marks_router_unhealthy() {
        let router = Arc::new(ScriptedRouter::one_to_one("sandwiched"));
        router.set_fill_ratio_bps(9_000);
        let mut exec = executor(vec![router.clone()]);
        let amount = U256::from(1_000_000u64);
        let err = exec
            .execute(Direction::AToB, amount, exec.min_amount_out(amount), 5, 0)
            .await
            .unwrap_err();
        assert_eq!(
            err.error,
            StrategyError::SlippageExceeded {
                quoted: U256::from(900_000u64),
                min_amount_out: U256::from(990_000u64)
            }
        );
        assert!(err.submitted);
        assert!(!exec.router_operational());

        // a clean quote on the next cycle restores it
        router.set_ratio_bps(10_000);
        exec.execute(Direction::AToB, amount, exec.min_amount_out(amount), 5, 0)
            .await
            .unwrap();
        assert!(exec.router_operational());
    }
}
