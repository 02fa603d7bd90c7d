// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::BPS_DENOMINATOR;
use crate::domain::types::AssetId;
use alloy::primitives::U256;
use serde::Serialize;

/// Holdings of the two rebalanced assets and their split in basis points.
///
/// Only the two basket assets are counted; a vault's base-asset balance is
/// never added on top, otherwise the shared asset would be counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocationSnapshot {
    pub asset_a_balance: U256,
    pub asset_b_balance: U256,
    pub total_holdings: U256,
    pub asset_a_percent_bps: u64,
    pub asset_b_percent_bps: u64,
}

impl AllocationSnapshot {
    pub fn compute(balance_a: U256, balance_b: U256) -> Self {
        let total = balance_a.saturating_add(balance_b);
        if total.is_zero() {
            return Self {
                asset_a_balance: balance_a,
                asset_b_balance: balance_b,
                total_holdings: total,
                asset_a_percent_bps: 0,
                asset_b_percent_bps: 0,
            };
        }

        // balance_a <= total, so the quotient never exceeds 10_000
        let pct_a: u64 = (balance_a.saturating_mul(U256::from(BPS_DENOMINATOR)) / total).to();
        Self {
            asset_a_balance: balance_a,
            asset_b_balance: balance_b,
            total_holdings: total,
            asset_a_percent_bps: pct_a,
            asset_b_percent_bps: BPS_DENOMINATOR - pct_a,
        }
    }

    pub fn balance(&self, asset: AssetId) -> U256 {
        match asset {
            AssetId::A => self.asset_a_balance,
            AssetId::B => self.asset_b_balance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_holdings.is_zero()
    }

    /// Absolute distance of asset A's share from `target_bps`.
    pub fn drift_bps(&self, target_bps: u64) -> u64 {
        self.asset_a_percent_bps.abs_diff(target_bps)
    }

    /// The asset holding more than its target share, if any.
    pub fn overweight(&self, target_bps: u64) -> Option<AssetId> {
        if self.is_empty() || self.asset_a_percent_bps == target_bps {
            return None;
        }
        if self.asset_a_percent_bps > target_bps {
            Some(AssetId::A)
        } else {
            Some(AssetId::B)
        }
    }

    /// Amount of the overweight asset that has to move to land on `target_bps`.
    pub fn excess(&self, target_bps: u64) -> U256 {
        let target_a =
            self.total_holdings.saturating_mul(U256::from(target_bps)) / U256::from(BPS_DENOMINATOR);
        match self.overweight(target_bps) {
            Some(AssetId::A) => self.asset_a_balance.saturating_sub(target_a),
            Some(AssetId::B) => {
                let target_b = self.total_holdings.saturating_sub(target_a);
                self.asset_b_balance.saturating_sub(target_b)
            }
            None => U256::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> U256 {
        U256::from(n) * U256::from(100_000_000u64)
    }

    #[test]
    fn zero_holdings_report_zero_percentages() {
        let snap = AllocationSnapshot::compute(U256::ZERO, U256::ZERO);
        assert_eq!(snap.total_holdings, U256::ZERO);
        assert_eq!(snap.asset_a_percent_bps, 0);
        assert_eq!(snap.asset_b_percent_bps, 0);
        assert_eq!(snap.overweight(5_000), None);
        assert_eq!(snap.excess(5_000), U256::ZERO);
    }

    #[test]
    fn percentages_sum_to_full_basis_even_with_rounding() {
        // 1/3 split rounds down for A; the remainder lands on B
        let snap = AllocationSnapshot::compute(U256::from(1u64), U256::from(2u64));
        assert_eq!(snap.asset_a_percent_bps, 3_333);
        assert_eq!(snap.asset_b_percent_bps, 6_667);
        assert_eq!(snap.asset_a_percent_bps + snap.asset_b_percent_bps, 10_000);
    }

    #[test]
    fn single_sided_basket_is_fully_allocated() {
        let snap = AllocationSnapshot::compute(units(50), U256::ZERO);
        assert_eq!(snap.asset_a_percent_bps, 10_000);
        assert_eq!(snap.asset_b_percent_bps, 0);
        assert_eq!(snap.total_holdings, units(50));
    }

    #[test]
    fn excess_moves_overweight_asset_to_target() {
        let snap = AllocationSnapshot::compute(units(60), units(40));
        assert_eq!(snap.drift_bps(5_000), 1_000);
        assert_eq!(snap.overweight(5_000), Some(AssetId::A));
        assert_eq!(snap.excess(5_000), units(10));

        let snap = AllocationSnapshot::compute(units(30), units(70));
        assert_eq!(snap.overweight(5_000), Some(AssetId::B));
        assert_eq!(snap.excess(5_000), units(20));
    }

    #[test]
    fn excess_respects_non_even_targets() {
        let snap = AllocationSnapshot::compute(units(50), units(50));
        assert_eq!(snap.overweight(6_000), Some(AssetId::B));
        assert_eq!(snap.excess(6_000), units(10));
    }
}
