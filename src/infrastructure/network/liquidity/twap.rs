// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::network::contracts::UniV3Pool;
use crate::network::provider::HttpProvider;
use crate::services::controller::oracle::TwapSource;
use alloy::primitives::Address;
use async_trait::async_trait;

/// Uniswap-V3-style pool used as the TWAP reference.
pub struct V3TwapPool {
    address: Address,
    contract: UniV3Pool::UniV3PoolInstance<HttpProvider>,
}

impl V3TwapPool {
    pub fn new(address: Address, provider: HttpProvider) -> Self {
        Self {
            address,
            contract: UniV3Pool::new(address, provider),
        }
    }
}

#[async_trait]
impl TwapSource for V3TwapPool {
    async fn observe(&self, seconds_agos: &[u32]) -> Result<Vec<i64>, AppError> {
        let observed = self
            .contract
            .observe(seconds_agos.to_vec())
            .call()
            .await
            .map_err(|e| {
                AppError::Connection(format!("observe failed for pool {:#x}: {e}", self.address))
            })?;
        observed
            .tickCumulatives
            .into_iter()
            .map(|cumulative| {
                i64::try_from(cumulative).map_err(|e| {
                    AppError::Validation {
                        field: "tickCumulatives".into(),
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    }
}
