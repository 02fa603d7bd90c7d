// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::network::contracts::AggregatorV3Interface;
use crate::network::provider::HttpProvider;
use crate::services::controller::oracle::{PriceFeed, RoundData};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::time::Duration;

/// Chainlink aggregator read through `latestRoundData`.
pub struct ChainlinkFeed {
    address: Address,
    contract: AggregatorV3Interface::AggregatorV3InterfaceInstance<HttpProvider>,
    decimals: u8,
}

impl ChainlinkFeed {
    /// Resolves the feed's decimals once; they never change for a deployed aggregator.
    pub async fn connect(address: Address, provider: HttpProvider) -> Result<Self, AppError> {
        let contract = AggregatorV3Interface::new(address, provider);
        let reader = contract.clone();
        let decimals: u8 = retry_async(
            move |_| {
                let c = reader.clone();
                async move { c.decimals().call().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Chainlink decimals failed for {address:#x}: {e}")))?;

        tracing::info!(target: "oracle", feed = %format!("{address:#x}"), decimals, "Chainlink feed connected");
        Ok(Self {
            address,
            contract,
            decimals,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl PriceFeed for ChainlinkFeed {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    // single call per cycle; staleness is judged by the caller
    async fn latest_round_data(&self) -> Result<RoundData, AppError> {
        let latest = self.contract.latestRoundData().call().await.map_err(|e| {
            AppError::Connection(format!("Chainlink price failed for {:#x}: {e}", self.address))
        })?;
        Ok(RoundData {
            round_id: latest.roundId.to::<u128>(),
            answer: latest.answer,
            started_at: latest.startedAt.saturating_to::<u64>(),
            updated_at: latest.updatedAt.saturating_to::<u64>(),
            answered_in_round: latest.answeredInRound.to::<u128>(),
        })
    }
}
