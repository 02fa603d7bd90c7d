// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::network::contracts::ERC20;
use crate::network::provider::HttpProvider;
use crate::services::controller::keeper::BalanceSource;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::time::Duration;

/// ERC-20 balances of the two basket tokens held by one account.
pub struct Erc20Balances {
    provider: HttpProvider,
    holder: Address,
    token_a: Address,
    token_b: Address,
}

impl Erc20Balances {
    pub fn new(provider: HttpProvider, holder: Address, token_a: Address, token_b: Address) -> Self {
        Self {
            provider,
            holder,
            token_a,
            token_b,
        }
    }

    async fn balance_of(&self, token: Address) -> Result<U256, AppError> {
        let contract = ERC20::new(token, self.provider.clone());
        let holder = self.holder;
        retry_async(
            move |_| {
                let contract = contract.clone();
                async move { contract.balanceOf(holder).call().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Token balance failed for {token:#x}: {e}")))
    }
}

#[async_trait]
impl BalanceSource for Erc20Balances {
    async fn balances(&self) -> Result<(U256, U256), AppError> {
        let (a, b) = tokio::try_join!(self.balance_of(self.token_a), self.balance_of(self.token_b))?;
        Ok((a, b))
    }
}
