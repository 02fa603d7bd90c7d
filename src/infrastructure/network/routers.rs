// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::types::Direction;
use crate::network::contracts::{ERC20, UniV2Router};
use crate::network::provider::{HttpProvider, SigningProvider};
use crate::services::controller::swap_executor::{SwapReceipt, SwapRequest, SwapRouter};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;

/// Router exposing the Uniswap-V2 `getAmountsOut` / `swapExactTokensForTokens` pair.
///
/// Without a signer the router only quotes; `swap` then reports the quoted
/// output with zero gas and sends nothing.
pub struct V2Router {
    name: String,
    router: Address,
    token_a: Address,
    token_b: Address,
    recipient: Address,
    reader: HttpProvider,
    signer: Option<SigningProvider>,
}

impl V2Router {
    pub fn new(
        name: impl Into<String>,
        router: Address,
        token_a: Address,
        token_b: Address,
        recipient: Address,
        reader: HttpProvider,
    ) -> Self {
        Self {
            name: name.into(),
            router,
            token_a,
            token_b,
            recipient,
            reader,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: SigningProvider) -> Self {
        self.signer = Some(signer);
        self
    }

    fn path(&self, direction: Direction) -> Vec<Address> {
        match direction {
            Direction::AToB => vec![self.token_a, self.token_b],
            Direction::BToA => vec![self.token_b, self.token_a],
        }
    }

    async fn output_balance(&self, token: Address) -> Result<U256, AppError> {
        ERC20::new(token, self.reader.clone())
            .balanceOf(self.recipient)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("Token balance failed: {}", e)))
    }

    async fn ensure_allowance(
        &self,
        signer: &SigningProvider,
        token: Address,
        amount: U256,
    ) -> Result<(), AppError> {
        let erc20 = ERC20::new(token, signer.clone());
        let current = erc20
            .allowance(self.recipient, self.router)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("Allowance lookup failed: {}", e)))?;
        if current >= amount {
            return Ok(());
        }
        tracing::info!(
            target: "swap",
            router = %self.name,
            token = %format!("{token:#x}"),
            "Approving router"
        );
        let receipt = erc20
            .approve(self.router, U256::MAX)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Approve send failed: {}", e)))?
            .get_receipt()
            .await
            .map_err(|e| AppError::Connection(format!("Approve receipt failed: {}", e)))?;
        if !receipt.status() {
            return Err(AppError::Transaction {
                hash: format!("{:#x}", receipt.transaction_hash),
                reason: "approve reverted".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SwapRouter for V2Router {
    fn name(&self) -> &str {
        &self.name
    }

    // pool fee is fixed per V2 pair, so the fee tier does not select a route
    async fn get_amounts_out(
        &self,
        amount_in: U256,
        direction: Direction,
        _fee_bps: u64,
    ) -> Result<U256, AppError> {
        let amounts = UniV2Router::new(self.router, self.reader.clone())
            .getAmountsOut(amount_in, self.path(direction))
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("{} getAmountsOut failed: {}", self.name, e)))?;
        amounts.last().copied().ok_or_else(|| AppError::Validation {
            field: "amounts".into(),
            message: format!("{} returned an empty quote", self.name),
        })
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapReceipt, AppError> {
        let Some(signer) = &self.signer else {
            let quoted = self
                .get_amounts_out(request.amount_in, request.direction, request.fee_bps)
                .await?;
            tracing::info!(
                target: "swap",
                router = %self.name,
                direction = %request.direction,
                amount_in = %request.amount_in,
                quoted = %quoted,
                "Dry run: swap not sent"
            );
            return Ok(SwapReceipt {
                amount_out: quoted,
                gas_cost: U256::ZERO,
            });
        };

        let path = self.path(request.direction);
        let (token_in, token_out) = (path[0], path[1]);
        self.ensure_allowance(signer, token_in, request.amount_in)
            .await?;
        let before = self.output_balance(token_out).await?;

        let receipt = UniV2Router::new(self.router, signer.clone())
            .swapExactTokensForTokens(
                request.amount_in,
                request.min_amount_out,
                path,
                self.recipient,
                U256::from(request.deadline),
            )
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("{} swap send failed: {}", self.name, e)))?
            .get_receipt()
            .await
            .map_err(|e| AppError::Connection(format!("{} swap receipt failed: {}", self.name, e)))?;

        let hash = format!("{:#x}", receipt.transaction_hash);
        if !receipt.status() {
            return Err(AppError::Transaction {
                hash,
                reason: "swap reverted".into(),
            });
        }
        let gas_cost = U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price);
        let after = self.output_balance(token_out).await?;
        tracing::debug!(target: "swap", router = %self.name, tx = %hash, "Swap mined");
        Ok(SwapReceipt {
            amount_out: after.saturating_sub(before),
            gas_cost,
        })
    }
}
