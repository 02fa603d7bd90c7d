// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use alloy::network::{Ethereum, EthereumWallet};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;
use url::Url;

/// Read-only provider used for feeds, pools and balances.
pub type HttpProvider = RootProvider<Ethereum>;
/// Wallet-filling provider used to send swaps.
pub type SigningProvider = DynProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    fn parse_url(rpc_url: &str) -> Result<Url, AppError> {
        Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))
    }

    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url = Self::parse_url(rpc_url)?;
        Ok(RootProvider::new_http(url))
    }

    pub fn signing(rpc_url: &str, wallet_key: &str) -> Result<SigningProvider, AppError> {
        let url = Self::parse_url(rpc_url)?;
        let signer = PrivateKeySigner::from_str(wallet_key.trim())
            .map_err(|e| AppError::Config(format!("Invalid WALLET_KEY: {}", e)))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            ConnectionFactory::http("not a url"),
            Err(AppError::Config(_))
        ));
        assert!(ConnectionFactory::http("http://127.0.0.1:8545").is_ok());
    }

    #[test]
    fn signing_provider_rejects_bad_key() {
        let err = ConnectionFactory::signing("http://127.0.0.1:8545", "0xnothex").unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("WALLET_KEY")));
    }
}
