// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use std::sync::Arc;
use treasury_rebalancer::app::config::GlobalSettings;
use treasury_rebalancer::app::logging::setup_logging;
use treasury_rebalancer::domain::error::AppError;
use treasury_rebalancer::infrastructure::network::balances::Erc20Balances;
use treasury_rebalancer::infrastructure::network::chainlink::ChainlinkFeed;
use treasury_rebalancer::infrastructure::network::provider::{ConnectionFactory, HttpProvider};
use treasury_rebalancer::infrastructure::network::routers::V2Router;
use treasury_rebalancer::infrastructure::network::twap::V3TwapPool;
use treasury_rebalancer::services::controller::clock::SystemClock;
use treasury_rebalancer::services::controller::config::ControllerConfig;
use treasury_rebalancer::services::controller::keeper::{BalanceSource, KeeperHandle};
use treasury_rebalancer::services::controller::oracle::{
    AssetOracle, OracleAssetConfig, PriceOracleService, TwapConfig,
};
use treasury_rebalancer::services::controller::swap_executor::SwapRouter;
use treasury_rebalancer::services::controller::{Controller, CycleOutcome, StateStore};
use treasury_rebalancer::services::metrics::spawn_metrics_server;

#[derive(Parser, Debug)]
#[command(author, version, about = "two-asset treasury keeper")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Quote through the routers but never send a transaction
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Status server port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,
}

async fn asset_oracle(
    provider: &HttpProvider,
    config: OracleAssetConfig,
    primary: alloy::primitives::Address,
    fallback: Option<alloy::primitives::Address>,
    twap: Option<(alloy::primitives::Address, TwapConfig)>,
) -> Result<AssetOracle, AppError> {
    let feed = ChainlinkFeed::connect(primary, provider.clone()).await?;
    let mut oracle = AssetOracle::new(config, Arc::new(feed));
    if let Some(addr) = fallback {
        let feed = ChainlinkFeed::connect(addr, provider.clone()).await?;
        oracle = oracle.with_fallback(Arc::new(feed));
    }
    if let Some((pool, cfg)) = twap {
        oracle = oracle.with_twap(Arc::new(V3TwapPool::new(pool, provider.clone())), cfg);
    }
    Ok(oracle)
}

async fn build_controller(
    settings: &GlobalSettings,
    config: ControllerConfig,
    provider: &HttpProvider,
    dry_run: bool,
) -> Result<Controller, AppError> {
    let oracle_a = asset_oracle(
        provider,
        config.oracle_a,
        settings.oracle_a_primary,
        settings.oracle_a_fallback,
        settings.twap_pool_a.map(|p| (p, config.twap_a)),
    )
    .await?;
    let oracle_b = asset_oracle(
        provider,
        config.oracle_b,
        settings.oracle_b_primary,
        settings.oracle_b_fallback,
        settings.twap_pool_b.map(|p| (p, config.twap_b)),
    )
    .await?;

    let signer = if dry_run {
        None
    } else {
        let rpc_url = settings.get_http_provider()?;
        Some(ConnectionFactory::signing(&rpc_url, &settings.wallet_key()?)?)
    };
    let routers: Vec<Arc<dyn SwapRouter>> = settings
        .routers()
        .into_iter()
        .map(|(name, address)| {
            let router = V2Router::new(
                name,
                address,
                settings.asset_a_token,
                settings.asset_b_token,
                settings.wallet_address,
                provider.clone(),
            );
            let router = match &signer {
                Some(s) => router.with_signer(s.clone()),
                None => router,
            };
            Arc::new(router) as Arc<dyn SwapRouter>
        })
        .collect();

    Controller::new(
        config,
        Arc::new(SystemClock),
        PriceOracleService::new(oracle_a, oracle_b),
        routers,
    )
    .map_err(|e| AppError::Initialization(e.to_string()))
}

fn exit_code(outcome: &CycleOutcome) -> Result<(), AppError> {
    match outcome {
        CycleOutcome::Failed(attempt) => Err(AppError::Transaction {
            hash: String::new(),
            reason: attempt
                .error
                .clone()
                .unwrap_or_else(|| "rebalance failed".into()),
        }),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(
        if settings.debug { "debug" } else { "info" },
        settings.log_json,
    );

    let config = settings.controller_config()?;
    let rpc_url = settings.get_http_provider()?;
    let provider = ConnectionFactory::http(&rpc_url)?;
    tracing::info!(
        target: "config",
        chain_id = settings.chain_id,
        dry_run = cli.dry_run,
        once = cli.once,
        routers = settings.routers().len(),
        threshold_bps = config.rebalance_threshold_bps,
        "Keeper starting"
    );

    for key in settings.missing_twap_pools() {
        tracing::warn!(
            target: "oracle",
            key,
            "TWAP pool not configured; that reference price runs without the manipulation check"
        );
    }

    let mut controller = build_controller(&settings, config, &provider, cli.dry_run).await?;
    let store = StateStore::new(settings.state_path_value());
    match store.load().await? {
        Some(state) => controller.restore_state(state),
        None => tracing::info!(
            target: "state",
            path = %store.path().display(),
            "No saved controller state; starting fresh"
        ),
    }
    if let Err(e) = controller.refresh_oracles().await {
        tracing::warn!(target: "oracle", error = %e, "Initial oracle check failed");
    }

    let balances: Arc<dyn BalanceSource> = Arc::new(Erc20Balances::new(
        provider.clone(),
        settings.wallet_address,
        settings.asset_a_token,
        settings.asset_b_token,
    ));
    let keeper = KeeperHandle::new(controller).with_state_store(store);

    if cli.once {
        let outcome = keeper.trigger_with(balances.as_ref()).await?;
        let error = match &outcome {
            CycleOutcome::Skipped(reason) => reason.to_error().map(|e| e.to_string()),
            _ => None,
        };
        tracing::info!(
            target: "keeper",
            outcome = outcome.label(),
            error = error.as_deref().unwrap_or(""),
            "Single cycle finished"
        );
        return exit_code(&outcome);
    }

    let port = cli.metrics_port.unwrap_or(settings.metrics_port);
    let bind = settings.metrics_bind_value();
    let _metrics_addr = spawn_metrics_server(bind.as_deref(), port, keeper.clone()).await;

    tokio::select! {
        _ = keeper.run(settings.keeper_interval(), Some(balances)) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!(target: "keeper", error = %e, "Signal handler failed");
            }
            tracing::info!(target: "keeper", "Shutdown requested; waiting for in-flight cycle");
            let _ctrl = keeper.lock().await;
        }
    }

    Ok(())
}
