// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::services::controller::engine::{Controller, ControllerStats, CycleOutcome, SkipReason};
use crate::services::controller::state::StateStore;
use crate::services::controller::status::StatusSnapshot;
use alloy::primitives::U256;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, watch};

/// Source of the basket balances held on chain.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balances(&self) -> Result<(U256, U256), AppError>;
}

/// Shared, non-reentrant entry point for external triggers.
///
/// Readers never touch the controller mutex: counters come from the shared
/// stats and everything else from the last published [`StatusSnapshot`].
#[derive(Clone)]
pub struct KeeperHandle {
    controller: Arc<Mutex<Controller>>,
    stats: Arc<ControllerStats>,
    status: watch::Receiver<StatusSnapshot>,
    store: Option<Arc<StateStore>>,
}

impl KeeperHandle {
    pub fn new(controller: Controller) -> Self {
        let stats = controller.stats();
        let status = controller.subscribe_status();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            stats,
            status,
            store: None,
        }
    }

    /// Saves controller state to `store` after every cycle.
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn stats(&self) -> Arc<ControllerStats> {
        Arc::clone(&self.stats)
    }

    /// Latest published snapshot; never waits on a running cycle.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Waits for any in-flight cycle, then grants exclusive access.
    pub async fn lock(&self) -> MutexGuard<'_, Controller> {
        self.controller.lock().await
    }

    /// Runs one cycle unless another trigger already holds the controller,
    /// in which case the call is reported as skipped and not queued.
    pub async fn trigger(&self) -> CycleOutcome {
        let Ok(mut ctrl) = self.controller.try_lock() else {
            return self.busy();
        };
        let outcome = ctrl.run_cycle().await;
        self.persist(&ctrl).await;
        outcome
    }

    /// Like [`trigger`](Self::trigger), refreshing holdings from `source` first.
    /// A failed balance read aborts the cycle before any decision is taken.
    pub async fn trigger_with(&self, source: &dyn BalanceSource) -> Result<CycleOutcome, AppError> {
        let Ok(mut ctrl) = self.controller.try_lock() else {
            return Ok(self.busy());
        };
        let (balance_a, balance_b) = source.balances().await?;
        ctrl.sync_holdings(balance_a, balance_b);
        let outcome = ctrl.run_cycle().await;
        self.persist(&ctrl).await;
        Ok(outcome)
    }

    async fn persist(&self, ctrl: &Controller) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&ctrl.export_state()).await {
            tracing::error!(
                target: "state",
                path = %store.path().display(),
                error = %e,
                "Failed to save controller state"
            );
        }
    }

    fn busy(&self) -> CycleOutcome {
        let outcome = CycleOutcome::Skipped(SkipReason::CycleInProgress);
        self.stats.record(&outcome);
        tracing::debug!(target: "keeper", "Cycle already in flight; trigger dropped");
        outcome
    }

    /// Triggers a cycle every `interval` until the task is dropped.
    pub async fn run(&self, interval: Duration, balances: Option<Arc<dyn BalanceSource>>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            target: "keeper",
            interval_secs = interval.as_secs(),
            "Keeper loop started"
        );
        loop {
            ticker.tick().await;
            let outcome = match balances.as_deref() {
                Some(source) => match self.trigger_with(source).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(target: "keeper", error = %e, "Balance sync failed; cycle skipped");
                        continue;
                    }
                },
                None => self.trigger().await,
            };
            tracing::debug!(target: "keeper", outcome = outcome.label(), "Keeper tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::controller::mocks::{MockSetup, units};

    struct FixedBalances(U256, U256);

    #[async_trait]
    impl BalanceSource for FixedBalances {
        async fn balances(&self) -> Result<(U256, U256), AppError> {
            Ok((self.0, self.1))
        }
    }

    struct BrokenBalances;

    #[async_trait]
    impl BalanceSource for BrokenBalances {
        async fn balances(&self) -> Result<(U256, U256), AppError> {
            Err(AppError::Connection("rpc down".into()))
        }
    }

    #[tokio::test]
    async fn concurrent_trigger_is_reported_busy() {
        let setup = MockSetup::new();
        let handle = KeeperHandle::new(setup.controller());
        let guard = handle.lock().await;
        let outcome = handle.trigger().await;
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::CycleInProgress));
        drop(guard);

        let stats = handle.stats();
        assert_eq!(stats.skip_busy.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(!matches!(
            handle.trigger().await,
            CycleOutcome::Skipped(SkipReason::CycleInProgress)
        ));
    }

    #[tokio::test]
    async fn trigger_with_syncs_holdings_before_deciding() {
        let setup = MockSetup::new();
        let handle = KeeperHandle::new(setup.controller());
        let outcome = handle
            .trigger_with(&FixedBalances(units(6), units(4)))
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Executed(_)));
        let ctrl = handle.lock().await;
        assert_eq!(ctrl.counters().rebalances_executed, 1);
        assert_eq!(ctrl.allocation_details().total_balance, units(10));
    }

    #[tokio::test]
    async fn balance_failure_aborts_cycle() {
        let setup = MockSetup::new();
        let handle = KeeperHandle::new(setup.controller());
        assert!(handle.trigger_with(&BrokenBalances).await.is_err());
        assert_eq!(handle.lock().await.counters().rebalances_executed, 0);
    }
}
