// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::services::controller::circuit_breaker::{BreakerSnapshot, BreakerState};
use crate::services::controller::engine::{Controller, Counters};
use crate::services::controller::oracle::RoundMark;
use crate::services::controller::rate_limit::WindowSnapshot;
use alloy::primitives::U256;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Protective state that must outlive a single process, so that a keeper
/// started once per cycle still sees the breaker, the spent budget, the
/// last rebalance time and the oracle round marks of earlier runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    pub saved_at: u64,
    pub breaker: BreakerSnapshot,
    pub window: WindowSnapshot,
    pub last_rebalance_time: u64,
    pub counters: Counters,
    pub last_gas_cost: U256,
    pub round_marks: Vec<RoundMark>,
    pub paused: bool,
    pub shutdown: bool,
    pub manual_oracle_failure: bool,
}

impl Controller {
    pub fn export_state(&self) -> ControllerState {
        ControllerState {
            saved_at: self.clock.now(),
            breaker: self.breaker.snapshot(),
            window: self.limiter.snapshot(),
            last_rebalance_time: self.last_rebalance_time,
            counters: self.counters,
            last_gas_cost: self.last_gas_cost,
            round_marks: self.oracle.round_marks(),
            paused: self.paused,
            shutdown: self.shutdown,
            manual_oracle_failure: self.manual_oracle_failure,
        }
    }

    /// Applies state saved by an earlier run. While the breaker is closed the
    /// configured daily limit wins over the saved one; an open or recovering
    /// breaker keeps the limit it pinned.
    pub fn restore_state(&mut self, state: ControllerState) {
        let mut window = state.window;
        if matches!(state.breaker.state, BreakerState::Closed { .. }) {
            window.daily_limit = self.config.daily_swap_limit;
        }
        self.breaker.restore(state.breaker);
        self.limiter.restore(window);
        self.last_rebalance_time = state.last_rebalance_time;
        self.counters = state.counters;
        self.last_gas_cost = state.last_gas_cost;
        self.oracle.restore_round_marks(&state.round_marks);
        self.paused = state.paused;
        self.shutdown = state.shutdown;
        self.manual_oracle_failure = state.manual_oracle_failure;

        tracing::info!(
            target: "state",
            saved_at = state.saved_at,
            breaker = ?state.breaker.state,
            daily_used = %window.daily_used,
            last_rebalance_time = state.last_rebalance_time,
            "Controller state restored"
        );
        self.publish();
    }
}

/// JSON file holding a [`ControllerState`]. Writes go to a sibling temp file
/// that is renamed over the target, so a crash mid-write keeps the old state.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no state was saved yet. An unreadable or corrupt file
    /// is an error: starting from scratch would silently reset the breaker.
    pub async fn load(&self) -> Result<Option<ControllerState>, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Initialization(format!(
                    "state file {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            AppError::Initialization(format!("state file {}: {e}", self.path.display()))
        })
    }

    pub async fn save(&self, state: &ControllerState) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(state).context("encode controller state")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} to {}", tmp.display(), self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::controller::mocks::{MockSetup, units};
    use crate::services::controller::{CycleOutcome, SkipReason};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}_{}.json", std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = StateStore::new(temp_path("keeper_state_missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let path = temp_path("keeper_state_corrupt");
        std::fs::write(&path, b"{not json").unwrap();
        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AppError::Initialization(_)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn saved_state_round_trips_through_file() {
        let setup = MockSetup::new();
        let mut ctrl = setup.controller();
        ctrl.sync_holdings(units(6), units(4));
        assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Executed(_)));
        ctrl.pause();

        let path = temp_path("keeper_state_round_trip");
        let store = StateStore::new(&path);
        store.save(&ctrl.export_state()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, ctrl.export_state());

        let mut next = setup.controller();
        next.restore_state(loaded);
        assert!(next.is_paused());
        assert_eq!(next.counters(), ctrl.counters());
        assert_eq!(next.last_rebalance_time(), ctrl.last_rebalance_time());
        assert_eq!(next.rate_limit_status(), ctrl.rate_limit_status());
        next.unpause().unwrap();
        next.sync_holdings(units(6), units(4));
        assert!(matches!(
            next.run_cycle().await,
            CycleOutcome::Skipped(SkipReason::MinIntervalNotElapsed { .. })
        ));
        let _ = std::fs::remove_file(path);
    }
}
