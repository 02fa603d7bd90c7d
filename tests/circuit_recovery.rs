// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::U256;
use treasury_rebalancer::services::controller::Controller;
use treasury_rebalancer::services::controller::circuit_breaker::BreakerState;
use treasury_rebalancer::services::controller::mocks::{MockSetup, units};
use treasury_rebalancer::services::controller::status::StrategyMode;
use treasury_rebalancer::services::controller::{CycleOutcome, SkipReason};

async fn fail_until_tripped(setup: &MockSetup, ctrl: &mut Controller) {
    setup.router.set_revert(true);
    for round in 1..=3u32 {
        if round > 1 {
            setup.advance(3_600);
        }
        ctrl.sync_holdings(units(6), units(4));
        assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Failed(_)));
    }
}

#[tokio::test]
async fn third_consecutive_failure_trips_the_breaker() {
    let setup = MockSetup::new();
    let mut ctrl = setup.controller();
    fail_until_tripped(&setup, &mut ctrl).await;

    let status = ctrl.circuit_breaker_status();
    assert!(status.tripped);
    assert_eq!(status.fail_count, 3);
    assert_eq!(status.time_since_last_failure, 0);
    assert_eq!(status.time_until_reset, 3_600);
    assert_eq!(ctrl.strategy_mode(), StrategyMode::CircuitBreakerTripped);
    assert_eq!(ctrl.pre_recovery_daily_limit(), units(10));
    assert_eq!(ctrl.daily_swap_limit(), units(1));

    let counters = ctrl.counters();
    assert_eq!(counters.rebalances_failed, 3);
    assert_eq!(counters.swaps_failed, 3);
    assert_eq!(setup.router.swap_calls(), 3);
}

#[tokio::test]
async fn open_breaker_turns_cycles_into_no_ops() {
    let setup = MockSetup::new();
    let mut ctrl = setup.controller();
    fail_until_tripped(&setup, &mut ctrl).await;
    setup.router.set_revert(false);
    let before = ctrl.counters();
    let quotes_before = setup.router.quote_calls();

    setup.advance(1_800);
    ctrl.sync_holdings(units(6), units(4));
    assert_eq!(
        ctrl.run_cycle().await,
        CycleOutcome::Skipped(SkipReason::CircuitBreakerOpen {
            retry_in_secs: 1_800
        })
    );
    assert_eq!(ctrl.counters(), before);
    assert_eq!(setup.router.quote_calls(), quotes_before);
    assert_eq!(ctrl.system_diagnostics().status_text, "CIRCUIT_BREAKER");
}

#[tokio::test]
async fn successes_ramp_the_limit_back() {
    let setup = MockSetup::new();
    let mut ctrl = setup.controller();
    fail_until_tripped(&setup, &mut ctrl).await;
    setup.router.set_revert(false);

    // cool down and start a fresh daily window
    setup.advance(86_400);
    // status reads do not advance the breaker
    assert!(ctrl.circuit_breaker_status().tripped);
    assert_eq!(ctrl.circuit_breaker_status().time_until_reset, 0);

    // floor 1, pre-trip 10, 4 steps
    let ramp = [325_000_000u64, 550_000_000, 775_000_000];
    for (i, expected) in ramp.iter().enumerate() {
        if i > 0 {
            setup.advance(3_600);
        }
        ctrl.sync_holdings(units(6), units(4));
        assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Executed(_)));
        assert_eq!(ctrl.breaker_state(), BreakerState::Recovering { step: i as u32 + 1 });
        assert_eq!(ctrl.daily_swap_limit(), U256::from(*expected));
        assert_eq!(ctrl.strategy_mode(), StrategyMode::GradualRecovery);
        assert_eq!(ctrl.strategy_status().fail_count, 0);
        assert_eq!(ctrl.system_diagnostics().status_text, "RECOVERING");
    }

    setup.advance(3_600);
    ctrl.sync_holdings(units(6), units(4));
    assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Executed(_)));
    assert_eq!(ctrl.breaker_state(), BreakerState::Closed { fail_count: 0 });
    assert_eq!(ctrl.daily_swap_limit(), units(10));
    assert_eq!(ctrl.strategy_mode(), StrategyMode::Normal);
    assert_eq!(ctrl.counters().rebalances_executed, 4);
}

#[tokio::test]
async fn failure_during_recovery_reopens_with_original_snapshot() {
    let setup = MockSetup::new();
    let mut ctrl = setup.controller();
    fail_until_tripped(&setup, &mut ctrl).await;
    setup.router.set_revert(false);

    setup.advance(86_400);
    ctrl.sync_holdings(units(6), units(4));
    assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Executed(_)));
    assert!(matches!(ctrl.breaker_state(), BreakerState::Recovering { .. }));

    setup.router.set_revert(true);
    setup.advance(3_600);
    ctrl.sync_holdings(units(6), units(4));
    assert!(matches!(ctrl.run_cycle().await, CycleOutcome::Failed(_)));
    assert!(ctrl.circuit_breaker_status().tripped);
    assert_eq!(ctrl.daily_swap_limit(), units(1));
    assert_eq!(ctrl.pre_recovery_daily_limit(), units(10));
}
