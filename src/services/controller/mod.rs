// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod allocation;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod engine;
pub mod keeper;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod oracle;
pub mod rate_limit;
pub mod state;
pub mod status;
pub mod swap_executor;

pub use engine::{Controller, CycleOutcome, SkipReason};
pub use keeper::KeeperHandle;
pub use state::{ControllerState, StateStore};
