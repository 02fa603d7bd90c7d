// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod balances;
pub mod contracts;

pub mod pricing;
pub use pricing::chainlink;

pub mod liquidity;
pub use liquidity::twap;

pub mod provider;
pub mod routers;
