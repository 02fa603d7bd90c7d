// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two slots of the basket.
///
/// The same slot naming is used for the two rebalanced assets and for the two
/// oracle reference assets; which reference prices which asset is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    A,
    B,
}

impl AssetId {
    pub const ALL: [AssetId; 2] = [AssetId::A, AssetId::B];

    pub fn index(self) -> usize {
        match self {
            AssetId::A => 0,
            AssetId::B => 1,
        }
    }

    pub fn other(self) -> AssetId {
        match self {
            AssetId::A => AssetId::B,
            AssetId::B => AssetId::A,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::A => f.write_str("A"),
            AssetId::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    /// Sell asset A, buy asset B.
    AToB,
    /// Sell asset B, buy asset A.
    BToA,
}

impl Direction {
    /// Direction that sells the given (overweight) asset.
    pub fn selling(asset: AssetId) -> Self {
        match asset {
            AssetId::A => Direction::AToB,
            AssetId::B => Direction::BToA,
        }
    }

    pub fn input(self) -> AssetId {
        match self {
            Direction::AToB => AssetId::A,
            Direction::BToA => AssetId::B,
        }
    }

    pub fn output(self) -> AssetId {
        self.input().other()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => f.write_str("A->B"),
            Direction::BToA => f.write_str("B->A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedSource {
    Primary,
    Fallback,
}
