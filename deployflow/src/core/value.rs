//! Multi-asset values and execution budgets.

use super::{AssetId, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coin plus an exact map of native tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Value {
    /// Base currency amount.
    pub coin: Quantity,
    /// Native tokens carried alongside the coin.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<AssetId, Quantity>,
}

impl Value {
    /// Creates a coin-only value.
    #[must_use]
    pub fn coin(coin: impl Into<Quantity>) -> Self {
        Self {
            coin: coin.into(),
            assets: BTreeMap::new(),
        }
    }

    /// Adds (or increases) a token amount.
    #[must_use]
    pub fn with_asset(mut self, asset: AssetId, quantity: Quantity) -> Self {
        let entry = self.assets.entry(asset).or_insert(Quantity::ZERO);
        *entry = entry.checked_add(quantity).unwrap_or(Quantity::new(u128::MAX));
        self
    }

    /// Returns the amount of a token (zero if absent).
    #[must_use]
    pub fn asset(&self, asset: &AssetId) -> Quantity {
        self.assets.get(asset).copied().unwrap_or(Quantity::ZERO)
    }

    /// Sums two values, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut out = self.clone();
        out.coin = out.coin.checked_add(other.coin)?;
        for (asset, qty) in &other.assets {
            let entry = out.assets.entry(asset.clone()).or_insert(Quantity::ZERO);
            *entry = entry.checked_add(*qty)?;
        }
        Some(out)
    }

    /// Subtracts token amounts, ignoring coin. Returns `None` if any token would go negative.
    #[must_use]
    pub fn checked_sub_assets(&self, other: &Self) -> Option<Self> {
        let mut out = self.clone();
        for (asset, qty) in &other.assets {
            let remaining = out.asset(asset).checked_sub(*qty)?;
            if remaining == Quantity::ZERO {
                out.assets.remove(asset);
            } else {
                out.assets.insert(asset.clone(), remaining);
            }
        }
        Some(out)
    }

    /// Returns true if this value holds no tokens.
    #[must_use]
    pub fn has_no_assets(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Execution budget estimate for running a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExUnits {
    /// Memory units.
    pub mem: Quantity,
    /// CPU steps.
    pub steps: Quantity,
}

impl ExUnits {
    /// Creates a new budget.
    #[must_use]
    pub const fn new(mem: u128, steps: u128) -> Self {
        Self {
            mem: Quantity::new(mem),
            steps: Quantity::new(steps),
        }
    }

    /// Sums two budgets, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            mem: self.mem.checked_add(other.mem)?,
            steps: self.steps.checked_add(other.steps)?,
        })
    }
}

impl Default for ExUnits {
    fn default() -> Self {
        Self::new(500_000, 200_000_000)
    }
}
