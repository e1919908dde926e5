//! Asset amounts keyed by unit
//!
//! A unit is either the native asset (`lovelace`) or a concatenated
//! policy id + asset name hex string, as returned by chain indexers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit name of the chain's native asset
pub const NATIVE_UNIT: &str = "lovelace";

/// Returns true for the native asset unit (indexers use both spellings)
pub fn is_native_unit(unit: &str) -> bool {
    unit == NATIVE_UNIT || unit.is_empty()
}

/// Amount of a single asset unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetAmount {
    pub unit: String,
    pub amount: u64,
}

impl AssetAmount {
    pub fn new(unit: impl Into<String>, amount: u64) -> Self {
        Self { unit: unit.into(), amount }
    }

    /// Native asset amount
    pub fn native(amount: u64) -> Self {
        Self::new(NATIVE_UNIT, amount)
    }

    pub fn is_native(&self) -> bool {
        is_native_unit(&self.unit)
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

/// Collapse a list of amounts into one total per unit.
///
/// The native unit is normalised to [`NATIVE_UNIT`] so that `""` and
/// `"lovelace"` are counted together.
pub fn totals_by_unit(amounts: &[AssetAmount]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for a in amounts {
        let unit = if a.is_native() { NATIVE_UNIT.to_string() } else { a.unit.clone() };
        let entry = totals.entry(unit).or_insert(0u64);
        *entry = entry.saturating_add(a.amount);
    }
    totals
}
