//! Locked-amount validation
//!
//! The native unit may be over-paid (minimum-UTXO padding); every other
//! requested unit must match exactly; unrequested non-native units are
//! rejected.

use std::fmt;

use agentpay_core::{is_native_unit, totals_by_unit, AssetAmount, NATIVE_UNIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundsMismatch {
    /// Less than requested of a unit (or a non-native unit not exact)
    Amount { unit: String, expected: u64, actual: u64 },
    /// A non-native unit that was never requested
    Unexpected { unit: String, actual: u64 },
}

impl fmt::Display for FundsMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundsMismatch::Amount { unit, expected, actual } => {
                write!(f, "expected {} {}, found {}", expected, unit, actual)
            }
            FundsMismatch::Unexpected { unit, actual } => {
                write!(f, "unexpected asset {} ({})", unit, actual)
            }
        }
    }
}

pub fn validate_funds(requested: &[AssetAmount], actual: &[AssetAmount]) -> Result<(), FundsMismatch> {
    let requested = totals_by_unit(requested);
    let actual = totals_by_unit(actual);

    for (unit, &expected) in &requested {
        let found = actual.get(unit).copied().unwrap_or(0);
        let ok = if unit == NATIVE_UNIT { found >= expected } else { found == expected };
        if !ok {
            return Err(FundsMismatch::Amount { unit: unit.clone(), expected, actual: found });
        }
    }

    for (unit, &found) in &actual {
        if !is_native_unit(unit) && !requested.contains_key(unit) && found > 0 {
            return Err(FundsMismatch::Unexpected { unit: unit.clone(), actual: found });
        }
    }

    Ok(())
}
