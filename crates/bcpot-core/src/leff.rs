// ─────────────────────────────────────────────────────────────────────
// BCPot — Effective Length
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Effective kernel length rule and basis-length selection.

use bcpot_types::error::{BcpError, BcpResult};
use ndarray::Array1;

/// Default floor of the effective length, as a fraction of L0.
pub const DEFAULT_MIN_LENGTH_FRACTION: f64 = 0.05;

/// L_eff = L0 / (1 + α·χ), floored at `min_fraction·L0`. NaN stiffness
/// yields NaN length rather than the floor.
pub fn leff_linear(l0: f64, chi: &[f64], alpha: f64, min_fraction: f64) -> Array1<f64> {
    let floor = min_fraction * l0;
    chi.iter()
        .map(|&c| {
            let l = l0 / (1.0 + alpha * c);
            if l.is_nan() {
                l
            } else {
                l.max(floor)
            }
        })
        .collect()
}

/// Basis lengths `L0·m` for each multiplier, ascending, duplicates removed.
pub fn basis_lengths(l0: f64, multipliers: &[f64]) -> BcpResult<Vec<f64>> {
    if !l0.is_finite() || l0 <= 0.0 {
        return Err(BcpError::ConfigError(format!(
            "reference length must be finite and > 0, got {l0}"
        )));
    }
    if multipliers.is_empty() {
        return Err(BcpError::ConfigError(
            "basis needs at least one multiplier".to_string(),
        ));
    }
    let mut lengths = Vec::with_capacity(multipliers.len());
    for &m in multipliers {
        if !m.is_finite() || m <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "basis multipliers must be finite and > 0, got {m}"
            )));
        }
        lengths.push(l0 * m);
    }
    lengths.sort_by(f64::total_cmp);
    lengths.dedup();
    Ok(lengths)
}
