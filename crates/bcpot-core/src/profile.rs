// ─────────────────────────────────────────────────────────────────────
// BCPot — Radial Profiles
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Annulus averaging of midplane slices.

use bcpot_math::interp::fill_nan_gaps;
use bcpot_types::error::{BcpError, BcpResult};
use bcpot_types::state::RadialProfile;
use ndarray::{Array1, Array3, ArrayView2, Axis};

/// The z = 0 plane of a cubic field (index n/2 on the last axis).
pub fn midplane(field: &Array3<f64>) -> ArrayView2<'_, f64> {
    let c = field.len_of(Axis(2)) / 2;
    field.index_axis(Axis(2), c)
}

/// Equal-width bin edges on [0, extent].
pub fn bin_edges(extent: f64, bins: usize) -> Array1<f64> {
    Array1::linspace(0.0, extent, bins + 1)
}

/// Mean of `slice` over `bins` equal-width annuli from 0 to `extent`.
///
/// Sample radii are measured from the half-cell offset point
/// `(c − ½, c − ½)·dx`, c = n/2. Empty annuli are filled by linear
/// interpolation over populated ones with edge values held.
pub fn radial_profile(
    slice: ArrayView2<'_, f64>,
    dx: f64,
    extent: f64,
    bins: usize,
) -> BcpResult<RadialProfile> {
    if bins == 0 {
        return Err(BcpError::ConfigError("radial_bins must be > 0".to_string()));
    }
    if !extent.is_finite() || extent <= 0.0 {
        return Err(BcpError::ConfigError(format!(
            "profile extent must be finite and > 0, got {extent}"
        )));
    }
    let edges = bin_edges(extent, bins);
    let width = edges[1] - edges[0];
    let (ny, nx) = slice.dim();
    let cy = (ny / 2) as f64;
    let cx = (nx / 2) as f64;

    let mut sums = vec![0.0_f64; bins];
    let mut counts = vec![0usize; bins];
    for ((i, j), &v) in slice.indexed_iter() {
        let ry = (i as f64 - cy + 0.5) * dx;
        let rx = (j as f64 - cx + 0.5) * dx;
        let r = (rx * rx + ry * ry).sqrt();
        if r >= extent {
            continue;
        }
        // guess by width, then settle against the stored edges
        let mut b = ((r / width) as usize).min(bins - 1);
        while b > 0 && r < edges[b] {
            b -= 1;
        }
        while b + 1 < bins && r >= edges[b + 1] {
            b += 1;
        }
        if r < edges[b + 1] {
            sums[b] += v;
            counts[b] += 1;
        }
    }

    let mut values: Array1<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
        .collect();
    fill_nan_gaps(&mut values);
    let centers = Array1::from_shape_fn(bins, |b| 0.5 * (edges[b] + edges[b + 1]));
    Ok(RadialProfile { centers, values })
}
