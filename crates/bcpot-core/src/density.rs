// ─────────────────────────────────────────────────────────────────────
// BCPot — Density Field
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Exponential-disk mass densities sampled on a [`Grid3D`].
//!
//! ρ(R, z) = ρ0 · exp(−R/Rd) · sech²(z/hz), ρ0 = M / (4π Rd² hz).

use bcpot_types::constants::{MIN_SCALE_HEIGHT, SECH2_CUTOFF};
use bcpot_types::state::{DiskComponent, GalaxyParams, Grid3D};
use ndarray::Array3;
use std::f64::consts::PI;

/// Per-component densities of one galaxy on one grid, Msun / kpc³.
#[derive(Debug, Clone)]
pub struct DensityField {
    pub stellar: Array3<f64>,
    pub gas: Array3<f64>,
}

impl DensityField {
    pub fn total(&self) -> Array3<f64> {
        &self.stellar + &self.gas
    }

    /// Σρ·dx³ of the total field.
    pub fn total_mass(&self, grid: &Grid3D) -> f64 {
        (self.stellar.sum() + self.gas.sum()) * grid.cell_volume()
    }
}

/// Samples disk components onto a fixed grid.
#[derive(Debug, Clone, Copy)]
pub struct DensityFieldBuilder<'a> {
    grid: &'a Grid3D,
}

impl<'a> DensityFieldBuilder<'a> {
    pub fn new(grid: &'a Grid3D) -> Self {
        DensityFieldBuilder { grid }
    }

    pub fn build(&self, galaxy: &GalaxyParams) -> DensityField {
        DensityField {
            stellar: self.component(&galaxy.stellar),
            gas: self.component(&galaxy.gas),
        }
    }

    /// One disk component; absent components give an all-zero field.
    pub fn component(&self, disk: &DiskComponent) -> Array3<f64> {
        let grid = self.grid;
        if !disk.is_present() {
            return Array3::zeros(grid.dim());
        }
        let rd = disk.scale_radius;
        let hz = disk.scale_height.max(MIN_SCALE_HEIGHT);
        let rho0 = disk.mass / (4.0 * PI * rd * rd * hz);

        let vertical: Vec<f64> = grid.axis.iter().map(|&z| sech2(z / hz)).collect();
        Array3::from_shape_fn(grid.dim(), |(i, j, k)| {
            let v = vertical[k];
            if v == 0.0 {
                return 0.0;
            }
            rho0 * (-grid.cylindrical_radius(i, j) / rd).exp() * v
        })
    }
}

/// sech²(s), zero past the overflow cutoff.
fn sech2(s: f64) -> f64 {
    let s = s.abs();
    if s < SECH2_CUTOFF {
        let c = s.cosh();
        1.0 / (c * c)
    } else {
        0.0
    }
}
