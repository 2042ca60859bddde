// ─────────────────────────────────────────────────────────────────────
// BCPot — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{GAS_RADIUS_FALLBACK_FACTOR, HELIUM_FACTOR, MAX_GRID_N};
use crate::error::{BcpError, BcpResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Periodic cubic grid spanning [-half_box, +half_box) on every axis.
///
/// Cell `i` sits at `-half_box + i·dx`, so the centre index `n/2` is the
/// origin and flat index 0 is the far corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid3D {
    pub n: usize,
    pub half_box: f64,
    pub dx: f64,
    pub axis: Array1<f64>,
}

impl Grid3D {
    pub fn new(n: usize, half_box: f64) -> BcpResult<Self> {
        if n < 4 || n % 2 != 0 || n > MAX_GRID_N {
            return Err(BcpError::ConfigError(format!(
                "grid n must be even and within [4, {MAX_GRID_N}], got {n}"
            )));
        }
        if !half_box.is_finite() || half_box <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "grid half_box must be finite and > 0, got {half_box}"
            )));
        }
        let dx = 2.0 * half_box / n as f64;
        let axis = Array1::from_shape_fn(n, |i| -half_box + i as f64 * dx);
        Ok(Grid3D {
            n,
            half_box,
            dx,
            axis,
        })
    }

    /// Index of the cell whose coordinate is exactly zero.
    pub fn center_index(&self) -> usize {
        self.n / 2
    }

    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dx * self.dx
    }

    pub fn cell_count(&self) -> usize {
        self.n * self.n * self.n
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.n, self.n, self.n)
    }

    /// Distance of cell (i, j, k) from the origin.
    pub fn radius(&self, i: usize, j: usize, k: usize) -> f64 {
        let (x, y, z) = (self.axis[i], self.axis[j], self.axis[k]);
        (x * x + y * y + z * z).sqrt()
    }

    /// In-plane distance of cell (i, j) from the z axis.
    pub fn cylindrical_radius(&self, i: usize, j: usize) -> f64 {
        let (x, y) = (self.axis[i], self.axis[j]);
        (x * x + y * y).sqrt()
    }
}

/// Closed set of analytic kernel shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelShape {
    /// `1 / sqrt(r² + L²)`
    Plummer,
    /// `exp(-r/L) / r`
    ExpCore,
    /// `½ ln(1 + (r/L)²)` with a 1% L core softening.
    AnantaHybrid,
}

impl KernelShape {
    pub const ALL: [KernelShape; 3] = [
        KernelShape::Plummer,
        KernelShape::ExpCore,
        KernelShape::AnantaHybrid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KernelShape::Plummer => "plummer",
            KernelShape::ExpCore => "exp-core",
            KernelShape::AnantaHybrid => "ananta-hybrid",
        }
    }
}

impl fmt::Display for KernelShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelShape {
    type Err = BcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plummer" => Ok(KernelShape::Plummer),
            "exp-core" => Ok(KernelShape::ExpCore),
            "ananta-hybrid" => Ok(KernelShape::AnantaHybrid),
            other => Err(BcpError::UnknownKernel(other.to_string())),
        }
    }
}

/// One exponential-disk mass component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskComponent {
    /// Msun
    pub mass: f64,
    /// kpc
    pub scale_radius: f64,
    /// kpc
    pub scale_height: f64,
}

impl DiskComponent {
    pub fn new(mass: f64, scale_radius: f64, scale_height: f64) -> Self {
        DiskComponent {
            mass,
            scale_radius,
            scale_height,
        }
    }

    pub fn absent() -> Self {
        DiskComponent::new(0.0, 0.0, 0.0)
    }

    /// Non-positive mass or scale radius means the component does not exist.
    pub fn is_present(&self) -> bool {
        self.mass > 0.0 && self.scale_radius > 0.0
    }
}

/// Structural parameters of one galaxy (stellar + gas disks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyParams {
    pub name: String,
    pub stellar: DiskComponent,
    pub gas: DiskComponent,
}

impl GalaxyParams {
    pub fn new(name: impl Into<String>, stellar: DiskComponent, gas: DiskComponent) -> Self {
        GalaxyParams {
            name: name.into(),
            stellar,
            gas,
        }
    }

    /// Build from raw catalogue values: HI gas mass gets the helium
    /// correction and a missing gas scale radius falls back to 1.8·Rd_star.
    pub fn from_catalog(
        name: impl Into<String>,
        rd_star: f64,
        mstar: f64,
        hz_star: f64,
        rd_gas: f64,
        mgas_hi: f64,
        hz_gas: f64,
    ) -> Self {
        let rd_gas = if rd_gas > 0.0 {
            rd_gas
        } else if rd_star > 0.0 {
            GAS_RADIUS_FALLBACK_FACTOR * rd_star
        } else {
            GAS_RADIUS_FALLBACK_FACTOR
        };
        GalaxyParams {
            name: name.into(),
            stellar: DiskComponent::new(mstar, rd_star, hz_star),
            gas: DiskComponent::new(mgas_hi * HELIUM_FACTOR, rd_gas, hz_gas),
        }
    }
}

/// Observed rotation curve, sorted by radius.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCurve {
    pub radii: Array1<f64>,
    pub velocities: Array1<f64>,
}

impl ObservedCurve {
    /// Sorts the pairs by radius; radii must be finite, non-negative and
    /// distinct. Velocities may carry NaN for missing points.
    pub fn new(radii: Vec<f64>, velocities: Vec<f64>) -> BcpResult<Self> {
        if radii.len() != velocities.len() {
            return Err(BcpError::ShapeMismatch(format!(
                "observed curve has {} radii but {} velocities",
                radii.len(),
                velocities.len()
            )));
        }
        if radii.is_empty() {
            return Err(BcpError::ConfigError(
                "observed curve must contain at least one point".to_string(),
            ));
        }
        if radii.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(BcpError::ConfigError(
                "observed radii must be finite and >= 0".to_string(),
            ));
        }

        let mut pairs: Vec<(f64, f64)> = radii.into_iter().zip(velocities).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(w) = pairs.windows(2).find(|w| w[1].0 <= w[0].0) {
            return Err(BcpError::ConfigError(format!(
                "observed radii must be distinct, found {} twice",
                w[0].0
            )));
        }

        Ok(ObservedCurve {
            radii: pairs.iter().map(|p| p.0).collect(),
            velocities: pairs.iter().map(|p| p.1).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.radii.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    pub fn r_max(&self) -> f64 {
        self.radii[self.radii.len() - 1]
    }
}

/// Annulus-averaged quantity on strictly increasing bin centres.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    pub centers: Array1<f64>,
    pub values: Array1<f64>,
}

/// Rotation curve decomposed into its contributions (km/s).
#[derive(Debug, Clone, PartialEq)]
pub struct RotationCurve {
    pub radii: Array1<f64>,
    pub v_total: Array1<f64>,
    pub v_baryon: Array1<f64>,
    pub v_kernel: Array1<f64>,
    pub v_star: Array1<f64>,
    pub v_gas: Array1<f64>,
}

impl RotationCurve {
    /// Largest |v_total² − (v_star² + v_gas² + v_kernel²)|.
    pub fn quadrature_residual(&self) -> f64 {
        let mut worst = 0.0_f64;
        for i in 0..self.radii.len() {
            let parts = self.v_star[i].powi(2) + self.v_gas[i].powi(2) + self.v_kernel[i].powi(2);
            worst = worst.max((self.v_total[i].powi(2) - parts).abs());
        }
        worst
    }
}
