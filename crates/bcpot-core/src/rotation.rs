// ─────────────────────────────────────────────────────────────────────
// BCPot — Rotation Curve Assembly
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Single-length rotation-curve prediction.
//!
//! Pipeline per request:
//! 1. choose the grid and sample the stellar and gas densities
//! 2. Newtonian forces g_b = −∇φ_b from the spectral Poisson solve
//! 3. kernel force g_K = ∇Φ_K, Φ_K = s·μ·G·(ρ ⊛ U)
//! 4. polarity check on the midplane, flip g_K when anti-aligned
//! 5. annulus-average g², v = sqrt(R·g)
//! 6. calibrate the kernel amplitude against the observed curve
//! 7. compose by quadrature
//!
//! A failure inside step 3 degrades to a baryon-only curve; every other
//! failure is fatal.

use crate::density::DensityFieldBuilder;
use crate::grid::{GridChoice, GridSpec};
use crate::kernel::{KernelCache, KernelDiagnostics, KernelField};
use crate::profile::{midplane, radial_profile};
use bcpot_math::interp::{max_abs_diff, resample};
use bcpot_math::spectral::{convolve, planar_gradient, poisson_solve};
use bcpot_types::config::{AssemblyConfig, PipelineConfig};
use bcpot_types::error::{BcpError, BcpResult};
use bcpot_types::state::{GalaxyParams, Grid3D, KernelShape, ObservedCurve, RotationCurve};
use ndarray::{Array1, Array2, Array3, Zip};
use tracing::{debug, info, warn};

/// Kernel selection and coupling for one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelRequest {
    pub shape: KernelShape,
    /// Kernel length L (kpc).
    pub length: f64,
    /// Coupling strength μ.
    pub coupling: f64,
    /// Reserved shape parameter; part of the cache key only.
    pub beta: f64,
}

impl KernelRequest {
    pub fn new(shape: KernelShape, length: f64, coupling: f64) -> Self {
        KernelRequest {
            shape,
            length,
            coupling,
            beta: 1.0,
        }
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    fn validate(&self) -> BcpResult<()> {
        if !self.length.is_finite() || self.length <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "kernel length must be finite and > 0, got {}",
                self.length
            )));
        }
        if !self.coupling.is_finite() {
            return Err(BcpError::ConfigError(format!(
                "coupling must be finite, got {}",
                self.coupling
            )));
        }
        if !self.beta.is_finite() {
            return Err(BcpError::ConfigError(format!(
                "beta must be finite, got {}",
                self.beta
            )));
        }
        Ok(())
    }
}

/// Outcome of the baryon/kernel sign comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarityReport {
    /// Probe point saw opposite x-force signs.
    pub probe_mismatch: bool,
    /// Σ g_b·g_K over the midplane.
    pub dot: f64,
    pub baryon_norm: f64,
    pub kernel_norm: f64,
    /// Kernel slice was negated.
    pub flipped: bool,
}

/// Kernel amplitude fit against observed velocities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Multiplier applied to v_kernel (1 when skipped).
    pub alpha: f64,
    pub applied: bool,
    pub points_used: usize,
    /// Points whose ratio (v_obs² − v_b²)/v_K² was negative and clipped to 0.
    pub clipped_points: usize,
    pub mse_before: Option<f64>,
    pub mse_after: Option<f64>,
}

impl Calibration {
    fn skipped(points_used: usize) -> Self {
        Calibration {
            alpha: 1.0,
            applied: false,
            points_used,
            clipped_points: 0,
            mse_before: None,
            mse_after: None,
        }
    }
}

/// Everything one prediction produces.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub curve: RotationCurve,
    pub grid: GridChoice,
    /// Observed velocities interpolated onto the curve radii (NaN outside).
    pub observed: Array1<f64>,
    pub polarity: PolarityReport,
    pub calibration: Calibration,
    /// Set when the kernel stage failed and the curve is baryon-only.
    pub kernel_failure: Option<String>,
    pub kernel_diagnostics: KernelDiagnostics,
}

/// In-plane force components on the midplane.
#[derive(Debug, Clone)]
struct PlanarForce {
    gx: Array2<f64>,
    gy: Array2<f64>,
}

impl PlanarForce {
    fn zeros(n: usize) -> Self {
        PlanarForce {
            gx: Array2::zeros((n, n)),
            gy: Array2::zeros((n, n)),
        }
    }

    fn magnitude_sq(&self) -> Array2<f64> {
        Zip::from(&self.gx)
            .and(&self.gy)
            .map_collect(|&x, &y| x * x + y * y)
    }

    fn sum_magnitude_sq(&self, other: &PlanarForce) -> Array2<f64> {
        Zip::from(&self.gx)
            .and(&self.gy)
            .and(&other.gx)
            .and(&other.gy)
            .map_collect(|&ax, &ay, &bx, &by| (ax + bx).powi(2) + (ay + by).powi(2))
    }

    fn add(&self, other: &PlanarForce) -> PlanarForce {
        PlanarForce {
            gx: &self.gx + &other.gx,
            gy: &self.gy + &other.gy,
        }
    }

    fn negate(&mut self) {
        self.gx.mapv_inplace(|v| -v);
        self.gy.mapv_inplace(|v| -v);
    }

    fn is_finite(&self) -> bool {
        self.gx.iter().chain(self.gy.iter()).all(|v| v.is_finite())
    }
}

/// Predicts rotation curves for single kernel lengths.
#[derive(Debug, Clone)]
pub struct RotationCurveAssembler {
    config: PipelineConfig,
    grid_spec: GridSpec,
}

impl RotationCurveAssembler {
    pub fn new(config: PipelineConfig) -> BcpResult<Self> {
        let config = config.validated()?;
        let grid_spec = GridSpec::new(config.grid.clone());
        Ok(RotationCurveAssembler { config, grid_spec })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid_spec(&self) -> &GridSpec {
        &self.grid_spec
    }

    /// Full prediction; the kernel comes from (or is added to) `cache`.
    pub fn predict(
        &self,
        cache: &KernelCache,
        galaxy: &GalaxyParams,
        observed: &ObservedCurve,
        request: &KernelRequest,
    ) -> BcpResult<Prediction> {
        request.validate()?;
        let choice = self.grid_spec.choose(observed.r_max(), request.length)?;
        let grid = choice.to_grid()?;
        let kernel = cache.get_or_build(&grid, request.shape, request.length, request.beta)?;
        self.predict_on_grid(&grid, choice, &kernel, galaxy, observed, request)
    }

    /// Prediction with a caller-supplied kernel field.
    pub fn predict_with_kernel(
        &self,
        kernel: &KernelField,
        galaxy: &GalaxyParams,
        observed: &ObservedCurve,
        request: &KernelRequest,
    ) -> BcpResult<Prediction> {
        request.validate()?;
        let choice = self.grid_spec.choose(observed.r_max(), request.length)?;
        let grid = choice.to_grid()?;
        self.predict_on_grid(&grid, choice, kernel, galaxy, observed, request)
    }

    fn predict_on_grid(
        &self,
        grid: &Grid3D,
        choice: GridChoice,
        kernel: &KernelField,
        galaxy: &GalaxyParams,
        observed: &ObservedCurve,
        request: &KernelRequest,
    ) -> BcpResult<Prediction> {
        let r_obs_max = observed.r_max();
        if r_obs_max <= 0.0 {
            return Err(BcpError::ConfigError(
                "observed curve must extend beyond R = 0".to_string(),
            ));
        }
        let asm = &self.config.assembly;
        let g_newton = self.config.gravitational_constant;
        let non_finite = |stage: &str| BcpError::NonFinite {
            stage: stage.to_string(),
            length: request.length,
            n: grid.n,
            dx: grid.dx,
        };

        let density = DensityFieldBuilder::new(grid).build(galaxy);
        debug!(
            galaxy = %galaxy.name,
            mass = density.total_mass(grid),
            dx = grid.dx,
            "density sampled"
        );

        let (star, gas) = rayon::join(
            || self.baryon_force(&density.stellar, galaxy.stellar.is_present(), grid),
            || self.baryon_force(&density.gas, galaxy.gas.is_present(), grid),
        );
        let (star, gas) = (star?, gas?);
        if !star.is_finite() || !gas.is_finite() {
            return Err(non_finite("baryon force"));
        }
        let baryon = star.add(&gas);

        let total_rho = density.total();
        let factor = asm.polarity_sign * request.coupling * g_newton;
        let (mut kern, kernel_failure) = match kernel_force(&total_rho, kernel, grid, factor) {
            Ok(force) if force.is_finite() => (force, None),
            Ok(_) => (PlanarForce::zeros(grid.n), Some(non_finite("kernel force").to_string())),
            Err(e) => (PlanarForce::zeros(grid.n), Some(e.to_string())),
        };
        if let Some(reason) = &kernel_failure {
            warn!(
                galaxy = %galaxy.name,
                length = request.length,
                coupling = request.coupling,
                reason = %reason,
                "kernel computation failed; continuing with baryons only"
            );
        }

        let polarity = check_polarity(&baryon, &mut kern, grid, asm);

        let extent = asm.radial_extent_factor * r_obs_max;
        let g2_profile = |map: Array2<f64>| radial_profile(map.view(), grid.dx, extent, asm.radial_bins);
        let star_p = g2_profile(star.magnitude_sq())?;
        let centers = star_p.centers.clone();
        let v_star = velocity_from_g2(&centers, &star_p.values);
        let v_gas = velocity_from_g2(&centers, &g2_profile(gas.magnitude_sq())?.values);
        let v_bary_field = velocity_from_g2(&centers, &g2_profile(baryon.magnitude_sq())?.values);
        let v_kernel_raw = velocity_from_g2(&centers, &g2_profile(kern.magnitude_sq())?.values);
        let v_total_field =
            velocity_from_g2(&centers, &g2_profile(baryon.sum_magnitude_sq(&kern))?.values);

        let v_baryon = quadrature(&[&v_star, &v_gas]);
        let v_total = quadrature(&[&v_baryon, &v_kernel_raw]);
        let combined = quadrature(&[&v_bary_field, &v_kernel_raw]);
        if let Some(diff) = max_abs_diff(
            &v_total.to_vec(),
            &combined.to_vec(),
        ) {
            if diff > asm.quadrature_tolerance {
                info!(max_diff = diff, "quadrature composition overrides combined-field velocity");
            }
        }
        debug!(
            v_total_field_max = v_total_field.fold(0.0_f64, |m, &v| m.max(v)),
            "direct total-field velocity"
        );

        let observed_on_centers = resample(
            &centers.to_vec(),
            &observed.radii.to_vec(),
            &observed.velocities.to_vec(),
            f64::NAN,
            f64::NAN,
        );
        let calibration = calibrate_amplitude(
            &observed_on_centers,
            &v_baryon,
            &v_kernel_raw,
            &v_total,
            asm,
        );
        let v_kernel = v_kernel_raw.mapv(|v| v * calibration.alpha);
        let v_total = quadrature(&[&v_star, &v_gas, &v_kernel]);

        let curve = RotationCurve {
            radii: centers,
            v_total,
            v_baryon,
            v_kernel,
            v_star,
            v_gas,
        };
        let finite = [&curve.v_total, &curve.v_baryon, &curve.v_kernel]
            .iter()
            .all(|a| a.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(non_finite("rotation curve"));
        }

        Ok(Prediction {
            curve,
            grid: choice,
            observed: observed_on_centers,
            polarity,
            calibration,
            kernel_failure,
            kernel_diagnostics: kernel.diagnostics,
        })
    }

    fn baryon_force(
        &self,
        rho: &Array3<f64>,
        present: bool,
        grid: &Grid3D,
    ) -> BcpResult<PlanarForce> {
        if !present {
            return Ok(PlanarForce::zeros(grid.n));
        }
        let phi = poisson_solve(rho, grid.dx, self.config.gravitational_constant)?;
        let (dphi_dx, dphi_dy) = planar_gradient(&phi, grid.dx)?;
        Ok(PlanarForce {
            gx: midplane(&dphi_dx).mapv(|v| -v),
            gy: midplane(&dphi_dy).mapv(|v| -v),
        })
    }
}

fn kernel_force(
    rho: &Array3<f64>,
    kernel: &KernelField,
    grid: &Grid3D,
    factor: f64,
) -> BcpResult<PlanarForce> {
    let mut phi_k = convolve(rho, &kernel.values)?;
    phi_k.mapv_inplace(|v| v * factor);
    let (gx, gy) = planar_gradient(&phi_k, grid.dx)?;
    Ok(PlanarForce {
        gx: midplane(&gx).to_owned(),
        gy: midplane(&gy).to_owned(),
    })
}

/// Compare baryon and kernel forces; negate `kern` when anti-aligned.
fn check_polarity(
    baryon: &PlanarForce,
    kern: &mut PlanarForce,
    grid: &Grid3D,
    asm: &AssemblyConfig,
) -> PolarityReport {
    let c = grid.center_index();
    let offset = (asm.polarity_probe_radius / grid.dx.max(1e-6)).round() as usize;
    let ix = c + offset;
    let mut probe_mismatch = false;
    if ix < grid.n {
        let b = baryon.gx[[ix, c]];
        let k = kern.gx[[ix, c]];
        if (b > 0.0 && k < 0.0) || (b < 0.0 && k > 0.0) {
            probe_mismatch = true;
            warn!(baryon = b, kernel = k, "polarity mismatch at probe point");
        }
    }

    let mut dot = 0.0;
    let mut bn = 0.0;
    let mut kn = 0.0;
    Zip::from(&baryon.gx)
        .and(&baryon.gy)
        .and(&kern.gx)
        .and(&kern.gy)
        .for_each(|&bx, &by, &kx, &ky| {
            dot += bx * kx + by * ky;
            bn += bx * bx + by * by;
            kn += kx * kx + ky * ky;
        });
    let baryon_norm = bn.sqrt();
    let kernel_norm = kn.sqrt();
    debug!(dot, baryon_norm, kernel_norm, "polarity dot test");

    let flipped = dot < 0.0
        && kernel_norm > 0.0
        && dot.abs() > asm.polarity_threshold * baryon_norm * kernel_norm;
    if flipped {
        debug!("anti-aligned kernel force, flipping sign");
        kern.negate();
    }
    PolarityReport {
        probe_mismatch,
        dot,
        baryon_norm,
        kernel_norm,
        flipped,
    }
}

/// v = sqrt(max(R·g, 0)) with g = sqrt(max(g², 0)).
pub fn velocity_from_g2(radii: &Array1<f64>, g2: &Array1<f64>) -> Array1<f64> {
    Zip::from(radii)
        .and(g2)
        .map_collect(|&r, &g2| (r * g2.max(0.0).sqrt()).max(0.0).sqrt())
}

/// Elementwise sqrt(Σ vᵢ²).
pub fn quadrature(parts: &[&Array1<f64>]) -> Array1<f64> {
    let n = parts.first().map_or(0, |p| p.len());
    Array1::from_shape_fn(n, |i| {
        parts.iter().map(|p| p[i] * p[i]).sum::<f64>().max(0.0).sqrt()
    })
}

/// Fit the kernel amplitude α from points with a valid observed velocity
/// and a non-negligible kernel velocity:
/// α² = mean(clip((v_obs² − v_b²) / (v_K² + ε), 0, ∞)).
pub fn calibrate_amplitude(
    v_obs: &Array1<f64>,
    v_baryon: &Array1<f64>,
    v_kernel: &Array1<f64>,
    v_total: &Array1<f64>,
    asm: &AssemblyConfig,
) -> Calibration {
    let idx: Vec<usize> = (0..v_obs.len())
        .filter(|&i| v_obs[i].is_finite() && v_obs[i] > 0.0 && v_kernel[i] > asm.kernel_velocity_floor)
        .collect();
    if idx.len() < asm.calibration_min_points {
        warn!(
            points = idx.len(),
            required = asm.calibration_min_points,
            "amplitude calibration skipped"
        );
        return Calibration::skipped(idx.len());
    }

    let mut clipped = 0usize;
    let mut acc = 0.0;
    for &i in &idx {
        let ratio = (v_obs[i].powi(2) - v_baryon[i].powi(2)) / (v_kernel[i].powi(2) + asm.calibration_epsilon);
        if ratio < 0.0 {
            clipped += 1;
        } else {
            acc += ratio;
        }
    }
    let alpha = (acc / idx.len() as f64).sqrt();
    if clipped > 0 {
        warn!(
            clipped,
            points = idx.len(),
            "observed velocity below baryons at some radii; ratios clipped to zero"
        );
    }

    let mse = |curve: &dyn Fn(usize) -> f64| {
        idx.iter().map(|&i| (v_obs[i] - curve(i)).powi(2)).sum::<f64>() / idx.len() as f64
    };
    let mse_before = mse(&|i| v_total[i]);
    let mse_after = mse(&|i| (v_baryon[i].powi(2) + (alpha * v_kernel[i]).powi(2)).sqrt());
    debug!(alpha, mse_before, mse_after, "kernel amplitude calibrated");

    Calibration {
        alpha,
        applied: true,
        points_used: idx.len(),
        clipped_points: clipped,
        mse_before: Some(mse_before),
        mse_after: Some(mse_after),
    }
}
