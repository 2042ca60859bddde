// ─────────────────────────────────────────────────────────────────────
// BCPot — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{
    G_KPC_KMS2_MSUN, MAX_GRID_N, MIN_CALIBRATION_POINTS, RADIAL_BINS,
};
use crate::error::{BcpError, BcpResult};
use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration. Every field has a default, so a JSON
/// file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Newton's constant in the caller's unit system.
    pub gravitational_constant: f64,
    pub grid: GridConfig,
    pub kernel: KernelConfig,
    pub assembly: AssemblyConfig,
    pub adaptive: AdaptiveConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            gravitational_constant: G_KPC_KMS2_MSUN,
            grid: GridConfig::default(),
            kernel: KernelConfig::default(),
            assembly: AssemblyConfig::default(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// Box and resolution rule: half-box = max(r_obs_factor·R_obs_max,
/// length_factor·L, min_half_box), n ≈ 2·half_box / target_dx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub r_obs_factor: f64,
    pub length_factor: f64,
    pub min_half_box: f64,
    pub target_dx: f64,
    pub n_min: usize,
    pub n_max: usize,
    /// Forces a cell spacing on a fixed box, for reproducible debug runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugGrid>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            r_obs_factor: 1.5,
            length_factor: 4.0,
            min_half_box: 20.0,
            target_dx: 0.5,
            n_min: 64,
            n_max: 320,
            debug: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugGrid {
    pub dx: f64,
    #[serde(default = "default_debug_half_box")]
    pub half_box: f64,
    #[serde(default = "default_debug_n_max")]
    pub n_max: usize,
}

fn default_debug_half_box() -> f64 {
    80.0
}
fn default_debug_n_max() -> usize {
    512
}

impl DebugGrid {
    pub fn with_dx(dx: f64) -> Self {
        DebugGrid {
            dx,
            half_box: default_debug_half_box(),
            n_max: default_debug_n_max(),
        }
    }
}

/// Taper, renormalisation and acceptance thresholds for kernel grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Cut radius is min(cut_length_factor·L, cut_box_fraction·half_box).
    pub cut_length_factor: f64,
    pub cut_box_fraction: f64,
    /// Raised-cosine roll-off starts at this fraction of the cut radius.
    pub taper_inner_fraction: f64,
    pub min_nonzero_fraction: f64,
    pub integral_floor: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            cut_length_factor: 3.0,
            cut_box_fraction: 0.45,
            taper_inner_fraction: 0.85,
            min_nonzero_fraction: 0.02,
            integral_floor: 1e-30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub radial_bins: usize,
    /// Profiles extend to radial_extent_factor·R_obs_max.
    pub radial_extent_factor: f64,
    /// Global sign applied to the kernel potential before differentiation.
    pub polarity_sign: f64,
    /// Off-centre distance (kpc) of the polarity sign probe.
    pub polarity_probe_radius: f64,
    /// Relative size |dot| must exceed (vs |g_b|·|g_K|) before a flip.
    pub polarity_threshold: f64,
    /// Kernel velocities at or below this are excluded from calibration.
    pub kernel_velocity_floor: f64,
    pub calibration_min_points: usize,
    pub calibration_epsilon: f64,
    pub quadrature_tolerance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        AssemblyConfig {
            radial_bins: RADIAL_BINS,
            radial_extent_factor: 1.1,
            polarity_sign: 1.0,
            polarity_probe_radius: 10.0,
            polarity_threshold: 1e-6,
            kernel_velocity_floor: 1e-6,
            calibration_min_points: MIN_CALIBRATION_POINTS,
            calibration_epsilon: 1e-8,
            quadrature_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Basis lengths as multiples of L0.
    pub multipliers: Vec<f64>,
    /// Outer region is r / r_max >= outer_fraction.
    pub outer_fraction: f64,
    /// Maximum allowed |ΔV| in the outer region (km/s).
    pub outer_tolerance: f64,
    /// Absolute tolerance for radial-grid equality.
    pub radius_tolerance: f64,
    /// Refuse to resample mismatched basis grids.
    pub strict_radii: bool,
    /// Run basis lengths concurrently (memory scales with the thread count).
    pub parallel_basis: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            multipliers: vec![1.00, 0.85, 0.70, 0.55],
            outer_fraction: 0.70,
            outer_tolerance: 2.0,
            radius_tolerance: 1e-10,
            strict_radii: true,
            parallel_basis: false,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &str) -> BcpResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> BcpResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validated()
    }

    pub fn validated(self) -> BcpResult<Self> {
        if !self.gravitational_constant.is_finite() || self.gravitational_constant <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "gravitational_constant must be finite and > 0, got {}",
                self.gravitational_constant
            )));
        }

        let g = &self.grid;
        for (name, v) in [
            ("grid.r_obs_factor", g.r_obs_factor),
            ("grid.length_factor", g.length_factor),
            ("grid.min_half_box", g.min_half_box),
            ("grid.target_dx", g.target_dx),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(BcpError::ConfigError(format!(
                    "{name} must be finite and > 0, got {v}"
                )));
            }
        }
        check_n_bounds("grid", g.n_min, g.n_max)?;
        if let Some(debug) = &g.debug {
            if !debug.dx.is_finite() || debug.dx <= 0.0 {
                return Err(BcpError::ConfigError(format!(
                    "grid.debug.dx must be finite and > 0, got {}",
                    debug.dx
                )));
            }
            if !debug.half_box.is_finite() || debug.half_box <= 0.0 {
                return Err(BcpError::ConfigError(format!(
                    "grid.debug.half_box must be finite and > 0, got {}",
                    debug.half_box
                )));
            }
            check_n_bounds("grid.debug", g.n_min, debug.n_max)?;
        }

        let k = &self.kernel;
        if !(k.taper_inner_fraction > 0.0 && k.taper_inner_fraction < 1.0) {
            return Err(BcpError::ConfigError(format!(
                "kernel.taper_inner_fraction must be in (0, 1), got {}",
                k.taper_inner_fraction
            )));
        }
        if !(k.cut_length_factor > 0.0) || !(k.cut_box_fraction > 0.0) {
            return Err(BcpError::ConfigError(
                "kernel cut factors must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&k.min_nonzero_fraction) {
            return Err(BcpError::ConfigError(format!(
                "kernel.min_nonzero_fraction must be in [0, 1), got {}",
                k.min_nonzero_fraction
            )));
        }

        let a = &self.assembly;
        if a.radial_bins < 2 {
            return Err(BcpError::ConfigError(format!(
                "assembly.radial_bins must be >= 2, got {}",
                a.radial_bins
            )));
        }
        if !a.radial_extent_factor.is_finite() || a.radial_extent_factor <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "assembly.radial_extent_factor must be finite and > 0, got {}",
                a.radial_extent_factor
            )));
        }
        if a.polarity_sign != 1.0 && a.polarity_sign != -1.0 {
            return Err(BcpError::ConfigError(format!(
                "assembly.polarity_sign must be +1 or -1, got {}",
                a.polarity_sign
            )));
        }
        if a.calibration_min_points == 0 {
            return Err(BcpError::ConfigError(
                "assembly.calibration_min_points must be >= 1".to_string(),
            ));
        }

        let ad = &self.adaptive;
        if ad.multipliers.is_empty()
            || ad.multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0)
        {
            return Err(BcpError::ConfigError(
                "adaptive.multipliers must be non-empty, finite and > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&ad.outer_fraction) {
            return Err(BcpError::ConfigError(format!(
                "adaptive.outer_fraction must be in [0, 1], got {}",
                ad.outer_fraction
            )));
        }
        if !ad.outer_tolerance.is_finite() || ad.outer_tolerance < 0.0 {
            return Err(BcpError::ConfigError(format!(
                "adaptive.outer_tolerance must be finite and >= 0, got {}",
                ad.outer_tolerance
            )));
        }
        if !ad.radius_tolerance.is_finite() || ad.radius_tolerance < 0.0 {
            return Err(BcpError::ConfigError(format!(
                "adaptive.radius_tolerance must be finite and >= 0, got {}",
                ad.radius_tolerance
            )));
        }
        Ok(self)
    }
}

fn check_n_bounds(section: &str, n_min: usize, n_max: usize) -> BcpResult<()> {
    if n_min < 4 || n_min % 2 != 0 || n_max % 2 != 0 || n_min > n_max || n_max > MAX_GRID_N {
        return Err(BcpError::ConfigError(format!(
            "{section} bounds must be even with 4 <= n_min <= n_max <= {MAX_GRID_N}, \
             got n_min={n_min}, n_max={n_max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = PipelineConfig::default().validated().unwrap();
        assert_eq!(cfg.grid.n_min, 64);
        assert_eq!(cfg.grid.n_max, 320);
        assert_eq!(cfg.assembly.radial_bins, 30);
        assert_eq!(cfg.adaptive.multipliers, vec![1.00, 0.85, 0.70, 0.55]);
        assert!((cfg.gravitational_constant - 4.30091e-6).abs() < 1e-18);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "grid": { "debug": { "dx": 1.0 } }, "adaptive": { "strict_radii": false } }"#,
        )
        .unwrap();
        let debug = cfg.grid.debug.as_ref().unwrap();
        assert_eq!(debug.dx, 1.0);
        assert_eq!(debug.half_box, 80.0);
        assert_eq!(debug.n_max, 512);
        assert!(!cfg.adaptive.strict_radii);
        assert_eq!(cfg.grid.target_dx, 0.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.grid.n_min = 63;
        assert!(cfg.validated().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.assembly.polarity_sign = 0.5;
        assert!(cfg.validated().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.adaptive.multipliers.clear();
        assert!(cfg.validated().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.kernel.taper_inner_fraction = 1.0;
        assert!(cfg.validated().is_err());

        assert!(PipelineConfig::from_json_str(r#"{ "gravitational_constant": -1.0 }"#).is_err());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut cfg = PipelineConfig::default();
        cfg.grid.debug = Some(DebugGrid::with_dx(2.5));
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PipelineConfig::from_file("/nonexistent/bcpot.json").unwrap_err();
        assert!(matches!(err, BcpError::Io(_)));
    }
}
