// ─────────────────────────────────────────────────────────────────────
// BCPot — Kernel Grid
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Discrete convolution kernel U and its memoizing cache.
//!
//! Build order, each step a hard invariant:
//! 1. evaluate the analytic shape on the grid radius
//! 2. raised-cosine taper between 0.85·R_cut and R_cut, zero beyond
//! 3. rescale so Σ U·dx³ = 1/L
//! 4. DC guard: subtract the mean, zero flat index 0
//!
//! Steps 1-3 run in f64; the stored field is f32.

use bcpot_types::config::KernelConfig;
use bcpot_types::constants::{KERNEL_RADIUS_FLOOR, MIN_KERNEL_LENGTH};
use bcpot_types::error::{BcpError, BcpResult};
use bcpot_types::state::{Grid3D, KernelShape};
use ndarray::Array3;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Core softening of the ananta-hybrid shape, as a fraction of L.
const HYBRID_CORE_FRACTION: f64 = 0.01;

/// Shape-only kernel value at radius `r` (no amplitude normalisation).
pub fn shape_value(shape: KernelShape, r: f64, length: f64) -> f64 {
    match shape {
        KernelShape::Plummer => {
            let r = r.max(KERNEL_RADIUS_FLOOR);
            1.0 / (r * r + length * length).sqrt()
        }
        KernelShape::ExpCore => (-r / length).exp() / (r + KERNEL_RADIUS_FLOOR),
        KernelShape::AnantaHybrid => {
            let eps = HYBRID_CORE_FRACTION * length;
            let rs = (r * r + eps * eps).sqrt();
            0.5 * (1.0 + (rs / length).powi(2)).ln()
        }
    }
}

/// Spherical taper weight: 1 inside `inner_fraction·r_cut`, raised cosine
/// down to 0 at `r_cut`, 0 beyond.
pub fn taper_weight(r: f64, r_cut: f64, inner_fraction: f64) -> f64 {
    let r0 = inner_fraction * r_cut;
    if r <= r0 {
        1.0
    } else if r <= r_cut {
        let frac = (r - r0) / (r_cut - r0);
        0.5 * (1.0 + (PI * frac).cos())
    } else {
        0.0
    }
}

/// Cutoff radius min(k·L, f·half_box).
pub fn cut_radius(length: f64, half_box: f64, cfg: &KernelConfig) -> f64 {
    (cfg.cut_length_factor * length).min(cfg.cut_box_fraction * half_box)
}

/// Numbers recorded while building one kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelDiagnostics {
    pub r_cut: f64,
    /// Fraction of cells with nonzero taper weight.
    pub nonzero_fraction: f64,
    /// Σ U·dx³ after tapering, before rescaling.
    pub raw_integral: f64,
    pub scale: f64,
    /// Σ U·dx³ after rescaling; equals 1/L up to rounding.
    pub normalized_integral: f64,
    /// Mean removed by the DC guard.
    pub dc_offset: f64,
}

/// Immutable kernel field for one (shape, L, grid, beta) combination.
#[derive(Debug, Clone)]
pub struct KernelField {
    pub values: Array3<f32>,
    pub shape: KernelShape,
    pub length: f64,
    pub beta: f64,
    pub n: usize,
    pub half_box: f64,
    pub diagnostics: KernelDiagnostics,
}

/// Build the kernel grid. `beta` is carried through for keying only.
pub fn build_kernel(
    grid: &Grid3D,
    shape: KernelShape,
    length: f64,
    beta: f64,
    cfg: &KernelConfig,
) -> BcpResult<KernelField> {
    if !length.is_finite() || length <= 0.0 {
        return Err(BcpError::ConfigError(format!(
            "kernel length must be finite and > 0, got {length}"
        )));
    }
    let n = grid.n;
    let dx = grid.dx;
    let r_cut = cut_radius(length, grid.half_box, cfg);

    let mut u = Array3::<f64>::zeros(grid.dim());
    let mut raw_min = f64::INFINITY;
    let mut raw_max = f64::NEG_INFINITY;
    let mut nonzero = 0usize;
    for ((i, j, k), v) in u.indexed_iter_mut() {
        let r = grid.radius(i, j, k);
        let raw = shape_value(shape, r, length);
        raw_min = raw_min.min(raw);
        raw_max = raw_max.max(raw);
        let w = taper_weight(r, r_cut, cfg.taper_inner_fraction);
        if w != 0.0 {
            nonzero += 1;
        }
        *v = raw * w;
    }
    debug!(kernel = %shape, length, raw_min, raw_max, "analytic kernel sampled");

    let nonzero_fraction = nonzero as f64 / grid.cell_count() as f64;
    info!(kernel = %shape, length, r_cut, nonzero_fraction, "kernel taper applied");
    if nonzero_fraction < cfg.min_nonzero_fraction {
        return Err(BcpError::TaperFailure {
            length,
            n,
            dx,
            nonzero_fraction,
            min_fraction: cfg.min_nonzero_fraction,
        });
    }

    let cell_volume = grid.cell_volume();
    let raw_integral = u.sum() * cell_volume;
    if !raw_integral.is_finite() || raw_integral.abs() < cfg.integral_floor {
        return Err(BcpError::DegenerateKernel {
            length,
            n,
            dx,
            integral: raw_integral,
        });
    }
    let scale = (1.0 / length.max(MIN_KERNEL_LENGTH)) / raw_integral;
    u.mapv_inplace(|v| v * scale);
    let normalized_integral = u.sum() * cell_volume;
    info!(
        kernel = %shape,
        length,
        raw_integral,
        normalized_integral,
        scale,
        "kernel renormalized"
    );

    let dc_offset = u.sum() / grid.cell_count() as f64;
    let mut values = u.mapv(|v| (v - dc_offset) as f32);
    if let Some(first) = values.iter_mut().next() {
        *first = 0.0;
    }

    Ok(KernelField {
        values,
        shape,
        length,
        beta,
        n,
        half_box: grid.half_box,
        diagnostics: KernelDiagnostics {
            r_cut,
            nonzero_fraction,
            raw_integral,
            scale,
            normalized_integral,
            dc_offset,
        },
    })
}

/// Cache key: (shape, L, n, half_box to 0.01, beta). Floats are keyed by
/// bit pattern so equal inputs always collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    shape: KernelShape,
    length_bits: u64,
    n: usize,
    half_box_centi: i64,
    beta_bits: u64,
}

impl KernelKey {
    pub fn new(shape: KernelShape, length: f64, n: usize, half_box: f64, beta: f64) -> Self {
        KernelKey {
            shape,
            length_bits: length.to_bits(),
            n,
            half_box_centi: (half_box * 100.0).round() as i64,
            beta_bits: beta.to_bits(),
        }
    }
}

type Slot = Arc<Mutex<Option<Arc<KernelField>>>>;

/// Get-or-build kernel cache owned by the calling pipeline.
///
/// The map lock is held only to find a key's slot; the slot lock is held
/// across build-and-store, so each key is built at most once while other
/// keys build concurrently. Failed builds leave the slot empty.
#[derive(Debug)]
pub struct KernelCache {
    config: KernelConfig,
    slots: Mutex<HashMap<KernelKey, Slot>>,
    builds: AtomicU64,
}

impl KernelCache {
    pub fn new(config: KernelConfig) -> Self {
        KernelCache {
            config,
            slots: Mutex::new(HashMap::new()),
            builds: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn get_or_build(
        &self,
        grid: &Grid3D,
        shape: KernelShape,
        length: f64,
        beta: f64,
    ) -> BcpResult<Arc<KernelField>> {
        let key = KernelKey::new(shape, length, grid.n, grid.half_box, beta);
        let slot = {
            let mut slots = self.slots.lock().map_err(|_| BcpError::CachePoisoned)?;
            Arc::clone(slots.entry(key).or_default())
        };

        let mut entry = slot.lock().map_err(|_| BcpError::CachePoisoned)?;
        if let Some(field) = entry.as_ref() {
            debug!(kernel = %shape, length, n = grid.n, "kernel cache hit");
            return Ok(Arc::clone(field));
        }
        let field = Arc::new(build_kernel(grid, shape, length, beta, &self.config)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        *entry = Some(Arc::clone(&field));
        Ok(field)
    }

    /// Number of kernels actually constructed (cache misses that succeeded).
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots
                .values()
                .filter(|s| s.lock().map(|e| e.is_some()).unwrap_or(false))
                .count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

impl Default for KernelCache {
    fn default() -> Self {
        KernelCache::new(KernelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> Grid3D {
        Grid3D::new(32, 20.0).unwrap()
    }

    #[test]
    fn test_taper_weight_profile() {
        let r_cut = 9.0;
        assert_eq!(taper_weight(0.0, r_cut, 0.85), 1.0);
        assert_eq!(taper_weight(0.85 * r_cut, r_cut, 0.85), 1.0);
        let mid = taper_weight(0.925 * r_cut, r_cut, 0.85);
        assert!((mid - 0.5).abs() < 1e-12, "mid-roll-off weight {mid}");
        assert!(taper_weight(r_cut, r_cut, 0.85).abs() < 1e-15);
        assert_eq!(taper_weight(r_cut + 1e-9, r_cut, 0.85), 0.0);
    }

    #[test]
    fn test_shapes_finite_at_origin() {
        for shape in KernelShape::ALL {
            let v = shape_value(shape, 0.0, 5.0);
            assert!(v.is_finite(), "{shape} at r=0 gave {v}");
        }
        assert!((shape_value(KernelShape::Plummer, 0.0, 5.0) - 0.2).abs() < 1e-12);
        assert!(shape_value(KernelShape::AnantaHybrid, 0.0, 5.0) > 0.0);
    }

    #[test]
    fn test_kernel_invariants() {
        let grid = small_grid();
        let cfg = KernelConfig::default();
        for shape in KernelShape::ALL {
            let k = build_kernel(&grid, shape, 5.0, 1.0, &cfg).unwrap();
            let d = k.diagnostics;
            assert_eq!(d.r_cut, 9.0);
            assert!(d.nonzero_fraction > 0.02);

            let rel = (d.normalized_integral - 0.2).abs() / 0.2;
            assert!(rel < 1e-6, "{shape}: integral {} vs 0.2", d.normalized_integral);

            assert_eq!(k.values[[0, 0, 0]], 0.0);
            let sum: f64 = k.values.iter().map(|&v| v as f64).sum();
            let max_abs = k.values.iter().fold(0.0f64, |m, &v| m.max(v.abs() as f64));
            let mean = sum / grid.cell_count() as f64;
            assert!(mean.abs() < 1e-6 * max_abs, "{shape}: mean {mean}");

            // beyond the cut every cell carries the same DC shift
            let outside = -(d.dc_offset as f32);
            for ((i, j, l), &v) in k.values.indexed_iter() {
                if (i, j, l) != (0, 0, 0) && grid.radius(i, j, l) > d.r_cut {
                    assert_eq!(v, outside, "{shape}: cell ({i},{j},{l})");
                }
            }
        }
    }

    #[test]
    fn test_taper_failure() {
        let grid = small_grid();
        let err = build_kernel(&grid, KernelShape::Plummer, 1.0, 1.0, &KernelConfig::default())
            .unwrap_err();
        match err {
            BcpError::TaperFailure {
                length,
                n,
                nonzero_fraction,
                ..
            } => {
                assert_eq!(length, 1.0);
                assert_eq!(n, 32);
                assert!(nonzero_fraction < 0.02);
            }
            other => panic!("expected TaperFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_integral() {
        let grid = small_grid();
        let cfg = KernelConfig {
            integral_floor: 1e30,
            ..KernelConfig::default()
        };
        let err = build_kernel(&grid, KernelShape::Plummer, 5.0, 1.0, &cfg).unwrap_err();
        assert!(matches!(err, BcpError::DegenerateKernel { .. }));
        assert!(err.is_numerical_degeneracy());
    }

    #[test]
    fn test_invalid_length_rejected() {
        let grid = small_grid();
        let cfg = KernelConfig::default();
        assert!(matches!(
            build_kernel(&grid, KernelShape::Plummer, 0.0, 1.0, &cfg),
            Err(BcpError::ConfigError(_))
        ));
        assert!(build_kernel(&grid, KernelShape::Plummer, f64::NAN, 1.0, &cfg).is_err());
    }

    #[test]
    fn test_cache_returns_identical_field() {
        let grid = small_grid();
        let cache = KernelCache::default();
        let a = cache.get_or_build(&grid, KernelShape::Plummer, 5.0, 1.0).unwrap();
        let b = cache.get_or_build(&grid, KernelShape::Plummer, 5.0, 1.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.build_count(), 1);

        let c = cache.get_or_build(&grid, KernelShape::Plummer, 6.0, 1.0).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.build_count(), 2);
        assert!(
            (a.diagnostics.normalized_integral - c.diagnostics.normalized_integral).abs() > 1e-3
        );
        assert_ne!(a.values, c.values);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_key_rounds_half_box() {
        let cache = KernelCache::default();
        let g1 = Grid3D::new(32, 20.0).unwrap();
        let g2 = Grid3D::new(32, 20.001).unwrap();
        let a = cache.get_or_build(&g1, KernelShape::ExpCore, 5.0, 1.0).unwrap();
        let b = cache.get_or_build(&g2, KernelShape::ExpCore, 5.0, 1.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let d = cache.get_or_build(&g1, KernelShape::ExpCore, 5.0, 2.0).unwrap();
        assert!(!Arc::ptr_eq(&a, &d), "beta is part of the key");
        assert_eq!(cache.build_count(), 2);
    }

    #[test]
    fn test_cache_failed_build_not_stored() {
        let cache = KernelCache::default();
        let grid = small_grid();
        assert!(cache.get_or_build(&grid, KernelShape::Plummer, 1.0, 1.0).is_err());
        assert_eq!(cache.build_count(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_builds_once_under_contention() {
        let cache = KernelCache::default();
        let grid = small_grid();
        let fields: Vec<Arc<KernelField>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| cache.get_or_build(&grid, KernelShape::Plummer, 5.0, 1.0)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        assert_eq!(cache.build_count(), 1);
        assert!(fields.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        cache.clear();
        assert!(cache.is_empty());
    }
}
