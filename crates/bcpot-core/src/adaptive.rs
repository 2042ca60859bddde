// ─────────────────────────────────────────────────────────────────────
// BCPot — Adaptive Length Interpolation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Radius-dependent kernel length from a precomputed basis.
//!
//! A [`BasisSet`] holds fixed-length curves on one canonical radial grid.
//! At each radius the effective length is clipped into the basis range and
//! the basis velocities are interpolated across L (never across R). The
//! outer-stability gate then compares the result with the L0 baseline.

use crate::kernel::KernelCache;
use crate::leff::{basis_lengths, leff_linear};
use crate::rotation::{KernelRequest, Prediction, RotationCurveAssembler};
use bcpot_math::interp::{all_close, interp1d_clamped, max_abs_diff, resample};
use bcpot_types::config::AdaptiveConfig;
use bcpot_types::error::{BcpError, BcpResult};
use bcpot_types::state::{GalaxyParams, ObservedCurve, RotationCurve};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use tracing::{info, warn};

/// Fixed-length total-velocity curves sharing one radial grid.
#[derive(Debug, Clone)]
pub struct BasisSet {
    lengths: Vec<f64>,
    radii: Array1<f64>,
    /// Row i holds v_total at `lengths[i]`.
    v_total: Array2<f64>,
    reference_length: f64,
    baseline: Array1<f64>,
    resampled: bool,
}

impl BasisSet {
    /// Assemble a basis on the grid of `reference` (the L0 curve).
    ///
    /// Every entry's radii must match the reference within
    /// `cfg.radius_tolerance`. With `cfg.strict_radii` a mismatch is a
    /// [`BcpError::GridMismatch`]; otherwise the entry is resampled onto the
    /// reference grid (edge values held) and the set is flagged
    /// [`BasisSet::is_resampled`].
    pub fn from_curves(
        reference_length: f64,
        reference: &RotationCurve,
        entries: &[(f64, RotationCurve)],
        cfg: &AdaptiveConfig,
    ) -> BcpResult<Self> {
        if entries.is_empty() {
            return Err(BcpError::ConfigError(
                "basis needs at least one entry".to_string(),
            ));
        }
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| entries[a].0.total_cmp(&entries[b].0));
        for w in order.windows(2) {
            if entries[w[0]].0 == entries[w[1]].0 {
                return Err(BcpError::ConfigError(format!(
                    "duplicate basis length {}",
                    entries[w[0]].0
                )));
            }
        }

        let radii = reference.radii.clone();
        let r_ref = radii.to_vec();
        let mut v_total = Array2::zeros((entries.len(), radii.len()));
        let mut lengths = Vec::with_capacity(entries.len());
        let mut resampled = false;

        for (row, &idx) in order.iter().enumerate() {
            let (length, curve) = &entries[idx];
            if !length.is_finite() || *length <= 0.0 {
                return Err(BcpError::ConfigError(format!(
                    "basis length must be finite and > 0, got {length}"
                )));
            }
            let r_now = curve.radii.to_vec();
            let v_now = curve.v_total.to_vec();
            let values = if all_close(&r_now, &r_ref, cfg.radius_tolerance) {
                curve.v_total.clone()
            } else {
                let message = format!(
                    "basis n={} vs canonical n={}, max |ΔR|={}",
                    r_now.len(),
                    r_ref.len(),
                    max_abs_diff(&r_now, &r_ref).unwrap_or(f64::NAN)
                );
                if cfg.strict_radii {
                    return Err(BcpError::GridMismatch {
                        length: *length,
                        message,
                    });
                }
                let (first, last) = match (v_now.first(), v_now.last()) {
                    (Some(&f), Some(&l)) => (f, l),
                    _ => {
                        return Err(BcpError::GridMismatch {
                            length: *length,
                            message: "empty basis curve".to_string(),
                        })
                    }
                };
                warn!(
                    length,
                    %message,
                    "resampling basis curve onto canonical radii; not for reviewer-grade comparison"
                );
                resampled = true;
                resample(&r_ref, &r_now, &v_now, first, last)
            };
            v_total.row_mut(row).assign(&values);
            lengths.push(*length);
        }

        Ok(BasisSet {
            lengths,
            radii,
            v_total,
            reference_length,
            baseline: reference.v_total.clone(),
            resampled,
        })
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn radii(&self) -> &Array1<f64> {
        &self.radii
    }

    pub fn reference_length(&self) -> f64 {
        self.reference_length
    }

    /// The L0 curve the outer gate compares against.
    pub fn baseline(&self) -> &Array1<f64> {
        &self.baseline
    }

    /// v_total of basis entry `i` (ascending length order).
    pub fn curve(&self, i: usize) -> ArrayView1<'_, f64> {
        self.v_total.row(i)
    }

    pub fn is_resampled(&self) -> bool {
        self.resampled
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    fn length_range(&self) -> (f64, f64) {
        let first = self.lengths.first().copied().unwrap_or(f64::NAN);
        let last = self.lengths.last().copied().unwrap_or(f64::NAN);
        (first, last)
    }
}

/// Per-radius effective length, externally supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveLengthProfile {
    pub radii: Array1<f64>,
    pub lengths: Array1<f64>,
}

impl EffectiveLengthProfile {
    pub fn new(radii: Array1<f64>, lengths: Array1<f64>) -> BcpResult<Self> {
        if radii.len() != lengths.len() {
            return Err(BcpError::ShapeMismatch(format!(
                "effective length profile has {} radii but {} lengths",
                radii.len(),
                lengths.len()
            )));
        }
        if lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(BcpError::ConfigError(
                "effective lengths must be finite and > 0".to_string(),
            ));
        }
        Ok(EffectiveLengthProfile { radii, lengths })
    }

    /// Constant length at every radius.
    pub fn uniform(radii: Array1<f64>, length: f64) -> BcpResult<Self> {
        let lengths = Array1::from_elem(radii.len(), length);
        Self::new(radii, lengths)
    }

    /// `L0 / (1 + α·χ(r))` floored at `min_fraction·L0`; non-finite
    /// stiffness is rejected.
    pub fn from_stiffness(
        radii: Array1<f64>,
        l0: f64,
        chi: &[f64],
        alpha: f64,
        min_fraction: f64,
    ) -> BcpResult<Self> {
        let lengths = leff_linear(l0, chi, alpha, min_fraction);
        Self::new(radii, lengths)
    }
}

/// Outer-region agreement between adapted and baseline curves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OuterGate {
    /// max |ΔV| over r/r_max ≥ fraction; NaN when no radius qualifies or
    /// any outer velocity is NaN.
    pub max_abs_delta: f64,
    pub pass: bool,
}

/// Gate the outer region `r / r_max ≥ fraction` at `tolerance` km/s.
pub fn outer_stability_gate(
    radii: &Array1<f64>,
    baseline: &Array1<f64>,
    adapted: &Array1<f64>,
    fraction: f64,
    tolerance: f64,
) -> OuterGate {
    let r_max = radii.fold(f64::NEG_INFINITY, |m, &r| m.max(r));
    let mut worst: Option<f64> = None;
    for ((&r, &b), &a) in radii.iter().zip(baseline.iter()).zip(adapted.iter()) {
        let rfrac = if r_max > 0.0 { r / r_max } else { 0.0 };
        if rfrac >= fraction {
            let d = (a - b).abs();
            if d.is_nan() {
                return OuterGate {
                    max_abs_delta: f64::NAN,
                    pass: false,
                };
            }
            worst = Some(worst.map_or(d, |w: f64| w.max(d)));
        }
    }
    match worst {
        Some(d) => OuterGate {
            max_abs_delta: d,
            pass: d <= tolerance,
        },
        None => OuterGate {
            max_abs_delta: f64::NAN,
            pass: false,
        },
    }
}

/// Adapted curve plus its gate verdict.
#[derive(Debug, Clone)]
pub struct AdaptiveCurve {
    pub radii: Array1<f64>,
    pub v_total: Array1<f64>,
    /// Effective lengths after clipping into the basis range.
    pub lengths: Array1<f64>,
    pub gate: OuterGate,
    /// Inherited from the basis: some entry was resampled.
    pub resampled: bool,
}

#[derive(Debug, Clone)]
pub struct AdaptiveLengthInterpolator {
    config: AdaptiveConfig,
}

impl AdaptiveLengthInterpolator {
    pub fn new(config: AdaptiveConfig) -> Self {
        AdaptiveLengthInterpolator { config }
    }

    pub fn interpolate(
        &self,
        basis: &BasisSet,
        leff: &EffectiveLengthProfile,
    ) -> BcpResult<AdaptiveCurve> {
        let r_ref = basis.radii().to_vec();
        let r_leff = leff.radii.to_vec();
        if !all_close(&r_leff, &r_ref, self.config.radius_tolerance) {
            return Err(BcpError::GridMismatch {
                length: basis.reference_length(),
                message: format!(
                    "effective-length radii (n={}) do not match the basis grid (n={})",
                    r_leff.len(),
                    r_ref.len()
                ),
            });
        }

        let (l_min, l_max) = basis.length_range();
        let clipped = leff.lengths.mapv(|l| l.clamp(l_min, l_max));
        let v_total = Array1::from_shape_fn(r_ref.len(), |j| {
            let column: Vec<f64> = basis.v_total.index_axis(Axis(1), j).to_vec();
            interp1d_clamped(clipped[j], basis.lengths(), &column)
        });

        let gate = outer_stability_gate(
            basis.radii(),
            basis.baseline(),
            &v_total,
            self.config.outer_fraction,
            self.config.outer_tolerance,
        );
        info!(
            l_min,
            l_max,
            max_outer_delta = gate.max_abs_delta,
            pass = gate.pass,
            resampled = basis.is_resampled(),
            "outer stability gate"
        );

        Ok(AdaptiveCurve {
            radii: basis.radii().clone(),
            v_total,
            lengths: clipped,
            gate,
            resampled: basis.is_resampled(),
        })
    }
}

/// Run the single-length prediction at every basis length around
/// `request.length` (= L0) and assemble the basis on the L0 grid.
///
/// With `adaptive.parallel_basis` the runs go through rayon; order of the
/// result never depends on completion order.
pub fn generate_basis(
    assembler: &RotationCurveAssembler,
    cache: &KernelCache,
    galaxy: &GalaxyParams,
    observed: &ObservedCurve,
    request: &KernelRequest,
) -> BcpResult<BasisSet> {
    let cfg = &assembler.config().adaptive;
    let l0 = request.length;
    let lengths = basis_lengths(l0, &cfg.multipliers)?;
    let run = |length: f64| {
        assembler
            .predict(cache, galaxy, observed, &request.with_length(length))
            .map(|p| (length, p))
    };

    let runs: Vec<(f64, Prediction)> = if cfg.parallel_basis {
        lengths.par_iter().map(|&l| run(l)).collect::<BcpResult<_>>()?
    } else {
        lengths.iter().map(|&l| run(l)).collect::<BcpResult<_>>()?
    };

    let reference = match runs.iter().find(|(l, _)| *l == l0) {
        Some((_, p)) => p.curve.clone(),
        None => run(l0)?.1.curve,
    };
    let entries: Vec<(f64, RotationCurve)> =
        runs.into_iter().map(|(l, p)| (l, p.curve)).collect();
    BasisSet::from_curves(l0, &reference, &entries, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcpot_types::config::{DebugGrid, PipelineConfig};
    use bcpot_types::state::{DiskComponent, KernelShape};
    use ndarray::s;

    fn synthetic(radii: &Array1<f64>, v: Array1<f64>) -> RotationCurve {
        let zeros = Array1::zeros(radii.len());
        RotationCurve {
            radii: radii.clone(),
            v_total: v.clone(),
            v_baryon: v,
            v_kernel: zeros.clone(),
            v_star: zeros.clone(),
            v_gas: zeros,
        }
    }

    fn radii() -> Array1<f64> {
        Array1::linspace(0.5, 19.5, 20)
    }

    /// v(L, r) = 100 + 2·L + r, linear in L.
    fn basis(cfg: &AdaptiveConfig) -> BasisSet {
        let r = radii();
        let l0 = 20.0;
        let entries: Vec<(f64, RotationCurve)> = [1.0, 0.85, 0.7, 0.55]
            .iter()
            .map(|m| {
                let l = l0 * m;
                (l, synthetic(&r, r.mapv(|x| 100.0 + 2.0 * l + x)))
            })
            .collect();
        let reference = entries[0].1.clone();
        BasisSet::from_curves(l0, &reference, &entries, cfg).unwrap()
    }

    #[test]
    fn test_basis_sorted_ascending() {
        let b = basis(&AdaptiveConfig::default());
        assert_eq!(b.len(), 4);
        assert!(b.lengths().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(b.lengths()[3], 20.0);
        assert_eq!(b.curve(3)[0], 100.0 + 40.0 + 0.5);
        assert!(!b.is_resampled());
    }

    #[test]
    fn test_identity_at_reference_length() {
        let cfg = AdaptiveConfig::default();
        let b = basis(&cfg);
        let leff = EffectiveLengthProfile::uniform(radii(), 20.0).unwrap();
        let out = AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff).unwrap();
        assert_eq!(out.v_total, *b.baseline());
        assert!(out.gate.pass);
        assert_eq!(out.gate.max_abs_delta, 0.0);
    }

    #[test]
    fn test_interior_knot_is_exact() {
        let cfg = AdaptiveConfig::default();
        let b = basis(&cfg);
        let l = b.lengths()[1];
        let leff = EffectiveLengthProfile::uniform(radii(), l).unwrap();
        let out = AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff).unwrap();
        assert_eq!(out.v_total, b.curve(1).to_owned());
    }

    #[test]
    fn test_linear_between_lengths_and_clipping() {
        let cfg = AdaptiveConfig::default();
        let b = basis(&cfg);
        let r = radii();
        let mut lengths = Array1::from_elem(r.len(), 15.0);
        lengths[0] = 1.0;
        lengths[1] = 500.0;
        let leff = EffectiveLengthProfile::new(r.clone(), lengths).unwrap();
        let out = AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff).unwrap();

        assert_eq!(out.lengths[0], b.lengths()[0]);
        assert_eq!(out.lengths[1], 20.0);
        assert!((out.v_total[0] - (100.0 + 22.0 + r[0])).abs() < 1e-9);
        assert!((out.v_total[1] - (100.0 + 40.0 + r[1])).abs() < 1e-9);
        for j in 2..r.len() {
            assert!((out.v_total[j] - (130.0 + r[j])).abs() < 1e-9);
        }
        // 10 km/s below the baseline everywhere outside
        assert!(!out.gate.pass);
        assert!((out.gate.max_abs_delta - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_strict_mode_rejects_shifted_grid() {
        let cfg = AdaptiveConfig::default();
        let r = radii();
        let shifted = r.mapv(|x| x + 0.01);
        let reference = synthetic(&r, r.mapv(|x| x + 1.0));
        let entries = vec![
            (10.0, synthetic(&r, r.mapv(|x| x + 1.0))),
            (20.0, synthetic(&shifted, shifted.mapv(|x| x + 2.0))),
        ];
        let err = BasisSet::from_curves(20.0, &reference, &entries, &cfg).unwrap_err();
        match err {
            BcpError::GridMismatch { length, .. } => assert_eq!(length, 20.0),
            other => panic!("expected GridMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_tolerance_accepts_tiny_jitter() {
        let cfg = AdaptiveConfig::default();
        let r = radii();
        let jitter = r.mapv(|x| x + 1e-12);
        let reference = synthetic(&r, r.clone());
        let entries = vec![(20.0, synthetic(&jitter, r.clone()))];
        let b = BasisSet::from_curves(20.0, &reference, &entries, &cfg).unwrap();
        assert!(!b.is_resampled());
    }

    #[test]
    fn test_non_strict_resamples() {
        let cfg = AdaptiveConfig {
            strict_radii: false,
            ..AdaptiveConfig::default()
        };
        let r = radii();
        let coarse = Array1::linspace(0.0, 20.0, 5);
        let reference = synthetic(&r, r.mapv(|x| 2.0 * x));
        let entries = vec![
            (10.0, synthetic(&coarse, coarse.mapv(|x| 3.0 * x))),
            (20.0, synthetic(&r, r.mapv(|x| 2.0 * x))),
        ];
        let b = BasisSet::from_curves(20.0, &reference, &entries, &cfg).unwrap();
        assert!(b.is_resampled());
        for (j, &x) in r.iter().enumerate() {
            assert!((b.curve(0)[j] - 3.0 * x).abs() < 1e-9);
        }

        let leff = EffectiveLengthProfile::uniform(r, 20.0).unwrap();
        let out = AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff).unwrap();
        assert!(out.resampled);
    }

    #[test]
    fn test_leff_grid_must_match() {
        let cfg = AdaptiveConfig::default();
        let b = basis(&cfg);
        let leff = EffectiveLengthProfile::uniform(Array1::linspace(0.5, 19.5, 19), 20.0).unwrap();
        assert!(matches!(
            AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff),
            Err(BcpError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_and_empty_basis_rejected() {
        let cfg = AdaptiveConfig::default();
        let r = radii();
        let c = synthetic(&r, r.clone());
        assert!(BasisSet::from_curves(20.0, &c, &[], &cfg).is_err());
        let dup = vec![(20.0, c.clone()), (20.0, c.clone())];
        assert!(BasisSet::from_curves(20.0, &c, &dup, &cfg).is_err());
    }

    #[test]
    fn test_outer_gate() {
        let r = Array1::from(vec![1.0, 5.0, 8.0, 10.0]);
        let base = Array1::from(vec![100.0, 100.0, 100.0, 100.0]);
        let adapted = Array1::from(vec![50.0, 90.0, 101.5, 99.0]);
        let gate = outer_stability_gate(&r, &base, &adapted, 0.7, 2.0);
        assert!(gate.pass);
        assert_eq!(gate.max_abs_delta, 1.5);

        let gate = outer_stability_gate(&r, &base, &adapted, 0.4, 2.0);
        assert!(!gate.pass);
        assert_eq!(gate.max_abs_delta, 10.0);

        let gate = outer_stability_gate(&r, &base, &adapted, 1.5, 2.0);
        assert!(gate.max_abs_delta.is_nan());
        assert!(!gate.pass);
    }

    #[test]
    fn test_outer_gate_fails_on_nan_outer_velocity() {
        let r = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let base = Array1::from_elem(4, 100.0);
        let adapted = Array1::from(vec![100.0, 100.0, f64::NAN, 100.0]);
        let gate = outer_stability_gate(&r, &base, &adapted, 0.7, 2.0);
        assert!(gate.max_abs_delta.is_nan());
        assert!(!gate.pass);

        // NaN inside the excluded inner region does not affect the verdict
        let adapted = Array1::from(vec![f64::NAN, 100.0, 100.5, 100.0]);
        let gate = outer_stability_gate(&r, &base, &adapted, 0.7, 2.0);
        assert!(gate.pass);
        assert_eq!(gate.max_abs_delta, 0.5);
    }

    #[test]
    fn test_strided_radii_are_compared_elementwise() {
        let cfg = AdaptiveConfig::default();
        let r = Array1::linspace(0.5, 39.5, 40).slice_move(s![..;2]);
        assert!(r.as_slice().is_none());
        let shifted = (Array1::linspace(0.5, 39.5, 40) + 0.01).slice_move(s![..;2]);
        let reference = synthetic(&r, r.mapv(|x| x + 1.0));

        let entries = vec![
            (10.0, synthetic(&r, r.mapv(|x| x + 1.0))),
            (20.0, synthetic(&shifted, shifted.mapv(|x| x + 2.0))),
        ];
        assert!(matches!(
            BasisSet::from_curves(20.0, &reference, &entries, &cfg),
            Err(BcpError::GridMismatch { .. })
        ));

        let entries = vec![
            (10.0, synthetic(&r, r.mapv(|x| x + 1.0))),
            (20.0, synthetic(&r, r.mapv(|x| x + 2.0))),
        ];
        let b = BasisSet::from_curves(20.0, &reference, &entries, &cfg).unwrap();
        assert!(!b.is_resampled());
        let leff = EffectiveLengthProfile::uniform(r.clone(), 20.0).unwrap();
        let out = AdaptiveLengthInterpolator::new(cfg).interpolate(&b, &leff).unwrap();
        for (j, &x) in r.iter().enumerate() {
            assert_eq!(out.v_total[j], x + 2.0);
        }
    }

    #[test]
    fn test_from_stiffness() {
        let r = Array1::from(vec![1.0, 2.0, 3.0]);
        let p = EffectiveLengthProfile::from_stiffness(r, 10.0, &[0.0, 1.0, 1e6], 1.0, 0.05).unwrap();
        assert_eq!(p.lengths.to_vec(), vec![10.0, 5.0, 0.5]);
        assert!(EffectiveLengthProfile::new(Array1::zeros(2), Array1::zeros(3)).is_err());
        let r = Array1::from(vec![1.0, 2.0]);
        assert!(matches!(
            EffectiveLengthProfile::from_stiffness(r, 10.0, &[0.0, f64::NAN], 1.0, 0.05),
            Err(BcpError::ConfigError(_))
        ));
    }

    #[test]
    fn test_generate_basis_end_to_end() {
        let mut config = PipelineConfig::default();
        config.grid.debug = Some(DebugGrid::with_dx(2.5));
        config.adaptive.parallel_basis = true;
        let assembler = RotationCurveAssembler::new(config.clone()).unwrap();
        let cache = KernelCache::new(config.kernel.clone());
        let galaxy = GalaxyParams::new(
            "disk",
            DiskComponent::new(5e10, 3.0, 0.3),
            DiskComponent::new(1e10, 6.0, 0.15),
        );
        let radii: Vec<f64> = (1..=25).map(|r| r as f64).collect();
        let observed = ObservedCurve::new(radii, vec![160.0; 25]).unwrap();
        let request = KernelRequest::new(KernelShape::Plummer, 40.0, 100.0);

        let basis = generate_basis(&assembler, &cache, &galaxy, &observed, &request).unwrap();
        assert_eq!(basis.len(), 4);
        assert_eq!(cache.build_count(), 4);
        assert!(!basis.is_resampled());
        assert_eq!(basis.reference_length(), 40.0);

        let leff = EffectiveLengthProfile::uniform(basis.radii().clone(), 40.0).unwrap();
        let out = AdaptiveLengthInterpolator::new(config.adaptive)
            .interpolate(&basis, &leff)
            .unwrap();
        assert!(out.gate.pass);
        assert_eq!(out.gate.max_abs_delta, 0.0);
    }
}
