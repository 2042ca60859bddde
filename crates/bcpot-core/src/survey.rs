// ─────────────────────────────────────────────────────────────────────
// BCPot — Parameter Survey
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Grid search over (kernel, L, μ) for one galaxy, scored by MAFE.

use crate::kernel::KernelCache;
use crate::rotation::{KernelRequest, RotationCurveAssembler};
use bcpot_math::interp::{median, resample};
use bcpot_types::error::BcpResult;
use bcpot_types::state::{GalaxyParams, KernelShape, ObservedCurve};
use tracing::{info, warn};

/// Floor on observed velocity in the fractional error denominator.
const MAFE_VELOCITY_FLOOR: f64 = 1e-6;

/// Median absolute fractional error over pairs where both values are finite.
pub fn mafe(predicted: &[f64], observed: &[f64]) -> Option<f64> {
    let errors: Vec<f64> = predicted
        .iter()
        .zip(observed)
        .filter(|(p, o)| p.is_finite() && o.is_finite())
        .map(|(p, o)| (p - o).abs() / o.max(MAFE_VELOCITY_FLOOR))
        .collect();
    median(&errors)
}

/// Parameter combinations to evaluate.
#[derive(Debug, Clone)]
pub struct SurveySpace {
    pub shapes: Vec<KernelShape>,
    pub lengths: Vec<f64>,
    pub couplings: Vec<f64>,
    pub beta: f64,
}

impl SurveySpace {
    pub fn new(shapes: Vec<KernelShape>, lengths: Vec<f64>, couplings: Vec<f64>) -> Self {
        SurveySpace {
            shapes,
            lengths,
            couplings,
            beta: 1.0,
        }
    }

    fn requests(&self) -> impl Iterator<Item = KernelRequest> + '_ {
        self.shapes.iter().flat_map(move |&shape| {
            self.lengths.iter().flat_map(move |&length| {
                self.couplings.iter().map(move |&coupling| {
                    KernelRequest::new(shape, length, coupling).with_beta(self.beta)
                })
            })
        })
    }
}

/// One scored combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyPoint {
    pub request: KernelRequest,
    pub mafe: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SurveyOutcome {
    pub points: Vec<SurveyPoint>,
    /// Combinations rejected as numerically degenerate, with the reason.
    pub skipped: Vec<(KernelRequest, String)>,
}

impl SurveyOutcome {
    /// Lowest-MAFE point; the first one wins ties.
    pub fn best(&self) -> Option<&SurveyPoint> {
        self.points
            .iter()
            .reduce(|best, p| if p.mafe < best.mafe { p } else { best })
    }
}

/// Evaluate every combination in `space`.
///
/// Taper and integral failures skip the combination; any other error
/// aborts the survey.
pub fn survey(
    assembler: &RotationCurveAssembler,
    cache: &KernelCache,
    galaxy: &GalaxyParams,
    observed: &ObservedCurve,
    space: &SurveySpace,
) -> BcpResult<SurveyOutcome> {
    let mut outcome = SurveyOutcome::default();
    let r_obs = observed.radii.to_vec();
    let v_obs = observed.velocities.to_vec();

    for request in space.requests() {
        let prediction = match assembler.predict(cache, galaxy, observed, &request) {
            Ok(p) => p,
            Err(e) if e.is_numerical_degeneracy() => {
                warn!(
                    galaxy = %galaxy.name,
                    kernel = %request.shape,
                    length = request.length,
                    error = %e,
                    "survey point skipped"
                );
                outcome.skipped.push((request, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };
        let curve = &prediction.curve;
        let on_obs = resample(
            &r_obs,
            &curve.radii.to_vec(),
            &curve.v_total.to_vec(),
            f64::NAN,
            f64::NAN,
        );
        if let Some(score) = mafe(&on_obs.to_vec(), &v_obs) {
            outcome.points.push(SurveyPoint {
                request,
                mafe: score,
                alpha: prediction.calibration.alpha,
            });
        }
    }

    if let Some(best) = outcome.best() {
        info!(
            galaxy = %galaxy.name,
            kernel = %best.request.shape,
            length = best.request.length,
            coupling = best.request.coupling,
            mafe = best.mafe,
            "survey best fit"
        );
    } else {
        warn!(galaxy = %galaxy.name, "survey produced no scored point");
    }
    Ok(outcome)
}
