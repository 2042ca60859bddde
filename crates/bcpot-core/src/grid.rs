// ─────────────────────────────────────────────────────────────────────
// BCPot — Grid Selection
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Box size and resolution choice for one (galaxy, L) request.

use bcpot_types::config::GridConfig;
use bcpot_types::error::{BcpError, BcpResult};
use bcpot_types::state::Grid3D;
use tracing::{debug, info, warn};

/// Half-box extent and cells per axis picked for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridChoice {
    pub half_box: f64,
    pub n: usize,
}

impl GridChoice {
    pub fn dx(&self) -> f64 {
        2.0 * self.half_box / self.n as f64
    }

    pub fn to_grid(&self) -> BcpResult<Grid3D> {
        Grid3D::new(self.n, self.half_box)
    }
}

/// Grid resolution rule, parameterised by a [`GridConfig`].
#[derive(Debug, Clone)]
pub struct GridSpec {
    config: GridConfig,
}

impl GridSpec {
    pub fn new(config: GridConfig) -> Self {
        GridSpec { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Pick `(half_box, n)` for an observed extent `r_obs_max` and kernel
    /// length `length`.
    ///
    /// Normal mode: half-box = max(k1·R_obs_max, k2·L, floor) and
    /// n = round(2·half_box / target_dx) clamped to [n_min, n_max], even.
    /// With a debug override the box is fixed and n follows the forced
    /// spacing, clamped to [n_min, debug.n_max].
    pub fn choose(&self, r_obs_max: f64, length: f64) -> BcpResult<GridChoice> {
        if !r_obs_max.is_finite() || r_obs_max < 0.0 {
            return Err(BcpError::ConfigError(format!(
                "observed extent must be finite and >= 0, got {r_obs_max}"
            )));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(BcpError::ConfigError(format!(
                "kernel length must be finite and > 0, got {length}"
            )));
        }
        let cfg = &self.config;

        if let Some(dbg) = &cfg.debug {
            if !dbg.dx.is_finite() || dbg.dx <= 0.0 {
                return Err(BcpError::ConfigError(format!(
                    "debug grid dx must be finite and > 0, got {}",
                    dbg.dx
                )));
            }
            let half_box = dbg.half_box;
            let n_req = (2.0 * half_box / dbg.dx).round_ties_even() as usize;
            let n = clamp_even(n_req, cfg.n_min, dbg.n_max);
            if n != n_req {
                warn!(
                    dx = dbg.dx,
                    n_req,
                    n,
                    "debug grid spacing clipped to grid size bounds"
                );
            }
            debug!(dx = dbg.dx, n, half_box, "forced debug grid");
            return Ok(GridChoice { half_box, n });
        }

        let half_box = (cfg.r_obs_factor * r_obs_max)
            .max(cfg.length_factor * length)
            .max(cfg.min_half_box);
        let n_req = (2.0 * half_box / cfg.target_dx).round_ties_even() as usize;
        let n = clamp_even(n_req, cfg.n_min, cfg.n_max);
        info!(r_obs_max, length, half_box, n, dx = 2.0 * half_box / n as f64, "grid chosen");
        Ok(GridChoice { half_box, n })
    }

    /// Convenience: [`GridSpec::choose`] followed by grid construction.
    pub fn build(&self, r_obs_max: f64, length: f64) -> BcpResult<Grid3D> {
        self.choose(r_obs_max, length)?.to_grid()
    }
}

/// Clamp into `[lo, hi]`, then bump odd results to the next even size
/// (or down, when that would leave `hi`).
fn clamp_even(n: usize, lo: usize, hi: usize) -> usize {
    let mut n = n.clamp(lo, hi.max(lo));
    if n % 2 == 1 {
        n = if n < hi { n + 1 } else { n - 1 };
    }
    n
}
