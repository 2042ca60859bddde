// ─────────────────────────────────────────────────────────────────────
// BCPot — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Newton's constant in kpc (km/s)² / Msun.
/// Lengths are kpc, masses Msun, velocities km/s throughout.
pub const G_KPC_KMS2_MSUN: f64 = 4.30091e-6;

/// Helium correction applied to catalogue HI gas masses.
pub const HELIUM_FACTOR: f64 = 1.33;

/// Gas scale radius in units of the stellar one when the catalogue has none.
pub const GAS_RADIUS_FALLBACK_FACTOR: f64 = 1.8;

/// Smallest vertical scale height used when rasterising a disk (kpc).
pub const MIN_SCALE_HEIGHT: f64 = 1e-3;

/// |z/hz| above which the sech² vertical weight is taken as zero.
pub const SECH2_CUTOFF: f64 = 20.0;

/// Radius floor guarding the analytic kernel shapes at the origin (kpc).
pub const KERNEL_RADIUS_FLOOR: f64 = 1e-6;

/// Smallest length accepted when forming the 1/L integral target.
pub const MIN_KERNEL_LENGTH: f64 = 1e-12;

/// Default number of annuli in a radial profile.
pub const RADIAL_BINS: usize = 30;

/// Minimum valid points for the amplitude calibration.
pub const MIN_CALIBRATION_POINTS: usize = 5;

/// Hard ceiling on cells per axis; n³ f64 fields beyond this exhaust memory.
pub const MAX_GRID_N: usize = 1024;
