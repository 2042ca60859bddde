// ─────────────────────────────────────────────────────────────────────
// BCPot — Spectral Operators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Periodic spectral operators on uniform 3D grids.
//!
//! Poisson solve, kernel convolution, gradient and Laplacian, all via
//! `fft3`/`ifft3`. Every operator drops the k=0 coefficient where a mean
//! offset would otherwise leak into the result. Purely functional: no
//! planner or buffer state survives a call.

use crate::fft::{fft3, fft3_f32, fft_wavenumbers, ifft3};
use bcpot_types::error::{BcpError, BcpResult};
use ndarray::{Array1, Array3, Axis};
use num_complex::Complex64;
use std::f64::consts::PI;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Solve ∇²φ = 4πGρ on the periodic box: φ_k = −4πG ρ_k / k², φ_0 = 0.
pub fn poisson_solve(
    rho: &Array3<f64>,
    dx: f64,
    gravitational_constant: f64,
) -> BcpResult<Array3<f64>> {
    check_spacing(dx)?;
    let [kx, ky, kz] = wavenumbers(rho.dim(), dx);
    let four_pi_g = 4.0 * PI * gravitational_constant;

    let mut phi_k = fft3(rho);
    for ((i, j, l), v) in phi_k.indexed_iter_mut() {
        let k2 = kx[i] * kx[i] + ky[j] * ky[j] + kz[l] * kz[l];
        *v = if k2 == 0.0 { ZERO } else { *v * (-four_pi_g / k2) };
    }
    Ok(ifft3(&phi_k))
}

/// Circular convolution ρ ⊛ U with the k=0 coefficient removed.
///
/// `kernel` is sampled with its origin at the grid centre (index n/2 on
/// each axis); its spectrum is shifted by half a box so the result stays
/// aligned with `rho`. The sum carries no cell-volume factor.
pub fn convolve(rho: &Array3<f64>, kernel: &Array3<f32>) -> BcpResult<Array3<f64>> {
    if rho.dim() != kernel.dim() {
        return Err(BcpError::ShapeMismatch(format!(
            "convolution operands differ: rho {:?} vs kernel {:?}",
            rho.dim(),
            kernel.dim()
        )));
    }
    let (n0, n1, n2) = rho.dim();
    if n0 % 2 != 0 || n1 % 2 != 0 || n2 % 2 != 0 {
        return Err(BcpError::ShapeMismatch(format!(
            "centred convolution needs even dimensions, got {:?}",
            rho.dim()
        )));
    }

    let mut phi_k = fft3(rho);
    let kernel_k = fft3_f32(kernel);
    for (((i, j, l), v), u) in phi_k.indexed_iter_mut().zip(kernel_k.iter()) {
        // half-box shift: exp(iπm) = (−1)^m per axis
        let u = if (i + j + l) % 2 == 0 { *u } else { -*u };
        *v *= u;
    }
    phi_k[[0, 0, 0]] = ZERO;
    Ok(ifft3(&phi_k))
}

/// ∇f via multiplication by i·k along each axis.
pub fn gradient(field: &Array3<f64>, dx: f64) -> BcpResult<[Array3<f64>; 3]> {
    check_spacing(dx)?;
    let k = wavenumbers(field.dim(), dx);
    let field_k = offset_free_spectrum(field);
    Ok([
        derivative(&field_k, &k, 0),
        derivative(&field_k, &k, 1),
        derivative(&field_k, &k, 2),
    ])
}

/// In-plane components (∂f/∂x, ∂f/∂y) only; skips the z transform.
pub fn planar_gradient(field: &Array3<f64>, dx: f64) -> BcpResult<(Array3<f64>, Array3<f64>)> {
    check_spacing(dx)?;
    let k = wavenumbers(field.dim(), dx);
    let field_k = offset_free_spectrum(field);
    Ok((derivative(&field_k, &k, 0), derivative(&field_k, &k, 1)))
}

/// ∇²f via multiplication by −k², k=0 coefficient zeroed.
pub fn laplacian(field: &Array3<f64>, dx: f64) -> BcpResult<Array3<f64>> {
    check_spacing(dx)?;
    let [kx, ky, kz] = wavenumbers(field.dim(), dx);
    let mut lap_k = fft3(field);
    for ((i, j, l), v) in lap_k.indexed_iter_mut() {
        let k2 = kx[i] * kx[i] + ky[j] * ky[j] + kz[l] * kz[l];
        *v *= -k2;
    }
    lap_k[[0, 0, 0]] = ZERO;
    Ok(ifft3(&lap_k))
}

/// Spectrum of `field − field[0,0,0]`. Only the k=0 coefficient differs
/// from the plain transform, and a constant field maps to an exact zero.
fn offset_free_spectrum(field: &Array3<f64>) -> Array3<Complex64> {
    match field.first() {
        Some(&offset) => fft3(&field.mapv(|v| v - offset)),
        None => fft3(field),
    }
}

/// i·k along `axis`; the Nyquist plane of an even axis is dropped.
fn derivative(field_k: &Array3<Complex64>, k: &[Array1<f64>; 3], axis: usize) -> Array3<f64> {
    let n = field_k.len_of(Axis(axis));
    let nyquist = (n % 2 == 0).then_some(n / 2);
    let mut d_k = field_k.clone();
    for ((i, j, l), v) in d_k.indexed_iter_mut() {
        let idx = [i, j, l][axis];
        if Some(idx) == nyquist {
            *v = ZERO;
        } else {
            *v *= Complex64::new(0.0, k[axis][idx]);
        }
    }
    ifft3(&d_k)
}

fn wavenumbers(dim: (usize, usize, usize), dx: f64) -> [Array1<f64>; 3] {
    [
        fft_wavenumbers(dim.0, dx),
        fft_wavenumbers(dim.1, dx),
        fft_wavenumbers(dim.2, dx),
    ]
}

fn check_spacing(dx: f64) -> BcpResult<()> {
    if !dx.is_finite() || dx <= 0.0 {
        return Err(BcpError::ConfigError(format!(
            "grid spacing must be finite and > 0, got {dx}"
        )));
    }
    Ok(())
}
