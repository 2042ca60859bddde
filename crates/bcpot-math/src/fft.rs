//! 3D FFT wrappers around rustfft.
//!
//! Convention matches numpy:
//! - Forward FFT (fft3): unnormalized
//! - Inverse FFT (ifft3): normalized by 1/(n0*n1*n2), real part returned

use ndarray::{Array1, Array3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Forward 3D FFT of a real field. Matches `numpy.fft.fftn()`.
pub fn fft3(input: &Array3<f64>) -> Array3<Complex64> {
    let mut data = input.mapv(|v| Complex64::new(v, 0.0));
    transform(&mut data, FftDirection::Forward);
    data
}

/// Forward 3D FFT of an f32 field, promoted to double precision.
pub fn fft3_f32(input: &Array3<f32>) -> Array3<Complex64> {
    let mut data = input.mapv(|v| Complex64::new(f64::from(v), 0.0));
    transform(&mut data, FftDirection::Forward);
    data
}

/// Inverse 3D FFT, keeping the real part. Matches `numpy.fft.ifftn().real`.
///
/// The imaginary residue left by roundoff is discarded.
pub fn ifft3(input: &Array3<Complex64>) -> Array3<f64> {
    let mut data = input.clone();
    ifft3_in_place(&mut data);
    data.mapv(|c| c.re)
}

/// Normalized inverse transform in place, complex result kept.
pub fn ifft3_in_place(data: &mut Array3<Complex64>) {
    transform(data, FftDirection::Inverse);
    let norm = 1.0 / data.len() as f64;
    data.mapv_inplace(|c| c * norm);
}

/// Angular wavenumbers `2π·fftfreq(n, dx)`, numpy bin order.
pub fn fft_wavenumbers(n: usize, dx: f64) -> Array1<f64> {
    let scale = 2.0 * PI / (n as f64 * dx);
    Array1::from_shape_fn(n, |i| {
        // fftfreq puts the Nyquist bin on the negative side for even n
        let m = if i < n.div_ceil(2) {
            i as f64
        } else {
            i as f64 - n as f64
        };
        m * scale
    })
}

fn transform(data: &mut Array3<Complex64>, direction: FftDirection) {
    let mut planner = FftPlanner::new();
    for axis in 0..3 {
        let len = data.len_of(Axis(axis));
        let fft = planner.plan_fft(len, direction);
        transform_axis(data, axis, &fft);
    }
}

fn transform_axis(data: &mut Array3<Complex64>, axis: usize, fft: &Arc<dyn Fft<f64>>) {
    let len = data.len_of(Axis(axis));
    let mut buffer = vec![Complex64::new(0.0, 0.0); len];
    let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    for mut lane in data.lanes_mut(Axis(axis)) {
        // Innermost axis is contiguous; the others go through a buffer.
        match lane.as_slice_mut() {
            Some(slice) => fft.process_with_scratch(slice, &mut scratch),
            None => {
                for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                    *b = *v;
                }
                fft.process_with_scratch(&mut buffer, &mut scratch);
                for (v, b) in lane.iter_mut().zip(buffer.iter()) {
                    *v = *b;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft3_roundtrip() {
        let original = Array3::from_shape_fn((8, 6, 4), |(i, j, k)| {
            (i * 24 + j * 4 + k) as f64 * 0.37 - 5.0
        });
        let spectrum = fft3(&original);
        let recovered = ifft3(&spectrum);

        for ((i, j, k), &val) in original.indexed_iter() {
            assert!(
                (recovered[[i, j, k]] - val).abs() < 1e-10,
                "FFT roundtrip failed at ({i}, {j}, {k}): {} vs {val}",
                recovered[[i, j, k]]
            );
        }
    }

    #[test]
    fn test_fft3_dc_component() {
        // For a constant field, the DC component is N*value
        let n = 8;
        let val = 3.0;
        let input = Array3::from_elem((n, n, n), val);
        let spectrum = fft3(&input);

        let expected_dc = (n * n * n) as f64 * val;
        assert!(
            (spectrum[[0, 0, 0]].re - expected_dc).abs() < 1e-9,
            "DC component: {} vs {expected_dc}",
            spectrum[[0, 0, 0]].re
        );
        assert!(spectrum[[0, 0, 0]].im.abs() < 1e-10);
        for ((i, j, k), v) in spectrum.indexed_iter() {
            if (i, j, k) != (0, 0, 0) {
                assert!(v.norm() < 1e-9, "non-DC mode ({i},{j},{k}) = {v}");
            }
        }
    }

    #[test]
    fn test_fft3_zeros() {
        let input = Array3::zeros((8, 8, 8));
        let spectrum = fft3(&input);
        for &v in spectrum.iter() {
            assert_eq!(v, Complex64::new(0.0, 0.0), "FFT of zeros should be zero");
        }
    }

    #[test]
    fn test_fft3_single_mode() {
        // cos(2π x / n) along axis 1 lights up bins (0, ±1, 0) only
        let n = 16;
        let input = Array3::from_shape_fn((n, n, n), |(_, j, _)| {
            (2.0 * PI * j as f64 / n as f64).cos()
        });
        let spectrum = fft3(&input);
        let half = (n * n * n) as f64 / 2.0;
        assert!((spectrum[[0, 1, 0]].re - half).abs() < 1e-8);
        assert!((spectrum[[0, n - 1, 0]].re - half).abs() < 1e-8);
        assert!(spectrum[[1, 0, 0]].norm() < 1e-8);
        assert!(spectrum[[0, 0, 1]].norm() < 1e-8);
    }

    #[test]
    fn test_f32_matches_f64() {
        let a = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| (i + 2 * j + 3 * k) as f32);
        let s32 = fft3_f32(&a);
        let s64 = fft3(&a.mapv(f64::from));
        for (x, y) in s32.iter().zip(s64.iter()) {
            assert!((x - y).norm() < 1e-12);
        }
    }

    #[test]
    fn test_wavenumbers_match_fftfreq() {
        // numpy: 2π * fftfreq(8, d=0.5)
        let k = fft_wavenumbers(8, 0.5);
        let unit = 2.0 * PI / 4.0;
        let expected = [0.0, 1.0, 2.0, 3.0, -4.0, -3.0, -2.0, -1.0];
        for (got, m) in k.iter().zip(expected.iter()) {
            assert!((got - m * unit).abs() < 1e-12);
        }

        let odd = fft_wavenumbers(5, 1.0);
        let unit = 2.0 * PI / 5.0;
        let expected = [0.0, 1.0, 2.0, -2.0, -1.0];
        for (got, m) in odd.iter().zip(expected.iter()) {
            assert!((got - m * unit).abs() < 1e-12);
        }
    }
}
