//! Piecewise-linear interpolation on sorted knots plus small reductions
//! used by the profile and adaptive stages.

use ndarray::Array1;

/// Linear interpolation of `(xs, ys)` at `x`.
///
/// `xs` must be strictly increasing. Queries below `xs[0]` return `left`,
/// above `xs[last]` return `right`. A query landing on a knot returns
/// that knot's value exactly. Empty input or NaN query yields NaN.
pub fn interp1d(x: f64, xs: &[f64], ys: &[f64], left: f64, right: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if x < xs[0] {
        return left;
    }
    if x > xs[n - 1] {
        return right;
    }
    if x == xs[n - 1] {
        return ys[n - 1];
    }
    // first knot strictly greater than x; x >= xs[0] so hi >= 1
    let hi = xs[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
    if t == 0.0 {
        return ys[lo];
    }
    ys[lo] + t * (ys[hi] - ys[lo])
}

/// Interpolation holding the edge values outside the knot range.
pub fn interp1d_clamped(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    match (ys.first(), ys.last()) {
        (Some(&first), Some(&last)) => interp1d(x, xs, ys, first, last),
        _ => f64::NAN,
    }
}

/// Evaluate `interp1d` at every query point.
pub fn resample(xq: &[f64], xs: &[f64], ys: &[f64], left: f64, right: f64) -> Array1<f64> {
    xq.iter()
        .map(|&x| interp1d(x, xs, ys, left, right))
        .collect()
}

/// Replace NaN entries by linear interpolation over the finite ones,
/// using the index as abscissa and holding edge values.
///
/// Returns `false` (leaving `values` untouched) when no entry is finite.
pub fn fill_nan_gaps(values: &mut Array1<f64>) -> bool {
    let (idx, known): (Vec<f64>, Vec<f64>) = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as f64, v))
        .unzip();
    if known.is_empty() {
        return false;
    }
    for (i, v) in values.iter_mut().enumerate() {
        if !v.is_finite() {
            *v = interp1d_clamped(i as f64, &idx, &known);
        }
    }
    true
}

/// Median of the finite entries.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let m = finite.len() / 2;
    let med = if finite.len() % 2 == 0 {
        0.5 * (finite[m - 1] + finite[m])
    } else {
        finite[m]
    };
    Some(med)
}

/// Largest absolute elementwise difference; NaN if any pair is NaN, `None` on
/// length mismatch.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let mut worst = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let d = (x - y).abs();
        if d.is_nan() {
            return Some(f64::NAN);
        }
        worst = worst.max(d);
    }
    Some(worst)
}

/// Elementwise `|a - b| <= atol` over equal-length slices.
pub fn all_close(a: &[f64], b: &[f64], atol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= atol)
}
