//! Background evaluators and estimators: none, constant, linear, internal
//! (opaque baseline) and square-filter.

use crate::baseline::SubacCache;
use crate::constraint::Constraint;

pub const NONE_N: usize = 0;
pub const CONSTANT_N: usize = 1;
pub const LINEAR_N: usize = 2;
pub const INTERNAL_N: usize = 3;
pub const SQUARE_FILTER_N: usize = 2;

pub const CONSTANT_NAMES: [&str; CONSTANT_N] = ["Constant"];
pub const LINEAR_NAMES: [&str; LINEAR_N] = ["Constant", "Slope"];
pub const INTERNAL_NAMES: [&str; INTERNAL_N] = ["Curvature", "Iterations", "Constant"];
pub const SQUARE_FILTER_NAMES: [&str; SQUARE_FILTER_N] = ["Width", "Constant"];

pub fn evaluate_none(_params: &[f64], x: &[f64]) -> Vec<f64> {
    vec![0.0; x.len()]
}

pub fn evaluate_constant(params: &[f64], x: &[f64]) -> Vec<f64> {
    vec![params[0]; x.len()]
}

pub fn evaluate_linear(params: &[f64], x: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| params[0] + params[1] * xi).collect()
}

/// `subac(y, curvature, iterations) + c`, memoized against the last
/// `(x, y, curvature, iterations)` tuple, since the baseline only depends on
/// `y`, not on the current trial parameters.
pub fn evaluate_internal(params: &[f64], y: &[f64], cache: &mut SubacCache) -> Vec<f64> {
    let curvature = params[0];
    let iterations = params[1].max(0.0).round() as u32;
    let c = params[2];
    cache.get(y, curvature, iterations).iter().map(|b| b + c).collect()
}

/// A symmetric moving-window subtractive filter: subtract `c`, apply a
/// `2*half_width + 1`-wide boxcar low-pass, add `c` back. Pass-through when
/// `len(y) < 4*half_width + 1`.
pub fn evaluate_square_filter(params: &[f64], y: &[f64]) -> Vec<f64> {
    let half_width = (params[0].max(1.0).round() as usize).max(1);
    let c = params[1];
    let n = y.len();
    if n < 4 * half_width + 1 {
        return y.to_vec();
    }
    let shifted: Vec<f64> = y.iter().map(|v| v - c).collect();
    let mut out = vec![0.0; n];
    for i in 0..n {
        let lo = i.saturating_sub(half_width);
        let hi = (i + half_width).min(n - 1);
        let window = &shifted[lo..=hi];
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        out[i] = avg + c;
    }
    out
}

pub fn estimate_none(_x: &[f64], _y: &[f64]) -> (Vec<f64>, Vec<Constraint>, Vec<f64>) {
    (Vec::new(), Vec::new(), Vec::new())
}

pub fn estimate_constant(_x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<Constraint>, Vec<f64>) {
    let c = y.iter().cloned().fold(f64::INFINITY, f64::min);
    let curve = vec![c; y.len()];
    (vec![c], vec![Constraint::Free], curve)
}

/// Ordinary least squares on `(x, y)`, matching `estimate_linear`'s seeding
/// of slope/intercept from the baseline estimate rather than from raw `y`.
pub fn estimate_linear(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<Constraint>, Vec<f64>) {
    let n = x.len() as f64;
    if x.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let xmean = x.iter().sum::<f64>() / n;
    let ymean = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        num += (xi - xmean) * (yi - ymean);
        den += (xi - xmean).powi(2);
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };
    let intercept = ymean - slope * xmean;
    let curve = evaluate_linear(&[intercept, slope], x);
    (vec![intercept, slope], vec![Constraint::Free, Constraint::Free], curve)
}

/// Fixed defaults: the internal baseline needs no data-dependent seed since
/// `subac` self-adapts to the signal shape.
pub fn estimate_internal(x: &[f64], y: &[f64], cache: &mut SubacCache) -> (Vec<f64>, Vec<Constraint>, Vec<f64>) {
    if x.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let params = vec![1.0001, 24.0, 0.0];
    let curve = evaluate_internal(&params, y, cache);
    (params, vec![Constraint::Fixed, Constraint::Fixed, Constraint::Free], curve)
}

pub fn estimate_square_filter(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<Constraint>, Vec<f64>) {
    if x.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let params = vec![5.0, 0.0];
    let curve = evaluate_square_filter(&params, y);
    (params, vec![Constraint::Fixed, Constraint::Free], curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_returns_flat_curve() {
        let y = vec![3.0, 5.0, 1.0, 8.0];
        let v = evaluate_constant(&[2.5], &y);
        assert_eq!(v, vec![2.5; 4]);
    }

    #[test]
    fn linear_estimator_recovers_exact_line() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 3.0 + 2.0 * xi).collect();
        let (params, _, _) = estimate_linear(&x, &y);
        assert!((params[0] - 3.0).abs() < 1e-9);
        assert!((params[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn square_filter_is_pass_through_on_short_signals() {
        let y = vec![1.0, 2.0, 3.0];
        let filtered = evaluate_square_filter(&[5.0, 0.0], &y);
        assert_eq!(filtered, y);
    }

    #[test]
    fn internal_background_caches_identical_calls() {
        let y: Vec<f64> = (0..50).map(|i| (i as f64 * 0.2).sin() * 20.0 + 50.0).collect();
        let mut cache = SubacCache::default();
        let a = evaluate_internal(&[1.0001, 10.0, 0.0], &y, &mut cache);
        let b = evaluate_internal(&[1.0001, 10.0, 0.0], &y, &mut cache);
        assert_eq!(a, b);
    }
}
