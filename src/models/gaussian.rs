//! Gaussian and Area-Gaussian theories (`n = 3`: Height|Area, Position, FWHM).

use super::{gauss_area_to_height, gauss_height_to_area, gaussian_value, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N: usize = 3;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "FWHM"];
pub const AREA_PARAMETER_NAMES: [&str; N] = ["Area", "Position", "FWHM"];

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| gaussian_value(xi, p[0], p[1], p[2]))
}

pub fn evaluate_area(params: &[f64], x: &[f64]) -> Vec<f64> {
    let height_params: Vec<f64> = params
        .chunks(N)
        .flat_map(|p| [gauss_area_to_height(p[0], p[2]), p[1], p[2]])
        .collect();
    evaluate(&height_params, x)
}

pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_height_position_fwhm(x, y, bg, yscaling, config)
}

/// Wraps [`estimate`], converting each peak's seeded height into an area.
pub fn estimate_area(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (mut params, constraints) = estimate_height_position_fwhm(x, y, bg, yscaling, config);
    for chunk in params.chunks_mut(N) {
        chunk[0] = gauss_height_to_area(chunk[0], chunk[2]);
    }
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_peak_is_sum_of_single_peaks() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let params = [100.0, 10.0, 5.0, 200.0, 30.0, 8.0];
        let combined = evaluate(&params, &x);
        let a = evaluate(&params[0..3], &x);
        let b = evaluate(&params[3..6], &x);
        for i in 0..x.len() {
            assert!((combined[i] - (a[i] + b[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn area_gaussian_estimator_matches_analytic_formula() {
        let height = 1000.0;
        let fwhm = 20.0;
        let area = gauss_height_to_area(height, fwhm);
        assert!((area - 21289.5).abs() < 1.0);
    }
}
