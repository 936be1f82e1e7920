//! Lorentz and Area-Lorentz theories (`n = 3`: Height|Area, Position, FWHM).

use super::{lorentz_area_to_height, lorentz_height_to_area, lorentz_value, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N: usize = 3;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "FWHM"];
pub const AREA_PARAMETER_NAMES: [&str; N] = ["Area", "Position", "FWHM"];

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| lorentz_value(xi, p[0], p[1], p[2]))
}

pub fn evaluate_area(params: &[f64], x: &[f64]) -> Vec<f64> {
    let height_params: Vec<f64> = params
        .chunks(N)
        .flat_map(|p| [lorentz_area_to_height(p[0], p[2]), p[1], p[2]])
        .collect();
    evaluate(&height_params, x)
}

pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_height_position_fwhm(x, y, bg, yscaling, config)
}

pub fn estimate_area(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (mut params, constraints) = estimate_height_position_fwhm(x, y, bg, yscaling, config);
    for chunk in params.chunks_mut(N) {
        chunk[0] = lorentz_height_to_area(chunk[0], chunk[2]);
    }
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_lorentzian_area_round_trip() {
        let height = 1000.0;
        let fwhm = 20.0;
        let area = lorentz_height_to_area(height, fwhm);
        assert!((lorentz_area_to_height(area, fwhm) - height).abs() < 1e-9);
    }
}
