//! Pseudo-Voigt and Area Pseudo-Voigt theories (`n = 4`: Height|Area, Position, FWHM, eta).

use super::{gaussian_value, gauss_height_to_area, lorentz_height_to_area, lorentz_value, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N: usize = 4;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "FWHM", "Eta"];
pub const AREA_PARAMETER_NAMES: [&str; N] = ["Area", "Position", "FWHM", "Eta"];

pub fn pseudo_voigt_value(x: f64, height: f64, position: f64, fwhm: f64, eta: f64) -> f64 {
    eta * gaussian_value(x, height, position, fwhm) + (1.0 - eta) * lorentz_value(x, height, position, fwhm)
}

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| pseudo_voigt_value(xi, p[0], p[1], p[2], p[3]))
}

/// Area form seeds height from a fixed 50/50 Gaussian/Lorentzian area blend
/// (matching `estimate_apvoigt`'s seeding convention), independent of `eta`.
fn area_blend_to_height(area: f64, fwhm: f64) -> f64 {
    let lorentz_factor = fwhm * std::f64::consts::FRAC_PI_2;
    let gauss_factor = gauss_height_to_area(1.0, fwhm);
    let denom = 0.5 * lorentz_factor + 0.5 * gauss_factor;
    if denom == 0.0 {
        0.0
    } else {
        area / denom
    }
}

fn height_blend_to_area(height: f64, fwhm: f64) -> f64 {
    0.5 * lorentz_height_to_area(height, fwhm) + 0.5 * gauss_height_to_area(height, fwhm)
}

pub fn evaluate_area(params: &[f64], x: &[f64]) -> Vec<f64> {
    let height_params: Vec<f64> = params
        .chunks(N)
        .flat_map(|p| [area_blend_to_height(p[0], p[2]), p[1], p[2], p[3]])
        .collect();
    evaluate(&height_params, x)
}

/// Appends `Eta = 0.5` per peak to a 3-wide `(Height, Position, FWHM)` block,
/// re-deriving the FWHM FACTOR linkage (if any) from the peak index rather
/// than algebraically transforming the old 3-wide block.
fn widen_with_eta(params3: Vec<f64>, cons3: Vec<Constraint>, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let n_peaks = params3.len() / 3;
    let index_largest = (0..n_peaks)
        .max_by(|&a, &b| params3[a * 3].partial_cmp(&params3[b * 3]).unwrap())
        .unwrap_or(0);
    let mut params = Vec::with_capacity(n_peaks * N);
    let mut constraints = Vec::with_capacity(n_peaks * N);
    for i in 0..n_peaks {
        params.extend_from_slice(&params3[i * 3..i * 3 + 3]);
        params.push(0.5);
        if config.no_constraints_flag {
            constraints.extend_from_slice(&[Constraint::Free; N]);
            continue;
        }
        constraints.push(cons3[i * 3]);
        constraints.push(cons3[i * 3 + 1]);
        let fwhm_constraint = if config.same_fwhm_flag && i != index_largest {
            Constraint::Factor { j: index_largest * N + 2, ratio: 1.0 }
        } else {
            cons3[i * 3 + 2]
        };
        constraints.push(fwhm_constraint);
        constraints.push(if config.quoted_eta_flag { Constraint::Quoted { min: 0.0, max: 1.0 } } else { Constraint::Free });
    }
    (params, constraints)
}

pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (params3, cons3) = estimate_height_position_fwhm(x, y, bg, yscaling, config);
    if params3.is_empty() {
        return (params3, cons3);
    }
    widen_with_eta(params3, cons3, config)
}

pub fn estimate_area(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (mut params, constraints) = estimate(x, y, bg, yscaling, config);
    for chunk in params.chunks_mut(N) {
        chunk[0] = height_blend_to_area(chunk[0], chunk[2]);
    }
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_one_reproduces_gaussian() {
        let height = 100.0;
        let fwhm = 10.0;
        for x in [0.0, 3.0, -5.0, 12.0] {
            let pv = pseudo_voigt_value(x, height, 0.0, fwhm, 1.0);
            let g = gaussian_value(x, height, 0.0, fwhm);
            assert!((pv - g).abs() < 1e-9);
        }
    }

    #[test]
    fn eta_zero_reproduces_lorentzian() {
        let height = 100.0;
        let fwhm = 10.0;
        for x in [0.0, 3.0, -5.0, 12.0] {
            let pv = pseudo_voigt_value(x, height, 0.0, fwhm, 0.0);
            let l = lorentz_value(x, height, 0.0, fwhm);
            assert!((pv - l).abs() < 1e-9);
        }
    }
}
