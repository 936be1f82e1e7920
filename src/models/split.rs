//! Split Gaussian, Split Lorentz and Split Pseudo-Voigt theories: the base
//! shape uses `FWHM_low` for `x < Position` and `FWHM_high` otherwise.

use super::pseudo_voigt::pseudo_voigt_value;
use super::{gaussian_value, lorentz_value, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N_SPLIT: usize = 4;
pub const N_SPLIT_PVOIGT: usize = 5;
pub const SPLIT_GAUSSIAN_NAMES: [&str; N_SPLIT] = ["Height", "Position", "FWHM_low", "FWHM_high"];
pub const SPLIT_LORENTZ_NAMES: [&str; N_SPLIT] = ["Height", "Position", "FWHM_low", "FWHM_high"];
pub const SPLIT_PVOIGT_NAMES: [&str; N_SPLIT_PVOIGT] = ["Height", "Position", "FWHM_low", "FWHM_high", "Eta"];

pub fn evaluate_split_gaussian(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N_SPLIT, |xi, p| {
        let fwhm = if xi < p[1] { p[2] } else { p[3] };
        gaussian_value(xi, p[0], p[1], fwhm)
    })
}

pub fn evaluate_split_lorentz(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N_SPLIT, |xi, p| {
        let fwhm = if xi < p[1] { p[2] } else { p[3] };
        lorentz_value(xi, p[0], p[1], fwhm)
    })
}

pub fn evaluate_split_pseudo_voigt(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N_SPLIT_PVOIGT, |xi, p| {
        let fwhm = if xi < p[1] { p[2] } else { p[3] };
        pseudo_voigt_value(xi, p[0], p[1], fwhm, p[4])
    })
}

/// Widens a 3-wide `(Height, Position, FWHM)` block by duplicating the FWHM
/// parameter into `(..., FWHM_low, FWHM_high)`, re-deriving any `SameFwhmFlag`
/// FACTOR linkage from the peak index for *both* clones so low-ties-to-low
/// and high-ties-to-high.
fn split_fwhm(params3: Vec<f64>, cons3: Vec<Constraint>, config: &FitConfig, extra_names: usize) -> (Vec<f64>, Vec<Constraint>) {
    let n = 4 + extra_names;
    let n_peaks = params3.len() / 3;
    let index_largest = (0..n_peaks)
        .max_by(|&a, &b| params3[a * 3].partial_cmp(&params3[b * 3]).unwrap())
        .unwrap_or(0);
    let mut params = Vec::with_capacity(n_peaks * n);
    let mut constraints = Vec::with_capacity(n_peaks * n);
    for i in 0..n_peaks {
        let height = params3[i * 3];
        let position = params3[i * 3 + 1];
        let fwhm = params3[i * 3 + 2];
        params.extend_from_slice(&[height, position, fwhm, fwhm]);
        if extra_names > 0 {
            params.push(0.5);
        }
        if config.no_constraints_flag {
            constraints.extend_from_slice(&vec![Constraint::Free; n]);
            continue;
        }
        constraints.push(cons3[i * 3]);
        constraints.push(cons3[i * 3 + 1]);
        for slot in 2..4 {
            let tied = if config.same_fwhm_flag && i != index_largest {
                Constraint::Factor { j: index_largest * n + slot, ratio: 1.0 }
            } else {
                cons3[i * 3 + 2]
            };
            constraints.push(tied);
        }
        if extra_names > 0 {
            constraints.push(if config.quoted_eta_flag { Constraint::Quoted { min: 0.0, max: 1.0 } } else { Constraint::Free });
        }
    }
    (params, constraints)
}

pub fn estimate_split_gaussian(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (params3, cons3) = estimate_height_position_fwhm(x, y, bg, yscaling, config);
    if params3.is_empty() {
        return (params3, cons3);
    }
    split_fwhm(params3, cons3, config, 0)
}

pub fn estimate_split_lorentz(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_split_gaussian(x, y, bg, yscaling, config)
}

pub fn estimate_split_pseudo_voigt(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (params3, cons3) = estimate_height_position_fwhm(x, y, bg, yscaling, config);
    if params3.is_empty() {
        return (params3, cons3);
    }
    split_fwhm(params3, cons3, config, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gaussian::evaluate as gaussian_evaluate;

    #[test]
    fn split_gaussian_with_equal_widths_matches_plain_gaussian() {
        let x: Vec<f64> = (-50..50).map(|i| i as f64).collect();
        let split_params = [100.0, 0.0, 15.0, 15.0];
        let plain_params = [100.0, 0.0, 15.0];
        let split = evaluate_split_gaussian(&split_params, &x);
        let plain = gaussian_evaluate(&plain_params, &x);
        for i in 0..x.len() {
            assert!((split[i] - plain[i]).abs() < 1e-9);
        }
    }
}
