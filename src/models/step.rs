//! Step Down / Step Up theories (`n = 3`: Height, Position, FWHM), smooth
//! edges built from the complementary error function.

use super::{erfc, fwhm_to_sigma, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N: usize = 3;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "FWHM"];

pub fn step_down_value(x: f64, height: f64, position: f64, fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    if sigma == 0.0 {
        return 0.0;
    }
    0.5 * height * erfc((x - position) / (std::f64::consts::SQRT_2 * sigma))
}

pub fn step_up_value(x: f64, height: f64, position: f64, fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    if sigma == 0.0 {
        return 0.0;
    }
    0.5 * height * erfc((position - x) / (std::f64::consts::SQRT_2 * sigma))
}

pub fn evaluate_down(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| step_down_value(xi, p[0], p[1], p[2]))
}

pub fn evaluate_up(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| step_up_value(xi, p[0], p[1], p[2]))
}

/// `[-0.25, -0.75, 0, 0.75, 0.25]` for a down-edge detector; the up-edge
/// kernel is its sign-flip. Same-length output, edge samples reused beyond
/// the valid convolution window.
pub fn edge_filter(y: &[f64], down: bool) -> Vec<f64> {
    let kernel: [f64; 5] = if down { [-0.25, -0.75, 0.0, 0.75, 0.25] } else { [0.25, 0.75, 0.0, -0.75, -0.25] };
    let n = y.len();
    if n < 5 {
        return y.to_vec();
    }
    let mut out = vec![0.0; n];
    for i in 0..n {
        let mut acc = 0.0;
        for (k, &c) in kernel.iter().enumerate() {
            let offset = k as isize - 2;
            let idx = (i as isize + offset).clamp(0, n as isize - 1) as usize;
            acc += c * y[idx];
        }
        out[i] = acc;
    }
    let y_max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let out_max = out.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if out_max > 0.0 {
        let scale = y_max / out_max;
        for v in &mut out {
            *v *= scale;
        }
    }
    out
}

fn estimate_from_edge(x: &[f64], y: &[f64], config: &FitConfig, down: bool) -> (Vec<f64>, Vec<Constraint>) {
    let filtered = edge_filter(y, down);
    let zero_bg = vec![0.0; y.len()];
    let (params, cons) = estimate_height_position_fwhm(x, &filtered, &zero_bg, 1.0, config);
    if params.is_empty() {
        return (params, cons);
    }
    let n_peaks = params.len() / 3;
    let largest = (0..n_peaks).max_by(|&a, &b| params[a * 3].partial_cmp(&params[b * 3]).unwrap()).unwrap_or(0);
    let mut out_params = params[largest * 3..largest * 3 + 3].to_vec();
    let y_max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let y_min = y.iter().cloned().fold(f64::INFINITY, f64::min);
    out_params[0] = y_max - y_min;

    let out_cons = if config.no_constraints_flag {
        vec![Constraint::Free; 3]
    } else {
        let xmin = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let xmax = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        vec![
            if config.positive_height_area_flag { Constraint::Positive } else { Constraint::Free },
            if config.quoted_position_flag { Constraint::Quoted { min: xmin, max: xmax } } else { Constraint::Free },
            if config.positive_fwhm_flag { Constraint::Positive } else { Constraint::Free },
        ]
    };
    (out_params, out_cons)
}

pub fn estimate_down(x: &[f64], y: &[f64], _bg: &[f64], _yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_from_edge(x, y, config, true)
}

pub fn estimate_up(x: &[f64], y: &[f64], _bg: &[f64], _yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_from_edge(x, y, config, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_down_descends_from_height_to_zero() {
        let top = step_down_value(-100.0, 10.0, 0.0, 5.0);
        let bottom = step_down_value(100.0, 10.0, 0.0, 5.0);
        assert!(top > 9.0);
        assert!(bottom < 1.0);
    }

    #[test]
    fn step_up_is_mirror_of_step_down() {
        for x in [-10.0, -3.0, 0.0, 7.0] {
            let down = step_down_value(x, 10.0, 0.0, 5.0);
            let up = step_up_value(-x, 10.0, 0.0, 5.0);
            assert!((down - up).abs() < 1e-9);
        }
    }
}
