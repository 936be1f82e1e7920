//! Slit theory (`n = 4`: Height, Position, FWHM, BeamFWHM) — a plateau with
//! smoothed (beam-convolved) edges.

use super::step::edge_filter;
use super::{erfc, fwhm_to_sigma, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::estimate::estimate_height_position_fwhm;

pub const N: usize = 4;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "FWHM", "BeamFWHM"];

fn erf(z: f64) -> f64 {
    1.0 - erfc(z)
}

pub fn slit_value(x: f64, height: f64, position: f64, fwhm: f64, beamfwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(beamfwhm);
    if sigma <= 0.0 {
        return 0.0;
    }
    let half_width = fwhm / 2.0;
    let z1 = (x - (position - half_width)) / (std::f64::consts::SQRT_2 * sigma);
    let z2 = (x - (position + half_width)) / (std::f64::consts::SQRT_2 * sigma);
    0.5 * height * (erf(z1) - erf(z2))
}

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| slit_value(xi, p[0], p[1], p[2], p[3]))
}

fn half_max_region(xd: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let n = y.len();
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }
    let (imax, hmax) = y.iter().enumerate().fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v >= acc.1 { (i, v) } else { acc });
    let half = 0.5 * hmax;
    let mut lo = imax;
    while lo > 0 && y[lo] > half {
        lo -= 1;
    }
    let mut hi = imax;
    while hi < n - 1 && y[hi] > half {
        hi += 1;
    }
    let position = xd[imax];
    let spacing = if n > 1 { (xd[n - 1] - xd[0]) / (n - 1) as f64 } else { 1.0 };
    let fwhm = ((hi as isize - lo as isize - 1).max(1) as f64) * spacing.abs();
    (hmax, position, fwhm)
}

/// Runs both edge estimators (`estimate_upstep`/`estimate_downstep`
/// equivalents), derives `fwhm` from the separation of their two edges, and
/// estimates `beamfwhm` as the average of *both* edges' widths (not a
/// width/position mix), clamped against the plateau width and floored by the
/// data's sampling resolution.
pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], _yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    if x.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let zero_bg = vec![0.0; y.len()];
    let up_filtered = edge_filter(y, false);
    let down_filtered = edge_filter(y, true);
    let (up_params, _) = estimate_height_position_fwhm(x, &up_filtered, &zero_bg, 1.0, config);
    let (down_params, _) = estimate_height_position_fwhm(x, &down_filtered, &zero_bg, 1.0, config);
    if up_params.is_empty() || down_params.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let largest_up = (0..up_params.len() / 3).max_by(|&a, &b| up_params[a * 3].partial_cmp(&up_params[b * 3]).unwrap()).unwrap_or(0);
    let largest_down = (0..down_params.len() / 3).max_by(|&a, &b| down_params[a * 3].partial_cmp(&down_params[b * 3]).unwrap()).unwrap_or(0);
    let up = &up_params[largest_up * 3..largest_up * 3 + 3];
    let down = &down_params[largest_down * 3..largest_down * 3 + 3];

    let fwhm = (down[1] - up[1]).abs();
    let mut beamfwhm = 0.5 * (up[2] + down[2]);
    beamfwhm = beamfwhm.min(fwhm / 10.0);
    let spacing_floor = (x[x.len() - 1] - x[0]).abs() * 3.0 / x.len() as f64;
    beamfwhm = beamfwhm.max(spacing_floor);

    let diff: Vec<f64> = y.iter().enumerate().map(|(i, &yi)| yi - bg.get(i).copied().unwrap_or(0.0)).collect();
    let (height, position, fwhm_half_max) = half_max_region(x, &diff);

    let params = vec![height, position, fwhm_half_max.max(fwhm), beamfwhm];
    let constraints = if config.no_constraints_flag {
        vec![Constraint::Free; N]
    } else {
        let xmin = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let xmax = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        vec![
            if config.positive_height_area_flag { Constraint::Positive } else { Constraint::Free },
            if config.quoted_position_flag { Constraint::Quoted { min: xmin, max: xmax } } else { Constraint::Free },
            if config.positive_fwhm_flag { Constraint::Positive } else { Constraint::Free },
            Constraint::Positive,
        ]
    };
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_reaches_full_height_at_center() {
        let v = slit_value(0.0, 100.0, 0.0, 40.0, 2.0);
        assert!(v > 99.0);
    }

    #[test]
    fn plateau_vanishes_far_outside_width() {
        let v = slit_value(1000.0, 100.0, 0.0, 40.0, 2.0);
        assert!(v < 1e-6);
    }
}
