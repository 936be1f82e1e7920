//! Hypermet theory (`n = 8`: G_Area, Position, FWHM, ST_Area, ST_Slope,
//! LT_Area, LT_Slope, Step_H) — Gaussian core plus short/long exponential
//! tails plus a step, common in X-ray spectroscopy.

use super::gaussian::estimate_area as gaussian_estimate_area;
use super::{erfc, fwhm_to_sigma, gauss_area_to_height, gaussian_value, sum_peaks};
use crate::config::FitConfig;
use crate::constraint::Constraint;

pub const N: usize = 8;
pub const PARAMETER_NAMES: [&str; N] =
    ["G_Area", "Position", "FWHM", "ST_Area", "ST_Slope", "LT_Area", "LT_Slope", "Step_H"];

/// Decodes the 4-bit `HypermetTails` mask into `(gaussian, short_tail, long_tail, step)`.
pub fn decode_tails_mask(mask: u8) -> (bool, bool, bool, bool) {
    (mask & 0b0001 != 0, mask & 0b0010 != 0, mask & 0b0100 != 0, mask & 0b1000 != 0)
}

fn exponential_tail(x: f64, pos: f64, sigma: f64, area: f64, slope: f64) -> f64 {
    if area == 0.0 || slope <= 0.0 || sigma <= 0.0 {
        return 0.0;
    }
    let a = (x - pos) / (slope * sigma) + 1.0 / (2.0 * slope * slope);
    let b = (x - pos) / (std::f64::consts::SQRT_2 * sigma) + 1.0 / (std::f64::consts::SQRT_2 * slope);
    // Guard against exp() overflow far from the peak, where erfc(b) already
    // underflows to zero and the product is zero regardless.
    if a > 700.0 {
        return 0.0;
    }
    area / (2.0 * slope * sigma) * a.exp() * erfc(b)
}

fn hypermet_value(x: f64, p: &[f64]) -> f64 {
    let (g_area, pos, fwhm, st_area, st_slope, lt_area, lt_slope, step_h) =
        (p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]);
    let sigma = fwhm_to_sigma(fwhm);
    if sigma <= 0.0 {
        return 0.0;
    }
    let g_term = gaussian_value(x, gauss_area_to_height(g_area, fwhm), pos, fwhm);
    let st_term = exponential_tail(x, pos, sigma, st_area, st_slope);
    let lt_term = exponential_tail(x, pos, sigma, lt_area, lt_slope);
    let step_term = 0.5 * step_h * erfc((x - pos) / (std::f64::consts::SQRT_2 * sigma));
    g_term + st_term + lt_term + step_term
}

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, hypermet_value)
}

pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let (params3, cons3) = gaussian_estimate_area(x, y, bg, yscaling, config);
    if params3.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let n_peaks = params3.len() / 3;
    let (gauss_on, short_on, long_on, step_on) = decode_tails_mask(config.hypermet_tails);

    let heights: Vec<f64> = params3.chunks(3).map(|p| gauss_area_to_height(p[0], p[2])).collect();
    let main_peak = if config.same_fwhm_flag {
        (0..n_peaks).find(|&i| !matches!(cons3[i * 3 + 2], Constraint::Factor { .. })).unwrap_or(0)
    } else {
        (0..n_peaks).max_by(|&a, &b| heights[a].partial_cmp(&heights[b]).unwrap()).unwrap_or(0)
    };

    let mut params = Vec::with_capacity(n_peaks * N);
    let mut constraints = Vec::with_capacity(n_peaks * N);
    for i in 0..n_peaks {
        let area = params3[i * 3];
        let position = params3[i * 3 + 1];
        let fwhm = params3[i * 3 + 2];
        let height = heights[i];
        let scaled_area = area * yscaling;
        let scaled_height = height * yscaling;

        let gauss_area = if gauss_on { area } else { 0.0 };
        let gauss_area_cons = if gauss_on { cons3[i * 3] } else { Constraint::Fixed };
        let gauss_pos_cons = if config.hypermet_quoted_position_flag {
            Constraint::Quoted { min: position - config.delta_position_fwhm_units * fwhm, max: position + config.delta_position_fwhm_units * fwhm }
        } else {
            cons3[i * 3 + 1]
        };
        let gauss_fwhm_cons = if config.same_fwhm_flag && i != main_peak {
            Constraint::Factor { j: main_peak * N + 2, ratio: 1.0 }
        } else {
            cons3[i * 3 + 2]
        };

        let short_enabled = short_on && scaled_area >= config.min_gauss_area_4_short_tail;
        let (st_area, st_area_cons) = if short_enabled {
            let seed = area * config.initial_short_tail_area_ratio;
            (seed, Constraint::Quoted { min: area * config.min_short_tail_area_ratio, max: area * config.max_short_tail_area_ratio })
        } else {
            (0.0, Constraint::Fixed)
        };
        let (st_slope, st_slope_cons) = if short_enabled {
            (config.initial_short_tail_slope_ratio, Constraint::Quoted { min: config.min_short_tail_slope_ratio, max: config.max_short_tail_slope_ratio })
        } else {
            (0.0, Constraint::Fixed)
        };

        let long_enabled = long_on && scaled_area >= config.min_gauss_area_4_long_tail;
        let (lt_area, lt_area_cons) = if long_enabled {
            let seed = area * config.initial_long_tail_area_ratio;
            (seed, Constraint::Quoted { min: area * config.min_long_tail_area_ratio, max: area * config.max_long_tail_area_ratio })
        } else {
            (0.0, Constraint::Fixed)
        };
        let (lt_slope, lt_slope_cons) = if long_enabled {
            (config.initial_long_tail_slope_ratio, Constraint::Quoted { min: config.min_long_tail_slope_ratio, max: config.max_long_tail_slope_ratio })
        } else {
            (0.0, Constraint::Fixed)
        };

        let step_enabled = step_on && scaled_height >= config.min_gauss_height_4_step_tail;
        let (step_h, step_h_cons) = if step_enabled {
            let seed = height * config.initial_step_tail_height_ratio;
            (seed, Constraint::Quoted { min: height * config.min_step_tail_height_ratio, max: height * config.max_step_tail_height_ratio })
        } else {
            (0.0, Constraint::Fixed)
        };

        let st_area_cons = if config.same_area_ratio_flag && i != main_peak {
            Constraint::Factor { j: main_peak * N + 3, ratio: 1.0 }
        } else {
            st_area_cons
        };
        let lt_area_cons = if config.same_area_ratio_flag && i != main_peak {
            Constraint::Factor { j: main_peak * N + 5, ratio: 1.0 }
        } else {
            lt_area_cons
        };
        let st_slope_cons = if config.same_slope_ratio_flag && i != main_peak {
            Constraint::Factor { j: main_peak * N + 4, ratio: 1.0 }
        } else {
            st_slope_cons
        };
        let lt_slope_cons = if config.same_slope_ratio_flag && i != main_peak {
            Constraint::Factor { j: main_peak * N + 6, ratio: 1.0 }
        } else {
            lt_slope_cons
        };

        params.extend_from_slice(&[gauss_area, position, fwhm, st_area, st_slope, lt_area, lt_slope, step_h]);
        if config.no_constraints_flag {
            constraints.extend_from_slice(&[Constraint::Free; N]);
        } else {
            constraints.extend_from_slice(&[
                gauss_area_cons,
                gauss_pos_cons,
                gauss_fwhm_cons,
                st_area_cons,
                st_slope_cons,
                lt_area_cons,
                lt_slope_cons,
                step_h_cons,
            ]);
        }
    }
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_terms_contribute_nothing() {
        let params = [1000.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let pure_gauss = gaussian_value(5.0, gauss_area_to_height(1000.0, 10.0), 0.0, 10.0);
        assert!((hypermet_value(5.0, &params) - pure_gauss).abs() < 1e-9);
    }

    #[test]
    fn mask_decodes_in_documented_bit_order() {
        assert_eq!(decode_tails_mask(15), (true, true, true, true));
        assert_eq!(decode_tails_mask(1), (true, false, false, false));
        assert_eq!(decode_tails_mask(8), (false, false, false, true));
    }
}
