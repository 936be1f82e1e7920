//! Atan theory (`n = 3`: Height, Position, Width) — an arctangent step,
//! reusing the up-step estimator verbatim.

use super::sum_peaks;
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::models::step::estimate_up;

pub const N: usize = 3;
pub const PARAMETER_NAMES: [&str; N] = ["Height", "Position", "Width"];

pub fn atan_value(x: f64, height: f64, position: f64, width: f64) -> f64 {
    if width == 0.0 {
        return 0.0;
    }
    height * (0.5 + ((x - position) / width).atan() / std::f64::consts::PI)
}

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    sum_peaks(x, params, N, |xi, p| atan_value(xi, p[0], p[1], p[2]))
}

/// Estimation is identical to the up-step estimator: an arctangent edge and
/// an error-function edge have the same gross shape (height, position,
/// transition width) under the common peak-search machinery.
pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    estimate_up(x, y, bg, yscaling, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atan_value_is_half_height_at_position() {
        let v = atan_value(0.0, 10.0, 0.0, 2.0);
        assert!((v - 5.0).abs() < 1e-9);
    }

    #[test]
    fn atan_value_saturates_far_from_position() {
        let hi = atan_value(1000.0, 10.0, 0.0, 2.0);
        let lo = atan_value(-1000.0, 10.0, 0.0, 2.0);
        assert!(hi > 9.9);
        assert!(lo < 0.1);
    }
}
