//! Periodic Gaussian theory (`n = 5`: N, Delta, Height, Position, FWHM) — a
//! single comb of `N` identical Gaussians spaced by `Delta`, common for
//! equally-spaced level structures.

use super::gaussian_value;
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::peak_search::{guess_fwhm, peak_search};

pub const N: usize = 5;
pub const PARAMETER_NAMES: [&str; N] = ["N", "Delta", "Height", "Position", "FWHM"];

/// A single comb: `N` rounds down to the nearest integer `>= 1` and is
/// evaluated as `sum_{i=0}^{count-1} gaussian(x; Height, Position + i*Delta, FWHM)`.
fn periodic_value(x: f64, p: &[f64]) -> f64 {
    let count = (p[0].round().max(1.0)) as usize;
    let delta = p[1];
    let height = p[2];
    let position = p[3];
    let fwhm = p[4];
    (0..count).map(|i| gaussian_value(x, height, position + i as f64 * delta, fwhm)).sum()
}

pub fn evaluate(params: &[f64], x: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|&xi| params.chunks(N).map(|p| periodic_value(xi, p)).sum())
        .collect()
}

/// `N = #peaks`, `Delta = mean spacing`, `Height = mean peak height`,
/// `Position = x[first peak]`, `FWHM = search FWHM`. `N` is fixed; `Delta` is
/// fixed only for a single peak, since a lone peak carries no spacing
/// information to optimize against.
pub fn estimate(x: &[f64], y: &[f64], bg: &[f64], yscaling: f64, config: &FitConfig) -> (Vec<f64>, Vec<Constraint>) {
    let yscaling = if yscaling == 0.0 { 1.0 } else { yscaling };
    let search_fwhm = if config.auto_fwhm { guess_fwhm(y) } else { config.fwhm_points as usize }.max(3);
    let sensitivity = config.sensitivity.max(1.0);

    if (y.len() as f64) <= 1.5 * search_fwhm as f64 {
        return (Vec::new(), Vec::new());
    }
    let scaled: Vec<f64> = y.iter().map(|v| v.abs() * yscaling).collect();
    let peaks = peak_search(&scaled, search_fwhm, sensitivity);
    if peaks.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let diff: Vec<f64> = y.iter().enumerate().map(|(i, yi)| yi - bg.get(i).copied().unwrap_or(0.0)).collect();
    let count = peaks.len();
    let heights: Vec<f64> = peaks.iter().map(|&p| diff[p]).collect();
    let mean_height = heights.iter().sum::<f64>() / count as f64;
    let positions: Vec<f64> = peaks.iter().map(|&p| x[p]).collect();
    let delta = if count > 1 {
        let spacings: Vec<f64> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        spacings.iter().sum::<f64>() / spacings.len() as f64
    } else {
        0.0
    };

    let fwhm_x = {
        let idx = search_fwhm.min(x.len() - 1);
        (x[idx] - x[0]).abs()
    };

    let params = vec![count as f64, delta, mean_height, positions[0], fwhm_x];
    let constraints = if config.no_constraints_flag {
        vec![
            Constraint::Fixed,
            if count > 1 { Constraint::Free } else { Constraint::Fixed },
            Constraint::Free,
            Constraint::Free,
            Constraint::Free,
        ]
    } else {
        vec![
            Constraint::Fixed,
            if count > 1 { Constraint::Free } else { Constraint::Fixed },
            if config.positive_height_area_flag { Constraint::Positive } else { Constraint::Free },
            if config.quoted_position_flag {
                let xmin = x.iter().cloned().fold(f64::INFINITY, f64::min);
                let xmax = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                Constraint::Quoted { min: xmin, max: xmax }
            } else {
                Constraint::Free
            },
            if config.positive_fwhm_flag { Constraint::Positive } else { Constraint::Free },
        ]
    };
    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_sum_matches_individual_gaussians() {
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let params = [5.0, 20.0, 100.0, 10.0, 8.0];
        let periodic = evaluate(&params, &x);
        let direct: Vec<f64> = x.iter().map(|&xi| (0..5).map(|i| gaussian_value(xi, 100.0, 10.0 + i as f64 * 20.0, 8.0)).sum()).collect();
        for i in 0..x.len() {
            assert!((periodic[i] - direct[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn estimator_recovers_five_equally_spaced_peaks() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| 1.0 + (0..5).map(|i| gaussian_value(xi, 500.0, 100.0 + i as f64 * 150.0, 20.0)).sum::<f64>())
            .collect();
        let bg = vec![1.0; y.len()];
        let config = FitConfig { auto_fwhm: true, ..FitConfig::default() };
        let (params, constraints) = estimate(&x, &y, &bg, 1.0, &config);
        assert_eq!(params[0], 5.0);
        assert!((params[1] - 150.0).abs() < 1.0);
        assert!((params[3] - 100.0).abs() < 5.0);
        assert_eq!(constraints[0], Constraint::Fixed);
        assert_eq!(constraints[1], Constraint::Free);
    }

    #[test]
    fn single_peak_fixes_delta() {
        let x: Vec<f64> = (0..500).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + gaussian_value(xi, 1000.0, 250.0, 20.0)).collect();
        let bg = vec![1.0; y.len()];
        let config = FitConfig::default();
        let (params, constraints) = estimate(&x, &y, &bg, 1.0, &config);
        assert_eq!(params[0], 1.0);
        assert_eq!(constraints[1], Constraint::Fixed);
    }
}
