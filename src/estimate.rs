//! The common peak-shape estimator heuristic, shared by every
//! Gaussian-family theory's own estimator.

use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::models::gaussian_value;
use crate::peak_search::{guess_fwhm, peak_search};
use crate::solver;

/// `n = 3` initial `(Height, Position, FWHM)` guesses per detected peak,
/// plus the constraint block the config's toggles imply.
///
/// Resolves search FWHM/sensitivity, runs [`peak_search`], seeds
/// height/position/width per peak, refines with a short bounded pre-fit,
/// then assembles the final per-peak constraints from the configuration's
/// toggles.
pub fn estimate_height_position_fwhm(
    x: &[f64],
    y: &[f64],
    bg: &[f64],
    yscaling: f64,
    config: &FitConfig,
) -> (Vec<f64>, Vec<Constraint>) {
    let yscaling = if yscaling == 0.0 { 1.0 } else { yscaling };
    let search_fwhm = if config.auto_fwhm { guess_fwhm(y) } else { config.fwhm_points as usize }.max(3);
    let sensitivity = config.sensitivity.max(1.0);

    let diff: Vec<f64> = y.iter().enumerate().map(|(i, yi)| yi - bg.get(i).copied().unwrap_or(0.0)).collect();

    let mut peaks: Vec<usize> = if (y.len() as f64) > 1.5 * search_fwhm as f64 {
        let scaled: Vec<f64> = y.iter().map(|v| v.abs() * yscaling).collect();
        peak_search(&scaled, search_fwhm, sensitivity)
    } else {
        Vec::new()
    };

    if peaks.is_empty() && config.force_peak_presence && !diff.is_empty() {
        let (argmax, _) = diff
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        peaks.push(argmax);
        log::warn!("no peaks found by search; forcing one peak at the global maximum (ForcePeakPresence)");
    }

    if peaks.is_empty() || x.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let n_points = x.len() as f64;
    let span = (x[x.len() - 1] - x[0]).abs();
    let mut params = Vec::with_capacity(peaks.len() * 3);
    let mut index_largest = 0usize;
    let mut largest_height = f64::NEG_INFINITY;
    for (i, &p) in peaks.iter().enumerate() {
        let height = diff[p];
        let position = x[p];
        let fwhm = 5.0 * span / n_points;
        params.extend_from_slice(&[height, position, fwhm]);
        if height > largest_height {
            largest_height = height;
            index_largest = i;
        }
    }

    // Bounded pre-fit: heights positive, positions quoted within +/- half the
    // search-FWHM span, widths positive.
    let fwhm_idx = search_fwhm.min(x.len() - 1);
    let fwhmx = (x[fwhm_idx] - x[0]).abs();
    let mut pre_cons = Vec::with_capacity(peaks.len() * 3);
    for i in 0..peaks.len() {
        let position = params[i * 3 + 1];
        pre_cons.push(Constraint::Positive);
        pre_cons.push(Constraint::Quoted { min: position - 0.5 * fwhmx, max: position + 0.5 * fwhmx });
        pre_cons.push(Constraint::Positive);
    }
    let sigma = vec![1.0; y.len()];
    let model = |p: &[f64], x: &[f64]| {
        let mut out = vec![0.0; x.len()];
        for (i, xi) in x.iter().enumerate() {
            out[i] = (0..p.len() / 3).map(|g| gaussian_value(*xi, p[g * 3], p[g * 3 + 1], p[g * 3 + 2])).sum();
        }
        out
    };
    match solver::solve(&model, x, y, &sigma, &params, &pre_cons, 4) {
        Ok(result) => params = result.params,
        Err(e) => log::debug!("peak pre-fit did not converge, keeping raw seed values: {e}"),
    }

    let xmin = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let xmax = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut constraints = Vec::with_capacity(peaks.len() * 3);
    for i in 0..peaks.len() {
        if config.no_constraints_flag {
            constraints.push(Constraint::Free);
            constraints.push(Constraint::Free);
            constraints.push(Constraint::Free);
            continue;
        }
        constraints.push(if config.positive_height_area_flag { Constraint::Positive } else { Constraint::Free });
        constraints.push(if config.quoted_position_flag {
            Constraint::Quoted { min: xmin, max: xmax }
        } else {
            Constraint::Free
        });
        let fwhm_constraint = if config.same_fwhm_flag && i != index_largest {
            Constraint::Factor { j: index_largest * 3 + 2, ratio: 1.0 }
        } else if config.positive_fwhm_flag {
            Constraint::Positive
        } else {
            Constraint::Free
        };
        constraints.push(fwhm_constraint);
    }

    (params, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(x: f64, height: f64, pos: f64, fwhm: f64) -> f64 {
        gaussian_value(x, height, pos, fwhm)
    }

    #[test]
    fn seeds_two_peaks_with_matching_length_blocks() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + gaussian(xi, 1500.0, 100.0, 50.0) + gaussian(xi, 1500.0, 700.0, 50.0)).collect();
        let bg = vec![1.0; y.len()];
        let config = FitConfig { auto_fwhm: true, ..FitConfig::default() };
        let (params, constraints) = estimate_height_position_fwhm(&x, &y, &bg, 1.0, &config);
        assert_eq!(params.len(), 6);
        assert_eq!(constraints.len(), 6);
    }

    #[test]
    fn same_fwhm_flag_ties_non_largest_peak() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + gaussian(xi, 3000.0, 100.0, 50.0) + gaussian(xi, 1000.0, 700.0, 50.0)).collect();
        let bg = vec![1.0; y.len()];
        let config = FitConfig { same_fwhm_flag: true, auto_fwhm: true, ..FitConfig::default() };
        let (_, constraints) = estimate_height_position_fwhm(&x, &y, &bg, 1.0, &config);
        assert_eq!(constraints[2], Constraint::Positive);
        assert_eq!(constraints[5], Constraint::Factor { j: 2, ratio: 1.0 });
    }

    #[test]
    fn no_constraints_flag_overrides_every_other_toggle() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + gaussian(xi, 3000.0, 100.0, 50.0) + gaussian(xi, 1000.0, 700.0, 50.0)).collect();
        let bg = vec![1.0; y.len()];
        let config = FitConfig {
            no_constraints_flag: true,
            same_fwhm_flag: true,
            positive_height_area_flag: true,
            positive_fwhm_flag: true,
            quoted_position_flag: true,
            auto_fwhm: true,
            ..FitConfig::default()
        };
        let (_, constraints) = estimate_height_position_fwhm(&x, &y, &bg, 1.0, &config);
        assert!(constraints.iter().all(|c| *c == Constraint::Free));
    }
}
