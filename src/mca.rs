//! MCA mode: segment the full spectrum into regions around detected peaks,
//! fit each region independently, and grow the model by discovering peaks
//! from the fit residuals.

use crate::baseline::guess_yscaling;
use crate::constraint::Constraint;
use crate::driver::{FitDriver, FitState, Parameter};
use crate::error::FitError;
use crate::peak_search::{guess_fwhm, peak_search};

const REGION_HALF_WIDTH_FWHM: f64 = 3.0;
const RESIDUAL_MASK_FWHM: f64 = 0.8;
const NEW_PEAK_QUOTE_FWHM: f64 = 0.5;
const CHISQ_THRESHOLD: f64 = 2.5;
const MAX_RESIDUAL_ITERATIONS: usize = 25;

/// One region's fit report: its window, the final parameter table, the
/// achieved `chisq`, and one numerically-integrated `(group, area,
/// uncertainty)` triple per peak group.
#[derive(Debug, Clone)]
pub struct RegionResult {
    pub window: (f64, f64),
    pub parameters: Vec<Parameter>,
    pub chisq: Option<f64>,
    pub areas: Vec<(usize, f64, f64)>,
}

/// Merges `±half_width` expansions of `positions` into non-overlapping
/// intervals.
pub fn group_regions(positions: &[f64], half_width: f64) -> Vec<(f64, f64)> {
    let mut intervals: Vec<(f64, f64)> = positions.iter().map(|&p| (p - half_width, p + half_width)).collect();
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for iv in intervals {
        if let Some(last) = merged.last_mut() {
            if iv.0 <= last.1 {
                last.1 = last.1.max(iv.1);
                continue;
            }
        }
        merged.push(iv);
    }
    merged
}

/// Picks the largest-magnitude normalized residual outside a
/// `±mask_half_width` window around every position in `existing_positions`.
fn find_residual_peak(
    x: &[f64],
    residuals: &[f64],
    existing_positions: &[f64],
    mask_half_width: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (&xi, &r)) in x.iter().zip(residuals.iter()).enumerate() {
        if existing_positions.iter().any(|&p| (xi - p).abs() <= mask_half_width) {
            continue;
        }
        let mag = r.abs();
        if best.is_none_or(|(_, bm)| mag > bm) {
            best = Some((i, mag));
        }
    }
    best.map(|(i, _)| i)
}

fn position_index(names: &[String]) -> Option<usize> {
    names.iter().position(|n| n == "Position")
}

fn width_index(names: &[String]) -> Option<usize> {
    names
        .iter()
        .position(|n| n == "FWHM")
        .or_else(|| names.iter().position(|n| n == "FWHM_low"))
        .or_else(|| names.iter().position(|n| n == "Width"))
}

/// Snapshots `fit_result` back into `estimate_value` so a follow-up
/// `start_fit` resumes from the best-known point rather than the original
/// estimate (`FitDriver::start_fit` always solves from `estimate_value`).
fn carry_forward_estimates(parameters: &mut [Parameter]) {
    for p in parameters.iter_mut() {
        if let Some(v) = p.fit_result {
            p.estimate_value = v;
        }
    }
}

/// Runs the full MCA loop over `driver`'s data. Restores the driver's data
/// window to the full spectrum before returning, regardless of the outcome.
pub fn run(driver: &mut FitDriver) -> Result<Vec<RegionResult>, FitError> {
    let (x_full, y_full, sigma_full) = {
        let (x, y, s) = driver.full_data();
        (x.to_vec(), y.to_vec(), s.to_vec())
    };
    let restore = || (x_full.clone(), y_full.clone(), sigma_full.clone());

    if x_full.is_empty() {
        return Ok(Vec::new());
    }

    let fwhm_samples = if driver.config.auto_fwhm { guess_fwhm(&y_full) } else { driver.config.fwhm_points as usize }.max(3);
    let scaling = if driver.config.auto_scaling {
        guess_yscaling(&y_full)
    } else if driver.config.yscaling == 0.0 {
        1.0
    } else {
        driver.config.yscaling
    };
    let sensitivity = driver.config.sensitivity.max(1.0);
    let scaled: Vec<f64> = y_full.iter().map(|v| v.abs() * scaling).collect();
    let peaks = peak_search(&scaled, fwhm_samples, sensitivity);

    let spacing = if x_full.len() > 1 { (x_full[x_full.len() - 1] - x_full[0]).abs() / (x_full.len() - 1) as f64 } else { 1.0 };
    let fwhm_x = fwhm_samples as f64 * spacing;

    let positions: Vec<f64> = peaks.iter().map(|&i| x_full[i]).collect();
    let regions = group_regions(&positions, REGION_HALF_WIDTH_FWHM * fwhm_x);

    let mut results = Vec::with_capacity(regions.len());
    for &(lo, hi) in &regions {
        let (x, y, s) = restore();
        driver.set_data(x, y, Some(s), Some(lo), Some(hi))?;
        driver.estimate()?;
        if driver.parameters().is_empty() {
            continue;
        }
        if driver.start_fit().is_err() {
            continue;
        }

        if driver.config.residuals_flag {
            let mut iterations = 0;
            while driver.chisq().is_some_and(|c| c > CHISQ_THRESHOLD) && iterations < MAX_RESIDUAL_ITERATIONS {
                if !try_add_residual_peak(driver, fwhm_x)? {
                    break;
                }
                iterations += 1;
            }
        }

        let areas = compute_areas(driver)?;
        results.push(RegionResult {
            window: (lo, hi),
            parameters: driver.parameters().to_vec(),
            chisq: driver.chisq(),
            areas,
        });
    }

    let (x, y, s) = restore();
    driver.set_data(x, y, Some(s), None, None)?;
    Ok(results)
}

/// One residual-discovery round: returns `false` when no new peak is
/// proposed (ending the loop).
fn try_add_residual_peak(driver: &mut FitDriver, fwhm_x: f64) -> Result<bool, FitError> {
    let (x, y, sigma) = {
        let (x, y, s) = driver.working_data();
        (x.to_vec(), y.to_vec(), s.to_vec())
    };
    let fitted = driver.generate_curve(Some(&x), None)?;
    let residuals: Vec<f64> = y
        .iter()
        .zip(fitted.iter())
        .zip(sigma.iter())
        .map(|((&yi, &fi), &si)| (yi - fi) / if si == 0.0 { 1.0 } else { si })
        .collect();

    let names = driver.theory_parameter_names()?.to_vec();
    let Some(pos_idx) = position_index(&names) else { return Ok(false) };
    let n_bg = driver.background_param_count()?;
    let n = driver.theory_param_count()?;

    let existing_positions: Vec<f64> = driver
        .parameters()
        .iter()
        .filter(|p| p.name.starts_with("Position"))
        .map(|p| p.fit_result.unwrap_or(p.estimate_value))
        .collect();

    let Some(candidate_idx) = find_residual_peak(&x, &residuals, &existing_positions, RESIDUAL_MASK_FWHM * fwhm_x) else {
        return Ok(false);
    };

    let candidate_x = x[candidate_idx];
    let candidate_height = y[candidate_idx] - fitted[candidate_idx];

    let first_peak_fwhm_idx = match width_index(&names) {
        Some(w) => n_bg + w,
        None => return Ok(false),
    };
    let first_peak_fwhm = driver.parameters()[first_peak_fwhm_idx].fit_result.unwrap_or(driver.parameters()[first_peak_fwhm_idx].estimate_value);
    let first_group_base = n_bg;

    let mut new_values = vec![0.0; n];
    let mut new_constraints = vec![Constraint::Fixed; n];
    new_values[pos_idx] = candidate_x;
    new_constraints[pos_idx] = Constraint::Quoted {
        min: candidate_x - NEW_PEAK_QUOTE_FWHM * fwhm_x,
        max: candidate_x + NEW_PEAK_QUOTE_FWHM * fwhm_x,
    };
    if let Some(w) = width_index(&names) {
        new_values[w] = first_peak_fwhm;
        new_constraints[w] = Constraint::Factor { j: first_peak_fwhm_idx, ratio: 1.0 };
    }
    let height_slot = 0;
    let seed_is_area = names.first().is_some_and(|n| n.contains("Area"));
    new_values[height_slot] = if seed_is_area {
        crate::models::gauss_height_to_area(candidate_height, first_peak_fwhm)
    } else {
        candidate_height
    };
    new_constraints[height_slot] = Constraint::Positive;
    for slot in 0..n {
        if slot != pos_idx && Some(slot) != width_index(&names) && slot != height_slot {
            new_values[slot] = driver.parameters()[first_group_base + slot].fit_result.unwrap_or(driver.parameters()[first_group_base + slot].estimate_value);
            new_constraints[slot] = Constraint::Free;
        }
    }

    let next_group = driver.parameters().iter().map(|p| p.group).max().unwrap_or(0) + 1;
    carry_forward_estimates(driver.parameters_mut());
    let xmin = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let xmax = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    for (slot, (&value, &cons)) in new_values.iter().zip(new_constraints.iter()).enumerate() {
        driver.parameters_mut().push(Parameter {
            name: format!("{}{}", names[slot], next_group),
            group: next_group,
            estimate_value: value,
            fit_result: None,
            uncertainty: None,
            constraint: cons,
            xmin,
            xmax,
        });
    }
    driver.set_state(FitState::ReadyToFit);
    driver.start_fit()?;
    Ok(true)
}

fn compute_areas(driver: &FitDriver) -> Result<Vec<(usize, f64, f64)>, FitError> {
    let names = driver.theory_parameter_names()?.to_vec();
    let Some(pos_idx) = position_index(&names) else { return Ok(Vec::new()) };
    let Some(w_idx) = width_index(&names) else { return Ok(Vec::new()) };
    let n = driver.theory_param_count()?;
    let n_bg = driver.background_param_count()?;

    let mut areas = Vec::new();
    let groups: Vec<usize> = {
        let mut g: Vec<usize> = driver.parameters().iter().filter(|p| p.group > 0).map(|p| p.group).collect();
        g.sort_unstable();
        g.dedup();
        g
    };
    for group in groups {
        let base = n_bg + (group - 1) * n;
        if base + n > driver.parameters().len() {
            continue;
        }
        let position = driver.parameters()[base + pos_idx].fit_result.unwrap_or(driver.parameters()[base + pos_idx].estimate_value);
        let fwhm = driver.parameters()[base + w_idx].fit_result.unwrap_or(driver.parameters()[base + w_idx].estimate_value);
        let (area, uncertainty) = driver.peak_area(group, position, fwhm)?;
        areas.push((group, area, uncertainty));
    }
    Ok(areas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_expansions_merge_into_one_region() {
        let regions = group_regions(&[100.0, 110.0, 500.0], 30.0);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].0 <= 70.0 && regions[0].1 >= 140.0);
    }

    #[test]
    fn well_separated_peaks_stay_in_distinct_regions() {
        let regions = group_regions(&[100.0, 700.0], 30.0);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn mca_on_two_well_separated_gaussians_finds_two_regions() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        driver.config.auto_fwhm = true;
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| {
                1.0 + crate::models::gaussian_value(xi, 1500.0, 100.0, 50.0)
                    + crate::models::gaussian_value(xi, 1500.0, 700.0, 50.0)
            })
            .collect();
        driver.set_data(x, y, None, None, None).unwrap();
        let regions = driver.mca_fit().unwrap();
        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert!(region.chisq.unwrap().is_finite());
            assert_eq!(region.areas.len(), 1);
        }
    }
}
