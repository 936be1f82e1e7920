//! The external nonlinear least-squares solver collaborator. The core treats
//! the solver as a black box behind [`solve`]; the actual Levenberg-Marquardt
//! iteration is supplied by the `rmpfit` crate.
//!
//! `rmpfit` has no native notion of `Factor`/`Delta`/`Sum` constraints (they
//! are algebraic substitutions, not box/fixed bounds), so this module lowers
//! the full parameter vector to a reduced free-parameter vector before
//! handing it to `rmpfit`, and reconstructs dependents from their defining
//! parameter inside the model-evaluation closure on every call.

use crate::constraint::Constraint;
use crate::error::FitError;
use rmpfit::{MPConfig, MPFitter, MPPar, MPResult as RmpResult};

/// `model(params, x) -> y`, the solver's model contract.
pub type Model<'a> = dyn Fn(&[f64], &[f64]) -> Vec<f64> + 'a;

pub struct SolveResult {
    pub params: Vec<f64>,
    pub chisq: f64,
    pub sigma: Vec<f64>,
}

/// Solve `y ~ model(params, x)` starting from `p0`, honoring `constraints`
/// (same length as `p0`). `max_iter` of `0` asks `rmpfit` to only validate
/// and report uncertainties at the initial point (used by the bounded
/// pre-fit inside the common peak estimator).
pub fn solve(
    model: &Model<'_>,
    x: &[f64],
    y: &[f64],
    sigma: &[f64],
    p0: &[f64],
    constraints: &[Constraint],
    max_iter: usize,
) -> Result<SolveResult, FitError> {
    let free_idx: Vec<usize> = constraints
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Constraint::Free | Constraint::Positive | Constraint::Quoted { .. }))
        .map(|(i, _)| i)
        .collect();
    if free_idx.is_empty() {
        return Err(FitError::SolverFailure("no free parameters to fit".into()));
    }

    let mp_pars: Vec<MPPar> = free_idx
        .iter()
        .map(|&i| match constraints[i] {
            Constraint::Positive => MPPar { limited_low: true, limit_low: 0.0, ..MPPar::new() },
            Constraint::Quoted { min, max } => {
                MPPar { limited_low: true, limited_up: true, limit_low: min, limit_up: max, ..MPPar::new() }
            }
            _ => MPPar::new(),
        })
        .collect();

    let mut xall: Vec<f64> = free_idx.iter().map(|&i| p0[i]).collect();

    let mut fitter = Fitter {
        model,
        x,
        y,
        sigma,
        full: p0.to_vec(),
        free_idx: &free_idx,
        constraints,
        mp_pars,
        config: MPConfig { max_iter, ..MPConfig::default() },
    };

    let status = fitter
        .mpfit(&mut xall)
        .map_err(|e| FitError::SolverFailure(e.to_string()))?;

    fitter.resolve(&xall);
    let full = fitter.full.clone();

    let mut sigma_out = vec![0.0; full.len()];
    for (k, &i) in free_idx.iter().enumerate() {
        sigma_out[i] = status.xerror[k];
    }
    for (i, c) in constraints.iter().enumerate() {
        match *c {
            Constraint::Factor { j, ratio } => sigma_out[i] = sigma_out[j] * ratio.abs(),
            Constraint::Delta { j, .. } | Constraint::Sum { j, .. } => sigma_out[i] = sigma_out[j],
            _ => {}
        }
    }

    if !status.best_norm.is_finite() {
        return Err(FitError::SolverFailure("chi-square is not finite".into()));
    }

    Ok(SolveResult { params: full, chisq: status.best_norm, sigma: sigma_out })
}

struct Fitter<'a> {
    model: &'a Model<'a>,
    x: &'a [f64],
    y: &'a [f64],
    sigma: &'a [f64],
    full: Vec<f64>,
    free_idx: &'a [usize],
    constraints: &'a [Constraint],
    mp_pars: Vec<MPPar>,
    config: MPConfig,
}

impl Fitter<'_> {
    fn resolve(&mut self, free_values: &[f64]) {
        for (k, &i) in self.free_idx.iter().enumerate() {
            self.full[i] = free_values[k];
        }
        for (i, c) in self.constraints.iter().enumerate() {
            match *c {
                Constraint::Factor { j, ratio } => self.full[i] = ratio * self.full[j],
                Constraint::Delta { j, delta } => self.full[i] = self.full[j] - delta,
                Constraint::Sum { j, sum } => self.full[i] = sum - self.full[j],
                _ => {}
            }
        }
    }
}

impl MPFitter for Fitter<'_> {
    fn eval(&mut self, params: &[f64], deviates: &mut [f64]) -> RmpResult<()> {
        self.resolve(params);
        let yfit = (self.model)(&self.full, self.x);
        for ((d, &yi), &fi) in deviates.iter_mut().zip(self.y.iter()).zip(yfit.iter()) {
            *d = yi - fi;
        }
        for (k, d) in deviates.iter_mut().enumerate() {
            let s = self.sigma.get(k).copied().unwrap_or(1.0);
            let s = if s == 0.0 { 1.0 } else { s };
            *d /= s;
            if !d.is_finite() {
                return Err(rmpfit::MPError::Nan);
            }
        }
        Ok(())
    }

    fn number_of_points(&self) -> usize {
        self.x.len()
    }

    fn config(&self) -> &MPConfig {
        &self.config
    }

    fn parameters(&self) -> &[MPPar] {
        &self.mp_pars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_a_linear_fit() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 + 3.0 * xi).collect();
        let sigma = vec![1.0; x.len()];
        let model = |p: &[f64], x: &[f64]| x.iter().map(|&xi| p[0] + p[1] * xi).collect();
        let constraints = vec![Constraint::Free, Constraint::Free];
        let result = solve(&model, &x, &y, &sigma, &[0.0, 0.0], &constraints, 200).unwrap();
        assert!((result.params[0] - 2.0).abs() < 1e-6);
        assert!((result.params[1] - 3.0).abs() < 1e-6);
        assert!(result.chisq < 1e-6);
    }

    #[test]
    fn respects_factor_constraint() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 4.0 + 8.0 * xi).collect();
        let sigma = vec![1.0; x.len()];
        let model = |p: &[f64], x: &[f64]| x.iter().map(|&xi| p[0] + p[1] * xi).collect();
        let constraints = vec![Constraint::Free, Constraint::Factor { j: 0, ratio: 2.0 }];
        let result = solve(&model, &x, &y, &sigma, &[1.0, 2.0], &constraints, 200).unwrap();
        assert!((result.params[0] - 4.0).abs() < 1e-6);
        assert!((result.params[1] - 2.0 * result.params[0]).abs() < 1e-9);
    }

    #[test]
    fn no_free_parameters_is_a_solver_failure() {
        let x = vec![0.0, 1.0];
        let y = vec![0.0, 1.0];
        let sigma = vec![1.0, 1.0];
        let model = |p: &[f64], x: &[f64]| x.iter().map(|&xi| p[0] * xi).collect();
        let constraints = vec![Constraint::Fixed];
        assert!(solve(&model, &x, &y, &sigma, &[1.0], &constraints, 200).is_err());
    }
}
