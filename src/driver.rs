//! The fit driver: owns the current data, theory
//! selection and parameter table, and orchestrates estimate -> solve ->
//! report. MCA mode lives in [`crate::mca`] as a set of helpers the driver
//! calls into, since it reuses the same estimate/fit cycle per region.

use serde_json::Value;

use crate::background::INTERNAL_N;
use crate::baseline::guess_yscaling;
use crate::config::FitConfig;
use crate::constraint::{rebase, Constraint};
use crate::error::FitError;
use crate::registry::{BackgroundRegistry, TheoryRegistry};

/// The fit's state machine: `chisq` and parameter
/// uncertainties are only meaningful once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Idle,
    EstimateInProgress,
    ReadyToFit,
    FitInProgress,
    Ready,
}

/// Payload of the single `FitStatusChanged` event,
/// fired at each state transition of `estimate` and `start_fit`.
#[derive(Debug, Clone, Copy)]
pub struct FitEvent {
    pub chisq: Option<f64>,
    pub status: FitState,
}

/// One entry in the parameter table: `group` is the peak
/// index (`0` for background parameters).
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub group: usize,
    pub estimate_value: f64,
    pub fit_result: Option<f64>,
    pub uncertainty: Option<f64>,
    pub constraint: Constraint,
    pub xmin: f64,
    pub xmax: f64,
}

/// `event_sink` is invoked synchronously on every transition; attach `None`
/// for a no-op sink — emission is then simply skipped.
pub struct FitDriver {
    pub theories: TheoryRegistry,
    pub backgrounds: BackgroundRegistry,
    pub config: FitConfig,
    theory_name: String,
    background_name: String,

    x_full: Vec<f64>,
    y_full: Vec<f64>,
    sigma_full: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    sigma: Vec<f64>,
    window: Option<(f64, f64)>,

    parameters: Vec<Parameter>,
    state: FitState,
    chisq: Option<f64>,

    event_sink: Option<Box<dyn Fn(FitEvent)>>,
}

impl FitDriver {
    /// Builds a driver over the built-in theory/background registries,
    /// selecting `theory_name`/`background_name` as the active pair.
    pub fn new(theory_name: &str, background_name: &str) -> Result<Self, FitError> {
        let theories = TheoryRegistry::with_builtins();
        let backgrounds = BackgroundRegistry::with_builtins();
        theories.get(theory_name)?;
        backgrounds.get(background_name)?;
        Ok(FitDriver {
            theories,
            backgrounds,
            config: FitConfig::default(),
            theory_name: theory_name.to_string(),
            background_name: background_name.to_string(),
            x_full: Vec::new(),
            y_full: Vec::new(),
            sigma_full: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            sigma: Vec::new(),
            window: None,
            parameters: Vec::new(),
            state: FitState::Idle,
            chisq: None,
            event_sink: None,
        })
    }

    pub fn with_event_sink(mut self, sink: impl Fn(FitEvent) + 'static) -> Self {
        self.event_sink = Some(Box::new(sink));
        self
    }

    fn emit(&self) {
        if let Some(sink) = &self.event_sink {
            sink(FitEvent { chisq: self.chisq, status: self.state });
        }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn chisq(&self) -> Option<f64> {
        self.chisq
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn theory_name(&self) -> &str {
        &self.theory_name
    }

    pub fn background_name(&self) -> &str {
        &self.background_name
    }

    pub fn select_theory(&mut self, name: &str) -> Result<(), FitError> {
        self.theories.get(name)?;
        self.theory_name = name.to_string();
        Ok(())
    }

    pub fn select_background(&mut self, name: &str) -> Result<(), FitError> {
        self.backgrounds.get(name)?;
        self.background_name = name.to_string();
        Ok(())
    }

    /// Replaces the working buffers, retaining the originals verbatim.
    /// `sigma` defaults to all-ones; `(xmin, xmax)` filters to a contiguous
    /// working view, matching the originals' `x ∈ [xmin, xmax]` selection.
    pub fn set_data(
        &mut self,
        x: Vec<f64>,
        y: Vec<f64>,
        sigma: Option<Vec<f64>>,
        xmin: Option<f64>,
        xmax: Option<f64>,
    ) -> Result<(), FitError> {
        if x.len() != y.len() {
            return Err(FitError::ShapeMismatch { expected: x.len(), found: y.len() });
        }
        let sigma = sigma.unwrap_or_else(|| vec![1.0; x.len()]);
        if sigma.len() != x.len() {
            return Err(FitError::ShapeMismatch { expected: x.len(), found: sigma.len() });
        }
        self.x_full = x;
        self.y_full = y;
        self.sigma_full = sigma;
        self.window = match (xmin, xmax) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };
        self.apply_window();
        self.state = FitState::Idle;
        Ok(())
    }

    fn apply_window(&mut self) {
        match self.window {
            Some((lo, hi)) => {
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                let mut ss = Vec::new();
                for i in 0..self.x_full.len() {
                    if self.x_full[i] >= lo && self.x_full[i] <= hi {
                        xs.push(self.x_full[i]);
                        ys.push(self.y_full[i]);
                        ss.push(self.sigma_full[i]);
                    }
                }
                self.x = xs;
                self.y = ys;
                self.sigma = ss;
            }
            None => {
                self.x = self.x_full.clone();
                self.y = self.y_full.clone();
                self.sigma = self.sigma_full.clone();
            }
        }
    }

    pub fn working_data(&self) -> (&[f64], &[f64], &[f64]) {
        (&self.x, &self.y, &self.sigma)
    }

    pub fn full_data(&self) -> (&[f64], &[f64], &[f64]) {
        (&self.x_full, &self.y_full, &self.sigma_full)
    }

    /// Merges a patch into the configuration, matching
    /// `configure(**kwargs)`'s case-insensitive key resolution. `fittheory`
    /// / `fitbkg` keys reselect the active theory/background rather than
    /// being interpreted as configuration fields; if the active theory
    /// exposes a configurator, its returned patch is merged afterward.
    pub fn configure(&mut self, patch: &Value) -> Result<(), FitError> {
        let Value::Object(map) = patch else {
            return Err(FitError::InvalidConfiguration("configure() patch must be a JSON object".into()));
        };
        let mut rest = serde_json::Map::new();
        for (key, value) in map {
            let lower = key.to_ascii_lowercase();
            if lower == "fittheory" {
                let name = value.as_str().ok_or_else(|| {
                    FitError::InvalidConfiguration("fittheory must be a string".into())
                })?;
                self.select_theory(name)?;
            } else if lower == "fitbkg" {
                let name = value.as_str().ok_or_else(|| {
                    FitError::InvalidConfiguration("fitbkg must be a string".into())
                })?;
                self.select_background(name)?;
            } else {
                rest.insert(key.clone(), value.clone());
            }
        }
        self.config.configure(&Value::Object(rest))?;
        if let Some(configurator) = self.theories.get(&self.theory_name)?.configure {
            let extra = configurator(&self.config);
            self.config.configure(&extra)?;
        }
        Ok(())
    }

    /// Estimate -> background estimator -> peak estimator -> merged
    /// parameter table.
    pub fn estimate(&mut self) -> Result<(), FitError> {
        self.state = FitState::EstimateInProgress;
        self.emit();

        let bg_entry = self.backgrounds.get(&self.background_name)?;
        let (bg_params, bg_cons, bg_curve) = (bg_entry.estimate)(&self.x, &self.y);
        let bg_curve = if bg_curve.is_empty() { vec![0.0; self.y.len()] } else { bg_curve };

        let yscaling = if self.config.auto_scaling {
            guess_yscaling(&self.y)
        } else if self.config.yscaling == 0.0 {
            1.0
        } else {
            self.config.yscaling
        };

        let theory_entry = self.theories.get(&self.theory_name)?;
        let (peak_params, mut peak_cons) = (theory_entry.estimate)(&self.x, &self.y, &bg_curve, yscaling, &self.config);
        rebase(&mut peak_cons, bg_params.len());

        let xmin = self.x.iter().cloned().fold(f64::INFINITY, f64::min);
        let xmax = self.x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut parameters = Vec::with_capacity(bg_params.len() + peak_params.len());
        for (i, (&value, &cons)) in bg_params.iter().zip(bg_cons.iter()).enumerate() {
            parameters.push(Parameter {
                name: bg_entry.parameter_names.get(i).cloned().unwrap_or_else(|| format!("Bg{i}")),
                group: 0,
                estimate_value: value,
                fit_result: None,
                uncertainty: None,
                constraint: cons,
                xmin,
                xmax,
            });
        }
        let n = theory_entry.n;
        for (i, (&value, &cons)) in peak_params.iter().zip(peak_cons.iter()).enumerate() {
            let peak_index = i / n + 1;
            let slot = i % n;
            let base_name = theory_entry.parameter_names.get(slot).cloned().unwrap_or_else(|| format!("P{slot}"));
            parameters.push(Parameter {
                name: format!("{base_name}{peak_index}"),
                group: peak_index,
                estimate_value: value,
                fit_result: None,
                uncertainty: None,
                constraint: cons,
                xmin,
                xmax,
            });
        }
        self.parameters = parameters;
        self.state = FitState::ReadyToFit;
        self.emit();
        Ok(())
    }

    /// Sum of the peak evaluator over `k = (len(params) - n_bg) / n_peak`
    /// groups plus the background evaluator.
    pub fn fitfunction(&self, params: &[f64], x: &[f64]) -> Result<Vec<f64>, FitError> {
        let bg_entry = self.backgrounds.get(&self.background_name)?;
        let theory_entry = self.theories.get(&self.theory_name)?;
        let n_bg = bg_entry.n;
        if params.len() < n_bg {
            return Err(FitError::ShapeMismatch { expected: n_bg, found: params.len() });
        }
        let bg_params = &params[..n_bg];
        let peak_params = &params[n_bg..];
        let bg_curve = (bg_entry.evaluate)(bg_params, x, &self.y);
        let peak_curve = (theory_entry.evaluate)(peak_params, x);
        Ok(bg_curve.iter().zip(peak_curve.iter()).map(|(a, b)| a + b).collect())
    }

    /// Runs the external solver over the current parameter table, writing
    /// back `fit_result`/`uncertainty` for every non-`Ignore` parameter and
    /// storing `chisq`.
    pub fn start_fit(&mut self) -> Result<(), FitError> {
        if self.parameters.is_empty() {
            return Err(FitError::DegenerateData);
        }
        self.state = FitState::FitInProgress;
        self.emit();

        let p0: Vec<f64> = self.parameters.iter().map(|p| p.estimate_value).collect();
        let constraints: Vec<Constraint> = self.parameters.iter().map(|p| p.constraint).collect();
        let bg_entry = self.backgrounds.get(&self.background_name)?;
        let theory_entry = self.theories.get(&self.theory_name)?;
        let n_bg = bg_entry.n;
        let y_ref = &self.y;
        let bg_eval = bg_entry.evaluate.clone();
        let theory_eval = theory_entry.evaluate;
        let model = move |p: &[f64], x: &[f64]| -> Vec<f64> {
            let bg_params = &p[..n_bg];
            let peak_params = &p[n_bg..];
            let bg_curve = (bg_eval)(bg_params, x, y_ref);
            let peak_curve = (theory_eval)(peak_params, x);
            bg_curve.iter().zip(peak_curve.iter()).map(|(a, b)| a + b).collect()
        };

        let result = crate::solver::solve(&model, &self.x, &self.y, &self.sigma, &p0, &constraints, 200);

        match result {
            Ok(solved) => {
                for (param, (&value, &sigma)) in
                    self.parameters.iter_mut().zip(solved.params.iter().zip(solved.sigma.iter()))
                {
                    param.fit_result = Some(value);
                    param.uncertainty = if param.constraint == Constraint::Ignore { None } else { Some(sigma) };
                }
                self.chisq = Some(solved.chisq);
                self.state = FitState::Ready;
                self.emit();
                Ok(())
            }
            Err(e) => {
                log::error!("fit did not converge: {e}");
                self.chisq = None;
                self.state = FitState::Ready;
                self.emit();
                Err(e)
            }
        }
    }

    /// Evaluates `fitfunction` at `x` (default: the working view) using
    /// either `params` or the current fit results (falling back to estimate
    /// values), skipping parameter groups that are entirely `Ignore`
    /// (a whole peak "not part of the model").
    pub fn generate_curve(&self, x: Option<&[f64]>, params: Option<&[f64]>) -> Result<Vec<f64>, FitError> {
        let x = x.unwrap_or(&self.x);
        let owned;
        let params = match params {
            Some(p) => p,
            None => {
                owned = self
                    .parameters
                    .iter()
                    .map(|p| p.fit_result.unwrap_or(p.estimate_value))
                    .collect::<Vec<_>>();
                &owned
            }
        };
        let bg_entry = self.backgrounds.get(&self.background_name)?;
        let n_bg = bg_entry.n;
        let ignored_groups: std::collections::HashSet<usize> = self
            .parameters
            .iter()
            .filter(|p| p.group > 0)
            .map(|p| p.group)
            .filter(|&g| self.parameters.iter().filter(|p| p.group == g).all(|p| p.constraint == Constraint::Ignore))
            .collect();
        let theory_entry = self.theories.get(&self.theory_name)?;
        let n = theory_entry.n;
        let peak_params: Vec<f64> = params[n_bg.min(params.len())..]
            .chunks(n)
            .enumerate()
            .filter(|(i, _)| !ignored_groups.contains(&(i + 1)))
            .flat_map(|(_, chunk)| chunk.to_vec())
            .collect();
        let bg_params = &params[..n_bg.min(params.len())];
        let bg_curve = (bg_entry.evaluate)(bg_params, x, &self.y);
        let peak_curve = (theory_entry.evaluate)(&peak_params, x);
        Ok(bg_curve.iter().zip(peak_curve.iter()).map(|(a, b)| a + b).collect())
    }

    /// Integrates `y - (background + every other peak group)` over
    /// `[pos - 3.99*sigma, pos + 3.99*sigma]` via a left-Riemann sum on the
    /// working view, alongside its `sqrt(sum y)` counting-statistics
    /// uncertainty. `group` (1-based) is the peak group being measured, so
    /// its own contribution can be excluded from the subtracted curve.
    pub fn peak_area(&self, group: usize, position: f64, fwhm: f64) -> Result<(f64, f64), FitError> {
        let bg_entry = self.backgrounds.get(&self.background_name)?;
        let theory_entry = self.theories.get(&self.theory_name)?;
        let n_bg = bg_entry.n;
        let n = theory_entry.n;

        let n_bg_have = n_bg.min(self.parameters.len());
        let bg_params: Vec<f64> =
            self.parameters[..n_bg_have].iter().map(|p| p.fit_result.unwrap_or(p.estimate_value)).collect();
        let bg_curve = (bg_entry.evaluate)(&bg_params, &self.x, &self.y);

        let mut peak_params: Vec<f64> =
            self.parameters[n_bg_have..].iter().map(|p| p.fit_result.unwrap_or(p.estimate_value)).collect();
        let block = (group - 1) * n;
        if block + n <= peak_params.len() {
            for slot in &mut peak_params[block..block + n] {
                *slot = 0.0;
            }
        }
        let other_peaks_curve = (theory_entry.evaluate)(&peak_params, &self.x);

        let sigma = crate::models::fwhm_to_sigma(fwhm).abs();
        let lo = position - 3.99 * sigma;
        let hi = position + 3.99 * sigma;

        let mut area = 0.0;
        let mut sum_y = 0.0;
        for i in 0..self.x.len() {
            if self.x[i] < lo || self.x[i] > hi {
                continue;
            }
            sum_y += self.y[i];
            if i + 1 < self.x.len() {
                let width = self.x[i + 1] - self.x[i];
                let isolated = self.y[i] - bg_curve[i] - other_peaks_curve[i];
                area += isolated * width;
            }
        }
        Ok((area, sum_y.max(0.0).sqrt()))
    }

    /// Exposes the background entry's parameter count, used by [`crate::mca`]
    /// when appending a discovered peak's parameter group.
    pub fn background_param_count(&self) -> Result<usize, FitError> {
        Ok(self.backgrounds.get(&self.background_name)?.n)
    }

    pub fn theory_param_count(&self) -> Result<usize, FitError> {
        Ok(self.theories.get(&self.theory_name)?.n)
    }

    pub fn theory_parameter_names(&self) -> Result<&[String], FitError> {
        Ok(&self.theories.get(&self.theory_name)?.parameter_names)
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut Vec<Parameter> {
        &mut self.parameters
    }

    pub(crate) fn set_state(&mut self, state: FitState) {
        self.state = state;
        self.emit();
    }

    /// MCA mode: delegates to [`crate::mca::run`].
    pub fn mca_fit(&mut self) -> Result<Vec<crate::mca::RegionResult>, FitError> {
        crate::mca::run(self)
    }
}

/// `internal`/`square-filter` backgrounds carry a non-zero parameter count
/// even though the spec lists `none` as the conceptually empty case; this
/// constant documents the richest built-in background's arity for callers
/// sizing scratch buffers ahead of a `select_background("Internal")` call.
pub const MAX_BUILTIN_BACKGROUND_N: usize = INTERNAL_N;

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(x: f64, height: f64, pos: f64, fwhm: f64) -> f64 {
        crate::models::gaussian_value(x, height, pos, fwhm)
    }

    #[test]
    fn unknown_theory_is_rejected_without_state_change() {
        assert!(FitDriver::new("Nonexistent", "Constant").is_err());
    }

    #[test]
    fn set_data_rejects_mismatched_lengths() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        let err = driver.set_data(vec![1.0, 2.0], vec![1.0], None, None, None).unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch { .. }));
    }

    #[test]
    fn full_estimate_and_fit_recovers_two_gaussians_on_a_constant_background() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        driver.config.auto_fwhm = true;
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| 1.0 + gaussian(xi, 1500.0, 100.0, 50.0) + gaussian(xi, 1500.0, 700.0, 50.0))
            .collect();
        driver.set_data(x, y, None, None, None).unwrap();
        driver.estimate().unwrap();
        assert_eq!(driver.state(), FitState::ReadyToFit);
        driver.start_fit().unwrap();
        assert_eq!(driver.state(), FitState::Ready);
        let chisq = driver.chisq().unwrap();
        assert!(chisq.is_finite());

        let params = driver.parameters();
        assert_eq!(params.len(), 7);
        let bg = params[0].fit_result.unwrap();
        assert!((bg - 1.0).abs() / 1.0 < 0.05);
        let positions: Vec<f64> = params.iter().filter(|p| p.name.starts_with("Position")).map(|p| p.fit_result.unwrap()).collect();
        assert!(positions.iter().any(|&p| (p - 100.0).abs() < 1.0));
        assert!(positions.iter().any(|&p| (p - 700.0).abs() < 1.0));
    }

    #[test]
    fn peak_area_isolates_its_own_group_from_background_and_other_peaks() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        driver.config.auto_fwhm = true;
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| 1.0 + gaussian(xi, 1500.0, 100.0, 50.0) + gaussian(xi, 1500.0, 700.0, 50.0))
            .collect();
        driver.set_data(x, y, None, None, None).unwrap();
        driver.estimate().unwrap();
        driver.start_fit().unwrap();

        let analytic_area = 1500.0 * 50.0 * (std::f64::consts::PI / (4.0 * 2.0_f64.ln())).sqrt();
        let (area_a, unc_a) = driver.peak_area(1, 100.0, 50.0).unwrap();
        let (area_b, unc_b) = driver.peak_area(2, 700.0, 50.0).unwrap();
        assert!((area_a - analytic_area).abs() / analytic_area < 0.05);
        assert!((area_b - analytic_area).abs() / analytic_area < 0.05);
        assert!(unc_a > 0.0 && unc_a.is_finite());
        assert!(unc_b > 0.0 && unc_b.is_finite());
    }

    #[test]
    fn configure_is_idempotent_over_current_state() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        let before = driver.config.clone();
        let snapshot = serde_json::to_value(&before).unwrap();
        driver.configure(&snapshot).unwrap();
        assert_eq!(driver.config, before);
        assert_eq!(driver.theory_name(), "Gaussians");
        assert_eq!(driver.background_name(), "Constant");
    }

    #[test]
    fn configure_reselects_theory_and_background_by_name() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        driver.configure(&serde_json::json!({"fittheory": "Lorentz", "fitbkg": "Linear"})).unwrap();
        assert_eq!(driver.theory_name(), "Lorentz");
        assert_eq!(driver.background_name(), "Linear");
    }

    #[test]
    fn generate_curve_matches_fitfunction_before_any_ignore() {
        let mut driver = FitDriver::new("Gaussians", "Constant").unwrap();
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + gaussian(xi, 500.0, 80.0, 20.0)).collect();
        driver.set_data(x.clone(), y, None, None, None).unwrap();
        driver.estimate().unwrap();
        let params: Vec<f64> = driver.parameters().iter().map(|p| p.estimate_value).collect();
        let via_fitfunction = driver.fitfunction(&params, &x).unwrap();
        let via_generate = driver.generate_curve(Some(&x), Some(&params)).unwrap();
        for i in 0..x.len() {
            assert!((via_fitfunction[i] - via_generate[i]).abs() < 1e-9);
        }
    }
}
