//! The theory/background registry: an insertion-ordered mapping from name to
//! an immutable descriptor, plus a parallel background registry. Built-in
//! theories are registered by [`TheoryRegistry::with_builtins`]; third-party
//! bundles are imported via [`TheoryRegistry::import_bundle`].

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::baseline::SubacCache;
use crate::background;
use crate::config::FitConfig;
use crate::constraint::Constraint;
use crate::error::FitError;
use crate::models::{atan, gaussian, hypermet, lorentz, periodic_gaussian, pseudo_voigt, slit, split, step};

pub type Evaluator = fn(&[f64], &[f64]) -> Vec<f64>;
pub type Estimator = fn(&[f64], &[f64], &[f64], f64, &FitConfig) -> (Vec<f64>, Vec<Constraint>);
pub type Derivative = fn(&[f64], usize, &[f64]) -> Vec<f64>;
pub type Configurator = fn(&FitConfig) -> Value;

/// Immutable descriptor for one peak theory.
#[derive(Clone)]
pub struct TheoryEntry {
    pub n: usize,
    pub parameter_names: Vec<String>,
    pub evaluate: Evaluator,
    pub estimate: Estimator,
    pub configure: Option<Configurator>,
    pub derivative: Option<Derivative>,
}

/// Immutable descriptor for one background. Backgrounds evaluate against
/// `(params, x, y)` rather than `(params, x)` alone, since the internal and
/// square-filter backgrounds are functions of the signal itself.
pub struct BackgroundEntry {
    pub n: usize,
    pub parameter_names: Vec<String>,
    pub evaluate: Rc<dyn Fn(&[f64], &[f64], &[f64]) -> Vec<f64>>,
    pub estimate: Rc<dyn Fn(&[f64], &[f64]) -> (Vec<f64>, Vec<Constraint>, Vec<f64>)>,
}

impl Clone for BackgroundEntry {
    fn clone(&self) -> Self {
        BackgroundEntry {
            n: self.n,
            parameter_names: self.parameter_names.clone(),
            evaluate: Rc::clone(&self.evaluate),
            estimate: Rc::clone(&self.estimate),
        }
    }
}

/// A third-party theory bundle: each field is either a single value or an
/// equal-length ordered sequence, one entry per theory name. `init` is
/// invoked at most once, at import time.
pub struct TheoryBundle {
    pub names: Vec<String>,
    pub n: Vec<usize>,
    pub parameter_names: Vec<Vec<String>>,
    pub evaluate: Vec<Evaluator>,
    pub estimate: Vec<Estimator>,
    pub configure: Vec<Option<Configurator>>,
    pub derivative: Vec<Option<Derivative>>,
    pub init: Option<fn()>,
}

#[derive(Default)]
pub struct TheoryRegistry {
    entries: IndexMap<String, TheoryEntry>,
}

impl TheoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the fourteen built-in theories.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("Gaussians", TheoryEntry {
            n: gaussian::N,
            parameter_names: gaussian::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: gaussian::evaluate,
            estimate: gaussian::estimate,
            configure: None,
            derivative: None,
        });
        reg.register("Area Gaussians", TheoryEntry {
            n: gaussian::N,
            parameter_names: gaussian::AREA_PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: gaussian::evaluate_area,
            estimate: gaussian::estimate_area,
            configure: None,
            derivative: None,
        });
        reg.register("Lorentz", TheoryEntry {
            n: lorentz::N,
            parameter_names: lorentz::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: lorentz::evaluate,
            estimate: lorentz::estimate,
            configure: None,
            derivative: None,
        });
        reg.register("Area Lorentz", TheoryEntry {
            n: lorentz::N,
            parameter_names: lorentz::AREA_PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: lorentz::evaluate_area,
            estimate: lorentz::estimate_area,
            configure: None,
            derivative: None,
        });
        reg.register("Pseudo-Voigt", TheoryEntry {
            n: pseudo_voigt::N,
            parameter_names: pseudo_voigt::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: pseudo_voigt::evaluate,
            estimate: pseudo_voigt::estimate,
            configure: None,
            derivative: None,
        });
        reg.register("Area Pseudo-Voigt", TheoryEntry {
            n: pseudo_voigt::N,
            parameter_names: pseudo_voigt::AREA_PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: pseudo_voigt::evaluate_area,
            estimate: pseudo_voigt::estimate_area,
            configure: None,
            derivative: None,
        });
        reg.register("Split Gaussian", TheoryEntry {
            n: split::N_SPLIT,
            parameter_names: split::SPLIT_GAUSSIAN_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: split::evaluate_split_gaussian,
            estimate: split::estimate_split_gaussian,
            configure: None,
            derivative: None,
        });
        reg.register("Split Lorentz", TheoryEntry {
            n: split::N_SPLIT,
            parameter_names: split::SPLIT_LORENTZ_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: split::evaluate_split_lorentz,
            estimate: split::estimate_split_lorentz,
            configure: None,
            derivative: None,
        });
        reg.register("Split Pseudo-Voigt", TheoryEntry {
            n: split::N_SPLIT_PVOIGT,
            parameter_names: split::SPLIT_PVOIGT_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: split::evaluate_split_pseudo_voigt,
            estimate: split::estimate_split_pseudo_voigt,
            configure: None,
            derivative: None,
        });
        reg.register("Step Down", TheoryEntry {
            n: step::N,
            parameter_names: step::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: step::evaluate_down,
            estimate: step::estimate_down,
            configure: None,
            derivative: None,
        });
        reg.register("Step Up", TheoryEntry {
            n: step::N,
            parameter_names: step::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: step::evaluate_up,
            estimate: step::estimate_up,
            configure: None,
            derivative: None,
        });
        reg.register("Slit", TheoryEntry {
            n: slit::N,
            parameter_names: slit::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: slit::evaluate,
            estimate: slit::estimate,
            configure: None,
            derivative: None,
        });
        // Atan preserves the source's mapping to the up-step estimator.
        reg.register("Atan", TheoryEntry {
            n: atan::N,
            parameter_names: atan::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: atan::evaluate,
            estimate: atan::estimate,
            configure: None,
            derivative: None,
        });
        reg.register("Hypermet", TheoryEntry {
            n: hypermet::N,
            parameter_names: hypermet::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: hypermet::evaluate,
            estimate: hypermet::estimate,
            configure: None,
            derivative: None,
        });
        reg.register("Periodic Gaussians", TheoryEntry {
            n: periodic_gaussian::N,
            parameter_names: periodic_gaussian::PARAMETER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: periodic_gaussian::evaluate,
            estimate: periodic_gaussian::estimate,
            configure: None,
            derivative: None,
        });
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, entry: TheoryEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Result<&TheoryEntry, FitError> {
        self.entries.get(name).ok_or_else(|| FitError::UnknownTheory(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Imports a third-party bundle, validating that every plural field has
    /// matching length with `names` before registering any entry.
    pub fn import_bundle(&mut self, bundle: &TheoryBundle) -> Result<(), FitError> {
        let count = bundle.names.len();
        let lengths = [
            bundle.n.len(),
            bundle.parameter_names.len(),
            bundle.evaluate.len(),
            bundle.estimate.len(),
            bundle.configure.len(),
            bundle.derivative.len(),
        ];
        if lengths.iter().any(|&l| l != count) {
            return Err(FitError::InvalidConfiguration(
                "theory bundle fields must all have the same length as THEORY".into(),
            ));
        }
        if let Some(init) = bundle.init {
            init();
        }
        for i in 0..count {
            self.register(bundle.names[i].clone(), TheoryEntry {
                n: bundle.n[i],
                parameter_names: bundle.parameter_names[i].clone(),
                evaluate: bundle.evaluate[i],
                estimate: bundle.estimate[i],
                configure: bundle.configure[i],
                derivative: bundle.derivative[i],
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct BackgroundRegistry {
    entries: IndexMap<String, BackgroundEntry>,
}

impl BackgroundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the five built-in backgrounds. The `internal` background
    /// gets its own [`SubacCache`], living for as long as this registry (and
    /// therefore the owning driver).
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("None", BackgroundEntry {
            n: background::NONE_N,
            parameter_names: Vec::new(),
            evaluate: Rc::new(|p, x, _y| background::evaluate_none(p, x)),
            estimate: Rc::new(background::estimate_none),
        });
        reg.register("Constant", BackgroundEntry {
            n: background::CONSTANT_N,
            parameter_names: background::CONSTANT_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: Rc::new(|p, x, _y| background::evaluate_constant(p, x)),
            estimate: Rc::new(background::estimate_constant),
        });
        reg.register("Linear", BackgroundEntry {
            n: background::LINEAR_N,
            parameter_names: background::LINEAR_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: Rc::new(|p, x, _y| background::evaluate_linear(p, x)),
            estimate: Rc::new(background::estimate_linear),
        });
        let eval_cache = Rc::new(std::cell::RefCell::new(SubacCache::default()));
        let est_cache = Rc::clone(&eval_cache);
        reg.register("Internal", BackgroundEntry {
            n: background::INTERNAL_N,
            parameter_names: background::INTERNAL_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: Rc::new(move |p, _x, y| background::evaluate_internal(p, y, &mut eval_cache.borrow_mut())),
            estimate: Rc::new(move |x, y| background::estimate_internal(x, y, &mut est_cache.borrow_mut())),
        });
        reg.register("Square Filter", BackgroundEntry {
            n: background::SQUARE_FILTER_N,
            parameter_names: background::SQUARE_FILTER_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            evaluate: Rc::new(|p, _x, y| background::evaluate_square_filter(p, y)),
            estimate: Rc::new(background::estimate_square_filter),
        });
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, entry: BackgroundEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Result<&BackgroundEntry, FitError> {
        self.entries.get(name).ok_or_else(|| FitError::UnknownBackground(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_theories_cover_the_documented_catalogue() {
        let reg = TheoryRegistry::with_builtins();
        for name in [
            "Gaussians", "Area Gaussians", "Lorentz", "Area Lorentz", "Pseudo-Voigt", "Area Pseudo-Voigt",
            "Split Gaussian", "Split Lorentz", "Split Pseudo-Voigt", "Step Down", "Step Up", "Slit", "Atan",
            "Hypermet", "Periodic Gaussians",
        ] {
            assert!(reg.get(name).is_ok(), "missing theory {name}");
        }
        assert!(reg.get("Nonexistent").is_err());
    }

    #[test]
    fn builtin_backgrounds_cover_the_documented_catalogue() {
        let reg = BackgroundRegistry::with_builtins();
        for name in ["None", "Constant", "Linear", "Internal", "Square Filter"] {
            assert!(reg.get(name).is_ok(), "missing background {name}");
        }
        assert!(reg.get("Nonexistent").is_err());
    }

    #[test]
    fn internal_background_cache_is_shared_across_calls() {
        let reg = BackgroundRegistry::with_builtins();
        let entry = reg.get("Internal").unwrap();
        let y: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() * 10.0 + 20.0).collect();
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let a = (entry.evaluate)(&[1.0001, 10.0, 0.0], &x, &y);
        let b = (entry.evaluate)(&[1.0001, 10.0, 0.0], &x, &y);
        assert_eq!(a, b);
    }
}
