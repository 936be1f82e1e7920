//! The configuration store read by estimators and the fit driver.
//!
//! Mirrors the source engine's flat dictionary of named tuning parameters,
//! but as a typed struct rather than a string-keyed map. [`FitConfig::configure`]
//! still accepts case-insensitive named patches, matching the source's
//! `configure(**kw)` entry point.

use crate::error::FitError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    // Peak search
    pub auto_fwhm: bool,
    pub fwhm_points: u32,
    pub sensitivity: f64,
    pub force_peak_presence: bool,
    pub auto_scaling: bool,
    pub yscaling: f64,
    pub xscaling: f64,

    // Constraint toggles
    pub no_constraints_flag: bool,
    pub positive_height_area_flag: bool,
    pub positive_fwhm_flag: bool,
    pub same_fwhm_flag: bool,
    pub quoted_position_flag: bool,
    pub quoted_eta_flag: bool,

    // Hypermet mask & positions
    pub hypermet_tails: u8,
    pub hypermet_quoted_position_flag: bool,
    pub delta_position_fwhm_units: f64,
    pub same_slope_ratio_flag: bool,
    pub same_area_ratio_flag: bool,
    pub quoted_fwhm_flag: bool,
    pub max_fwhm2_input_ratio: f64,
    pub min_fwhm2_input_ratio: f64,

    // Hypermet short tail
    pub min_gauss_area_4_short_tail: f64,
    pub initial_short_tail_area_ratio: f64,
    pub max_short_tail_area_ratio: f64,
    pub min_short_tail_area_ratio: f64,
    pub initial_short_tail_slope_ratio: f64,
    pub max_short_tail_slope_ratio: f64,
    pub min_short_tail_slope_ratio: f64,

    // Hypermet long tail
    pub min_gauss_area_4_long_tail: f64,
    pub initial_long_tail_area_ratio: f64,
    pub max_long_tail_area_ratio: f64,
    pub min_long_tail_area_ratio: f64,
    pub initial_long_tail_slope_ratio: f64,
    pub max_long_tail_slope_ratio: f64,
    pub min_long_tail_slope_ratio: f64,

    // Hypermet step
    pub min_gauss_height_4_step_tail: f64,
    pub initial_step_tail_height_ratio: f64,
    pub max_step_tail_height_ratio: f64,
    pub min_step_tail_height_ratio: f64,

    // MCA
    pub mca_mode: bool,
    pub residuals_flag: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            auto_fwhm: false,
            fwhm_points: 8,
            sensitivity: 2.5,
            force_peak_presence: false,
            auto_scaling: false,
            yscaling: 1.0,
            xscaling: 1.0,

            no_constraints_flag: false,
            positive_height_area_flag: true,
            positive_fwhm_flag: true,
            same_fwhm_flag: false,
            quoted_position_flag: false,
            quoted_eta_flag: false,

            hypermet_tails: 15,
            hypermet_quoted_position_flag: true,
            delta_position_fwhm_units: 0.5,
            same_slope_ratio_flag: true,
            same_area_ratio_flag: true,
            quoted_fwhm_flag: false,
            max_fwhm2_input_ratio: 1.5,
            min_fwhm2_input_ratio: 0.4,

            min_gauss_area_4_short_tail: 50_000.0,
            initial_short_tail_area_ratio: 0.05,
            max_short_tail_area_ratio: 0.1,
            min_short_tail_area_ratio: 0.001,
            initial_short_tail_slope_ratio: 0.7,
            max_short_tail_slope_ratio: 2.0,
            min_short_tail_slope_ratio: 0.5,

            min_gauss_area_4_long_tail: 1_000.0,
            initial_long_tail_area_ratio: 0.05,
            max_long_tail_area_ratio: 0.3,
            min_long_tail_area_ratio: 0.01,
            initial_long_tail_slope_ratio: 20.0,
            max_long_tail_slope_ratio: 50.0,
            min_long_tail_slope_ratio: 5.0,

            min_gauss_height_4_step_tail: 5_000.0,
            initial_step_tail_height_ratio: 0.002,
            max_step_tail_height_ratio: 0.01,
            min_step_tail_height_ratio: 0.0001,

            mca_mode: false,
            residuals_flag: false,
        }
    }
}

impl FitConfig {
    /// Merge a set of named fields (case-insensitive, matching the source's
    /// `configure(**kw)`) into this configuration. Unknown keys are ignored
    /// with a warning, matching the estimation pipeline's clamp-don't-error
    /// posture for configuration noise; malformed values for a recognized
    /// key surface as [`FitError::InvalidConfiguration`].
    pub fn configure(&mut self, patch: &serde_json::Value) -> Result<(), FitError> {
        let serde_json::Value::Object(map) = patch else {
            return Err(FitError::InvalidConfiguration(
                "configure() patch must be a JSON object".into(),
            ));
        };
        let mut current = serde_json::to_value(&*self)
            .map_err(|e| FitError::InvalidConfiguration(e.to_string()))?;
        let serde_json::Value::Object(current_map) = &mut current else {
            unreachable!("FitConfig always serializes to an object")
        };
        for (key, value) in map {
            let lower = key.to_ascii_lowercase();
            if let Some(existing_key) = current_map.keys().find(|k| k.eq_ignore_ascii_case(&lower)).cloned() {
                current_map.insert(existing_key, value.clone());
            } else {
                log::warn!("configure(): ignoring unrecognized configuration key '{key}'");
            }
        }
        let mut updated: FitConfig = serde_json::from_value(current)
            .map_err(|e| FitError::InvalidConfiguration(e.to_string()))?;
        updated.clamp();
        *self = updated;
        Ok(())
    }

    /// Clamp out-of-band values rather than reject them (FWHM floored at 3,
    /// sensitivity floored at 1).
    pub fn clamp(&mut self) {
        if self.fwhm_points < 3 {
            log::warn!("clamping fwhm_points {} up to the floor of 3", self.fwhm_points);
            self.fwhm_points = 3;
        }
        if self.sensitivity < 1.0 {
            log::warn!("clamping sensitivity {} up to the floor of 1.0", self.sensitivity);
            self.sensitivity = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_with_current_values_is_idempotent() {
        let mut cfg = FitConfig::default();
        let snapshot = serde_json::to_value(&cfg).unwrap();
        cfg.configure(&snapshot).unwrap();
        assert_eq!(cfg, FitConfig::default());
    }

    #[test]
    fn configure_is_case_insensitive() {
        let mut cfg = FitConfig::default();
        cfg.configure(&serde_json::json!({"SENSITIVITY": 4.0})).unwrap();
        assert_eq!(cfg.sensitivity, 4.0);
    }

    #[test]
    fn clamp_floors_sensitivity_and_fwhm_points() {
        let mut cfg = FitConfig { sensitivity: 0.1, fwhm_points: 1, ..FitConfig::default() };
        cfg.clamp();
        assert_eq!(cfg.sensitivity, 1.0);
        assert_eq!(cfg.fwhm_points, 3);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = FitConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: FitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
