//! The peak-shape model library: pure evaluators for each theory, each
//! summing `k` copies of its base shape across `k*n` parameters.

pub mod atan;
pub mod gaussian;
pub mod hypermet;
pub mod lorentz;
pub mod periodic_gaussian;
pub mod pseudo_voigt;
pub mod slit;
pub mod split;
pub mod step;

/// `sigma = FWHM / (2 * sqrt(2 * ln 2))`, the conversion used throughout
/// the Gaussian-family shapes.
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt())
}

pub fn gauss_area_to_height(area: f64, fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    if sigma == 0.0 {
        return 0.0;
    }
    area / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

pub fn gauss_height_to_area(height: f64, fwhm: f64) -> f64 {
    height * fwhm_to_sigma(fwhm) * (2.0 * std::f64::consts::PI).sqrt()
}

pub fn lorentz_area_to_height(area: f64, fwhm: f64) -> f64 {
    if fwhm == 0.0 {
        return 0.0;
    }
    area / (fwhm * std::f64::consts::FRAC_PI_2)
}

pub fn lorentz_height_to_area(height: f64, fwhm: f64) -> f64 {
    height * fwhm * std::f64::consts::FRAC_PI_2
}

/// Base (single-peak) Gaussian in height form.
pub fn gaussian_value(x: f64, height: f64, position: f64, fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    if sigma == 0.0 {
        return 0.0;
    }
    height * (-(x - position).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// Base (single-peak) Lorentzian in height form.
pub fn lorentz_value(x: f64, height: f64, position: f64, fwhm: f64) -> f64 {
    let half = fwhm / 2.0;
    if half == 0.0 {
        return 0.0;
    }
    height * half * half / ((x - position).powi(2) + half * half)
}

/// Complementary error function, `1 - erf(x)`, backed by `statrs`.
pub fn erfc(x: f64) -> f64 {
    1.0 - statrs::function::erf::erf(x)
}

/// Evaluate a multi-peak model: sums `base` across `k` contiguous `n`-wide
/// parameter groups.
pub fn sum_peaks<F>(x: &[f64], params: &[f64], n: usize, base: F) -> Vec<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let k = params.len() / n;
    x.iter()
        .map(|&xi| (0..k).map(|i| base(xi, &params[i * n..(i + 1) * n])).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erfc_matches_known_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!(erfc(3.0) < 1e-3);
        assert!((erfc(-1.0) - (2.0 - erfc(1.0))).abs() < 1e-9);
    }

    #[test]
    fn area_height_round_trip_gaussian() {
        let height = 1000.0;
        let fwhm = 20.0;
        let area = gauss_height_to_area(height, fwhm);
        assert!((gauss_area_to_height(area, fwhm) - height).abs() < 1e-9);
    }

    #[test]
    fn area_height_round_trip_lorentz() {
        let height = 500.0;
        let fwhm = 15.0;
        let area = lorentz_height_to_area(height, fwhm);
        assert!((lorentz_area_to_height(area, fwhm) - height).abs() < 1e-9);
    }
}
