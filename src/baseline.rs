//! The opaque iterative baseline ("subac" in the source engine) used by the
//! `internal` background and by a handful of estimator heuristics
//! (`guess_fwhm`, `guess_yscaling`). Rather than a numerically identical
//! port of the original lower-hull algorithm, this is a symmetric iterative
//! erosion toward the local 3-point average, clipped so the baseline never
//! rises above the signal.

/// Smooth `y` toward a monotone baseline. `curvature >= 1.0` trades
/// aggressiveness for smoothness (higher curvature erodes more slowly);
/// `iterations` controls how many erosion passes run.
pub fn subac(y: &[f64], curvature: f64, iterations: u32) -> Vec<f64> {
    let n = y.len();
    if n == 0 {
        return Vec::new();
    }
    let c = curvature.max(1.0);
    let mut z = y.to_vec();
    for _ in 0..iterations.max(1) {
        let prev = z.clone();
        for i in 0..n {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(n - 1);
            let avg = (prev[lo] + prev[hi]) / 2.0;
            let eroded = avg + (prev[i] - avg) / c;
            z[i] = eroded.min(prev[i]);
        }
    }
    z
}

/// A memoized handle to [`subac`], matching the source's per-driver cache
/// of the last `(x, y, curvature, iterations)` call.
#[derive(Debug, Default, Clone)]
pub struct SubacCache {
    last: Option<(Vec<f64>, f64, u32, Vec<f64>)>,
}

impl SubacCache {
    pub fn get(&mut self, y: &[f64], curvature: f64, iterations: u32) -> Vec<f64> {
        if let Some((cached_y, cached_curvature, cached_iterations, cached_result)) = &self.last {
            if cached_y.as_slice() == y && *cached_curvature == curvature && *cached_iterations == iterations {
                return cached_result.clone();
            }
        }
        let result = subac(y, curvature, iterations);
        self.last = Some((y.to_vec(), curvature, iterations, result.clone()));
        result
    }
}

/// Guess a multiplicative scaling factor for the signal prior to peak
/// search, matching `guess_yscaling`'s boxcar-smoothed chi-square heuristic.
pub fn guess_yscaling(y: &[f64]) -> f64 {
    if y.len() < 3 {
        return 1.0;
    }
    let smoothed: Vec<f64> = (1..y.len() - 1).map(|i| (y[i - 1] + y[i] + y[i + 1]) / 3.0).collect();
    let observed = &y[1..y.len() - 1];
    let mut chisq = 0.0;
    let mut count = 0usize;
    for (&obs, &fit) in observed.iter().zip(smoothed.iter()) {
        if obs.abs() > 0.0 {
            chisq += (obs - fit).powi(2) / obs.abs();
            count += 1;
        }
    }
    if count == 0 || chisq == 0.0 {
        return 1.0;
    }
    chisq /= count as f64;
    1.0 / chisq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subac_stays_at_or_below_signal() {
        let y: Vec<f64> = (0..50).map(|i| 10.0 + (i as f64 * 0.3).sin() * 50.0).collect();
        let z = subac(&y, 1.0001, 50);
        for (a, b) in y.iter().zip(z.iter()) {
            assert!(*b <= a + 1e-9);
        }
    }

    #[test]
    fn guess_yscaling_on_flat_signal_is_finite() {
        let y = vec![5.0; 20];
        assert!(guess_yscaling(&y).is_finite());
    }

    #[test]
    fn cache_reuses_identical_calls() {
        let mut cache = SubacCache::default();
        let y = vec![1.0, 2.0, 3.0, 2.0, 1.0];
        let first = cache.get(&y, 1.0, 5);
        let second = cache.get(&y, 1.0, 5);
        assert_eq!(first, second);
    }
}
