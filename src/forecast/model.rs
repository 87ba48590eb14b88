//! Autoregressive model with AIC order selection.
//!
//! Coefficients come from the Yule-Walker equations, solved for every order
//! at once with the Levinson-Durbin recursion. The innovation variance of
//! each order feeds `AIC = n ln(sigma^2) + 2 (p + 1)`, and the order with the
//! lowest score wins.

use thiserror::Error;

/// Shortest series a model is fitted on.
pub const MIN_FIT_POINTS: usize = 2;

/// Below this the series is treated as constant.
const VARIANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("series too short to fit: need {need} points, got {got}")]
    TooShort { need: usize, got: usize },

    #[error("series contains non-finite values")]
    NonFinite,

    #[error("model produced non-finite forecasts")]
    Diverged,

    #[error("re-indexed series would have {0} points")]
    SeriesTooLong(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArModel {
    mean: f64,
    /// `coefficients[j]` multiplies the value `j + 1` steps back.
    coefficients: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

impl ArModel {
    /// Fit every order up to `max_order` (bounded by series length) and keep
    /// the one with the lowest AIC.
    pub fn select(series: &[f64], max_order: usize) -> Result<Self, FitError> {
        let n = series.len();
        if n < MIN_FIT_POINTS {
            return Err(FitError::TooShort { need: MIN_FIT_POINTS, got: n });
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let mean = series.iter().sum::<f64>() / n as f64;
        let centered: Vec<f64> = series.iter().map(|v| v - mean).collect();
        let max_order = max_order.min((n - 1) / 2);
        let acov = autocovariances(&centered, max_order);

        if acov[0] <= VARIANCE_EPSILON {
            return Ok(Self { mean, coefficients: Vec::new(), sigma2: 0.0, aic: f64::NEG_INFINITY });
        }

        let aic = |sigma2: f64, p: usize| n as f64 * sigma2.ln() + 2.0 * (p as f64 + 1.0);
        let mut best = Self { mean, coefficients: Vec::new(), sigma2: acov[0], aic: aic(acov[0], 0) };

        for (coefficients, sigma2) in levinson_durbin(&acov, max_order) {
            let p = coefficients.len();
            let score = aic(sigma2, p);
            if score < best.aic {
                best = Self { mean, coefficients, sigma2, aic: score };
            }
        }
        Ok(best)
    }

    pub fn order(&self) -> usize {
        self.coefficients.len()
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Recursive multi-step forecast continuing `history`.
    pub fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, FitError> {
        let p = self.order();
        let mut window: Vec<f64> = history[history.len().saturating_sub(p)..]
            .iter()
            .map(|v| v - self.mean)
            .collect();

        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next: f64 = self
                .coefficients
                .iter()
                .zip(window.iter().rev())
                .map(|(phi, x)| phi * x)
                .sum();
            if !next.is_finite() {
                return Err(FitError::Diverged);
            }
            window.push(next);
            out.push(next + self.mean);
        }
        Ok(out)
    }
}

/// Biased sample autocovariances `r[0..=max_lag]` of a centered series.
fn autocovariances(centered: &[f64], max_lag: usize) -> Vec<f64> {
    let n = centered.len() as f64;
    (0..=max_lag)
        .map(|k| {
            centered[k..]
                .iter()
                .zip(centered.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n
        })
        .collect()
}

/// Yule-Walker solutions for orders `1..=max_order`, each with its innovation
/// variance. Stops early once the recursion leaves the stationary region.
fn levinson_durbin(acov: &[f64], max_order: usize) -> Vec<(Vec<f64>, f64)> {
    let mut fits = Vec::with_capacity(max_order);
    let mut phi: Vec<f64> = Vec::new();
    let mut err = acov[0];

    for k in 1..=max_order {
        let acc = acov[k] - phi.iter().enumerate().map(|(j, c)| c * acov[k - 1 - j]).sum::<f64>();
        let kappa = acc / err;
        if !kappa.is_finite() || kappa.abs() >= 1.0 {
            break;
        }

        let mut next = Vec::with_capacity(k);
        for j in 0..k - 1 {
            next.push(phi[j] - kappa * phi[k - 2 - j]);
        }
        next.push(kappa);
        phi = next;

        err *= 1.0 - kappa * kappa;
        if err <= VARIANCE_EPSILON {
            fits.push((phi.clone(), VARIANCE_EPSILON));
            break;
        }
        fits.push((phi.clone(), err));
    }
    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_series_gives_flat_forecast() {
        let model = ArModel::select(&[0.75; 12], 5).unwrap();
        assert_eq!(model.order(), 0);
        let out = model.forecast(&[0.75; 12], 10).unwrap();
        assert_eq!(out.len(), 10);
        for v in out {
            assert_relative_eq!(v, 0.75);
        }
    }

    #[test]
    fn recovers_ar1_coefficient() {
        // x_t = 0.8 x_{t-1} + e_t with a deterministic pseudo-noise.
        let mut x = vec![0.0f64];
        let mut seed = 17u64;
        for _ in 0..2000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let e = ((seed >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
            let prev = *x.last().unwrap();
            x.push(0.8 * prev + e);
        }
        let model = ArModel::select(&x, 5).unwrap();
        assert!(model.order() >= 1);
        assert_relative_eq!(model.coefficients[0], 0.8, epsilon = 0.1);
    }

    #[test]
    fn order_is_bounded_by_length() {
        let model = ArModel::select(&[1.0, 0.0, 1.0, 0.0, 1.0], 5).unwrap();
        assert!(model.order() <= 2);
    }

    #[test]
    fn rejects_short_and_non_finite_input() {
        assert_eq!(ArModel::select(&[1.0], 5), Err(FitError::TooShort { need: 2, got: 1 }));
        assert_eq!(ArModel::select(&[1.0, f64::NAN, 0.0], 5), Err(FitError::NonFinite));
    }
}
