//! Bayes–Stein shrinkage policies (Jorion).
//!
//! Sample means are shrunk toward the mean of the minimum-variance
//! portfolio, and the covariance is replaced by the Bayes–Stein predictive
//! covariance:
//!
//! ```text
//! μ_min = 1ᵗΣ⁻¹μ / 1ᵗΣ⁻¹1
//! φ     = (N+2) / ((N+2) + L (μ - μ_min 1)ᵗ Σ⁻¹ (μ - μ_min 1))
//! μ_bs  = (1 - φ) μ + φ μ_min 1
//! λ     = (N+2) / ((μ - μ_min 1)ᵗ Σ⁻¹ (μ - μ_min 1))
//! Σ_bs  = Σ (1 + 1/(L+λ)) + λ / (L (L+1+λ)) · 11ᵗ / 1ᵗΣ⁻¹1
//! ```
//!
//! where Σ is the bias-adjusted covariance and L the window length.

use super::qp::solve_budget_qp;
use crate::error::{BacktestError, Result};
use crate::moments::{invert_covariance, ParameterBundle};
use crate::policy::Policy;
use nalgebra::{DMatrix, DVector};

/// Shrunk means and predictive covariance for one window.
#[derive(Debug, Clone)]
pub struct BayesSteinMoments {
    pub mu: DVector<f64>,
    pub sigma: DMatrix<f64>,
    /// Shrinkage intensity φ in [0, 1].
    pub shrinkage: f64,
}

impl BayesSteinMoments {
    pub fn estimate(params: &ParameterBundle) -> Result<Self> {
        let n = params.risky_count;
        let l = params.window_len as f64;
        let mu = params.risky_mu();
        let inv = invert_covariance(&params.sigma)?;

        let ones = DVector::from_element(n, 1.0);
        let inv_ones = &inv * &ones;
        let a = ones.dot(&inv_ones);
        if a.abs() < f64::EPSILON {
            return Err(BacktestError::NumericalError(
                "1ᵗ Σ⁻¹ 1 is zero; Bayes-Stein target is undefined".to_string(),
            ));
        }
        let mu_min = inv_ones.dot(&mu) / a;

        let dev = &mu - &ones * mu_min;
        let q = dev.dot(&(&inv * &dev));
        let k = n as f64 + 2.0;

        let shrinkage = k / (k + l * q);
        let mu_bs = &mu * (1.0 - shrinkage) + &ones * (shrinkage * mu_min);

        let outer = &ones * ones.transpose() / a;
        let sigma_bs = if q > f64::EPSILON {
            let lambda = k / q;
            &params.sigma * (1.0 + 1.0 / (l + lambda)) + outer * (lambda / (l * (l + 1.0 + lambda)))
        } else {
            // Limit λ → ∞: all means already equal the target.
            &params.sigma + outer / l
        };

        Ok(Self {
            mu: mu_bs,
            sigma: sigma_bs,
            shrinkage,
        })
    }
}

/// Bayes–Stein portfolio `(1/γ) Σ_bs⁻¹ μ_bs`.
#[derive(Debug, Clone)]
pub struct BayesStein {
    name: String,
}

impl BayesStein {
    pub fn new() -> Self {
        Self::named("Bayes Stein")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for BayesStein {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for BayesStein {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_gamma(&self) -> bool {
        true
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let gamma = params.require_gamma()?;
        let moments = BayesSteinMoments::estimate(params)?;
        let inv = invert_covariance(&moments.sigma)?;
        Ok(inv * moments.mu / gamma)
    }
}

/// Bayes–Stein moments in the long-only, fully invested mean-variance program.
#[derive(Debug, Clone)]
pub struct BayesSteinShortSellCon {
    name: String,
}

impl BayesSteinShortSellCon {
    pub fn new() -> Self {
        Self::named("Bayes Stein with Short Sell Constraints")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for BayesSteinShortSellCon {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for BayesSteinShortSellCon {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_gamma(&self) -> bool {
        true
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let gamma = params.require_gamma()?;
        let moments = BayesSteinMoments::estimate(params)?;
        let p = moments.sigma * gamma;
        let q = -moments.mu;
        solve_budget_qp(&p, &q, 0.0)
    }
}
