//! Kan–Zhou three-fund rule.
//!
//! Combines the sample tangency direction `Σ⁻¹μ` with the global
//! minimum-variance direction `Σ⁻¹1`, weighting them by an adjusted estimate
//! of the squared Sharpe ratio of the tangency portfolio in excess of the
//! minimum-variance one (`ψ²`).

use crate::error::{BacktestError, Result};
use crate::moments::ParameterBundle;
use crate::policy::Policy;
use nalgebra::DVector;
use statrs::function::beta::{beta_reg, ln_beta};

/// Bias-adjusted `ψ²` estimate for `n` risky assets over `l` observations.
///
/// Uses the incomplete beta correction; the estimate never goes negative.
pub fn adjusted_psi_squared(psi_sq: f64, n: usize, l: usize) -> f64 {
    let nf = n as f64;
    let lf = l as f64;

    if n < 2 || psi_sq <= f64::EPSILON {
        // ψ² is identically zero for a single asset, and the correction
        // vanishes in the ψ² → 0 limit.
        return 0.0;
    }

    let base = ((lf - nf - 1.0) * psi_sq - (nf - 1.0)) / lf;

    let a = (nf - 1.0) / 2.0;
    let b = (lf - nf + 1.0) / 2.0;
    let x = psi_sq / (1.0 + psi_sq);
    let regularized = beta_reg(a, b, x);

    let correction = if regularized > 0.0 {
        let ln_term = std::f64::consts::LN_2 + a * psi_sq.ln()
            - ((lf - 2.0) / 2.0) * psi_sq.ln_1p()
            - lf.ln()
            - regularized.ln()
            - ln_beta(a, b);
        ln_term.exp()
    } else {
        (nf - 1.0) / lf
    };

    (base + correction).max(0.0)
}

/// Kan–Zhou three-fund portfolio.
#[derive(Debug, Clone)]
pub struct KanZhou {
    name: String,
}

impl KanZhou {
    pub fn new() -> Self {
        Self::named("Kan Zhou Three Fund")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for KanZhou {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for KanZhou {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_gamma(&self) -> bool {
        true
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let gamma = params.require_gamma()?;
        let n = params.risky_count;
        let l = params.window_len;
        if l <= n + 4 {
            return Err(BacktestError::PolicyError(format!(
                "Kan-Zhou rule needs more than {} observations for {} assets, got {}",
                n + 4,
                n,
                l
            )));
        }
        if params.amle.abs() < f64::EPSILON {
            return Err(BacktestError::NumericalError(
                "1ᵗ Σ⁻¹ 1 is zero; minimum-variance mean is undefined".to_string(),
            ));
        }

        let nf = n as f64;
        let lf = l as f64;
        let mu = params.risky_mu();
        let ones = DVector::from_element(n, 1.0);

        let inv_mu = &params.inv_sigma_mle * &mu;
        let inv_ones = &params.inv_sigma_mle * &ones;
        let mu_g = ones.dot(&inv_mu) / params.amle;
        let psi_sq = (mu.dot(&inv_mu) - mu_g * mu_g * params.amle).max(0.0);
        let psi_a = adjusted_psi_squared(psi_sq, n, l);

        let c3 = (lf - nf - 1.0) * (lf - nf - 4.0) / (lf * (lf - 2.0));
        let ratio = nf / lf;
        let denom = psi_a + ratio;

        Ok((inv_mu * (psi_a / denom) + inv_ones * (ratio / denom * mu_g)) * (c3 / gamma))
    }
}
