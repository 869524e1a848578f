//! Markowitz mean-variance policies.

use super::qp::solve_budget_qp;
use crate::error::Result;
use crate::moments::ParameterBundle;
use crate::policy::Policy;
use nalgebra::DVector;

/// Sample mean-variance portfolio `(1/γ) Σ_mle⁻¹ μ`.
///
/// The risky weights are not normalised; whatever they do not sum to is held
/// in the risk-free asset (or borrowed, when they exceed one).
#[derive(Debug, Clone)]
pub struct MeanVariance {
    name: String,
}

impl MeanVariance {
    pub fn new() -> Self {
        Self::named("Mean Variance (Markowitz)")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MeanVariance {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for MeanVariance {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_gamma(&self) -> bool {
        true
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let gamma = params.require_gamma()?;
        Ok(&params.inv_sigma_mle * params.risky_mu() / gamma)
    }
}

/// Mean-variance portfolio, fully invested and long-only:
/// maximise `μᵗw - γ/2 wᵗΣw` subject to `1ᵗw = 1`, `w >= 0`.
#[derive(Debug, Clone)]
pub struct MeanVarianceShortSellCon {
    name: String,
}

impl MeanVarianceShortSellCon {
    pub fn new() -> Self {
        Self::named("Mean Variance with Short Sell Constraints")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MeanVarianceShortSellCon {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for MeanVarianceShortSellCon {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_gamma(&self) -> bool {
        true
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let gamma = params.require_gamma()?;
        let p = &params.sigma_mle * gamma;
        let q = -params.risky_mu();
        solve_budget_qp(&p, &q, 0.0)
    }
}
