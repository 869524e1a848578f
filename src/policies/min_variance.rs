//! Minimum-variance policies.

use super::qp::solve_budget_qp;
use crate::error::{BacktestError, Result};
use crate::moments::ParameterBundle;
use crate::policy::Policy;
use nalgebra::DVector;

/// Sample global minimum-variance portfolio: `Σ_mle⁻¹ 1 / (1ᵗ Σ_mle⁻¹ 1)`.
///
/// Fully invested in risky assets; short positions allowed.
#[derive(Debug, Clone)]
pub struct MinVariance {
    name: String,
}

impl MinVariance {
    pub fn new() -> Self {
        Self::named("Minimum Variance")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MinVariance {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for MinVariance {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        if params.amle.abs() < f64::EPSILON {
            return Err(BacktestError::NumericalError(
                "1ᵗ Σ⁻¹ 1 is zero; minimum-variance weights are undefined".to_string(),
            ));
        }
        let ones = DVector::from_element(params.risky_count, 1.0);
        Ok(&params.inv_sigma_mle * ones / params.amle)
    }
}

/// Minimum-variance portfolio with short sales ruled out.
#[derive(Debug, Clone)]
pub struct MinVarianceShortSellCon {
    name: String,
}

impl MinVarianceShortSellCon {
    pub fn new() -> Self {
        Self::named("Minimum Variance with Short Sell Constraints")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MinVarianceShortSellCon {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for MinVarianceShortSellCon {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let q = DVector::zeros(params.risky_count);
        solve_budget_qp(&params.sigma_mle, &q, 0.0)
    }
}

/// Minimum-variance portfolio under the generalized constraint `w_i >= a/N`.
///
/// `a = 0` reduces to [`MinVarianceShortSellCon`]; `a = 1` forces 1/N over
/// the risky assets.
#[derive(Debug, Clone)]
pub struct JagannathanMa {
    name: String,
    lower_bound_fraction: f64,
}

impl JagannathanMa {
    pub const DEFAULT_LOWER_BOUND_FRACTION: f64 = 0.5;

    pub fn new(lower_bound_fraction: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&lower_bound_fraction),
            "Lower bound fraction must be in [0, 1]"
        );
        Self {
            name: "Jagannathan Ma".to_string(),
            lower_bound_fraction,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for JagannathanMa {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LOWER_BOUND_FRACTION)
    }
}

impl Policy for JagannathanMa {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        let n = params.risky_count;
        let q = DVector::zeros(n);
        solve_budget_qp(&params.sigma_mle, &q, self.lower_bound_fraction / n as f64)
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![(
            "lower_bound_fraction".to_string(),
            self.lower_bound_fraction.to_string(),
        )]
    }
}
