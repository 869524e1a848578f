//! Moment estimation over a trailing return window.
//!
//! Every window produces a [`ParameterBundle`]: the sample mean vector, the
//! maximum-likelihood covariance of the risky returns with its inverse, the
//! bias-adjusted covariance used by shrinkage policies, and
//! `amle = 1ᵗ Σ_mle⁻¹ 1`.

use crate::error::{BacktestError, Result};
use nalgebra::{DMatrix, DMatrixView, DVector, SymmetricEigen};
use serde::Serialize;

/// Smallest eigenvalue, relative to the largest, below which a covariance
/// matrix is treated as singular.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Moment estimates handed to every policy for one window.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterBundle {
    /// Number of assets including the risk-free asset (N + 1).
    pub asset_count: usize,
    /// Number of risky assets N.
    pub risky_count: usize,
    /// Observations in the estimation window.
    pub window_len: usize,
    /// Bias-adjusted covariance `(L-1)/(L-N-2) * S`.
    pub sigma: DMatrix<f64>,
    /// Maximum-likelihood covariance `(L-1)/L * S`.
    pub sigma_mle: DMatrix<f64>,
    pub inv_sigma_mle: DMatrix<f64>,
    /// `1ᵗ Σ_mle⁻¹ 1`.
    pub amle: f64,
    /// Risk aversion, set by the engine before calling a gamma-aware policy.
    pub gamma: Option<f64>,
    /// Risk-free mean followed by the N risky means.
    pub mu: DVector<f64>,
}

impl ParameterBundle {
    /// Means of the risky assets only.
    pub fn risky_mu(&self) -> DVector<f64> {
        self.mu.rows(1, self.risky_count).into_owned()
    }

    pub fn risk_free_mu(&self) -> f64 {
        self.mu[0]
    }

    /// Risk aversion, or a policy error when the engine did not supply one.
    pub fn require_gamma(&self) -> Result<f64> {
        self.gamma.ok_or_else(|| {
            BacktestError::PolicyError("policy requires a risk-aversion level (gamma)".to_string())
        })
    }
}

/// Computes [`ParameterBundle`]s from return windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentEstimator;

impl MomentEstimator {
    /// Check that a window of `window_len` observations supports the
    /// bias-adjusted covariance for `risky_count` assets.
    pub fn check_window(window_len: usize, risky_count: usize) -> Result<()> {
        if window_len <= risky_count + 2 {
            return Err(BacktestError::ConfigError(format!(
                "Estimation window of {} observations is too short for {} risky assets \
                 (need more than {})",
                window_len,
                risky_count,
                risky_count + 2
            )));
        }
        Ok(())
    }

    /// Estimate the moments of one window.
    ///
    /// `risk_free` has length L and `risky` is L x N.
    pub fn estimate(&self, risk_free: &[f64], risky: DMatrixView<'_, f64>) -> Result<ParameterBundle> {
        let len = risky.nrows();
        let n = risky.ncols();

        if risk_free.len() != len {
            return Err(BacktestError::InvalidInput(format!(
                "Risk-free window has {} rows but risky window has {}",
                risk_free.len(),
                len
            )));
        }
        Self::check_window(len, n)?;

        let l = len as f64;
        let risky_means: Vec<f64> = (0..n).map(|j| risky.column(j).sum() / l).collect();
        let rf_mean = risk_free.iter().sum::<f64>() / l;

        let mut mu = DVector::zeros(n + 1);
        mu[0] = rf_mean;
        for (j, m) in risky_means.iter().enumerate() {
            mu[j + 1] = *m;
        }

        let centered = DMatrix::from_fn(len, n, |i, j| risky[(i, j)] - risky_means[j]);
        let sample_cov = (centered.transpose() * &centered) / (l - 1.0);

        let sigma_mle = &sample_cov * ((l - 1.0) / l);
        let sigma = &sample_cov * ((l - 1.0) / (l - n as f64 - 2.0));
        let inv_sigma_mle = invert_covariance(&sigma_mle)?;

        let ones = DVector::from_element(n, 1.0);
        let amle = ones.dot(&(&inv_sigma_mle * &ones));

        Ok(ParameterBundle {
            asset_count: n + 1,
            risky_count: n,
            window_len: len,
            sigma,
            sigma_mle,
            inv_sigma_mle,
            amle,
            gamma: None,
            mu,
        })
    }
}

/// Invert a symmetric covariance matrix, refusing singular or near-singular input.
pub fn invert_covariance(cov: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(BacktestError::NumericalError(
            "covariance matrix contains non-finite entries".to_string(),
        ));
    }

    let eigenvalues = SymmetricEigen::new(cov.clone()).eigenvalues;
    let max_ev = eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_ev = eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);

    if max_ev <= 0.0 || min_ev <= max_ev * SINGULARITY_TOLERANCE {
        return Err(BacktestError::NumericalError(format!(
            "covariance matrix is singular (eigenvalues in [{:.3e}, {:.3e}])",
            min_ev, max_ev
        )));
    }

    cov.clone().try_inverse().ok_or_else(|| {
        BacktestError::NumericalError("covariance matrix could not be inverted".to_string())
    })
}
