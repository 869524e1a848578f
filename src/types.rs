//! Core data types for the backtest engine.

use crate::error::{BacktestError, Result};
use chrono::NaiveDate;
use nalgebra::{DMatrix, DMatrixView, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Historical return series: one risk-free column and N risky columns.
///
/// Row `t` is the period-`t` observation. The series is immutable once built.
#[derive(Debug, Clone)]
pub struct ReturnSeries {
    risk_free: Vec<f64>,
    /// T x N risky returns.
    risky: DMatrix<f64>,
    asset_names: Vec<String>,
    dates: Option<Vec<NaiveDate>>,
}

impl ReturnSeries {
    /// Create a series from a risk-free column and a T x N matrix of risky returns.
    pub fn new(risk_free: Vec<f64>, risky: DMatrix<f64>) -> Result<Self> {
        if risk_free.is_empty() {
            return Err(BacktestError::NoData);
        }
        if risky.ncols() == 0 {
            return Err(BacktestError::DataError(
                "Return series needs at least one risky asset".to_string(),
            ));
        }
        if risky.nrows() != risk_free.len() {
            return Err(BacktestError::DataError(format!(
                "Risk-free column has {} rows but risky returns have {}",
                risk_free.len(),
                risky.nrows()
            )));
        }
        if risk_free.iter().chain(risky.iter()).any(|v| !v.is_finite()) {
            return Err(BacktestError::DataError(
                "Return series contains non-finite values".to_string(),
            ));
        }

        let asset_names = (1..=risky.ncols()).map(|i| format!("Asset {}", i)).collect();

        Ok(Self {
            risk_free,
            risky,
            asset_names,
            dates: None,
        })
    }

    /// Create a series from rows laid out as `[risk_free, risky_1, ..., risky_N]`.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows.first().ok_or(BacktestError::NoData)?;
        let width = first.len();
        if width < 2 {
            return Err(BacktestError::DataError(format!(
                "Rows need a risk-free column and at least one risky column, got {} columns",
                width
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(BacktestError::DataError(format!(
                "Row {} has {} columns, expected {}",
                i,
                row.len(),
                width
            )));
        }

        let risk_free = rows.iter().map(|r| r[0]).collect();
        let risky = DMatrix::from_fn(rows.len(), width - 1, |i, j| rows[i][j + 1]);
        Self::new(risk_free, risky)
    }

    /// Attach asset names (one per risky column).
    pub fn with_asset_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.num_risky() {
            return Err(BacktestError::DataError(format!(
                "Got {} asset names for {} risky assets",
                names.len(),
                self.num_risky()
            )));
        }
        self.asset_names = names;
        Ok(self)
    }

    /// Attach observation dates (one per row).
    pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> Result<Self> {
        if dates.len() != self.len() {
            return Err(BacktestError::DataError(format!(
                "Got {} dates for {} observations",
                dates.len(),
                self.len()
            )));
        }
        self.dates = Some(dates);
        Ok(self)
    }

    /// Number of observations T.
    pub fn len(&self) -> usize {
        self.risk_free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.risk_free.is_empty()
    }

    /// Number of risky assets N.
    pub fn num_risky(&self) -> usize {
        self.risky.ncols()
    }

    pub fn risk_free(&self) -> &[f64] {
        &self.risk_free
    }

    pub fn risky(&self) -> &DMatrix<f64> {
        &self.risky
    }

    pub fn asset_names(&self) -> &[String] {
        &self.asset_names
    }

    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    /// Risk-free return at period `t`.
    pub fn risk_free_at(&self, t: usize) -> f64 {
        self.risk_free[t]
    }

    /// Risky returns at period `t` as a column vector.
    pub fn risky_at(&self, t: usize) -> DVector<f64> {
        self.risky.row(t).transpose()
    }

    /// Rows `[start, end)` of both columns.
    pub fn window(&self, start: usize, end: usize) -> (&[f64], DMatrixView<'_, f64>) {
        (
            &self.risk_free[start..end],
            self.risky.rows(start, end - start),
        )
    }
}

/// Identifies one table slot: a policy evaluated at one horizon (and one
/// risk-aversion level for gamma-aware policies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotKey {
    pub policy: String,
    pub horizon: usize,
    pub gamma: Option<f64>,
}

impl SlotKey {
    pub fn new(policy: impl Into<String>, horizon: usize, gamma: Option<f64>) -> Self {
        Self {
            policy: policy.into(),
            horizon,
            gamma,
        }
    }

    /// Policy name with the risk-aversion level, without the horizon.
    pub fn policy_label(&self) -> String {
        match self.gamma {
            Some(g) => format!("{} (gamma={})", self.policy, g),
            None => self.policy.clone(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [M={}]", self.policy_label(), self.horizon)
    }
}
