//! Rolling-window backtest engine.
//!
//! For every horizon M the engine walks the series with a trailing window,
//! estimates moments, asks every policy for weights and fills three tables
//! per policy slot: rebalanced weights, buy-and-hold (drifted) weights and
//! one-step-ahead out-of-sample returns.
//!
//! All horizons share the same evaluation dates. With `upperM` the longest
//! horizon, a horizon M skips `shift = upperM - M` leading observations so
//! that every horizon's window ends at `m = M + shift = upperM`.

use crate::error::{BacktestError, Result};
use crate::moments::{MomentEstimator, ParameterBundle};
use crate::policy::{Policy, PolicySet};
use crate::types::{ReturnSeries, SlotKey};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Configuration for the backtest engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Estimation window lengths. The largest one anchors every horizon.
    pub horizons: Vec<usize>,
    /// Risk-aversion levels for gamma-aware policies.
    pub gammas: Vec<f64>,
    /// Show progress bar during backtest.
    #[serde(default)]
    pub show_progress: bool,
    /// Run horizons in parallel.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            horizons: vec![60, 120],
            gammas: vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0],
            show_progress: true,
            parallel: false,
        }
    }
}

/// Window layout for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    /// Horizon M.
    pub horizon: usize,
    /// Leading observations skipped, `upperM - M`.
    pub shift: usize,
    /// Effective window end `m = M + shift`.
    pub window_end: usize,
    /// Number of rolling windows.
    pub num_windows: usize,
    /// Observations in each estimation window.
    pub window_len: usize,
}

impl WindowPlan {
    /// Lay out windows for `horizon` on a series of `total` observations,
    /// aligned to the longest horizon `upper`.
    ///
    /// Requires `1 <= horizon <= upper <= total`.
    pub fn new(horizon: usize, upper: usize, total: usize) -> Result<Self> {
        if horizon == 0 || horizon > upper || upper > total {
            return Err(BacktestError::ConfigError(format!(
                "Invalid window layout: horizon {}, longest horizon {}, {} observations",
                horizon, upper, total
            )));
        }
        let shift = upper - horizon;
        let window_end = horizon + shift;
        let num_windows = if window_end == total {
            1
        } else {
            total - window_end
        };

        Ok(Self {
            horizon,
            shift,
            window_end,
            num_windows,
            window_len: window_end - 1 - shift,
        })
    }

    /// Rows `[start, end)` estimated in window `j`.
    ///
    /// The end excludes the window's newest observation.
    pub fn window_bounds(&self, j: usize) -> (usize, usize) {
        (j + self.shift, self.window_end + j - 1)
    }

    /// Period whose realised returns follow window `j`.
    pub fn evaluation_period(&self, j: usize) -> usize {
        self.window_end + j
    }

    /// More than one window: out-of-sample returns exist.
    pub fn is_rolling(&self) -> bool {
        self.num_windows > 1
    }
}

/// Tables filled for one policy slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTables {
    /// N x W rebalanced weights; column j is window j.
    pub weights: DMatrix<f64>,
    /// N x W weights drifted since the previous rebalance.
    pub buy_hold: DMatrix<f64>,
    /// Out-of-sample portfolio return per window; `None` when the horizon
    /// has no future period to evaluate.
    pub out_of_sample: Vec<Option<f64>>,
}

impl PolicyTables {
    pub fn new(num_risky: usize, num_windows: usize) -> Self {
        Self {
            weights: DMatrix::zeros(num_risky, num_windows),
            buy_hold: DMatrix::zeros(num_risky, num_windows),
            out_of_sample: vec![None; num_windows],
        }
    }

    pub fn num_windows(&self) -> usize {
        self.out_of_sample.len()
    }

    /// Out-of-sample returns that were actually recorded, in window order.
    pub fn valid_out_of_sample(&self) -> Vec<f64> {
        self.out_of_sample.iter().flatten().copied().collect()
    }
}

/// Where and why a policy slot stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotFailure {
    pub window: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlotOutcome {
    Completed(PolicyTables),
    /// The slot's tables are discarded; a partially filled table would bias
    /// every statistic computed from it.
    Failed(SlotFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResult {
    pub key: SlotKey,
    pub outcome: SlotOutcome,
}

impl SlotResult {
    pub fn tables(&self) -> Option<&PolicyTables> {
        match &self.outcome {
            SlotOutcome::Completed(tables) => Some(tables),
            SlotOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SlotFailure> {
        match &self.outcome {
            SlotOutcome::Completed(_) => None,
            SlotOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Results for one horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonResult {
    pub plan: WindowPlan,
    pub slots: Vec<SlotResult>,
}

impl HorizonResult {
    pub fn slot(&self, policy: &str, gamma: Option<f64>) -> Option<&SlotResult> {
        self.slots
            .iter()
            .find(|s| s.key.policy == policy && s.key.gamma == gamma)
    }
}

/// Results from a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Configuration used.
    pub config: BacktestConfig,
    pub num_observations: usize,
    pub num_risky: usize,
    /// Longest horizon (`upperM`).
    pub upper_horizon: usize,
    /// Per-horizon results, in configured order.
    pub horizons: Vec<HorizonResult>,
}

impl BacktestResult {
    pub fn horizon(&self, horizon: usize) -> Option<&HorizonResult> {
        self.horizons.iter().find(|h| h.plan.horizon == horizon)
    }

    pub fn slot(&self, policy: &str, horizon: usize, gamma: Option<f64>) -> Option<&SlotResult> {
        self.horizon(horizon)?.slot(policy, gamma)
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotResult> {
        self.horizons.iter().flat_map(|h| h.slots.iter())
    }

    pub fn failures(&self) -> Vec<(&SlotKey, &SlotFailure)> {
        self.slots()
            .filter_map(|s| s.failure().map(|f| (&s.key, f)))
            .collect()
    }
}

/// One buy-and-hold step.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyHoldUpdate {
    /// Drifted risky weights.
    pub weights: DVector<f64>,
    /// Grown value of the implicit risk-free position, `a`.
    pub cash_value: f64,
    /// Total portfolio value, `a + wᵗb`.
    pub total_value: f64,
}

/// Drift `weights` through one period without trading.
///
/// ```text
/// a   = (1 - Σw)(1 + rf)
/// b_i = 1 + r_i + rf
/// w_i' = w_i b_i / (a + wᵗb)
/// ```
///
/// The risk-free rate is added into every risky growth factor `b_i`.
pub fn buy_hold_update(weights: &DVector<f64>, risky: &DVector<f64>, risk_free: f64) -> Result<BuyHoldUpdate> {
    if weights.len() != risky.len() {
        return Err(BacktestError::InvalidInput(format!(
            "Got {} weights for {} risky returns",
            weights.len(),
            risky.len()
        )));
    }

    let cash_value = (1.0 - weights.sum()) * (1.0 + risk_free);
    let growth = risky.map(|r| 1.0 + r + risk_free);
    let total_value = cash_value + weights.dot(&growth);

    if !total_value.is_finite() || total_value.abs() < f64::EPSILON {
        return Err(BacktestError::NumericalError(format!(
            "Buy-and-hold portfolio value is {}",
            total_value
        )));
    }

    Ok(BuyHoldUpdate {
        weights: weights.component_mul(&growth) / total_value,
        cash_value,
        total_value,
    })
}

/// Realised return of holding `weights` through a period with risky returns `risky`.
pub fn out_of_sample_return(weights: &DVector<f64>, risky: &DVector<f64>) -> f64 {
    weights.dot(risky)
}

/// Engine-side state of one policy slot during a horizon run.
struct SlotState<'a> {
    key: SlotKey,
    policy: &'a dyn Policy,
    tables: PolicyTables,
    failure: Option<SlotFailure>,
}

impl SlotState<'_> {
    fn fail(&mut self, window: usize, err: BacktestError) {
        warn!(
            "{} failed at window {}: {}; discarding its tables",
            self.key, window, err
        );
        self.failure = Some(SlotFailure {
            window,
            reason: err.to_string(),
        });
    }

    fn finish(self) -> SlotResult {
        let outcome = match self.failure {
            Some(failure) => SlotOutcome::Failed(failure),
            None => SlotOutcome::Completed(self.tables),
        };
        SlotResult {
            key: self.key,
            outcome,
        }
    }
}

/// The rolling-window backtest engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    series: ReturnSeries,
    policies: PolicySet,
    estimator: MomentEstimator,
}

impl BacktestEngine {
    /// Create an engine, validating the configuration against the series.
    pub fn new(config: BacktestConfig, series: ReturnSeries, policies: PolicySet) -> Result<Self> {
        Self::validate(&config, &series, &policies)?;
        Ok(Self {
            config,
            series,
            policies,
            estimator: MomentEstimator,
        })
    }

    fn validate(config: &BacktestConfig, series: &ReturnSeries, policies: &PolicySet) -> Result<()> {
        if policies.is_empty() {
            return Err(BacktestError::ConfigError("No policies registered".to_string()));
        }
        if config.horizons.is_empty() {
            return Err(BacktestError::ConfigError("No time horizons configured".to_string()));
        }

        let total = series.len();
        let n = series.num_risky();
        let mut seen = HashSet::new();
        for &horizon in &config.horizons {
            if horizon == 0 {
                return Err(BacktestError::ConfigError(
                    "Time horizons must be positive".to_string(),
                ));
            }
            if horizon > total {
                return Err(BacktestError::ConfigError(format!(
                    "Time horizon {} exceeds the series length {}",
                    horizon, total
                )));
            }
            if !seen.insert(horizon) {
                return Err(BacktestError::ConfigError(format!(
                    "Duplicate time horizon {}",
                    horizon
                )));
            }
            MomentEstimator::check_window(horizon - 1, n).map_err(|e| {
                BacktestError::ConfigError(format!("Time horizon {}: {}", horizon, e))
            })?;
        }

        if policies.any_uses_gamma() && config.gammas.is_empty() {
            return Err(BacktestError::ConfigError(
                "Gamma-aware policies are registered but no gammas are configured".to_string(),
            ));
        }
        for (i, &gamma) in config.gammas.iter().enumerate() {
            if !gamma.is_finite() || gamma <= 0.0 {
                return Err(BacktestError::ConfigError(format!(
                    "Risk aversion must be positive and finite, got {}",
                    gamma
                )));
            }
            if config.gammas[..i].contains(&gamma) {
                return Err(BacktestError::ConfigError(format!(
                    "Duplicate risk aversion {}",
                    gamma
                )));
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn series(&self) -> &ReturnSeries {
        &self.series
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Longest configured horizon (`upperM`).
    pub fn upper_horizon(&self) -> usize {
        self.config.horizons.iter().copied().max().unwrap_or(0)
    }

    pub fn window_plan(&self, horizon: usize) -> Result<WindowPlan> {
        WindowPlan::new(horizon, self.upper_horizon(), self.series.len())
    }

    /// Table slots for one horizon: one per plain policy, one per gamma for
    /// gamma-aware policies.
    pub fn slot_keys(&self, horizon: usize) -> Vec<SlotKey> {
        self.slot_policies(horizon)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    fn slot_policies(&self, horizon: usize) -> Vec<(SlotKey, &dyn Policy)> {
        let mut slots = Vec::new();
        for policy in self.policies.iter() {
            if policy.uses_gamma() {
                for &gamma in &self.config.gammas {
                    slots.push((SlotKey::new(policy.name(), horizon, Some(gamma)), policy));
                }
            } else {
                slots.push((SlotKey::new(policy.name(), horizon, None), policy));
            }
        }
        slots
    }

    /// Run the backtest over every configured horizon.
    ///
    /// A policy failure discards that slot only. A moment-estimation failure
    /// aborts the run, since every policy depends on the shared estimates.
    pub fn run(&self) -> Result<BacktestResult> {
        let upper = self.upper_horizon();
        let windows_per_horizon = self.window_plan(upper)?.num_windows;

        info!(
            "Running backtest: {} policies over horizons {:?} ({} observations, {} risky assets)",
            self.policies.len(),
            self.config.horizons,
            self.series.len(),
            self.series.num_risky()
        );

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new((windows_per_horizon * self.config.horizons.len()) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let horizons = if self.config.parallel {
            self.config
                .horizons
                .par_iter()
                .map(|&h| self.run_horizon(h, progress.as_ref()))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.config
                .horizons
                .iter()
                .map(|&h| self.run_horizon(h, progress.as_ref()))
                .collect::<Result<Vec<_>>>()?
        };

        if let Some(pb) = progress {
            pb.finish_with_message("Backtest complete");
        }

        let result = BacktestResult {
            config: self.config.clone(),
            num_observations: self.series.len(),
            num_risky: self.series.num_risky(),
            upper_horizon: upper,
            horizons,
        };

        let failures = result.failures().len();
        if failures > 0 {
            warn!("{} policy slots failed", failures);
        }
        info!("Backtest complete: {} windows per horizon", windows_per_horizon);

        Ok(result)
    }

    fn run_horizon(&self, horizon: usize, progress: Option<&ProgressBar>) -> Result<HorizonResult> {
        let plan = self.window_plan(horizon)?;
        let n = self.series.num_risky();

        debug!(
            "Horizon {}: shift {}, window end {}, {} windows of {} observations",
            horizon, plan.shift, plan.window_end, plan.num_windows, plan.window_len
        );

        let mut slots: Vec<SlotState> = self
            .slot_policies(horizon)
            .into_iter()
            .map(|(key, policy)| SlotState {
                key,
                policy,
                tables: PolicyTables::new(n, plan.num_windows),
                failure: None,
            })
            .collect();

        for j in 0..plan.num_windows {
            let (start, end) = plan.window_bounds(j);
            let (rf, risky) = self.series.window(start, end);
            let mut bundle = self
                .estimator
                .estimate(rf, risky)
                .map_err(|e| e.at_window(horizon, j))?;

            // Realised returns of the period after the window; the single-window
            // case never reads them.
            let realised = if j > 0 || plan.is_rolling() {
                let t = plan.evaluation_period(j);
                Some((self.series.risky_at(t), self.series.risk_free_at(t)))
            } else {
                None
            };

            for slot in slots.iter_mut().filter(|s| s.failure.is_none()) {
                bundle.gamma = slot.key.gamma;
                if let Err(e) = Self::step(slot, &bundle, j, realised.as_ref(), plan.is_rolling()) {
                    slot.fail(j, e);
                }
            }

            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        Ok(HorizonResult {
            plan,
            slots: slots.into_iter().map(SlotState::finish).collect(),
        })
    }

    /// Fill column `j` of one slot's tables.
    fn step(
        slot: &mut SlotState,
        bundle: &ParameterBundle,
        j: usize,
        realised: Option<&(DVector<f64>, f64)>,
        rolling: bool,
    ) -> Result<()> {
        let alpha = slot.policy.weights(bundle)?;
        if alpha.len() != bundle.risky_count {
            return Err(BacktestError::PolicyError(format!(
                "returned {} weights for {} risky assets",
                alpha.len(),
                bundle.risky_count
            )));
        }
        if alpha.iter().any(|w| !w.is_finite()) {
            return Err(BacktestError::PolicyError(
                "returned non-finite weights".to_string(),
            ));
        }

        let tables = &mut slot.tables;
        tables.weights.set_column(j, &alpha);

        if j == 0 {
            tables.buy_hold.set_column(0, &alpha);
        } else if let Some((risky_t, rf_t)) = realised {
            let previous = tables.weights.column(j - 1).into_owned();
            let drifted = buy_hold_update(&previous, risky_t, *rf_t)?;
            tables.buy_hold.set_column(j, &drifted.weights);
        }

        if rolling {
            if let Some((risky_t, _)) = realised {
                tables.out_of_sample[j] = Some(out_of_sample_return(&alpha, risky_t));
            }
        }

        Ok(())
    }
}
