//! allocbench - rolling-window backtests of portfolio allocation policies.
//!
//! # Overview
//!
//! allocbench walks a history of risk-free and risky returns with a trailing
//! estimation window. For every window it estimates means and covariances,
//! hands them to a set of allocation policies, and records:
//!
//! - **Rebalanced weights**: what each policy asks for at the window end
//! - **Buy-and-hold weights**: the previous weights drifted through one period
//! - **Out-of-sample returns**: the realised return of the new weights
//!
//! Several estimation horizons are run side by side; every horizon is aligned
//! to the longest one so that all of them are evaluated on the same dates.
//! Out-of-sample series are reduced to Sharpe ratios and tested against a
//! benchmark policy.
//!
//! # Quick Start
//!
//! ```no_run
//! use allocbench::{
//!     analytics::{PerformanceReport, SignificanceMethod},
//!     data::{load_returns, DataConfig},
//!     engine::{BacktestConfig, BacktestEngine},
//!     policies,
//! };
//!
//! let series = load_returns("data/returns.txt", &DataConfig::default()).unwrap();
//! let engine = BacktestEngine::new(
//!     BacktestConfig::default(),
//!     series,
//!     policies::full_catalog().unwrap(),
//! )
//! .unwrap();
//!
//! let result = engine.run().unwrap();
//! let report = PerformanceReport::from_result(
//!     &result,
//!     Some("Equal Weight"),
//!     SignificanceMethod::PairedDifference,
//! )
//! .unwrap();
//!
//! for (slot, sharpe) in report.sharpe_by_slot() {
//!     println!("{}: {}", slot, sharpe);
//! }
//! ```
//!
//! # Creating Custom Policies
//!
//! Implement the [`Policy`] trait. Weights cover the risky assets only; the
//! remainder `1 - Σw` sits in the risk-free asset.
//!
//! ```
//! use allocbench::moments::ParameterBundle;
//! use allocbench::{Policy, Result};
//! use nalgebra::DVector;
//!
//! struct AllInFirst;
//!
//! impl Policy for AllInFirst {
//!     fn name(&self) -> &str {
//!         "All In First"
//!     }
//!
//!     fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
//!         let mut w = DVector::zeros(params.risky_count);
//!         w[0] = 1.0;
//!         Ok(w)
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`]: Return series and table slot keys
//! - [`data`]: Loading return series from text files
//! - [`moments`]: Window moment estimation
//! - [`policy`]: Policy trait and registry
//! - [`policies`]: Built-in allocation policies
//! - [`engine`]: Rolling-window backtest engine
//! - [`analytics`]: Sharpe ratios, significance tests and reporting
//! - [`config`]: TOML configuration file support

pub mod analytics;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod moments;
pub mod policies;
pub mod policy;
pub mod types;

// Re-exports for convenience
pub use analytics::{
    compare, paired_differences, sharpe_ratio, Metric, PerformanceReport, ResultFormatter,
    SignificanceMethod, SignificanceResult, UndefinedMetric,
};
pub use engine::{
    buy_hold_update, out_of_sample_return, BacktestConfig, BacktestEngine, BacktestResult,
    PolicyTables, SlotOutcome, WindowPlan,
};
pub use error::{BacktestError, Result};
pub use moments::{MomentEstimator, ParameterBundle};
pub use policy::{Policy, PolicySet};
pub use types::{ReturnSeries, SlotKey};
