//! Built-in allocation policies.
//!
//! Policies that ignore risk aversion:
//! - [`EqualWeight`]: 1/(N+1) in every asset
//! - [`MinVariance`]: sample global minimum-variance portfolio
//! - [`MinVarianceShortSellCon`]: minimum variance, long-only
//! - [`JagannathanMa`]: minimum variance with a per-asset floor
//!
//! Policies evaluated once per risk-aversion level:
//! - [`MeanVariance`]: sample Markowitz portfolio
//! - [`MeanVarianceShortSellCon`]: Markowitz, long-only and fully invested
//! - [`KanZhou`]: three-fund rule
//! - [`BayesStein`]: Jorion shrinkage
//! - [`BayesSteinShortSellCon`]: Jorion shrinkage, long-only

mod bayes_stein;
mod equal_weight;
mod kan_zhou;
mod mean_variance;
mod min_variance;
pub mod qp;

pub use bayes_stein::{BayesStein, BayesSteinMoments, BayesSteinShortSellCon};
pub use equal_weight::EqualWeight;
pub use kan_zhou::{adjusted_psi_squared, KanZhou};
pub use mean_variance::{MeanVariance, MeanVarianceShortSellCon};
pub use min_variance::{JagannathanMa, MinVariance, MinVarianceShortSellCon};

use crate::error::{BacktestError, Result};
use crate::policy::{Policy, PolicySet};

/// Identifier and one-line description of every built-in policy, in the
/// default registration order.
pub const CATALOG: &[(&str, &str)] = &[
    ("equal-weight", "1/(N+1) in each risky asset, remainder risk-free"),
    ("min-variance", "Sample global minimum-variance portfolio"),
    ("jagannathan-ma", "Minimum variance with weights floored at a/N"),
    (
        "min-variance-short-sell-con",
        "Minimum variance, long-only and fully invested",
    ),
    ("mean-variance", "Sample Markowitz portfolio (per gamma)"),
    (
        "mean-variance-short-sell-con",
        "Markowitz, long-only and fully invested (per gamma)",
    ),
    ("kan-zhou", "Kan-Zhou three-fund rule (per gamma)"),
    ("bayes-stein", "Jorion Bayes-Stein shrinkage (per gamma)"),
    (
        "bayes-stein-short-sell-con",
        "Bayes-Stein shrinkage, long-only (per gamma)",
    ),
];

/// Tunables for built-in policies.
#[derive(Debug, Clone, Copy)]
pub struct PolicyOptions {
    /// Floor `a` in the `w_i >= a/N` constraint of [`JagannathanMa`].
    pub jagannathan_ma_lower_bound: f64,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            jagannathan_ma_lower_bound: JagannathanMa::DEFAULT_LOWER_BOUND_FRACTION,
        }
    }
}

/// Build a built-in policy from its identifier.
pub fn from_id(id: &str, options: &PolicyOptions) -> Result<Box<dyn Policy>> {
    let policy: Box<dyn Policy> = match id.to_lowercase().as_str() {
        "equal-weight" => Box::new(EqualWeight::new()),
        "min-variance" => Box::new(MinVariance::new()),
        "jagannathan-ma" => {
            let a = options.jagannathan_ma_lower_bound;
            if !(0.0..=1.0).contains(&a) {
                return Err(BacktestError::ConfigError(format!(
                    "Jagannathan-Ma lower bound fraction must be in [0, 1], got {}",
                    a
                )));
            }
            Box::new(JagannathanMa::new(a))
        }
        "min-variance-short-sell-con" => Box::new(MinVarianceShortSellCon::new()),
        "mean-variance" => Box::new(MeanVariance::new()),
        "mean-variance-short-sell-con" => Box::new(MeanVarianceShortSellCon::new()),
        "kan-zhou" => Box::new(KanZhou::new()),
        "bayes-stein" => Box::new(BayesStein::new()),
        "bayes-stein-short-sell-con" => Box::new(BayesSteinShortSellCon::new()),
        other => {
            return Err(BacktestError::ConfigError(format!(
                "Unknown policy '{}'. Available: {}",
                other,
                CATALOG.iter().map(|(id, _)| *id).collect::<Vec<_>>().join(", ")
            )))
        }
    };
    Ok(policy)
}

/// Build a policy set from identifiers, preserving their order.
pub fn build_set<S: AsRef<str>>(ids: &[S], options: &PolicyOptions) -> Result<PolicySet> {
    let mut set = PolicySet::new();
    for id in ids {
        set.add(from_id(id.as_ref(), options)?)?;
    }
    Ok(set)
}

/// Every built-in policy with default options.
pub fn full_catalog() -> Result<PolicySet> {
    let ids: Vec<&str> = CATALOG.iter().map(|(id, _)| *id).collect();
    build_set(&ids, &PolicyOptions::default())
}
