//! Policy trait and the policy registry.

use crate::error::{BacktestError, Result};
use crate::moments::ParameterBundle;
use nalgebra::DVector;

/// An allocation rule mapping window moments to risky-asset weights.
///
/// Implementations must be pure: the same bundle always yields the same
/// weights, and nothing is remembered between windows. The weight on the
/// risk-free asset is implicit (`1 - sum(weights)`).
pub trait Policy: Send + Sync {
    /// Returns the name of the policy. Names key the result tables.
    fn name(&self) -> &str;

    /// Whether the policy reads `gamma` from the bundle. Gamma-aware policies
    /// are evaluated once per configured risk-aversion level.
    fn uses_gamma(&self) -> bool {
        false
    }

    /// Compute weights over the `risky_count` risky assets.
    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>>;

    /// Get policy parameters as key-value pairs for logging.
    fn parameters(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// Ordered set of policies with unique names.
#[derive(Default)]
pub struct PolicySet {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Register a policy. Duplicate names are a configuration error.
    pub fn add(&mut self, policy: Box<dyn Policy>) -> Result<()> {
        if self.get(policy.name()).is_some() {
            return Err(BacktestError::ConfigError(format!(
                "Duplicate policy name: {}",
                policy.name()
            )));
        }
        self.policies.push(policy);
        Ok(())
    }

    /// Builder-style [`PolicySet::add`].
    pub fn with(mut self, policy: Box<dyn Policy>) -> Result<Self> {
        self.add(policy)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Policy> {
        self.policies
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Policy> {
        self.policies.iter().map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn any_uses_gamma(&self) -> bool {
        self.policies.iter().any(|p| p.uses_gamma())
    }
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
