//! Naive diversification.

use crate::error::Result;
use crate::moments::ParameterBundle;
use crate::policy::Policy;
use nalgebra::DVector;

/// Equal weight across all assets including the risk-free asset.
///
/// Each of the N risky assets receives `1/(N+1)`; the remaining `1/(N+1)`
/// stays in the risk-free asset. Ignores every estimate in the bundle.
#[derive(Debug, Clone)]
pub struct EqualWeight {
    name: String,
}

impl EqualWeight {
    pub fn new() -> Self {
        Self::named("Equal Weight")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EqualWeight {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for EqualWeight {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self, params: &ParameterBundle) -> Result<DVector<f64>> {
        Ok(DVector::from_element(
            params.risky_count,
            1.0 / params.asset_count as f64,
        ))
    }
}
