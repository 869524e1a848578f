//! Configuration file support for backtests.
//!
//! Allows loading backtest configurations from TOML files for reproducibility.

use crate::analytics::SignificanceMethod;
use crate::data::DataConfig;
use crate::engine::BacktestConfig;
use crate::error::{BacktestError, Result};
use crate::policies::{self, PolicyOptions};
use crate::policy::PolicySet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete backtest configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestFileConfig {
    /// Data settings.
    #[serde(default)]
    pub data: DataSettings,
    /// General backtest settings.
    #[serde(default)]
    pub backtest: BacktestSettings,
    /// Policy selection.
    #[serde(default)]
    pub policies: PolicySettings,
    /// Benchmark comparison settings.
    #[serde(default)]
    pub significance: SignificanceSettings,
}

/// Data settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSettings {
    /// Path to the returns file.
    pub path: Option<String>,
    /// Field delimiter: a single character, "tab", "whitespace", or unset to
    /// detect it.
    pub delimiter: Option<String>,
    /// Whether the first row holds column names.
    #[serde(default)]
    pub has_headers: bool,
    /// Whether the first column holds dates.
    #[serde(default)]
    pub date_column: bool,
    /// Date format string.
    pub date_format: Option<String>,
    /// Position of the risk-free column among the numeric columns.
    #[serde(default)]
    pub risk_free_column: usize,
}

impl DataSettings {
    /// Convert to the loader's configuration.
    pub fn to_data_config(&self) -> Result<DataConfig> {
        let delimiter = match self.delimiter.as_deref() {
            None | Some("auto") => None,
            Some("whitespace") | Some(" ") => Some(b' '),
            Some("tab") | Some("\t") => Some(b'\t'),
            Some(s) if s.len() == 1 && s.is_ascii() => Some(s.as_bytes()[0]),
            Some(other) => {
                return Err(BacktestError::ConfigError(format!(
                    "Unsupported delimiter '{}'",
                    other
                )))
            }
        };

        Ok(DataConfig {
            delimiter,
            has_headers: self.has_headers,
            date_column: self.date_column,
            date_format: self.date_format.clone(),
            risk_free_column: self.risk_free_column,
        })
    }
}

/// General backtest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSettings {
    /// Estimation window lengths.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
    /// Risk-aversion levels.
    #[serde(default = "default_gammas")]
    pub gammas: Vec<f64>,
    /// Run horizons in parallel.
    #[serde(default)]
    pub parallel: bool,
    /// Show progress bar.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_horizons() -> Vec<usize> { vec![60, 120] }
fn default_gammas() -> Vec<f64> { vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0] }
fn default_true() -> bool { true }

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            horizons: default_horizons(),
            gammas: default_gammas(),
            parallel: false,
            show_progress: true,
        }
    }
}

/// Policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Policy identifiers, in report order.
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
    /// Identifier of the benchmark policy.
    #[serde(default = "default_benchmark")]
    pub benchmark: Option<String>,
    /// Floor fraction `a` of the Jagannathan-Ma constraint `w >= a/N`.
    #[serde(default = "default_jm_bound")]
    pub jagannathan_ma_lower_bound: f64,
}

fn default_enabled() -> Vec<String> {
    policies::CATALOG.iter().map(|(id, _)| id.to_string()).collect()
}
fn default_benchmark() -> Option<String> { Some("equal-weight".to_string()) }
fn default_jm_bound() -> f64 { PolicyOptions::default().jagannathan_ma_lower_bound }

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            benchmark: default_benchmark(),
            jagannathan_ma_lower_bound: default_jm_bound(),
        }
    }
}

/// Benchmark comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceSettings {
    #[serde(default)]
    pub method: SignificanceMethod,
    /// Two-sided significance level.
    #[serde(default = "default_level")]
    pub level: f64,
}

fn default_level() -> f64 { 0.05 }

impl Default for SignificanceSettings {
    fn default() -> Self {
        Self {
            method: SignificanceMethod::default(),
            level: default_level(),
        }
    }
}

impl BacktestFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: BacktestFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BacktestError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert to BacktestConfig for the engine.
    pub fn to_backtest_config(&self) -> Result<BacktestConfig> {
        if !(self.significance.level > 0.0 && self.significance.level < 1.0) {
            return Err(BacktestError::ConfigError(format!(
                "Significance level must be in (0, 1), got {}",
                self.significance.level
            )));
        }

        Ok(BacktestConfig {
            horizons: self.backtest.horizons.clone(),
            gammas: self.backtest.gammas.clone(),
            show_progress: self.backtest.show_progress,
            parallel: self.backtest.parallel,
        })
    }

    fn policy_options(&self) -> PolicyOptions {
        PolicyOptions {
            jagannathan_ma_lower_bound: self.policies.jagannathan_ma_lower_bound,
        }
    }

    /// Build the enabled policies in configured order.
    pub fn build_policies(&self) -> Result<PolicySet> {
        if self.policies.enabled.is_empty() {
            return Err(BacktestError::ConfigError("No policies enabled".to_string()));
        }
        policies::build_set(&self.policies.enabled, &self.policy_options())
    }

    /// Display name of the benchmark policy, which must be enabled.
    pub fn benchmark_name(&self) -> Result<Option<String>> {
        let Some(id) = &self.policies.benchmark else {
            return Ok(None);
        };
        if !self.policies.enabled.iter().any(|e| e.eq_ignore_ascii_case(id)) {
            return Err(BacktestError::ConfigError(format!(
                "Benchmark '{}' is not among the enabled policies",
                id
            )));
        }
        let policy = policies::from_id(id, &self.policy_options())?;
        Ok(Some(policy.name().to_string()))
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# allocbench configuration file

[data]
path = "data/returns.txt"
# "whitespace", "tab", a single character, or leave unset to detect
delimiter = "whitespace"
has_headers = false
date_column = false
# date_format = "%Y%m"
risk_free_column = 0

[backtest]
horizons = [60, 120]
gammas = [1.0, 2.0, 3.0, 4.0, 5.0, 10.0]
parallel = false
show_progress = true

[policies]
enabled = [
    "equal-weight",
    "min-variance",
    "jagannathan-ma",
    "min-variance-short-sell-con",
    "mean-variance",
    "mean-variance-short-sell-con",
    "kan-zhou",
    "bayes-stein",
    "bayes-stein-short-sell-con",
]
benchmark = "equal-weight"
jagannathan_ma_lower_bound = 0.5

[significance]
method = "paired-difference"   # or "jobson-korkie-memmel"
level = 0.05
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BacktestFileConfig::default();
        assert_eq!(config.backtest.horizons, vec![60, 120]);
        assert_eq!(config.policies.enabled.len(), policies::CATALOG.len());
        assert_eq!(config.significance.method, SignificanceMethod::PairedDifference);
    }

    #[test]
    fn test_load_config() {
        let toml_content = r#"
[data]
path = "returns.csv"
delimiter = ","
has_headers = true

[backtest]
horizons = [36, 72]
gammas = [2.0]

[policies]
enabled = ["equal-weight", "mean-variance"]
benchmark = "equal-weight"

[significance]
method = "jobson-korkie-memmel"
level = 0.1
"#;
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", toml_content).unwrap();

        let config = BacktestFileConfig::load(file.path()).unwrap();
        assert_eq!(config.data.path.as_deref(), Some("returns.csv"));
        assert_eq!(config.backtest.horizons, vec![36, 72]);
        assert!(config.backtest.show_progress);
        assert_eq!(config.policies.enabled.len(), 2);
        assert_eq!(config.significance.method, SignificanceMethod::JobsonKorkieMemmel);
        assert!((config.significance.level - 0.1).abs() < 1e-12);

        let data = config.data.to_data_config().unwrap();
        assert_eq!(data.delimiter, Some(b','));
        assert!(data.has_headers);
    }

    #[test]
    fn test_to_backtest_config() {
        let file_config = BacktestFileConfig {
            backtest: BacktestSettings {
                horizons: vec![24],
                parallel: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let config = file_config.to_backtest_config().unwrap();
        assert_eq!(config.horizons, vec![24]);
        assert_eq!(config.gammas.len(), 6);
        assert!(config.parallel);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let mut config = BacktestFileConfig::default();
        config.significance.level = 1.5;
        assert!(config.to_backtest_config().is_err());
    }

    #[test]
    fn test_build_policies_and_benchmark() {
        let mut config = BacktestFileConfig::default();
        config.policies.enabled = vec!["min-variance".into(), "equal-weight".into()];

        let set = config.build_policies().unwrap();
        assert_eq!(set.names(), vec!["Minimum Variance", "Equal Weight"]);
        assert_eq!(config.benchmark_name().unwrap().as_deref(), Some("Equal Weight"));

        config.policies.benchmark = Some("kan-zhou".into());
        assert!(config.benchmark_name().is_err());

        config.policies.benchmark = None;
        assert_eq!(config.benchmark_name().unwrap(), None);
    }

    #[test]
    fn test_delimiter_names() {
        let mut data = DataSettings::default();
        assert_eq!(data.to_data_config().unwrap().delimiter, None);

        data.delimiter = Some("whitespace".into());
        assert_eq!(data.to_data_config().unwrap().delimiter, Some(b' '));

        data.delimiter = Some("tab".into());
        assert_eq!(data.to_data_config().unwrap().delimiter, Some(b'\t'));

        data.delimiter = Some("||".into());
        assert!(data.to_data_config().is_err());
    }

    #[test]
    fn test_save_config() {
        let config = BacktestFileConfig::default();
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        // Verify we can load it back
        let loaded = BacktestFileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.backtest.horizons, config.backtest.horizons);
        assert_eq!(loaded.policies.enabled, config.policies.enabled);
    }

    #[test]
    fn test_example_config() {
        let example = BacktestFileConfig::example();
        let config: BacktestFileConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.policies.enabled.len(), policies::CATALOG.len());
        assert!(config.build_policies().is_ok());
        assert_eq!(config.data.to_data_config().unwrap().delimiter, Some(b' '));
    }
}
