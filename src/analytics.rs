//! Performance analytics: Sharpe ratios, significance tests and reporting.

use crate::engine::BacktestResult;
use crate::error::{BacktestError, Result};
use crate::types::SlotKey;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::collections::BTreeMap;
use std::fmt;
use tabled::{builder::Builder, settings::Style};
use tracing::{debug, warn};

/// Means at or below this magnitude make the Sharpe ratio undefined.
pub const NEGLIGIBLE_MEAN: f64 = 1e-16;

/// Relative size below which the Jobson-Korkie-Memmel variance counts as zero.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Why a metric has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedMetric {
    /// Fewer than two valid observations.
    InsufficientObservations,
    /// Mean return indistinguishable from zero.
    NegligibleMean,
    /// Sample standard deviation is zero.
    ZeroVolatility,
    /// Test statistic variance vanishes, e.g. one series is a scaled copy of the other.
    DegenerateVariance,
}

impl fmt::Display for UndefinedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            UndefinedMetric::InsufficientObservations => "insufficient observations",
            UndefinedMetric::NegligibleMean => "negligible mean",
            UndefinedMetric::ZeroVolatility => "zero volatility",
            UndefinedMetric::DegenerateVariance => "degenerate variance",
        };
        write!(f, "{}", reason)
    }
}

/// A statistic that is either a number or explicitly undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Value(f64),
    Undefined(UndefinedMetric),
}

impl Metric {
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Value(_))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => write!(f, "{:.4}", v),
            Metric::Undefined(reason) => write!(f, "undefined ({})", reason),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Needs at least two values.
fn sample_std(values: &[f64], mean: f64) -> f64 {
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn sample_cov(a: &[f64], mean_a: f64, b: &[f64], mean_b: f64) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / (a.len() - 1) as f64
}

/// Per-period Sharpe ratio: mean over sample standard deviation.
///
/// Returns are taken as already in excess of the risk-free rate; no
/// annualisation is applied.
pub fn sharpe_ratio(returns: &[f64]) -> Metric {
    if returns.len() < 2 {
        return Metric::Undefined(UndefinedMetric::InsufficientObservations);
    }
    let m = mean(returns);
    if m.abs() <= NEGLIGIBLE_MEAN {
        return Metric::Undefined(UndefinedMetric::NegligibleMean);
    }
    let sd = sample_std(returns, m);
    if sd == 0.0 || !sd.is_finite() {
        return Metric::Undefined(UndefinedMetric::ZeroVolatility);
    }
    Metric::Value(m / sd)
}

/// Column-aligned differences `candidate[i] - benchmark[i]`.
pub fn paired_differences(candidate: &[f64], benchmark: &[f64]) -> Result<Vec<f64>> {
    if candidate.len() != benchmark.len() {
        return Err(BacktestError::InvalidInput(format!(
            "Cannot pair {} candidate returns with {} benchmark returns",
            candidate.len(),
            benchmark.len()
        )));
    }
    Ok(candidate.iter().zip(benchmark).map(|(c, b)| c - b).collect())
}

/// Test used to compare a candidate series against the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SignificanceMethod {
    /// Student-t test on the paired return differences.
    #[default]
    PairedDifference,
    /// Jobson-Korkie test of equal Sharpe ratios with Memmel's correction.
    JobsonKorkieMemmel,
}

impl fmt::Display for SignificanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignificanceMethod::PairedDifference => write!(f, "paired-difference"),
            SignificanceMethod::JobsonKorkieMemmel => write!(f, "jobson-korkie-memmel"),
        }
    }
}

/// Outcome of comparing one series against the benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub method: SignificanceMethod,
    /// Paired observations used.
    pub observations: usize,
    /// Mean of `candidate - benchmark`.
    pub mean_difference: f64,
    /// t statistic (paired) or z statistic (Jobson-Korkie-Memmel).
    pub statistic: Metric,
    /// Two-sided p-value, when the statistic is defined.
    pub p_value: Option<f64>,
}

impl SignificanceResult {
    /// True when the two-sided p-value is below `level`.
    pub fn is_significant(&self, level: f64) -> bool {
        self.p_value.map_or(false, |p| p < level)
    }

    fn undefined(method: SignificanceMethod, observations: usize, mean_difference: f64, reason: UndefinedMetric) -> Self {
        Self {
            method,
            observations,
            mean_difference,
            statistic: Metric::Undefined(reason),
            p_value: None,
        }
    }
}

/// Compare `candidate` against `benchmark`, paired by window index.
pub fn compare(candidate: &[f64], benchmark: &[f64], method: SignificanceMethod) -> Result<SignificanceResult> {
    let diffs = paired_differences(candidate, benchmark)?;
    let n = diffs.len();
    if n < 2 {
        let mean_difference = if n == 1 { diffs[0] } else { 0.0 };
        return Ok(SignificanceResult::undefined(
            method,
            n,
            mean_difference,
            UndefinedMetric::InsufficientObservations,
        ));
    }

    match method {
        SignificanceMethod::PairedDifference => paired_t_test(&diffs),
        SignificanceMethod::JobsonKorkieMemmel => jobson_korkie_memmel(candidate, benchmark, mean(&diffs)),
    }
}

fn paired_t_test(diffs: &[f64]) -> Result<SignificanceResult> {
    let method = SignificanceMethod::PairedDifference;
    let n = diffs.len();
    let mean_difference = mean(diffs);
    let sd = sample_std(diffs, mean_difference);
    if sd == 0.0 || !sd.is_finite() {
        return Ok(SignificanceResult::undefined(
            method,
            n,
            mean_difference,
            UndefinedMetric::ZeroVolatility,
        ));
    }

    let t = mean_difference / (sd / (n as f64).sqrt());
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| BacktestError::NumericalError(format!("Student-t distribution: {}", e)))?;
    let p_value = (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0);

    Ok(SignificanceResult {
        method,
        observations: n,
        mean_difference,
        statistic: Metric::Value(t),
        p_value: Some(p_value),
    })
}

fn jobson_korkie_memmel(candidate: &[f64], benchmark: &[f64], mean_difference: f64) -> Result<SignificanceResult> {
    let method = SignificanceMethod::JobsonKorkieMemmel;
    let n = candidate.len();
    let t = n as f64;

    let mu_i = mean(candidate);
    let mu_n = mean(benchmark);
    let sd_i = sample_std(candidate, mu_i);
    let sd_n = sample_std(benchmark, mu_n);
    if sd_i == 0.0 || sd_n == 0.0 {
        return Ok(SignificanceResult::undefined(
            method,
            n,
            mean_difference,
            UndefinedMetric::ZeroVolatility,
        ));
    }
    let cov = sample_cov(candidate, mu_i, benchmark, mu_n);

    let positive = 2.0 * sd_i.powi(2) * sd_n.powi(2)
        + 0.5 * mu_i.powi(2) * sd_n.powi(2)
        + 0.5 * mu_n.powi(2) * sd_i.powi(2);
    let theta = (positive - 2.0 * sd_i * sd_n * cov - (mu_i * mu_n / (sd_i * sd_n)) * cov.powi(2)) / t;
    // Cancellation leaves rounding noise when the series are proportional.
    if !theta.is_finite() || theta <= DEGENERATE_TOLERANCE * positive / t {
        return Ok(SignificanceResult::undefined(
            method,
            n,
            mean_difference,
            UndefinedMetric::DegenerateVariance,
        ));
    }

    let z = (sd_n * mu_i - sd_i * mu_n) / theta.sqrt();
    let dist = Normal::new(0.0, 1.0)
        .map_err(|e| BacktestError::NumericalError(format!("normal distribution: {}", e)))?;
    let p_value = (2.0 * (1.0 - dist.cdf(z.abs()))).clamp(0.0, 1.0);

    Ok(SignificanceResult {
        method,
        observations: n,
        mean_difference,
        statistic: Metric::Value(z),
        p_value: Some(p_value),
    })
}

/// Sharpe ratio of one slot's out-of-sample series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpeEntry {
    pub key: SlotKey,
    pub observations: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub sharpe: Metric,
}

/// Significance of one slot against its horizon's benchmark slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceEntry {
    pub key: SlotKey,
    pub benchmark: SlotKey,
    pub result: SignificanceResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSlot {
    pub key: SlotKey,
    pub window: usize,
    pub reason: String,
}

/// Aggregated performance of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub benchmark: Option<String>,
    pub method: SignificanceMethod,
    /// Significance level used to flag results.
    pub level: f64,
    pub sharpe: Vec<SharpeEntry>,
    pub significance: Vec<SignificanceEntry>,
    pub failures: Vec<FailedSlot>,
}

impl PerformanceReport {
    /// Default significance level.
    pub const DEFAULT_LEVEL: f64 = 0.05;

    /// Build a report from a completed run.
    ///
    /// With a benchmark, every other completed slot is compared against the
    /// benchmark slot of the same horizon (same gamma when the benchmark is
    /// gamma-aware).
    pub fn from_result(
        result: &BacktestResult,
        benchmark: Option<&str>,
        method: SignificanceMethod,
    ) -> Result<Self> {
        if let Some(name) = benchmark {
            if !result.slots().any(|s| s.key.policy == name) {
                return Err(BacktestError::ConfigError(format!(
                    "Benchmark policy '{}' is not part of the run",
                    name
                )));
            }
        }

        let mut sharpe = Vec::new();
        let mut significance = Vec::new();
        let mut failures = Vec::new();

        for horizon in &result.horizons {
            for slot in &horizon.slots {
                let tables = match (slot.tables(), slot.failure()) {
                    (Some(tables), _) => tables,
                    (None, Some(failure)) => {
                        failures.push(FailedSlot {
                            key: slot.key.clone(),
                            window: failure.window,
                            reason: failure.reason.clone(),
                        });
                        continue;
                    }
                    (None, None) => continue,
                };

                let returns = tables.valid_out_of_sample();
                let m = (!returns.is_empty()).then(|| mean(&returns));
                let sd = m.filter(|_| returns.len() > 1).map(|m| sample_std(&returns, m));
                sharpe.push(SharpeEntry {
                    key: slot.key.clone(),
                    observations: returns.len(),
                    mean: m,
                    std_dev: sd,
                    sharpe: sharpe_ratio(&returns),
                });

                let Some(name) = benchmark else { continue };
                if slot.key.policy == name {
                    continue;
                }

                let bench_slot = horizon
                    .slot(name, slot.key.gamma)
                    .or_else(|| horizon.slot(name, None))
                    .or_else(|| horizon.slots.iter().find(|s| s.key.policy == name));
                let Some(bench_slot) = bench_slot else { continue };
                let Some(bench_tables) = bench_slot.tables() else {
                    warn!("Benchmark {} failed; skipping comparison for {}", bench_slot.key, slot.key);
                    continue;
                };

                let outcome = compare(&returns, &bench_tables.valid_out_of_sample(), method)?;
                debug!("{} vs {}: {}", slot.key, bench_slot.key, outcome.statistic);
                significance.push(SignificanceEntry {
                    key: slot.key.clone(),
                    benchmark: bench_slot.key.clone(),
                    result: outcome,
                });
            }
        }

        Ok(Self {
            benchmark: benchmark.map(str::to_string),
            method,
            level: Self::DEFAULT_LEVEL,
            sharpe,
            significance,
            failures,
        })
    }

    /// Set the significance level used for flagging.
    pub fn with_level(mut self, level: f64) -> Self {
        self.level = level;
        self
    }

    /// Sharpe ratio by slot label.
    pub fn sharpe_by_slot(&self) -> BTreeMap<String, Metric> {
        self.sharpe
            .iter()
            .map(|e| (e.key.to_string(), e.sharpe))
            .collect()
    }

    /// Significance result by slot label.
    pub fn significance_by_slot(&self) -> BTreeMap<String, &SignificanceResult> {
        self.significance
            .iter()
            .map(|e| (e.key.to_string(), &e.result))
            .collect()
    }

    pub fn significance_for(&self, key: &SlotKey) -> Option<&SignificanceResult> {
        self.significance
            .iter()
            .find(|e| &e.key == key)
            .map(|e| &e.result)
    }
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a full report to stdout.
    pub fn print_report(result: &BacktestResult, report: &PerformanceReport) {
        println!();
        println!("{}", "═".repeat(72).blue());
        println!("{}", " BACKTEST RESULTS ".bold().blue());
        println!("{}", "═".repeat(72).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!("  Observations:    {:>8}", result.num_observations);
        println!("  Risky Assets:    {:>8}", result.num_risky);
        println!("  Horizons:        {:?}", result.config.horizons);
        println!("  Gammas:          {:?}", result.config.gammas);
        if let Some(h) = result.horizons.first() {
            println!("  Windows:         {:>8}", h.plan.num_windows);
        }
        if let Some(bm) = &report.benchmark {
            println!("  Benchmark:       {}", bm);
            println!("  Test:            {} (level {})", report.method, report.level);
        }
        println!();

        Self::print_table(report);

        if !report.failures.is_empty() {
            println!();
            println!("{}", "Failed Policies".bold().underline());
            for failure in &report.failures {
                println!(
                    "  {} at window {}: {}",
                    failure.key.to_string().red(),
                    failure.window,
                    failure.reason
                );
            }
        }

        println!();
        println!("{}", "═".repeat(72).blue());
    }

    /// Print Sharpe ratios and significance as a table.
    pub fn print_table(report: &PerformanceReport) {
        let mut builder = Builder::new();
        builder.push_record(["Policy", "M", "Obs", "Mean", "Std", "Sharpe", "Stat", "p-value"]);

        for entry in &report.sharpe {
            let sig = report.significance_for(&entry.key);
            let p_value = match sig.and_then(|s| s.p_value) {
                Some(p) if p < report.level => format!("{:.4}", p).green().to_string(),
                Some(p) => format!("{:.4}", p),
                None => "-".to_string(),
            };

            builder.push_record([
                entry.key.policy_label(),
                entry.key.horizon.to_string(),
                entry.observations.to_string(),
                Self::format_option(entry.mean),
                Self::format_option(entry.std_dev),
                Self::format_metric(&entry.sharpe),
                sig.map(|s| Self::format_metric(&s.statistic))
                    .unwrap_or_else(|| "-".to_string()),
                p_value,
            ]);
        }

        let table = builder.build().with(Style::rounded()).to_string();
        println!("{}", table);
    }

    fn format_option(value: Option<f64>) -> String {
        value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
    }

    fn format_metric(metric: &Metric) -> String {
        match metric {
            Metric::Value(v) => format!("{:.4}", v),
            Metric::Undefined(_) => "undefined".yellow().to_string(),
        }
    }

    /// Export the report to JSON.
    pub fn to_json(report: &PerformanceReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    /// One CSV line per slot.
    pub fn to_csv_lines(report: &PerformanceReport) -> Vec<String> {
        let opt = |v: Option<f64>| v.map_or_else(String::new, |v| format!("{:.4}", v));
        report
            .sharpe
            .iter()
            .map(|entry| {
                let sig = report.significance_for(&entry.key);
                format!(
                    "{},{},{},{},{},{},{},{},{}",
                    entry.key.policy,
                    entry.key.gamma.map_or_else(String::new, |g| g.to_string()),
                    entry.key.horizon,
                    entry.observations,
                    opt(entry.mean),
                    opt(entry.std_dev),
                    opt(entry.sharpe.value()),
                    opt(sig.and_then(|s| s.statistic.value())),
                    opt(sig.and_then(|s| s.p_value)),
                )
            })
            .collect()
    }

    /// Get CSV header.
    pub fn csv_header() -> &'static str {
        "policy,gamma,horizon,observations,mean,std_dev,sharpe,statistic,p_value"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BacktestConfig, BacktestEngine};
    use crate::policies::{EqualWeight, MinVariance};
    use crate::policy::PolicySet;
    use crate::types::ReturnSeries;

    #[test]
    fn test_sharpe_ratio_value() {
        let returns = [0.01, 0.03, 0.02];
        // mean 0.02, sample std 0.01
        let sharpe = sharpe_ratio(&returns).value().unwrap();
        assert!((sharpe - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_negligible_mean_is_undefined() {
        let returns = [0.01, -0.01, 0.01, -0.01];
        assert_eq!(
            sharpe_ratio(&returns),
            Metric::Undefined(UndefinedMetric::NegligibleMean)
        );
    }

    #[test]
    fn test_sharpe_degenerate_series() {
        assert_eq!(
            sharpe_ratio(&[]),
            Metric::Undefined(UndefinedMetric::InsufficientObservations)
        );
        assert_eq!(
            sharpe_ratio(&[0.02]),
            Metric::Undefined(UndefinedMetric::InsufficientObservations)
        );
        assert_eq!(
            sharpe_ratio(&[0.5, 0.5, 0.5]),
            Metric::Undefined(UndefinedMetric::ZeroVolatility)
        );
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(Metric::Value(1.23456).to_string(), "1.2346");
        assert_eq!(
            Metric::Undefined(UndefinedMetric::NegligibleMean).to_string(),
            "undefined (negligible mean)"
        );
    }

    #[test]
    fn test_paired_differences_are_column_aligned() {
        let benchmark = [0.01, 0.02, -0.01];
        let candidate = [0.015, 0.018, -0.005];
        let diffs = paired_differences(&candidate, &benchmark).unwrap();

        let expected = [0.005, -0.002, 0.005];
        for (d, e) in diffs.iter().zip(expected.iter()) {
            assert!((d - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = compare(&[0.1, 0.2], &[0.1], SignificanceMethod::PairedDifference).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidInput(_)));
    }

    #[test]
    fn test_paired_t_statistic() {
        let benchmark = [0.01, 0.02, -0.01];
        let candidate = [0.015, 0.018, -0.005];
        let result = compare(&candidate, &benchmark, SignificanceMethod::PairedDifference).unwrap();

        let d: [f64; 3] = [0.005, -0.002, 0.005];
        let m = (0.005 - 0.002 + 0.005) / 3.0;
        let sd = (d.iter().map(|x| (x - m).powi(2)).sum::<f64>() / 2.0).sqrt();
        let t = m / (sd / 3f64.sqrt());

        assert_eq!(result.observations, 3);
        assert!((result.mean_difference - m).abs() < 1e-12);
        assert!((result.statistic.value().unwrap() - t).abs() < 1e-9);
        let p = result.p_value.unwrap();
        assert!(p > 0.0 && p < 1.0);
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn test_paired_t_detects_consistent_outperformance() {
        let benchmark: Vec<f64> = (0..50).map(|i| 0.01 * ((i as f64) * 0.7).sin()).collect();
        let candidate: Vec<f64> = benchmark
            .iter()
            .enumerate()
            .map(|(i, b)| b + 0.01 + 0.001 * ((i as f64) * 1.3).cos())
            .collect();

        let result = compare(&candidate, &benchmark, SignificanceMethod::PairedDifference).unwrap();
        assert!(result.statistic.value().unwrap() > 10.0);
        assert!(result.is_significant(0.01));
    }

    #[test]
    fn test_identical_series_undefined() {
        let series = [0.01, 0.02, -0.01, 0.03];
        let result = compare(&series, &series, SignificanceMethod::PairedDifference).unwrap();
        assert!(!result.statistic.is_defined());
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn test_jobson_korkie_memmel_antisymmetric() {
        let a: Vec<f64> = (0..40).map(|i| 0.01 + 0.02 * ((i as f64) * 0.9).sin()).collect();
        let b: Vec<f64> = (0..40).map(|i| 0.002 + 0.03 * ((i as f64) * 0.4).cos()).collect();

        let ab = compare(&a, &b, SignificanceMethod::JobsonKorkieMemmel).unwrap();
        let ba = compare(&b, &a, SignificanceMethod::JobsonKorkieMemmel).unwrap();

        let z_ab = ab.statistic.value().unwrap();
        let z_ba = ba.statistic.value().unwrap();
        assert!((z_ab + z_ba).abs() < 1e-9);
        assert!((ab.p_value.unwrap() - ba.p_value.unwrap()).abs() < 1e-9);
        assert!(z_ab > 0.0);
    }

    #[test]
    fn test_jobson_korkie_memmel_proportional_series_degenerate() {
        let a: Vec<f64> = (0..40).map(|i| 0.01 + 0.02 * ((i as f64) * 0.9).sin()).collect();
        let b: Vec<f64> = a.iter().map(|x| 2.0 * x).collect();

        let result = compare(&a, &b, SignificanceMethod::JobsonKorkieMemmel).unwrap();
        assert_eq!(
            result.statistic,
            Metric::Undefined(UndefinedMetric::DegenerateVariance)
        );
        assert!(result.p_value.is_none());
        assert!(!result.is_significant(0.05));
        assert_eq!(result.statistic.to_string(), "undefined (degenerate variance)");
    }

    #[test]
    fn test_short_series_comparison_undefined() {
        let result = compare(&[0.01], &[0.02], SignificanceMethod::PairedDifference).unwrap();
        assert_eq!(
            result.statistic,
            Metric::Undefined(UndefinedMetric::InsufficientObservations)
        );
        assert!(result.p_value.is_none());
    }

    fn run_small_backtest(t: usize, horizons: Vec<usize>) -> BacktestResult {
        let rows: Vec<Vec<f64>> = (0..t)
            .map(|i| {
                let x = i as f64;
                vec![
                    0.001,
                    0.01 + 0.03 * (x * 0.5).sin(),
                    0.005 + 0.02 * (x * 0.9 + 1.0).cos(),
                ]
            })
            .collect();
        let series = ReturnSeries::from_rows(&rows).unwrap();
        let policies = PolicySet::new()
            .with(Box::new(EqualWeight::new()))
            .unwrap()
            .with(Box::new(MinVariance::new()))
            .unwrap();
        let config = BacktestConfig {
            horizons,
            gammas: vec![1.0],
            show_progress: false,
            parallel: false,
        };
        BacktestEngine::new(config, series, policies).unwrap().run().unwrap()
    }

    #[test]
    fn test_report_from_result() {
        let result = run_small_backtest(80, vec![20, 40]);
        let report = PerformanceReport::from_result(
            &result,
            Some("Equal Weight"),
            SignificanceMethod::PairedDifference,
        )
        .unwrap();

        assert_eq!(report.sharpe.len(), 4);
        assert_eq!(report.significance.len(), 2);
        assert!(report.failures.is_empty());
        for entry in &report.sharpe {
            assert_eq!(entry.observations, 40);
        }
        for entry in &report.significance {
            assert_eq!(entry.benchmark.policy, "Equal Weight");
            assert_eq!(entry.benchmark.horizon, entry.key.horizon);
        }

        let by_slot = report.sharpe_by_slot();
        assert!(by_slot.contains_key("Minimum Variance [M=20]"));

        let lines = ResultFormatter::to_csv_lines(&report);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Equal Weight,,20,40,"));

        let json = ResultFormatter::to_json(&report);
        assert!(json.contains("\"paired-difference\""));
    }

    #[test]
    fn test_report_single_window_sharpe_undefined() {
        let result = run_small_backtest(40, vec![20, 40]);
        let report = PerformanceReport::from_result(&result, None, SignificanceMethod::default()).unwrap();

        for entry in &report.sharpe {
            assert_eq!(entry.observations, 0);
            assert_eq!(
                entry.sharpe,
                Metric::Undefined(UndefinedMetric::InsufficientObservations)
            );
        }
        assert!(report.significance.is_empty());
    }

    #[test]
    fn test_unknown_benchmark_rejected() {
        let result = run_small_backtest(60, vec![20]);
        let err = PerformanceReport::from_result(&result, Some("Oracle"), SignificanceMethod::default())
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
