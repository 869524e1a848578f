//! Integration tests for the backtest engine.

use allocbench::analytics::{
    sharpe_ratio, Metric, PerformanceReport, ResultFormatter, SignificanceMethod, UndefinedMetric,
};
use allocbench::config::BacktestFileConfig;
use allocbench::data::{load_returns, DataConfig};
use allocbench::engine::{BacktestConfig, BacktestEngine};
use allocbench::error::BacktestError;
use allocbench::policies::{self, EqualWeight, MinVariance, PolicyOptions};
use allocbench::policy::PolicySet;
use allocbench::types::ReturnSeries;
use std::io::Write;
use tempfile::NamedTempFile;

/// Create a synthetic monthly return history with `n` risky assets.
fn create_synthetic_returns(t: usize, n: usize) -> ReturnSeries {
    let rows: Vec<Vec<f64>> = (0..t)
        .map(|i| {
            let x = i as f64;
            let mut row = vec![0.003 + 0.001 * (x * 0.05).sin()];
            for j in 0..n {
                let k = j as f64 + 1.0;
                let common = 0.02 * (x * 0.83).sin();
                let own = 0.03 * (x * (0.41 + 0.29 * k) + k).sin() + 0.015 * (x * 1.37 / k).cos();
                row.push(0.004 + 0.002 * k + common + own);
            }
            row
        })
        .collect();
    ReturnSeries::from_rows(&rows).unwrap()
}

fn quiet_config(horizons: Vec<usize>, gammas: Vec<f64>) -> BacktestConfig {
    BacktestConfig {
        horizons,
        gammas,
        show_progress: false,
        parallel: false,
    }
}

fn baseline_policies() -> PolicySet {
    PolicySet::new()
        .with(Box::new(EqualWeight::new()))
        .unwrap()
        .with(Box::new(MinVariance::new()))
        .unwrap()
}

#[test]
fn test_window_count_matches_longest_horizon() {
    let series = create_synthetic_returns(200, 3);
    let engine =
        BacktestEngine::new(quiet_config(vec![60, 120], vec![1.0]), series, baseline_policies())
            .unwrap();
    let result = engine.run().unwrap();

    for horizon in &result.horizons {
        assert_eq!(horizon.plan.window_end, 120);
        assert_eq!(horizon.plan.num_windows, 80);
        for slot in &horizon.slots {
            let tables = slot.tables().unwrap();
            assert_eq!(tables.weights.ncols(), 80);
            assert_eq!(tables.buy_hold.ncols(), 80);
            assert_eq!(tables.out_of_sample.len(), 80);
        }
    }
}

#[test]
fn test_horizon_beyond_series_is_config_error() {
    let series = create_synthetic_returns(100, 3);
    let err = BacktestEngine::new(quiet_config(vec![60, 120], vec![1.0]), series, baseline_policies())
        .err()
        .unwrap();
    assert!(matches!(err, BacktestError::ConfigError(_)));
}

#[test]
fn test_equal_weight_three_assets() {
    let series = create_synthetic_returns(90, 3);
    let engine =
        BacktestEngine::new(quiet_config(vec![30], vec![1.0]), series.clone(), baseline_policies())
            .unwrap();
    let result = engine.run().unwrap();
    let tables = result.slot("Equal Weight", 30, None).unwrap().tables().unwrap();

    assert!(tables.weights.iter().all(|&w| w == 0.25));

    // Out-of-sample return of 1/(N+1) weights.
    let plan = result.horizon(30).unwrap().plan;
    for j in [0usize, 10, plan.num_windows - 1] {
        let t = plan.evaluation_period(j);
        let expected = 0.25 * series.risky_at(t).sum();
        assert!((tables.out_of_sample[j].unwrap() - expected).abs() < 1e-12);
    }
}

#[test]
fn test_collinear_assets_abort_run() {
    let rows: Vec<Vec<f64>> = (0..80)
        .map(|i| {
            let x = i as f64;
            let a = 0.02 * (x * 0.7).sin();
            let b = 0.03 * (x * 1.1).cos();
            vec![0.001, a, b, a + b]
        })
        .collect();
    let series = ReturnSeries::from_rows(&rows).unwrap();
    let engine =
        BacktestEngine::new(quiet_config(vec![30], vec![1.0]), series, baseline_policies()).unwrap();

    let err = engine.run().unwrap_err();
    assert!(err.is_numerical_error(), "{}", err);
}

#[test]
fn test_full_catalog_run() {
    let series = create_synthetic_returns(240, 3);
    let engine = BacktestEngine::new(
        quiet_config(vec![60, 120], vec![1.0, 5.0]),
        series,
        policies::full_catalog().unwrap(),
    )
    .unwrap();

    // 4 plain policies + 5 gamma-aware policies x 2 gammas.
    assert_eq!(engine.slot_keys(60).len(), 14);

    let result = engine.run().unwrap();
    assert!(result.failures().is_empty(), "{:?}", result.failures());

    for name in [
        "Minimum Variance with Short Sell Constraints",
        "Mean Variance with Short Sell Constraints",
        "Bayes Stein with Short Sell Constraints",
    ] {
        for slot in result.slots().filter(|s| s.key.policy == name) {
            let weights = &slot.tables().unwrap().weights;
            for column in weights.column_iter() {
                assert!(column.iter().all(|&w| w >= -1e-9), "{}", slot.key);
                assert!((column.sum() - 1.0).abs() < 1e-4, "{}", slot.key);
            }
        }
    }

    for slot in result.slots().filter(|s| s.key.policy == "Jagannathan Ma") {
        let weights = &slot.tables().unwrap().weights;
        assert!(weights.iter().all(|&w| w >= 0.5 / 3.0 - 1e-9));
    }

    let report =
        PerformanceReport::from_result(&result, Some("Equal Weight"), SignificanceMethod::default())
            .unwrap();
    assert_eq!(report.sharpe.len(), 28);
    assert_eq!(report.significance.len(), 26);
}

#[test]
fn test_single_window_has_undefined_sharpe() {
    let series = create_synthetic_returns(120, 2);
    let engine =
        BacktestEngine::new(quiet_config(vec![60, 120], vec![1.0]), series, baseline_policies())
            .unwrap();
    let result = engine.run().unwrap();

    for slot in result.slots() {
        let returns = slot.tables().unwrap().valid_out_of_sample();
        assert!(returns.is_empty());
        assert_eq!(
            sharpe_ratio(&returns),
            Metric::Undefined(UndefinedMetric::InsufficientObservations)
        );
    }
}

#[test]
fn test_parallel_run_matches_sequential() {
    let series = create_synthetic_returns(150, 4);
    let sequential = BacktestEngine::new(
        quiet_config(vec![40, 80], vec![2.0]),
        series.clone(),
        policies::full_catalog().unwrap(),
    )
    .unwrap()
    .run()
    .unwrap();

    let mut config = quiet_config(vec![40, 80], vec![2.0]);
    config.parallel = true;
    let parallel = BacktestEngine::new(config, series, policies::full_catalog().unwrap())
        .unwrap()
        .run()
        .unwrap();

    for (a, b) in sequential.slots().zip(parallel.slots()) {
        assert_eq!(a.key, b.key);
        assert_eq!(
            a.tables().unwrap().out_of_sample,
            b.tables().unwrap().out_of_sample
        );
    }
}

fn write_returns_file(series: &ReturnSeries) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".txt").unwrap();
    for t in 0..series.len() {
        let risky: Vec<String> = series
            .risky_at(t)
            .iter()
            .map(|r| format!("{:.10}", r))
            .collect();
        writeln!(file, "{:.10} {}", series.risk_free_at(t), risky.join(" ")).unwrap();
    }
    file
}

#[test]
fn test_load_run_and_report() {
    let series = create_synthetic_returns(140, 3);
    let file = write_returns_file(&series);

    let loaded = load_returns(file.path(), &DataConfig::default()).unwrap();
    assert_eq!(loaded.len(), 140);
    assert_eq!(loaded.num_risky(), 3);

    let policy_set = policies::build_set(
        &["equal-weight", "min-variance", "mean-variance"],
        &PolicyOptions::default(),
    )
    .unwrap();
    let engine =
        BacktestEngine::new(quiet_config(vec![48, 96], vec![3.0]), loaded, policy_set).unwrap();
    let result = engine.run().unwrap();

    let report = PerformanceReport::from_result(
        &result,
        Some("Equal Weight"),
        SignificanceMethod::JobsonKorkieMemmel,
    )
    .unwrap();

    assert_eq!(report.sharpe.len(), 6);
    assert_eq!(report.significance.len(), 4);
    for entry in &report.sharpe {
        assert_eq!(entry.observations, 44);
    }

    let json: serde_json::Value = serde_json::from_str(&ResultFormatter::to_json(&report)).unwrap();
    assert_eq!(json["method"], "jobson-korkie-memmel");
    assert_eq!(json["sharpe"].as_array().unwrap().len(), 6);
}

#[test]
fn test_config_file_workflow() {
    let series = create_synthetic_returns(100, 2);
    let data_file = write_returns_file(&series);

    let toml_content = format!(
        r#"
[data]
path = "{}"
delimiter = "whitespace"

[backtest]
horizons = [30, 60]
gammas = [2.0]
show_progress = false

[policies]
enabled = ["equal-weight", "jagannathan-ma", "bayes-stein"]
benchmark = "equal-weight"
jagannathan_ma_lower_bound = 0.8
"#,
        data_file.path().display()
    );
    let mut config_file = NamedTempFile::with_suffix(".toml").unwrap();
    write!(config_file, "{}", toml_content).unwrap();

    let file_config = BacktestFileConfig::load(config_file.path()).unwrap();
    let data_config = file_config.data.to_data_config().unwrap();
    let series = load_returns(file_config.data.path.as_ref().unwrap(), &data_config).unwrap();

    let engine = BacktestEngine::new(
        file_config.to_backtest_config().unwrap(),
        series,
        file_config.build_policies().unwrap(),
    )
    .unwrap();
    let result = engine.run().unwrap();
    assert_eq!(result.horizon(30).unwrap().plan.num_windows, 40);

    let jm = result.slot("Jagannathan Ma", 60, None).unwrap().tables().unwrap();
    assert!(jm.weights.iter().all(|&w| w >= 0.4 - 1e-9));

    let benchmark = file_config.benchmark_name().unwrap();
    let report =
        PerformanceReport::from_result(&result, benchmark.as_deref(), file_config.significance.method)
            .unwrap();
    assert_eq!(report.significance.len(), 4);
}
