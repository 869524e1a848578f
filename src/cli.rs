//! Command-line interface for the allocation backtester.

use allocbench::analytics::{PerformanceReport, ResultFormatter, SignificanceMethod};
use allocbench::config::{
    BacktestFileConfig, BacktestSettings, DataSettings, PolicySettings, SignificanceSettings,
};
use allocbench::data::load_returns;
use allocbench::engine::BacktestEngine;
use allocbench::error::{BacktestError, Result};
use allocbench::policies::{self, PolicyOptions};

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// allocbench - rolling-window backtests of portfolio allocation policies.
#[derive(Parser)]
#[command(name = "allocbench")]
#[command(version)]
#[command(about = "Rolling-window backtests of portfolio allocation policies")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options describing the layout of a returns file.
#[derive(clap::Args, Clone)]
pub struct DataArgs {
    /// Path to the returns file
    #[arg(short, long)]
    data: PathBuf,

    /// Field delimiter: a character, "tab" or "whitespace" (detected if omitted)
    #[arg(long)]
    delimiter: Option<String>,

    /// First row holds column names
    #[arg(long)]
    has_headers: bool,

    /// First column holds dates
    #[arg(long)]
    date_column: bool,

    /// Date format, e.g. "%Y%m%d"
    #[arg(long)]
    date_format: Option<String>,

    /// Position of the risk-free column among the numeric columns
    #[arg(long, default_value = "0")]
    risk_free_column: usize,
}

impl DataArgs {
    fn to_settings(&self) -> DataSettings {
        DataSettings {
            path: Some(self.data.display().to_string()),
            delimiter: self.delimiter.clone(),
            has_headers: self.has_headers,
            date_column: self.date_column,
            date_format: self.date_format.clone(),
            risk_free_column: self.risk_free_column,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backtest over a returns file
    Run {
        #[command(flatten)]
        data: DataArgs,

        /// Estimation window lengths
        #[arg(short = 'm', long, value_delimiter = ',', default_value = "60,120")]
        horizons: Vec<usize>,

        /// Risk-aversion levels for gamma-aware policies
        #[arg(short, long, value_delimiter = ',', default_value = "1,2,3,4,5,10")]
        gammas: Vec<f64>,

        /// Policies to run (see `allocbench policies`); all when omitted
        #[arg(short, long, value_delimiter = ',')]
        policies: Vec<String>,

        /// Benchmark policy for significance tests
        #[arg(short, long, default_value = "equal-weight")]
        benchmark: String,

        /// Skip the benchmark comparison
        #[arg(long)]
        no_benchmark: bool,

        /// Significance test
        #[arg(long, value_enum, default_value = "paired-difference")]
        method: SignificanceMethod,

        /// Significance level
        #[arg(long, default_value = "0.05")]
        level: f64,

        /// Jagannathan-Ma floor fraction a in w >= a/N
        #[arg(long, default_value = "0.5")]
        jm_lower_bound: f64,

        /// Run horizons in parallel
        #[arg(long)]
        parallel: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Run a backtest from a configuration file
    RunConfig {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List the built-in policies
    Policies,

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "allocbench.toml")]
        output: PathBuf,
    },

    /// Validate a returns file
    Validate {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Run {
            data,
            horizons,
            gammas,
            policies: policy_ids,
            benchmark,
            no_benchmark,
            method,
            level,
            jm_lower_bound,
            parallel,
            no_progress,
        } => {
            let enabled = if policy_ids.is_empty() {
                policies::CATALOG.iter().map(|(id, _)| id.to_string()).collect()
            } else {
                policy_ids.clone()
            };
            let file_config = BacktestFileConfig {
                data: data.to_settings(),
                backtest: BacktestSettings {
                    horizons: horizons.clone(),
                    gammas: gammas.clone(),
                    parallel: *parallel,
                    show_progress: !*no_progress && cli.output == OutputFormat::Text,
                },
                policies: PolicySettings {
                    enabled,
                    benchmark: (!*no_benchmark).then(|| benchmark.clone()),
                    jagannathan_ma_lower_bound: *jm_lower_bound,
                },
                significance: SignificanceSettings {
                    method: *method,
                    level: *level,
                },
            };
            execute(&file_config, cli.output)
        }

        Commands::RunConfig { config } => {
            let file_config = BacktestFileConfig::load(config)?;
            execute(&file_config, cli.output)
        }

        Commands::Policies => {
            print_policies();
            Ok(())
        }

        Commands::Init { output } => init_config(output),

        Commands::Validate { data } => validate_data(data),
    }
}

/// Load data, run the engine and print the report.
fn execute(file_config: &BacktestFileConfig, output: OutputFormat) -> Result<()> {
    let data_path = file_config.data.path.as_ref().ok_or_else(|| {
        BacktestError::ConfigError("No data path specified in config".to_string())
    })?;

    let backtest_config = file_config.to_backtest_config()?;
    let policy_set = file_config.build_policies()?;
    let benchmark = file_config.benchmark_name()?;

    let series = load_returns(data_path, &file_config.data.to_data_config()?)?;
    info!("Policies: {}", policy_set.names().join(", "));

    let engine = BacktestEngine::new(backtest_config, series, policy_set)?;
    let result = engine.run()?;

    let report = PerformanceReport::from_result(
        &result,
        benchmark.as_deref(),
        file_config.significance.method,
    )?
    .with_level(file_config.significance.level);

    match output {
        OutputFormat::Text => ResultFormatter::print_report(&result, &report),
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)),
        OutputFormat::Csv => {
            println!("{}", ResultFormatter::csv_header());
            for line in ResultFormatter::to_csv_lines(&report) {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

fn print_policies() {
    println!("\nAvailable Policies:\n");

    let defaults = PolicyOptions::default();
    for (id, description) in policies::CATALOG {
        match policies::from_id(id, &defaults) {
            Ok(policy) => {
                let per_gamma = if policy.uses_gamma() { " [per gamma]" } else { "" };
                println!("  {}{}", id, per_gamma);
                println!("    {} ({})", description, policy.name());
                for (key, value) in policy.parameters() {
                    println!("    {}: {}", key, value);
                }
            }
            Err(_) => println!("  {}\n    {}", id, description),
        }
        println!();
    }

    println!("Custom policies implement `allocbench::Policy` (library API).");
    println!();
}

fn init_config(output: &PathBuf) -> Result<()> {
    let example = BacktestFileConfig::example();
    fs::write(output, example)?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file to customize your backtest, then run:");
    println!("  allocbench run-config -c {}", output.display());
    Ok(())
}

fn validate_data(data: &DataArgs) -> Result<()> {
    println!("Validating data file: {}", data.data.display());

    let series = load_returns(&data.data, &data.to_settings().to_data_config()?)?;

    println!("\nData Summary:");
    println!("  Observations:  {}", series.len());
    println!("  Risky assets:  {}", series.num_risky());
    println!("  Assets:        {}", series.asset_names().join(", "));

    if let Some(dates) = series.dates() {
        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            println!("  Period:        {} to {}", first, last);
        }
    }

    let rf = series.risk_free();
    let rf_mean = rf.iter().sum::<f64>() / rf.len() as f64;
    println!("  Mean risk-free: {:.6}", rf_mean);

    for (j, name) in series.asset_names().iter().enumerate() {
        let column = series.risky().column(j);
        println!(
            "  {:<14} mean {:>10.6}  min {:>10.6}  max {:>10.6}",
            name,
            column.mean(),
            column.min(),
            column.max()
        );
    }

    println!("\nValidation: PASSED");
    Ok(())
}
