//! Error types for the backtest engine.

use thiserror::Error;

/// Main error type for the backtest engine.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Numerical error: {0}")]
    NumericalError(String),

    #[error("Policy error: {0}")]
    PolicyError(String),

    /// An estimation failure located at a specific horizon and window.
    #[error("Horizon {horizon}, window {window}: {source}")]
    WindowError {
        horizon: usize,
        window: usize,
        #[source]
        source: Box<BacktestError>,
    },

    #[error("No data loaded")]
    NoData,

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),
}

impl BacktestError {
    /// Attach a horizon/window location to an error.
    pub fn at_window(self, horizon: usize, window: usize) -> Self {
        BacktestError::WindowError {
            horizon,
            window,
            source: Box::new(self),
        }
    }

    /// True for configuration problems, including located ones.
    pub fn is_config_error(&self) -> bool {
        match self {
            BacktestError::ConfigError(_) => true,
            BacktestError::WindowError { source, .. } => source.is_config_error(),
            _ => false,
        }
    }

    /// True for singular or otherwise unusable numerics, including located ones.
    pub fn is_numerical_error(&self) -> bool {
        match self {
            BacktestError::NumericalError(_) => true,
            BacktestError::WindowError { source, .. } => source.is_numerical_error(),
            _ => false,
        }
    }
}

/// Result type alias for backtest operations.
pub type Result<T> = std::result::Result<T, BacktestError>;
