//! Return-series loading.
//!
//! Input files hold one observation per row: an optional leading date, then
//! the risk-free return and the risky returns. Fields are separated by a
//! single delimiter (comma, tab, semicolon) or by runs of whitespace.

use crate::error::{BacktestError, Result};
use crate::types::ReturnSeries;
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Field delimiter; `b' '` splits on runs of whitespace. If None, it is
    /// detected from the first lines and falls back to whitespace.
    #[serde(default)]
    pub delimiter: Option<u8>,
    /// Whether the first row holds column names.
    #[serde(default)]
    pub has_headers: bool,
    /// Whether the first column holds observation dates.
    #[serde(default)]
    pub date_column: bool,
    /// Date format string; common formats are tried when unset.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Position of the risk-free column among the numeric columns.
    #[serde(default)]
    pub risk_free_column: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_headers: false,
            date_column: false,
            date_format: None,
            risk_free_column: 0,
        }
    }
}

/// Field separator of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Byte(u8),
    Whitespace,
}

/// Detect the delimiter from the first few data lines.
///
/// A delimiter is accepted when it splits every sampled line into the same
/// number (at least two) of fields.
fn detect_separator(path: &Path) -> Result<Separator> {
    let file = File::open(path)?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .take(5)
        .collect();

    for delim in [b',', b'\t', b';'] {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delim).count() + 1)
            .collect();
        if let Some(&first) = counts.first() {
            if first >= 2 && counts.iter().all(|&c| c == first) {
                debug!("Detected delimiter {:?}", delim as char);
                return Ok(Separator::Byte(delim));
            }
        }
    }

    debug!("No delimiter detected, splitting on whitespace");
    Ok(Separator::Whitespace)
}

/// Parse a date with an explicit format or the supported defaults:
/// ISO (`2024-01-31`), `%Y/%m/%d`, compact `YYYYMMDD` and monthly `YYYYMM`
/// (first of the month).
pub fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    let s = s.trim();

    if let Some(fmt) = format {
        return Ok(NaiveDate::parse_from_str(s, fmt)?);
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let ymd = match s.len() {
            8 => Some((&s[0..4], &s[4..6], &s[6..8])),
            6 => Some((&s[0..4], &s[4..6], "01")),
            _ => None,
        };
        if let Some((y, m, d)) = ymd {
            let date = match (y.parse::<i32>(), m.parse::<u32>(), d.parse::<u32>()) {
                (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
                _ => None,
            };
            return date.ok_or_else(|| BacktestError::DataError(format!("Invalid date: {}", s)));
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    Err(BacktestError::DataError(format!("Unable to parse date: {}", s)))
}

/// Load a return series from a delimited or whitespace-separated text file.
pub fn load_returns(path: impl AsRef<Path>, config: &DataConfig) -> Result<ReturnSeries> {
    let path = path.as_ref();
    info!("Loading returns from: {}", path.display());

    let separator = match config.delimiter {
        Some(b' ') => Separator::Whitespace,
        Some(d) => Separator::Byte(d),
        None => detect_separator(path)?,
    };

    let (header, records) = match separator {
        Separator::Byte(d) => read_delimited(path, d, config.has_headers)?,
        Separator::Whitespace => read_whitespace(path, config.has_headers)?,
    };

    let series = build_series(header, records, config)?;
    info!(
        "Loaded {} observations of {} risky assets",
        series.len(),
        series.num_risky()
    );
    Ok(series)
}

type Records = Vec<(usize, Vec<String>)>;

fn read_delimited(path: &Path, delimiter: u8, has_headers: bool) -> Result<(Option<Vec<String>>, Records)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)?;

    let header = if has_headers {
        Some(reader.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let line = record.position().map_or(i + 1, |p| p.line() as usize);
        records.push((line, record.iter().map(str::to_string).collect()));
    }
    Ok((header, records))
}

fn read_whitespace(path: &Path, has_headers: bool) -> Result<(Option<Vec<String>>, Records)> {
    let reader = BufReader::new(File::open(path)?);
    let mut header = None;
    let mut records = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
        if has_headers && header.is_none() {
            header = Some(fields);
        } else {
            records.push((i + 1, fields));
        }
    }
    Ok((header, records))
}

fn build_series(header: Option<Vec<String>>, records: Records, config: &DataConfig) -> Result<ReturnSeries> {
    if records.is_empty() {
        return Err(BacktestError::NoData);
    }

    let skip = usize::from(config.date_column);
    let width = records[0].1.len().saturating_sub(skip);
    if width < 2 {
        return Err(BacktestError::DataError(format!(
            "Need a risk-free column and at least one risky column, got {} numeric columns",
            width
        )));
    }
    if config.risk_free_column >= width {
        return Err(BacktestError::ConfigError(format!(
            "Risk-free column {} is out of range for {} numeric columns",
            config.risk_free_column, width
        )));
    }

    let mut rows = Vec::with_capacity(records.len());
    let mut dates = Vec::new();
    for (line, fields) in &records {
        if fields.len() != width + skip {
            return Err(BacktestError::DataError(format!(
                "Line {} has {} fields, expected {}",
                line,
                fields.len(),
                width + skip
            )));
        }
        if config.date_column {
            dates.push(parse_date(&fields[0], config.date_format.as_deref())?);
        }

        let mut values = Vec::with_capacity(width);
        for (col, field) in fields[skip..].iter().enumerate() {
            let value: f64 = field.parse().map_err(|_| {
                BacktestError::DataError(format!(
                    "Line {}, column {}: '{}' is not a number",
                    line,
                    col + skip + 1,
                    field
                ))
            })?;
            values.push(value);
        }

        // Risk-free first, then the risky columns in file order.
        let rf = values.remove(config.risk_free_column);
        values.insert(0, rf);
        rows.push(values);
    }

    let mut series = ReturnSeries::from_rows(&rows)?;

    if let Some(header) = header {
        let mut names: Vec<String> = header.into_iter().skip(skip).collect();
        if names.len() == width {
            names.remove(config.risk_free_column);
            series = series.with_asset_names(names)?;
        } else {
            debug!("Header has {} numeric names for {} columns; keeping defaults", names.len(), width);
        }
    }
    if config.date_column {
        series = series.with_dates(dates)?;
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(suffix: &str, lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_load_whitespace() {
        let file = write_file(
            ".txt",
            &[
                "0.001  0.02 -0.01",
                "0.002 -0.03  0.04",
                "",
                "0.001  0.01  0.00",
            ],
        );
        let series = load_returns(file.path(), &DataConfig::default()).unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.num_risky(), 2);
        assert_eq!(series.risk_free(), &[0.001, 0.002, 0.001]);
        assert_eq!(series.risky()[(1, 1)], 0.04);
    }

    #[test]
    fn test_load_csv_with_header_and_dates() {
        let file = write_file(
            ".csv",
            &[
                "date,rf,stocks,bonds",
                "2024-01-31,0.001,0.02,0.005",
                "2024-02-29,0.001,-0.01,0.004",
            ],
        );
        let config = DataConfig {
            has_headers: true,
            date_column: true,
            ..Default::default()
        };
        let series = load_returns(file.path(), &config).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.asset_names(), &["stocks", "bonds"]);
        let dates = series.dates().unwrap();
        assert_eq!(dates[1].month(), 2);
        assert_eq!(dates[1].day(), 29);
    }

    #[test]
    fn test_risk_free_column_moved_first() {
        let file = write_file(".csv", &["0.02,0.005,0.001", "-0.01,0.004,0.002"]);
        let config = DataConfig {
            delimiter: Some(b','),
            risk_free_column: 2,
            ..Default::default()
        };
        let series = load_returns(file.path(), &config).unwrap();

        assert_eq!(series.risk_free(), &[0.001, 0.002]);
        assert_eq!(series.risky()[(0, 0)], 0.02);
        assert_eq!(series.risky()[(1, 1)], 0.004);
    }

    #[test]
    fn test_semicolon_detected() {
        let file = write_file(".csv", &["0.001;0.02", "0.001;0.03", "0.001;-0.01"]);
        let series = load_returns(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(series.num_risky(), 1);
        assert_eq!(series.risky()[(2, 0)], -0.01);
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let file = write_file(".txt", &["0.001 0.02", "0.001 abc"]);
        let err = load_returns(file.path(), &DataConfig::default()).unwrap_err();
        assert!(matches!(err, BacktestError::DataError(_)), "{}", err);
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let file = write_file(".txt", &["0.001 0.02 0.03", "0.001 0.02"]);
        assert!(matches!(
            load_returns(file.path(), &DataConfig::default()),
            Err(BacktestError::DataError(_))
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = write_file(".txt", &["# no data"]);
        assert!(matches!(
            load_returns(file.path(), &DataConfig::default()),
            Err(BacktestError::NoData)
        ));
    }

    #[test]
    fn test_risk_free_column_out_of_range() {
        let file = write_file(".txt", &["0.001 0.02"]);
        let config = DataConfig {
            risk_free_column: 2,
            ..Default::default()
        };
        let err = load_returns(file.path(), &config).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_date_parsing() {
        let d = parse_date("2024-01-15", None).unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));

        let d = parse_date("19900131", None).unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1990, 1, 31));

        let d = parse_date("199002", None).unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1990, 2, 1));

        let d = parse_date("15.03.2020", Some("%d.%m.%Y")).unwrap();
        assert_eq!(d.month(), 3);

        assert!(parse_date("199013", None).is_err());
        assert!(parse_date("yesterday", None).is_err());
    }
}
