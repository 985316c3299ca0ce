//! Command line arguments and their parsing

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use eo_core::domain::parse_instant;
use eo_core::{DimensionRange, DimensionValue, TimeOfInterest, TIME_DIMENSION_ID};

/// Resolve the dimensions of a dataset and print them as JSON
#[derive(Parser, Debug)]
#[command(name = "eo-dims")]
#[command(about = "Resolve dataset dimension domains, values and ranges")]
pub struct Args {
    /// Dataset configuration file
    pub config: PathBuf,

    /// Time of interest: an instant or `start/end`
    #[arg(long)]
    pub toi: Option<String>,

    /// Additional filter, `key=value` (repeatable)
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Select a value, `id=value` (repeatable)
    #[arg(long = "value", value_name = "ID=VALUE")]
    pub values: Vec<String>,

    /// Select a range, `id=min/max` or `id=a,b,c` (repeatable)
    #[arg(long = "range", value_name = "ID=RANGE")]
    pub ranges: Vec<String>,

    /// Restore a snapshot file before applying selections
    #[arg(long)]
    pub restore: Option<PathBuf>,

    /// Print the snapshot instead of the full state
    #[arg(long)]
    pub snapshot: bool,

    /// Print the catalogue item nearest to this instant
    #[arg(long)]
    pub nearest: Option<String>,

    /// Initialize unset dimensions, overriding the dataset file
    #[arg(long)]
    pub init: Option<bool>,

    /// Seconds to wait for domain resolution
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

pub fn parse_toi(s: &str) -> Result<TimeOfInterest> {
    match s.split_once('/') {
        Some((start, end)) => {
            let start = parse_instant(start.trim())?;
            let end = parse_instant(end.trim())?;
            if end < start {
                return Err(anyhow!("toi end {} is before its start {}", end, start));
            }
            Ok(TimeOfInterest::range(start, end))
        }
        None => Ok(TimeOfInterest::Instant(parse_instant(s.trim())?)),
    }
}

/// Split a `key=value` argument
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Parse a value of dimension `id`: instants for the time dimension, numbers
/// when they parse, text otherwise
pub fn parse_value(id: &str, s: &str) -> Result<DimensionValue> {
    if id == TIME_DIMENSION_ID {
        return Ok(DimensionValue::Time(parse_instant(s)?));
    }
    Ok(s.parse::<f64>()
        .map(DimensionValue::Number)
        .unwrap_or_else(|_| DimensionValue::Text(s.to_string())))
}

pub fn parse_range(id: &str, s: &str) -> Result<DimensionRange> {
    if let Some((min, max)) = s.split_once('/') {
        return Ok(DimensionRange::Interval {
            min: parse_value(id, min.trim())?,
            max: parse_value(id, max.trim())?,
        });
    }
    s.split(',')
        .map(|v| parse_value(id, v.trim()))
        .collect::<Result<Vec<_>>>()
        .map(DimensionRange::List)
}
