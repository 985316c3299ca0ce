//! Dimension values and ranges

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DimensionError;

/// A single value selected on a dimension.
///
/// Values of different kinds are never ordered against each other, so a
/// numeric domain never clamps a temporal selection and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    /// Numeric value (band index, elevation, wavelength...)
    Number(f64),
    /// Temporal instant
    Time(DateTime<Utc>),
    /// Categorical token
    Text(String),
}

impl DimensionValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DimensionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            DimensionValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DimensionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialOrd for DimensionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DimensionValue::Number(a), DimensionValue::Number(b)) => a.partial_cmp(b),
            (DimensionValue::Time(a), DimensionValue::Time(b)) => a.partial_cmp(b),
            (DimensionValue::Text(a), DimensionValue::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionValue::Number(n) => write!(f, "{}", n),
            DimensionValue::Time(t) => write!(f, "{}", format_instant(t)),
            DimensionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for DimensionValue {
    fn from(n: f64) -> Self {
        DimensionValue::Number(n)
    }
}

impl From<DateTime<Utc>> for DimensionValue {
    fn from(t: DateTime<Utc>) -> Self {
        DimensionValue::Time(t)
    }
}

impl From<&str> for DimensionValue {
    fn from(s: &str) -> Self {
        DimensionValue::Text(s.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(s: String) -> Self {
        DimensionValue::Text(s)
    }
}

/// A selection spanning several values of a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionRange {
    /// Closed interval
    Interval {
        min: DimensionValue,
        max: DimensionValue,
    },
    /// Explicit list of discrete values
    List(Vec<DimensionValue>),
}

impl DimensionRange {
    pub fn interval(min: impl Into<DimensionValue>, max: impl Into<DimensionValue>) -> Self {
        DimensionRange::Interval {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, DimensionRange::List(_))
    }
}

/// Format an instant the way snapshots carry it (ISO 8601, millisecond
/// precision, `Z` suffix)
pub fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO 8601 instant.
///
/// Accepts a full RFC 3339 timestamp, a timestamp without offset (UTC
/// assumed) or a bare date.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, DimensionError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Some(ndt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(DimensionError::InvalidTime(s.to_string()))
}
