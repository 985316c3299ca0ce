//! Serializable dimension state

use ahash::AHashMap;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TIME_DIMENSION_ID;
use crate::domain::{format_instant, parse_instant, DimensionRange, DimensionValue};
use crate::error::{DimensionError, DimensionResult};

/// Values and ranges of a dimension engine as `[id, value]` pairs, sorted by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionsSnapshot {
    #[serde(default)]
    pub dimension_values: Vec<(String, Value)>,
    #[serde(default)]
    pub range_values: Vec<(String, Value)>,
}

impl DimensionsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.dimension_values.is_empty() && self.range_values.is_empty()
    }
}

fn encode_value(value: &DimensionValue) -> Value {
    match value {
        DimensionValue::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        DimensionValue::Time(t) => Value::String(format_instant(t)),
        DimensionValue::Text(s) => Value::String(s.clone()),
    }
}

fn encode_range(range: &DimensionRange) -> Value {
    match range {
        DimensionRange::Interval { min, max } => serde_json::json!({
            "min": encode_value(min),
            "max": encode_value(max),
        }),
        DimensionRange::List(values) => Value::Array(values.iter().map(encode_value).collect()),
    }
}

pub(crate) fn encode_snapshot(
    values: &AHashMap<String, DimensionValue>,
    ranges: &AHashMap<String, DimensionRange>,
) -> DimensionsSnapshot {
    let mut dimension_values: Vec<(String, Value)> =
        values.iter().map(|(id, value)| (id.clone(), encode_value(value))).collect();
    dimension_values.sort_by(|a, b| a.0.cmp(&b.0));

    let mut range_values: Vec<(String, Value)> =
        ranges.iter().map(|(id, range)| (id.clone(), encode_range(range))).collect();
    range_values.sort_by(|a, b| a.0.cmp(&b.0));

    DimensionsSnapshot {
        dimension_values,
        range_values,
    }
}

fn invalid(id: &str, message: impl Into<String>) -> DimensionError {
    DimensionError::InvalidSnapshot {
        dimension: id.to_string(),
        message: message.into(),
    }
}

fn decode_value(id: &str, value: &Value) -> DimensionResult<DimensionValue> {
    if id == TIME_DIMENSION_ID {
        return match value {
            Value::String(s) => parse_instant(s)
                .map(DimensionValue::Time)
                .map_err(|e| invalid(id, e.to_string())),
            // epoch milliseconds
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(DimensionValue::Time)
                .ok_or_else(|| invalid(id, format!("invalid timestamp {}", n))),
            other => Err(invalid(id, format!("expected a time, got {}", other))),
        };
    }

    // other dimensions pass through uninterpreted
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(DimensionValue::Number)
            .ok_or_else(|| invalid(id, format!("invalid number {}", n))),
        Value::String(s) => Ok(DimensionValue::Text(s.clone())),
        other => Err(invalid(id, format!("expected a number or string, got {}", other))),
    }
}

fn decode_range(id: &str, value: &Value) -> DimensionResult<DimensionRange> {
    match value {
        Value::Object(map) => {
            let bound = |key: &str| {
                map.get(key)
                    .ok_or_else(|| invalid(id, format!("range is missing '{}'", key)))
                    .and_then(|v| decode_value(id, v))
            };
            Ok(DimensionRange::Interval {
                min: bound("min")?,
                max: bound("max")?,
            })
        }
        Value::Array(values) => values
            .iter()
            .map(|v| decode_value(id, v))
            .collect::<DimensionResult<Vec<_>>>()
            .map(DimensionRange::List),
        other => Err(invalid(id, format!("expected a range, got {}", other))),
    }
}

pub(crate) type DecodedSnapshot = (Vec<(String, DimensionValue)>, Vec<(String, DimensionRange)>);

/// Decode every entry of a snapshot, failing on the first malformed one
pub(crate) fn decode_snapshot(snapshot: &DimensionsSnapshot) -> DimensionResult<DecodedSnapshot> {
    let values = snapshot
        .dimension_values
        .iter()
        .map(|(id, value)| Ok((id.clone(), decode_value(id, value)?)))
        .collect::<DimensionResult<Vec<_>>>()?;
    let ranges = snapshot
        .range_values
        .iter()
        .map(|(id, range)| Ok((id.clone(), decode_range(id, range)?)))
        .collect::<DimensionResult<Vec<_>>>()?;
    Ok((values, ranges))
}
