//! Filter values shared between a dataset and its views

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::domain::DimensionValue;

/// Area of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiValue {
    pub geometry: Geometry<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
}

impl AoiValue {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            props: None,
        }
    }
}

/// A closed time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }
}

/// Time of interest: a single instant or a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeOfInterest {
    Instant(DateTime<Utc>),
    Range(TimeRange),
}

impl TimeOfInterest {
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeOfInterest::Range(TimeRange::new(start, end))
    }

    pub fn start(&self) -> DateTime<Utc> {
        match self {
            TimeOfInterest::Instant(t) => *t,
            TimeOfInterest::Range(r) => r.start,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self {
            TimeOfInterest::Instant(t) => *t,
            TimeOfInterest::Range(r) => r.end,
        }
    }
}

impl From<DateTime<Utc>> for TimeOfInterest {
    fn from(t: DateTime<Utc>) -> Self {
        TimeOfInterest::Instant(t)
    }
}

/// Dataset-level filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aoi: Option<AoiValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toi: Option<TimeOfInterest>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_filters: BTreeMap<String, serde_json::Value>,
}

/// Read-only filter view handed to domain providers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aoi: Option<AoiValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toi: Option<TimeOfInterest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Selected values of the other dimensions
    pub dimension_values: BTreeMap<String, DimensionValue>,
    pub additional_filters: BTreeMap<String, serde_json::Value>,
}

impl DimensionFilters {
    /// The dataset-level part of this view
    pub fn dataset_filters(&self) -> DatasetFilters {
        DatasetFilters {
            aoi: self.aoi.clone(),
            toi: self.toi,
            additional_filters: self.additional_filters.clone(),
        }
    }
}

/// A filter a domain provider can depend on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKey {
    Aoi,
    Toi,
    Variable,
    AdditionalFilters,
    /// Selected value of another dimension
    Dimension(String),
}

impl FilterKey {
    /// Dependencies assumed for a provider that does not declare any
    pub fn dataset_defaults() -> Vec<FilterKey> {
        vec![FilterKey::Aoi, FilterKey::Toi, FilterKey::AdditionalFilters]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_toi_serde_shapes() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let toi: TimeOfInterest = serde_json::from_str("\"2024-01-01T00:00:00Z\"").unwrap();
        assert_eq!(toi, TimeOfInterest::Instant(t0));

        let toi: TimeOfInterest =
            serde_json::from_str(r#"{"start": "2024-01-01T00:00:00Z", "end": "2024-02-01T00:00:00Z"}"#).unwrap();
        assert_eq!(toi, TimeOfInterest::range(t0, t1));
        assert_eq!(toi.end(), t1);
    }
}
