//! Domain model: the set of currently valid values of a dimension

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

mod value;

pub use value::{format_instant, parse_instant, DimensionRange, DimensionValue};

/// Continuous (or steppable) interval. Both bounds are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDomain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<DimensionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<DimensionValue>,
    /// Step between valid values (milliseconds for temporal domains)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data: Option<DimensionValue>,
}

impl ValueDomain {
    pub fn new(min: Option<DimensionValue>, max: Option<DimensionValue>) -> Self {
        Self {
            min,
            max,
            ..Default::default()
        }
    }

    pub fn bounded(min: impl Into<DimensionValue>, max: impl Into<DimensionValue>) -> Self {
        Self::new(Some(min.into()), Some(max.into()))
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_no_data(mut self, no_data: impl Into<DimensionValue>) -> Self {
        self.no_data = Some(no_data.into());
        self
    }
}

/// One entry of an enumerated domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalDomainItem {
    pub value: DimensionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Enumerated, ordered list of values. Duplicates are kept as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalDomain {
    pub values: Vec<CategoricalDomainItem>,
}

impl CategoricalDomain {
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DimensionValue>,
    {
        Self {
            values: values
                .into_iter()
                .map(|v| CategoricalDomainItem {
                    value: v.into(),
                    label: None,
                })
                .collect(),
        }
    }

    pub fn contains(&self, value: &DimensionValue) -> bool {
        self.values.iter().any(|item| &item.value == value)
    }

    pub fn first(&self) -> Option<&DimensionValue> {
        self.values.first().map(|item| &item.value)
    }
}

/// A dimension domain.
///
/// Deserialization follows the structural rule used by dataset configuration
/// files: an object whose `values` field is an array is categorical, anything
/// else is a value domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataDomain {
    Categorical(CategoricalDomain),
    Value(ValueDomain),
}

impl<'de> Deserialize<'de> for DataDomain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("values").map_or(false, Value::is_array) {
            CategoricalDomain::deserialize(value)
                .map(DataDomain::Categorical)
                .map_err(D::Error::custom)
        } else {
            ValueDomain::deserialize(value)
                .map(DataDomain::Value)
                .map_err(D::Error::custom)
        }
    }
}

impl DataDomain {
    pub fn is_categorical(&self) -> bool {
        matches!(self, DataDomain::Categorical(_))
    }

    pub fn as_value_domain(&self) -> Option<&ValueDomain> {
        match self {
            DataDomain::Value(domain) => Some(domain),
            DataDomain::Categorical(_) => None,
        }
    }

    /// Value used when a dimension gets initialized from its domain: the
    /// minimum of a value domain or the first categorical entry
    pub fn initial_value(&self) -> Option<DimensionValue> {
        match self {
            DataDomain::Value(domain) => domain.min.clone(),
            DataDomain::Categorical(domain) => domain.first().cloned(),
        }
    }
}

impl From<ValueDomain> for DataDomain {
    fn from(domain: ValueDomain) -> Self {
        DataDomain::Value(domain)
    }
}

impl From<CategoricalDomain> for DataDomain {
    fn from(domain: CategoricalDomain) -> Self {
        DataDomain::Categorical(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorical_iff_values_is_array() {
        let domain: DataDomain =
            serde_json::from_str(r#"{"values": [{"value": "B04", "label": "Red"}, {"value": 2}]}"#).unwrap();
        assert!(domain.is_categorical());

        let domain: DataDomain = serde_json::from_str(r#"{"min": 0, "max": 10, "step": 1}"#).unwrap();
        assert_eq!(domain, DataDomain::Value(ValueDomain::bounded(0.0, 10.0).with_step(1.0)));

        // a non-array `values` field does not make a domain categorical
        let domain: DataDomain = serde_json::from_str(r#"{"values": "B04", "min": 1}"#).unwrap();
        assert!(!domain.is_categorical());

        let domain: DataDomain = serde_json::from_str("{}").unwrap();
        assert_eq!(domain, DataDomain::Value(ValueDomain::default()));
    }

    #[test]
    fn test_malformed_values_array_is_an_error() {
        assert!(serde_json::from_str::<DataDomain>(r#"{"values": [1, 2, 3]}"#).is_err());
        assert!(serde_json::from_str::<DataDomain>(r#"{"values": [{"label": "Red"}], "min": 0}"#).is_err());

        let domain: DataDomain = serde_json::from_str(r#"{"values": []}"#).unwrap();
        assert_eq!(domain, DataDomain::Categorical(CategoricalDomain::default()));
    }

    #[test]
    fn test_initial_value() {
        let domain = DataDomain::from(CategoricalDomain::from_values(["a", "b"]));
        assert_eq!(domain.initial_value(), Some(DimensionValue::from("a")));

        let domain = DataDomain::from(CategoricalDomain::default());
        assert_eq!(domain.initial_value(), None);

        let domain = DataDomain::from(ValueDomain::bounded(3.0, 7.0));
        assert_eq!(domain.initial_value(), Some(DimensionValue::Number(3.0)));
    }
}
