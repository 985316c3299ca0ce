//! Clamping of values and ranges against dimension domains

use crate::domain::{DataDomain, DimensionRange, DimensionValue};

/// Correction needed to bring a value back inside its domain
#[derive(Debug, Clone, PartialEq)]
pub enum ValueCorrection {
    Set(DimensionValue),
    Unset,
}

/// Check a selected value against a domain.
///
/// Values below `min` or above `max` of a value domain are moved to the
/// violated bound. A value missing from a categorical domain is replaced by
/// the first listed value, or unset when the domain is empty.
pub fn reconcile_value(value: &DimensionValue, domain: &DataDomain) -> Option<ValueCorrection> {
    match domain {
        DataDomain::Value(domain) => {
            if let Some(min) = &domain.min {
                if value < min {
                    return Some(ValueCorrection::Set(min.clone()));
                }
            }
            if let Some(max) = &domain.max {
                if value > max {
                    return Some(ValueCorrection::Set(max.clone()));
                }
            }
            None
        }
        DataDomain::Categorical(domain) => {
            if domain.contains(value) {
                None
            } else {
                Some(
                    domain
                        .first()
                        .cloned()
                        .map_or(ValueCorrection::Unset, ValueCorrection::Set),
                )
            }
        }
    }
}

fn max_value(a: DimensionValue, b: &DimensionValue) -> DimensionValue {
    if b > &a {
        b.clone()
    } else {
        a
    }
}

fn min_value(a: DimensionValue, b: &DimensionValue) -> DimensionValue {
    if b < &a {
        b.clone()
    } else {
        a
    }
}

/// Clamp a candidate range to a domain.
///
/// - no domain, a categorical domain or a domain without bounds leaves the
///   candidate unchanged;
/// - a missing candidate, a discrete list or a candidate disjoint from
///   `[min, max]` resets to the whole domain;
/// - otherwise each bound is clamped independently.
///
/// Half-open domains cannot express a whole-domain interval: there a missing
/// candidate stays missing, lists are kept and an interval inverted by the
/// clamp collapses onto the defined bound.
pub fn clamp_range(domain: Option<&DataDomain>, candidate: Option<DimensionRange>) -> Option<DimensionRange> {
    let Some(domain) = domain.and_then(DataDomain::as_value_domain) else {
        return candidate;
    };

    match (&domain.min, &domain.max) {
        (None, None) => candidate,
        (Some(dmin), Some(dmax)) => {
            let whole = || DimensionRange::Interval {
                min: dmin.clone(),
                max: dmax.clone(),
            };
            match candidate {
                Some(DimensionRange::Interval { min, max }) => {
                    if &max <= dmin || &min >= dmax {
                        Some(whole())
                    } else {
                        Some(DimensionRange::Interval {
                            min: max_value(min, dmin),
                            max: min_value(max, dmax),
                        })
                    }
                }
                _ => Some(whole()),
            }
        }
        (dmin, dmax) => match candidate {
            Some(DimensionRange::Interval { min, max }) => {
                let mut min = dmin.as_ref().map_or(min.clone(), |b| max_value(min.clone(), b));
                let mut max = dmax.as_ref().map_or(max.clone(), |b| min_value(max.clone(), b));
                if min > max {
                    let bound = dmin.as_ref().or(dmax.as_ref()).cloned().unwrap_or_else(|| min.clone());
                    min = bound.clone();
                    max = bound;
                }
                Some(DimensionRange::Interval { min, max })
            }
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoricalDomain, ValueDomain};

    fn numeric(min: f64, max: f64) -> DataDomain {
        DataDomain::Value(ValueDomain::bounded(min, max))
    }

    #[test]
    fn test_clamp_partially_outside() {
        let domain = numeric(0.0, 10.0);
        let clamped = clamp_range(Some(&domain), Some(DimensionRange::interval(-5.0, 5.0)));
        assert_eq!(clamped, Some(DimensionRange::interval(0.0, 5.0)));

        let clamped = clamp_range(Some(&domain), Some(DimensionRange::interval(2.0, 15.0)));
        assert_eq!(clamped, Some(DimensionRange::interval(2.0, 10.0)));
    }

    #[test]
    fn test_clamp_disjoint_resets_to_whole_domain() {
        let domain = numeric(0.0, 10.0);
        let clamped = clamp_range(Some(&domain), Some(DimensionRange::interval(20.0, 30.0)));
        assert_eq!(clamped, Some(DimensionRange::interval(0.0, 10.0)));

        // touching the lower bound counts as disjoint
        let clamped = clamp_range(Some(&domain), Some(DimensionRange::interval(-3.0, 0.0)));
        assert_eq!(clamped, Some(DimensionRange::interval(0.0, 10.0)));
    }

    #[test]
    fn test_clamp_missing_or_list_candidate() {
        let domain = numeric(0.0, 10.0);
        assert_eq!(clamp_range(Some(&domain), None), Some(DimensionRange::interval(0.0, 10.0)));

        let list = DimensionRange::List(vec![DimensionValue::Number(3.0)]);
        assert_eq!(
            clamp_range(Some(&domain), Some(list)),
            Some(DimensionRange::interval(0.0, 10.0))
        );
    }

    #[test]
    fn test_clamp_without_meaningful_domain() {
        let candidate = Some(DimensionRange::interval(-5.0, 5.0));
        assert_eq!(clamp_range(None, candidate.clone()), candidate);

        let categorical = DataDomain::Categorical(CategoricalDomain::from_values([1.0, 2.0]));
        assert_eq!(clamp_range(Some(&categorical), candidate.clone()), candidate);

        let unbounded = DataDomain::Value(ValueDomain::default());
        assert_eq!(clamp_range(Some(&unbounded), candidate.clone()), candidate);
    }

    #[test]
    fn test_clamp_half_open_domain() {
        let domain = DataDomain::Value(ValueDomain::new(Some(DimensionValue::Number(0.0)), None));
        assert_eq!(
            clamp_range(Some(&domain), Some(DimensionRange::interval(-5.0, 5.0))),
            Some(DimensionRange::interval(0.0, 5.0))
        );
        assert_eq!(
            clamp_range(Some(&domain), Some(DimensionRange::interval(-5.0, -1.0))),
            Some(DimensionRange::interval(0.0, 0.0))
        );
        assert_eq!(clamp_range(Some(&domain), None), None);
    }

    #[test]
    fn test_reconcile_value_domain() {
        let domain = numeric(0.0, 10.0);
        assert_eq!(
            reconcile_value(&DimensionValue::Number(-1.0), &domain),
            Some(ValueCorrection::Set(DimensionValue::Number(0.0)))
        );
        assert_eq!(
            reconcile_value(&DimensionValue::Number(11.0), &domain),
            Some(ValueCorrection::Set(DimensionValue::Number(10.0)))
        );
        assert_eq!(reconcile_value(&DimensionValue::Number(4.0), &domain), None);
        // a value of another kind is left alone
        assert_eq!(reconcile_value(&DimensionValue::from("B04"), &domain), None);
    }

    #[test]
    fn test_reconcile_categorical_domain() {
        let domain = DataDomain::Categorical(CategoricalDomain::from_values(["B02", "B03"]));
        assert_eq!(reconcile_value(&DimensionValue::from("B03"), &domain), None);
        assert_eq!(
            reconcile_value(&DimensionValue::from("B08"), &domain),
            Some(ValueCorrection::Set(DimensionValue::from("B02")))
        );

        let empty = DataDomain::Categorical(CategoricalDomain::default());
        assert_eq!(
            reconcile_value(&DimensionValue::from("B08"), &empty),
            Some(ValueCorrection::Unset)
        );
    }
}
