// tally-core/src/application/reducer.rs

use tracing::debug;

use crate::domain::error::DomainError;
use crate::domain::scan::measurement::{Measurement, MeasurementDescriptor, MetricValue};
use crate::domain::scan::metric::{
    INVALID_COUNT, INVALID_PERCENTAGE, MISSING_COUNT, MISSING_PERCENTAGE, ROW_COUNT, VALID_COUNT,
    VALID_PERCENTAGE, VALUES_COUNT, VALUES_PERCENTAGE,
};

/// Binds the single result tuple to the descriptors, position by position.
pub fn reduce(
    values: Vec<MetricValue>,
    descriptors: &[MeasurementDescriptor],
) -> Result<Vec<Measurement>, DomainError> {
    if values.len() != descriptors.len() {
        return Err(DomainError::PositionalMismatch {
            fields: descriptors.len(),
            values: values.len(),
        });
    }

    let measurements: Vec<Measurement> = descriptors
        .iter()
        .cloned()
        .zip(values)
        .map(|(descriptor, value)| descriptor.fill(value))
        .collect();

    for m in &measurements {
        debug!("Query measurement: {}", m);
    }
    Ok(measurements)
}

/// Percentages and complementary counts, computed from raw measurements only.
///
/// Every column carrying a `missing_count` gets `missing_percentage`,
/// `values_count` and `values_percentage`; a `valid_count` next to it adds
/// `invalid_percentage`, `invalid_count` and `valid_percentage`. When the row
/// count is zero or not a number every percentage is `Undefined`.
pub fn derive(measurements: &[Measurement]) -> Vec<Measurement> {
    let row_count = measurements
        .iter()
        .find(|m| m.is_table_scope() && m.metric == ROW_COUNT)
        .and_then(|m| m.value.as_i64());

    let mut derived = Vec::new();
    for missing in measurements.iter().filter(|m| m.metric == MISSING_COUNT) {
        let Some(column) = missing.column.as_deref() else {
            continue;
        };
        let missing_count = missing.value.as_i64();
        let values_count = row_count.zip(missing_count).map(|(r, m)| r - m);

        derived.push(Measurement::new(
            MISSING_PERCENTAGE,
            Some(column),
            percentage(missing_count, row_count),
        ));
        derived.push(Measurement::new(VALUES_COUNT, Some(column), count(values_count)));
        derived.push(Measurement::new(
            VALUES_PERCENTAGE,
            Some(column),
            percentage(values_count, row_count),
        ));

        let valid = measurements
            .iter()
            .find(|m| m.metric == VALID_COUNT && m.column.as_deref() == Some(column));
        if let Some(valid) = valid {
            let valid_count = valid.value.as_i64();
            let invalid_count = values_count.zip(valid_count).map(|(v, ok)| v - ok);

            derived.push(Measurement::new(
                INVALID_PERCENTAGE,
                Some(column),
                percentage(invalid_count, row_count),
            ));
            derived.push(Measurement::new(INVALID_COUNT, Some(column), count(invalid_count)));
            derived.push(Measurement::new(
                VALID_PERCENTAGE,
                Some(column),
                percentage(valid_count, row_count),
            ));
        }
    }

    for m in &derived {
        debug!("Derived measurement: {}", m);
    }
    derived
}

fn count(value: Option<i64>) -> MetricValue {
    value.map(MetricValue::Integer).unwrap_or(MetricValue::Undefined)
}

fn percentage(part: Option<i64>, row_count: Option<i64>) -> MetricValue {
    match (part, row_count) {
        (Some(part), Some(total)) if total != 0 => {
            MetricValue::Decimal(part as f64 * 100.0 / total as f64)
        }
        _ => MetricValue::Undefined,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn value_of(measurements: &[Measurement], metric: &str, column: &str) -> MetricValue {
        measurements
            .iter()
            .find(|m| m.metric == metric && m.is_for_column(column))
            .map(|m| m.value.clone())
            .unwrap()
    }

    fn descriptors() -> Vec<MeasurementDescriptor> {
        vec![
            MeasurementDescriptor::table(ROW_COUNT),
            MeasurementDescriptor::column(MISSING_COUNT, "email"),
            MeasurementDescriptor::column(VALID_COUNT, "email"),
        ]
    }

    #[test]
    fn test_reduce_binds_by_position() -> Result<()> {
        let values = vec![
            MetricValue::Integer(10),
            MetricValue::Integer(2),
            MetricValue::Integer(7),
        ];
        let measurements = reduce(values, &descriptors())?;
        assert_eq!(measurements[0].to_string(), "row_count = 10");
        assert_eq!(measurements[2].to_string(), "valid_count(email) = 7");
        Ok(())
    }

    #[test]
    fn test_reduce_rejects_length_mismatch() {
        let result = reduce(vec![MetricValue::Integer(10)], &descriptors());
        assert!(matches!(
            result,
            Err(DomainError::PositionalMismatch { fields: 3, values: 1 })
        ));
    }

    #[test]
    fn test_derive_missing_and_validity() -> Result<()> {
        let values = vec![
            MetricValue::Integer(10),
            MetricValue::Integer(2),
            MetricValue::Integer(7),
        ];
        let measurements = reduce(values, &descriptors())?;
        let derived = derive(&measurements);

        let metrics: Vec<&str> = derived.iter().map(|m| m.metric.as_str()).collect();
        assert_eq!(
            metrics,
            vec![
                MISSING_PERCENTAGE,
                VALUES_COUNT,
                VALUES_PERCENTAGE,
                INVALID_PERCENTAGE,
                INVALID_COUNT,
                VALID_PERCENTAGE
            ]
        );
        assert_eq!(value_of(&derived, VALUES_COUNT, "email"), MetricValue::Integer(8));
        assert_eq!(value_of(&derived, INVALID_COUNT, "email"), MetricValue::Integer(1));
        assert_eq!(
            value_of(&derived, MISSING_PERCENTAGE, "email"),
            MetricValue::Decimal(20.0)
        );
        assert_eq!(
            value_of(&derived, VALID_PERCENTAGE, "email"),
            MetricValue::Decimal(70.0)
        );
        Ok(())
    }

    #[test]
    fn test_percentages_sum_to_hundred() -> Result<()> {
        let values = vec![
            MetricValue::Integer(7),
            MetricValue::Integer(3),
            MetricValue::Integer(2),
        ];
        let derived = derive(&reduce(values, &descriptors())?);

        let pct = |metric| value_of(&derived, metric, "email").as_f64().unwrap();
        assert!((pct(MISSING_PERCENTAGE) + pct(VALUES_PERCENTAGE) - 100.0).abs() < 1e-9);
        assert!(
            (pct(MISSING_PERCENTAGE) + pct(VALID_PERCENTAGE) + pct(INVALID_PERCENTAGE) - 100.0)
                .abs()
                < 1e-9
        );
        Ok(())
    }

    #[test]
    fn test_zero_rows_yield_undefined_percentages() -> Result<()> {
        let values = vec![
            MetricValue::Integer(0),
            MetricValue::Integer(0),
            MetricValue::Integer(0),
        ];
        let derived = derive(&reduce(values, &descriptors())?);

        for m in &derived {
            if m.metric.ends_with("_percentage") {
                assert!(m.value.is_undefined(), "{}", m);
            } else {
                assert_eq!(m.value, MetricValue::Integer(0));
            }
        }
        Ok(())
    }

    #[test]
    fn test_missing_only_column_skips_validity_derivations() {
        let measurements = vec![
            Measurement::new(ROW_COUNT, None, MetricValue::Integer(4)),
            Measurement::new(MISSING_COUNT, Some("name"), MetricValue::Integer(1)),
        ];
        let derived = derive(&measurements);
        assert_eq!(derived.len(), 3);
        assert_eq!(
            value_of(&derived, VALUES_PERCENTAGE, "name"),
            MetricValue::Decimal(75.0)
        );
    }
}
