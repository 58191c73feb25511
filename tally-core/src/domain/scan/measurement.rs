// tally-core/src/domain/scan/measurement.rs

use serde::{Serialize, Serializer};
use std::fmt;

/// A single value flowing out of the warehouse or out of a derivation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetricValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
    /// Explicit marker for a derivation that has no defined result (e.g. a
    /// percentage over zero rows).
    Undefined,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Decimal(d) => serializer.serialize_f64(*d),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

/// What one positional field of the aggregation query means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementDescriptor {
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl MeasurementDescriptor {
    pub fn table(metric: &str) -> Self {
        Self {
            metric: metric.to_string(),
            column: None,
        }
    }

    pub fn column(metric: &str, column: &str) -> Self {
        Self {
            metric: metric.to_string(),
            column: Some(column.to_string()),
        }
    }

    pub fn fill(self, value: MetricValue) -> Measurement {
        Measurement {
            metric: self.metric,
            column: self.column,
            value,
        }
    }
}

impl fmt::Display for MeasurementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}({})", self.metric, column),
            None => write!(f, "{}", self.metric),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub value: MetricValue,
}

impl Measurement {
    pub fn new(metric: &str, column: Option<&str>, value: MetricValue) -> Self {
        Self {
            metric: metric.to_string(),
            column: column.map(str::to_string),
            value,
        }
    }

    /// Table-scope measurements (no column) are visible to every test.
    pub fn is_table_scope(&self) -> bool {
        self.column.is_none()
    }

    pub fn is_for_column(&self, column: &str) -> bool {
        self.column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column))
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}({}) = {}", self.metric, column, self.value),
            None => write!(f, "{} = {}", self.metric, self.value),
        }
    }
}
