//! Untyped result rows and their conversion into typed row shapes.

use std::fmt;

use crate::error::ScanError;

/// Value of a single column in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating-point number.
    Float(f64),
    /// Fixed-point number in its textual representation.
    Decimal(String),
    /// Text.
    Text(String),
    /// Binary string.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns a human-readable name of the value type used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int(_) => "integer",
            Self::UInt(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Checks whether this is a `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) => Some(s),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Result row of a query: an ordered list of column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns column values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Checks that the row has exactly `expected` columns.
    ///
    /// # Errors
    ///
    /// Returns an error on column count mismatch.
    pub fn expect_columns(&self, expected: usize) -> Result<(), ScanError> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(ScanError::ColumnCount {
                expected,
                actual: self.values.len(),
            })
        }
    }

    /// Converts the column with the specified zero-based index.
    ///
    /// # Errors
    ///
    /// Returns an error if the column doesn't exist, is an unexpected `NULL` or cannot be converted
    /// to `T`.
    pub fn column<T: FromValue>(&self, index: usize) -> Result<T, ScanError> {
        let value = self.values.get(index).ok_or(ScanError::ColumnCount {
            expected: index + 1,
            actual: self.values.len(),
        })?;
        T::from_value(value).ok_or_else(|| {
            if value.is_null() {
                ScanError::UnexpectedNull { column: index }
            } else {
                ScanError::TypeMismatch {
                    column: index,
                    expected: T::EXPECTED,
                    actual: value.type_name(),
                }
            }
        })
    }
}

impl<V: Into<Value>> FromIterator<V> for Row {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Conversion of a column [`Value`] into a typed field.
///
/// Conversions are lenient in the same way as SQL drivers usually are: numbers can be read
/// as strings, and numeric strings can be read as numbers. `NULL` is only accepted by `Option`s
/// and [`Ignored`].
pub trait FromValue: Sized {
    /// Human-readable name of the type used in error messages.
    const EXPECTED: &'static str;

    /// Performs the conversion. Returns `None` if the value cannot be converted.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Int(value) => Some(value.to_string()),
            Value::UInt(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            other => other.as_text().map(str::to_owned),
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";

    #[allow(clippy::cast_precision_loss)] // acceptable for metric values
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::UInt(value) => Some(*value as f64),
            other => other.as_text()?.trim().parse().ok(),
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => (*value).try_into().ok(),
            other => other.as_text()?.trim().parse().ok(),
        }
    }
}

impl FromValue for u64 {
    const EXPECTED: &'static str = "unsigned integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt(value) => Some(*value),
            Value::Int(value) => (*value).try_into().ok(),
            other => other.as_text()?.trim().parse().ok(),
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).map(|value| value != 0)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Placeholder for a column that is present in a result row, but is not used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ignored;

impl FromValue for Ignored {
    const EXPECTED: &'static str = "any value";

    fn from_value(_value: &Value) -> Option<Self> {
        Some(Self)
    }
}

/// Conversion of a row field into a label value.
pub trait LabelValue {
    /// Performs the conversion.
    fn to_label_value(&self) -> String;
}

impl LabelValue for String {
    fn to_label_value(&self) -> String {
        self.clone()
    }
}

macro_rules! impl_label_value_via_display {
    ($($ty:ty),+) => {
        $(
        impl LabelValue for $ty {
            fn to_label_value(&self) -> String {
                self.to_string()
            }
        }
        )+
    };
}

impl_label_value_via_display!(f64, i64, u64, bool);

/// `None` is encoded as an empty label value.
impl<T: LabelValue> LabelValue for Option<T> {
    fn to_label_value(&self) -> String {
        self.as_ref().map(T::to_label_value).unwrap_or_default()
    }
}

/// Conversion of a row field into a sample value.
pub trait SampleValue {
    /// Performs the conversion.
    fn to_sample_value(&self) -> f64;
}

impl SampleValue for f64 {
    fn to_sample_value(&self) -> f64 {
        *self
    }
}

#[allow(clippy::cast_precision_loss)] // acceptable for metric values
impl SampleValue for i64 {
    fn to_sample_value(&self) -> f64 {
        *self as f64
    }
}

#[allow(clippy::cast_precision_loss)] // acceptable for metric values
impl SampleValue for u64 {
    fn to_sample_value(&self) -> f64 {
        *self as f64
    }
}

impl SampleValue for bool {
    fn to_sample_value(&self) -> f64 {
        if *self {
            1.0
        } else {
            0.0
        }
    }
}

/// Label values and the value of a single sample, as produced from one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Label values in the order of the descriptor labels.
    pub label_values: Vec<String>,
    /// Sample value.
    pub value: f64,
}

impl Observation {
    /// Creates a new observation.
    pub fn new(label_values: Vec<String>, value: f64) -> Self {
        Self {
            label_values,
            value,
        }
    }
}

/// Typed shape of a result row. Should be derived using the [corresponding macro](macro@crate::ScanRow).
pub trait ScanRow: Sized + fmt::Debug {
    /// Names of the labels produced by [`Self::into_observation()`], in order.
    const LABELS: &'static [&'static str];
    /// Number of columns in the row.
    const COLUMNS: usize;

    /// Scans a row into this shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the row doesn't match the shape.
    fn scan(row: &Row) -> Result<Self, ScanError>;

    /// Converts this row into label values and a sample value.
    fn into_observation(self) -> Observation;
}

/// Row mapper for a [`ScanRow`] shape.
pub(crate) fn map_row<R: ScanRow>(row: &Row) -> Result<Observation, ScanError> {
    R::scan(row).map(R::into_observation)
}
