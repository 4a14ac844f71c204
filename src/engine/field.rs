use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A single observed value handed to the engine. Observations expose their
/// fields through this tagged union so the engine never needs to know the
/// concrete observation type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    /// An unordered bag of words, e.g. the segments of a window title.
    Words(Vec<String>),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Str(_) => "str",
            FieldValue::Words(_) => "words",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::DateTime(_) => "datetime",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Words(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<NaiveTime> for FieldValue {
    fn from(value: NaiveTime) -> Self {
        FieldValue::Time(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::DateTime(value)
    }
}

/// Contract every observation type implements to be evaluated by the engine.
/// Returning [None] for a name the comparison references surfaces as a
/// missing-attribute evaluation error, not as a false result.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl FieldSource for std::collections::HashMap<String, FieldValue> {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }
}
