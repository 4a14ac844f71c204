use std::fmt::{self, Display};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};

use super::{
    error::{DefinitionError, EvaluationError},
    field::{FieldSource, FieldValue},
};

/// The type a comparison literal is coerced into before any evaluation
/// happens. The serialized tags match the persisted condition format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Date,
    Time,
    DateTime,
}

impl ValueKind {
    pub fn parse(tag: &str) -> Result<Self, DefinitionError> {
        match tag {
            "str" => Ok(ValueKind::Str),
            "int" => Ok(ValueKind::Int),
            "float" => Ok(ValueKind::Float),
            "date" => Ok(ValueKind::Date),
            "time" => Ok(ValueKind::Time),
            "datetime" => Ok(ValueKind::DateTime),
            other => Err(DefinitionError::UnknownValueKind(other.to_owned())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Str => "str",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::DateTime => "datetime",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        match text {
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            ">" => Ok(CompareOp::Gt),
            "<=" => Ok(CompareOp::Le),
            ">=" => Ok(CompareOp::Ge),
            "in" => Ok(CompareOp::In),
            "not in" => Ok(CompareOp::NotIn),
            other => Err(DefinitionError::UnknownOperator(other.to_owned())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }

    /// Static legality table. Membership operators only make sense for text,
    /// ordering only for values with a total order.
    pub fn legal_for(self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Str => matches!(
                self,
                CompareOp::Eq | CompareOp::Ne | CompareOp::In | CompareOp::NotIn
            ),
            _ => matches!(
                self,
                CompareOp::Eq
                    | CompareOp::Ne
                    | CompareOp::Lt
                    | CompareOp::Gt
                    | CompareOp::Le
                    | CompareOp::Ge
            ),
        }
    }

    /// Applies an ordering/equality operator with the observed value on the
    /// left. Membership operators never reach this point, the operator/kind
    /// pairing is validated at construction.
    fn ordered<T: PartialOrd>(self, observed: &T, expected: &T) -> bool {
        match self {
            CompareOp::Eq => observed == expected,
            CompareOp::Ne => observed != expected,
            CompareOp::Lt => observed < expected,
            CompareOp::Gt => observed > expected,
            CompareOp::Le => observed <= expected,
            CompareOp::Ge => observed >= expected,
            CompareOp::In | CompareOp::NotIn => {
                unreachable!("membership operators are rejected for ordered kinds at construction")
            }
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison literal, already coerced to its declared kind.
#[derive(Debug, Clone, PartialEq)]
enum ComparisonValue {
    Str(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

/// A single leaf of a condition tree: one observation field compared against
/// one literal. Immutable once constructed, an instance that exists is always
/// internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeComparison {
    attribute_name: String,
    operator: CompareOp,
    value: ComparisonValue,
}

impl AttributeComparison {
    /// Builds a comparison from its textual parts, the same shape the
    /// persisted format uses. Validates the kind tag, the operator and the
    /// operator/kind pairing, then coerces the literal.
    pub fn new(
        attribute_name: impl Into<String>,
        comp_operator: &str,
        attribute_value: &str,
        value_type: &str,
    ) -> Result<Self, DefinitionError> {
        let kind = ValueKind::parse(value_type)?;
        let operator = CompareOp::parse(comp_operator)?;
        if !operator.legal_for(kind) {
            return Err(DefinitionError::OperatorNotAllowed {
                operator: operator.as_str().to_owned(),
                kind: kind.as_str().to_owned(),
            });
        }
        let value = coerce_literal(attribute_value, kind)?;
        Ok(Self {
            attribute_name: attribute_name.into(),
            operator,
            value,
        })
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn operator(&self) -> CompareOp {
        self.operator
    }

    pub fn value_kind(&self) -> ValueKind {
        match self.value {
            ComparisonValue::Str(_) => ValueKind::Str,
            ComparisonValue::Int(_) => ValueKind::Int,
            ComparisonValue::Float(_) => ValueKind::Float,
            ComparisonValue::Date(_) => ValueKind::Date,
            ComparisonValue::Time(_) => ValueKind::Time,
            ComparisonValue::DateTime(_) => ValueKind::DateTime,
        }
    }

    /// The literal in the form it is persisted in. Reparsing this through
    /// [AttributeComparison::new] reconstructs an equivalent comparison.
    pub fn value_text(&self) -> String {
        match &self.value {
            ComparisonValue::Str(v) => v.clone(),
            ComparisonValue::Int(v) => v.to_string(),
            ComparisonValue::Float(v) => v.to_string(),
            ComparisonValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            ComparisonValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            ComparisonValue::DateTime(v) => v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }

    /// Evaluates the comparison against one observation. The observed value
    /// sits on the left of the operator: `field >= literal`.
    pub fn evaluate(&self, observation: &dyn FieldSource) -> Result<bool, EvaluationError> {
        let observed = observation
            .field(&self.attribute_name)
            .ok_or_else(|| EvaluationError::MissingAttribute(self.attribute_name.clone()))?;

        match &self.value {
            ComparisonValue::Str(expected) => self.evaluate_text(expected, &observed),
            ComparisonValue::Int(expected) => match observed {
                FieldValue::Int(found) => Ok(self.operator.ordered(&found, expected)),
                other => Err(self.mismatch("int", &other)),
            },
            ComparisonValue::Float(expected) => match observed {
                FieldValue::Float(found) => Ok(self.operator.ordered(&found, expected)),
                other => Err(self.mismatch("float", &other)),
            },
            ComparisonValue::Date(expected) => {
                let found = self.coerce_temporal(observed)?;
                Ok(self.operator.ordered(&found.date(), expected))
            }
            ComparisonValue::Time(expected) => {
                let found = self.coerce_temporal(observed)?;
                Ok(self.operator.ordered(&found.time(), expected))
            }
            ComparisonValue::DateTime(expected) => {
                let found = self.coerce_temporal(observed)?;
                Ok(self.operator.ordered(&found, expected))
            }
        }
    }

    /// String comparisons fold case on both sides. The observed side may be a
    /// plain string or a bag of words; membership means substring for the
    /// former and whole-word equality for the latter. A bag of words never
    /// equals a single string.
    fn evaluate_text(
        &self,
        expected: &str,
        observed: &FieldValue,
    ) -> Result<bool, EvaluationError> {
        let expected = expected.to_lowercase();
        match observed {
            FieldValue::Str(found) => {
                let found = found.to_lowercase();
                Ok(match self.operator {
                    CompareOp::Eq => found == expected,
                    CompareOp::Ne => found != expected,
                    CompareOp::In => found.contains(&expected),
                    CompareOp::NotIn => !found.contains(&expected),
                    _ => unreachable!("ordering operators are rejected for str at construction"),
                })
            }
            FieldValue::Words(words) => {
                let mut folded = words.iter().map(|word| word.to_lowercase());
                Ok(match self.operator {
                    CompareOp::Eq => false,
                    CompareOp::Ne => true,
                    CompareOp::In => folded.any(|word| word == expected),
                    CompareOp::NotIn => folded.all(|word| word != expected),
                    _ => unreachable!("ordering operators are rejected for str at construction"),
                })
            }
            other => Err(self.mismatch("str or words", other)),
        }
    }

    /// Temporal comparisons re-coerce the observed value through the same
    /// logic the constructor applies to literals: native temporal values,
    /// unix timestamps and ISO-8601 strings are all accepted.
    fn coerce_temporal(&self, observed: FieldValue) -> Result<NaiveDateTime, EvaluationError> {
        match observed {
            FieldValue::DateTime(v) => Ok(v),
            FieldValue::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            FieldValue::Time(v) => Ok(Local::now().date_naive().and_time(v)),
            FieldValue::Int(v) => DateTime::from_timestamp(v, 0)
                .map(|v| v.naive_utc())
                .ok_or_else(|| self.mismatch("temporal value", &FieldValue::Int(v))),
            FieldValue::Float(v) => naive_from_timestamp(v)
                .ok_or_else(|| self.mismatch("temporal value", &FieldValue::Float(v))),
            FieldValue::Str(ref text) => parse_temporal_literal(text)
                .ok_or_else(|| self.mismatch("iso date or datetime string", &observed)),
            FieldValue::Words(_) => Err(self.mismatch("temporal value", &observed)),
        }
    }

    fn mismatch(&self, expected: &'static str, found: &FieldValue) -> EvaluationError {
        EvaluationError::TypeMismatch {
            field: self.attribute_name.clone(),
            expected,
            found: found.type_name(),
        }
    }
}

impl Display for AttributeComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.attribute_name,
            self.operator,
            self.value_text(),
            self.value_kind()
        )
    }
}

fn coerce_literal(literal: &str, kind: ValueKind) -> Result<ComparisonValue, DefinitionError> {
    let bad = || DefinitionError::BadLiteral {
        literal: literal.to_owned(),
        kind: kind.as_str().to_owned(),
    };
    Ok(match kind {
        ValueKind::Str => ComparisonValue::Str(literal.to_owned()),
        ValueKind::Int => ComparisonValue::Int(literal.trim().parse().map_err(|_| bad())?),
        ValueKind::Float => ComparisonValue::Float(literal.trim().parse().map_err(|_| bad())?),
        ValueKind::Date => {
            ComparisonValue::Date(parse_temporal_literal(literal).ok_or_else(bad)?.date())
        }
        ValueKind::Time => ComparisonValue::Time(parse_time_literal(literal).ok_or_else(bad)?),
        ValueKind::DateTime => {
            ComparisonValue::DateTime(parse_temporal_literal(literal).ok_or_else(bad)?)
        }
    })
}

/// Parses a temporal literal: a unix timestamp, a full ISO-8601 datetime, or
/// a date-only ISO form interpreted at midnight.
fn parse_temporal_literal(literal: &str) -> Option<NaiveDateTime> {
    let trimmed = literal.trim();
    if is_unix_timestamp(trimmed) {
        return naive_from_timestamp(trimmed.parse().ok()?);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Clock times additionally accept their own bare form so that a serialized
/// time literal parses back to the value it was written from.
fn parse_time_literal(literal: &str) -> Option<NaiveTime> {
    let trimmed = literal.trim();
    for format in ["%H:%M:%S%.f", "%H:%M"] {
        if let Ok(parsed) = NaiveTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    parse_temporal_literal(trimmed).map(|v| v.time())
}

fn is_unix_timestamp(text: &str) -> bool {
    !text.is_empty() && text.replacen('.', "", 1).chars().all(|c| c.is_ascii_digit())
}

fn naive_from_timestamp(seconds: f64) -> Option<NaiveDateTime> {
    let whole = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos).map(|v| v.naive_utc())
}
