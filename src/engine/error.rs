use thiserror::Error;

/// Errors raised while defining a comparison or a group. The node is never
/// constructed when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("unknown value kind `{0}`")]
    UnknownValueKind(String),
    #[error("unknown comparison operator `{0}`")]
    UnknownOperator(String),
    #[error("operator `{operator}` is not allowed for `{kind}` comparisons")]
    OperatorNotAllowed { operator: String, kind: String },
    #[error("can't interpret `{literal}` as `{kind}`")]
    BadLiteral { literal: String, kind: String },
    #[error("unknown boolean operator `{0}`")]
    UnknownBoolOperator(String),
}

/// Errors raised while evaluating a condition tree against an observation.
/// These propagate out of group evaluation unchanged, the engine never turns
/// them into a boolean.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("observation has no field `{0}`")]
    MissingAttribute(String),
    #[error("field `{field}` is `{found}`, comparison expects `{expected}`")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised while rebuilding condition trees from their persisted form.
/// A failed load only poisons the tree being parsed, callers are expected to
/// skip it and keep loading.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("condition tree is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("condition node must be a json object")]
    NotAnObject,
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}
