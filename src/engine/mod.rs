//! The condition engine. Labels describe when they apply through trees of
//! attribute comparisons combined with and/or groups, and this module owns
//! building those trees, evaluating them against observations and moving them
//! to and from their persisted json form.
//!
//! The engine never looks at a concrete observation type. Everything it
//! evaluates goes through the [FieldSource] capability.

pub mod comparison;
pub mod error;
pub mod field;
pub mod group;
pub mod serial;

pub use comparison::{AttributeComparison, CompareOp, ValueKind};
pub use error::{DefinitionError, EvaluationError, SerialError};
pub use field::{FieldSource, FieldValue};
pub use group::{BoolOp, ConditionGroup, ConditionNode};
