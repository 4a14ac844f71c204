use std::fmt::{self, Display};

use super::{
    comparison::AttributeComparison,
    error::{DefinitionError, EvaluationError},
    field::FieldSource,
};

/// Boolean combinator for a group's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    /// Case-insensitive parse, stored normalized.
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        match text.to_lowercase().as_str() {
            "and" => Ok(BoolOp::And),
            "or" => Ok(BoolOp::Or),
            other => Err(DefinitionError::UnknownBoolOperator(other.to_owned())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

impl Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a condition tree. Groups may nest arbitrarily deep, the child
/// type is closed so a group can only ever contain comparisons and groups.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Comparison(AttributeComparison),
    Group(ConditionGroup),
}

impl ConditionNode {
    pub fn evaluate(&self, observation: &dyn FieldSource) -> Result<bool, EvaluationError> {
        match self {
            ConditionNode::Comparison(comparison) => comparison.evaluate(observation),
            ConditionNode::Group(group) => group.evaluate(observation),
        }
    }
}

impl From<AttributeComparison> for ConditionNode {
    fn from(value: AttributeComparison) -> Self {
        ConditionNode::Comparison(value)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(value: ConditionGroup) -> Self {
        ConditionNode::Group(value)
    }
}

/// An ordered collection of children combined under one boolean operator.
/// Children are owned exclusively, a node belongs to exactly one group.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    operator: BoolOp,
    children: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn new(operator: BoolOp) -> Self {
        Self {
            operator,
            children: Vec::new(),
        }
    }

    pub fn with_children(
        operator: BoolOp,
        children: impl IntoIterator<Item = ConditionNode>,
    ) -> Self {
        Self {
            operator,
            children: children.into_iter().collect(),
        }
    }

    pub fn operator(&self) -> BoolOp {
        self.operator
    }

    pub fn children(&self) -> &[ConditionNode] {
        &self.children
    }

    /// Appends one child. Exclusive access through `&mut self` gives the
    /// append the atomicity the rest of the tree gets from being immutable.
    pub fn add(&mut self, child: impl Into<ConditionNode>) {
        self.children.push(child.into());
    }

    /// Evaluates every child in insertion order and folds the results with
    /// the group operator. Children are all evaluated, there is no boolean
    /// short-circuit, so the first failing child's error always surfaces.
    ///
    /// An empty `and` group is vacuously true, an empty `or` group is
    /// vacuously false.
    pub fn evaluate(&self, observation: &dyn FieldSource) -> Result<bool, EvaluationError> {
        let mut results = Vec::with_capacity(self.children.len());
        for child in &self.children {
            results.push(child.evaluate(observation)?);
        }
        Ok(match self.operator {
            BoolOp::And => results.iter().all(|v| *v),
            BoolOp::Or => results.iter().any(|v| *v),
        })
    }
}

impl Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, child) in self.children.iter().enumerate() {
            if index > 0 {
                write!(f, " {} ", self.operator.as_str().to_uppercase())?;
            }
            match child {
                ConditionNode::Comparison(comparison) => write!(f, "{comparison}")?,
                ConditionNode::Group(group) => write!(f, "{group}")?,
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::engine::{
        comparison::AttributeComparison, error::EvaluationError, field::FieldValue,
    };

    use super::{BoolOp, ConditionGroup, ConditionNode};

    fn observation() -> HashMap<String, FieldValue> {
        [
            ("window_type".to_owned(), FieldValue::from("code.exe")),
            ("window_title".to_owned(), FieldValue::from("main.py - Code")),
            (
                "window_text_words".to_owned(),
                FieldValue::from(vec![
                    "main".to_owned(),
                    "python".to_owned(),
                    "file".to_owned(),
                ]),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn leaf(name: &str, op: &str, value: &str) -> ConditionNode {
        AttributeComparison::new(name, op, value, "str")
            .unwrap()
            .into()
    }

    // Against the observation above these evaluate to (true, false, true).
    fn three_leaves() -> Vec<ConditionNode> {
        vec![
            leaf("window_type", "==", "code.exe"),
            leaf("window_type", "==", "chrome.exe"),
            leaf("window_text_words", "in", "python"),
        ]
    }

    #[test]
    fn and_requires_all_children() {
        let group = ConditionGroup::with_children(BoolOp::And, three_leaves());
        assert!(!group.evaluate(&observation()).unwrap());
    }

    #[test]
    fn or_requires_any_child() {
        let group = ConditionGroup::with_children(BoolOp::Or, three_leaves());
        assert!(group.evaluate(&observation()).unwrap());
    }

    #[test]
    fn nested_groups_evaluate_recursively() {
        // AND(true, OR(false, true)) => true
        let inner = ConditionGroup::with_children(
            BoolOp::Or,
            vec![
                leaf("window_type", "==", "chrome.exe"),
                leaf("window_text_words", "in", "python"),
            ],
        );
        let mut outer = ConditionGroup::new(BoolOp::And);
        outer.add(
            AttributeComparison::new("window_type", "==", "code.exe", "str").unwrap(),
        );
        outer.add(inner);
        assert!(outer.evaluate(&observation()).unwrap());
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let empty_and = ConditionGroup::new(BoolOp::And);
        let empty_or = ConditionGroup::new(BoolOp::Or);
        assert!(empty_and.evaluate(&observation()).unwrap());
        assert!(!empty_or.evaluate(&observation()).unwrap());
    }

    #[test]
    fn child_errors_propagate_unchanged() {
        let group = ConditionGroup::with_children(
            BoolOp::Or,
            vec![
                leaf("window_type", "==", "code.exe"),
                leaf("no_such_field", "==", "anything"),
            ],
        );
        assert_eq!(
            group.evaluate(&observation()),
            Err(EvaluationError::MissingAttribute("no_such_field".to_owned()))
        );
    }

    #[test]
    fn bool_operator_parse_is_case_insensitive() {
        assert_eq!(BoolOp::parse("AND").unwrap(), BoolOp::And);
        assert_eq!(BoolOp::parse("Or").unwrap(), BoolOp::Or);
        assert!(BoolOp::parse("xor").is_err());
    }
}
