//! Persisted form of condition trees.
//!
//! Leaves and groups are stored as plain json objects with no explicit type
//! tag. A node containing an `attribute_name` key is a leaf, anything else is
//! a nested group. This shape discrimination is what previously persisted
//! trees rely on, so it stays isolated behind [node_from_value], the single
//! deserialization entry point.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    comparison::AttributeComparison,
    error::SerialError,
    group::{BoolOp, ConditionGroup, ConditionNode},
};

#[derive(Serialize, Deserialize)]
struct RawLeaf {
    attribute_name: String,
    comp_operator: String,
    attribute_value: String,
    #[serde(default = "default_value_type")]
    value_type: String,
}

fn default_value_type() -> String {
    "str".to_owned()
}

#[derive(Serialize, Deserialize)]
struct RawGroup {
    #[serde(default = "default_operator")]
    operator: String,
    #[serde(default)]
    conditions: Vec<Value>,
}

fn default_operator() -> String {
    "and".to_owned()
}

/// Deserializes one node, discriminating leaf from group by shape.
pub fn node_from_value(value: &Value) -> Result<ConditionNode, SerialError> {
    let object = value.as_object().ok_or(SerialError::NotAnObject)?;
    if object.contains_key("attribute_name") {
        Ok(ConditionNode::Comparison(comparison_from_value(value)?))
    } else {
        Ok(ConditionNode::Group(group_from_value(value)?))
    }
}

pub fn comparison_from_value(value: &Value) -> Result<AttributeComparison, SerialError> {
    let raw: RawLeaf = serde_json::from_value(value.clone())?;
    Ok(AttributeComparison::new(
        raw.attribute_name,
        &raw.comp_operator,
        &raw.attribute_value,
        &raw.value_type,
    )?)
}

pub fn group_from_value(value: &Value) -> Result<ConditionGroup, SerialError> {
    let raw: RawGroup = serde_json::from_value(value.clone())?;
    let operator = BoolOp::parse(&raw.operator)?;
    let mut group = ConditionGroup::new(operator);
    for child in &raw.conditions {
        group.add(node_from_value(child)?);
    }
    Ok(group)
}

pub fn group_from_json(text: &str) -> Result<ConditionGroup, SerialError> {
    let value: Value = serde_json::from_str(text)?;
    group_from_value(&value)
}

pub fn node_to_value(node: &ConditionNode) -> Value {
    match node {
        ConditionNode::Comparison(comparison) => comparison_to_value(comparison),
        ConditionNode::Group(group) => group_to_value(group),
    }
}

/// The literal is always written in its string form and re-coerced through
/// the typed parsing logic on the way back in.
pub fn comparison_to_value(comparison: &AttributeComparison) -> Value {
    json!({
        "attribute_name": comparison.attribute_name(),
        "comp_operator": comparison.operator().as_str(),
        "attribute_value": comparison.value_text(),
        "value_type": comparison.value_kind().as_str(),
    })
}

pub fn group_to_value(group: &ConditionGroup) -> Value {
    json!({
        "operator": group.operator().as_str(),
        "conditions": group.children().iter().map(node_to_value).collect::<Vec<_>>(),
    })
}

pub fn group_to_json(group: &ConditionGroup) -> String {
    group_to_value(group).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use crate::engine::{
        comparison::AttributeComparison,
        field::FieldValue,
        group::{BoolOp, ConditionGroup},
    };

    use super::{
        comparison_from_value, comparison_to_value, group_from_json, group_from_value,
        group_to_value, node_from_value,
    };

    fn observation() -> HashMap<String, FieldValue> {
        [
            ("window_type".to_owned(), FieldValue::from("code.exe")),
            ("count".to_owned(), FieldValue::from(7i64)),
            ("ratio".to_owned(), FieldValue::from(0.5f64)),
            (
                "timestamp".to_owned(),
                FieldValue::from("2025-01-16T14:00:00".to_owned()),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn comparison_round_trip_preserves_evaluation() {
        let cases = [
            ("window_type", "==", "Code.EXE", "str"),
            ("window_type", "not in", "chrome", "str"),
            ("count", ">=", "7", "int"),
            ("ratio", "<", "0.75", "float"),
            ("timestamp", ">=", "2025-01-16", "date"),
            ("timestamp", "<=", "15:00:00", "time"),
            ("timestamp", "==", "2025-01-16T14:00:00", "datetime"),
        ];
        let obs = observation();
        for (name, op, literal, kind) in cases {
            let original = AttributeComparison::new(name, op, literal, kind).unwrap();
            let rebuilt = comparison_from_value(&comparison_to_value(&original)).unwrap();
            assert_eq!(original, rebuilt);
            assert_eq!(
                original.evaluate(&obs).unwrap(),
                rebuilt.evaluate(&obs).unwrap(),
                "{name} {op} {literal} ({kind})"
            );
        }
    }

    #[test]
    fn nested_group_round_trip() {
        let mut inner_most = ConditionGroup::new(BoolOp::Or);
        inner_most.add(AttributeComparison::new("count", "<", "10", "int").unwrap());
        inner_most.add(AttributeComparison::new("ratio", ">", "0.9", "float").unwrap());

        let mut inner = ConditionGroup::new(BoolOp::And);
        inner.add(AttributeComparison::new("window_type", "in", "code", "str").unwrap());
        inner.add(inner_most);

        let mut outer = ConditionGroup::new(BoolOp::Or);
        outer.add(AttributeComparison::new("window_type", "==", "chrome.exe", "str").unwrap());
        outer.add(inner);

        let rebuilt = group_from_value(&group_to_value(&outer)).unwrap();
        assert_eq!(outer, rebuilt);
        assert_eq!(
            outer.evaluate(&observation()).unwrap(),
            rebuilt.evaluate(&observation()).unwrap()
        );
    }

    #[test]
    fn leaf_is_discriminated_by_attribute_name_key() {
        let leaf = json!({
            "attribute_name": "window_type",
            "comp_operator": "==",
            "attribute_value": "code.exe",
            "value_type": "str",
        });
        let group = json!({ "operator": "or", "conditions": [leaf] });
        let node = node_from_value(&group).unwrap();
        assert!(matches!(
            node,
            crate::engine::group::ConditionNode::Group(_)
        ));
    }

    #[test]
    fn group_operator_defaults_to_and() {
        let group = group_from_json(r#"{"conditions": []}"#).unwrap();
        assert_eq!(group.operator(), BoolOp::And);
    }

    #[test]
    fn value_type_defaults_to_str() {
        let leaf = json!({
            "attribute_name": "window_type",
            "comp_operator": "==",
            "attribute_value": "code.exe",
        });
        let comparison = comparison_from_value(&leaf).unwrap();
        assert_eq!(comparison.value_kind().as_str(), "str");
    }

    #[test]
    fn malformed_input_is_an_error_not_a_panic() {
        assert!(group_from_json("not json").is_err());
        assert!(node_from_value(&json!("just a string")).is_err());
        // leaf missing its operator key
        assert!(comparison_from_value(&json!({
            "attribute_name": "window_type",
            "attribute_value": "code.exe",
        }))
        .is_err());
        // illegal operator/kind pairing surfaces as a definition error
        assert!(comparison_from_value(&json!({
            "attribute_name": "count",
            "comp_operator": "in",
            "attribute_value": "5",
            "value_type": "int",
        }))
        .is_err());
    }
}
