//! Wire types of the classification REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of one class: parameter name → value.
pub type ClassParams = BTreeMap<String, Value>;

/// Class parameters of a group: class name → parameters.
pub type Classes = BTreeMap<String, ClassParams>;

/// A classification group as returned by `GET /groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Value>,
    #[serde(default)]
    pub classes: Classes,
}

impl Group {
    pub fn class_param(&self, class: &str, param: &str) -> Option<&Value> {
        self.classes.get(class)?.get(param)
    }

    /// Nodes pinned into the group: the `["=", "name", <node>]` terms of the rule.
    pub fn pinned_nodes(&self) -> Vec<String> {
        let mut nodes = Vec::new();
        if let Some(rule) = &self.rule {
            collect_pins(rule, &mut nodes);
        }
        nodes
    }

    pub fn is_pinned(&self, subject: &str) -> bool {
        self.pinned_nodes().iter().any(|node| node == subject)
    }
}

fn collect_pins(rule: &Value, out: &mut Vec<String>) {
    let Some(terms) = rule.as_array() else {
        return;
    };
    match terms.first().and_then(Value::as_str) {
        Some("or") => terms[1..].iter().for_each(|term| collect_pins(term, out)),
        Some("=") if terms.len() == 3 && terms[1] == "name" => {
            if let Some(node) = terms[2].as_str() {
                out.push(node.to_string());
            }
        }
        _ => {}
    }
}

/// Body of `POST /groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub environment: String,
    pub parent: String,
    pub rule: Value,
    pub classes: Classes,
}

/// Rule pinning exactly the given nodes.
pub fn pin_rule<I, S>(nodes: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut terms = vec![Value::from("or")];
    terms.extend(nodes.into_iter().map(|node| {
        Value::from(vec![
            Value::from("="),
            Value::from("name"),
            Value::from(node.into()),
        ])
    }));
    Value::Array(terms)
}
