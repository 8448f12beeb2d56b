//! Construction calls
//!
//! A [`Call`] is one node of the nested call tree fed to the builder: a name,
//! ordered attributes, an optional positional value and nested calls.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::BuildError;
use crate::value::{Attributes, Value};

/// One construction call and its nested calls
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCall")]
pub struct Call {
    pub name: String,
    pub attributes: Attributes,
    pub value: Option<Value>,
    pub children: Vec<Call>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            value: None,
            children: Vec::new(),
        }
    }

    /// Add an attribute, replacing an earlier one of the same name
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn child(mut self, child: Call) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Call>) -> Self {
        self.children.extend(children);
        self
    }

    /// Parse a call tree from JSON text
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Total number of calls in this tree
    pub fn call_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(call) = stack.pop() {
            count += 1;
            stack.extend(call.children.iter());
        }
        count
    }
}

/// JSON shape of a call before conversion into [`Value`]s
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCall {
    name: String,
    #[serde(default)]
    attributes: IndexMap<String, JsonValue>,
    #[serde(default)]
    value: Option<JsonValue>,
    #[serde(default)]
    children: Vec<RawCall>,
}

impl TryFrom<RawCall> for Call {
    type Error = BuildError;

    fn try_from(raw: RawCall) -> Result<Self, Self::Error> {
        let attributes = raw
            .attributes
            .iter()
            .map(|(k, v)| Ok((k.clone(), Value::from_json(v)?)))
            .collect::<Result<Attributes, BuildError>>()?;
        let value = raw.value.as_ref().map(Value::from_json).transpose()?;
        let children = raw
            .children
            .into_iter()
            .map(Call::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: raw.name,
            attributes,
            value,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::CheckRule;

    #[test]
    fn test_fluent_construction() {
        let call = Call::new("invoice")
            .attr("number", "INV-1")
            .child(Call::new("items").child(Call::new("item").attr("qty", 2)));
        assert_eq!(call.name, "invoice");
        assert_eq!(call.attributes["number"], Value::from("INV-1"));
        assert_eq!(call.children[0].children[0].attributes["qty"], Value::Int(2));
        assert_eq!(call.call_count(), 3);
    }

    #[test]
    fn test_parse_json() {
        let call = Call::from_json_str(
            r#"{
                "name": "item",
                "attributes": {"z": 1, "a": 2.5, "code": {"$pattern": "[A-Z]+"}},
                "value": "x",
                "children": [{"name": "tag"}]
            }"#,
        )
        .unwrap();
        let keys: Vec<&str> = call.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "code"]);
        assert_eq!(call.attributes["a"], Value::Float(2.5));
        match &call.attributes["code"] {
            Value::Check(check) => assert!(matches!(check.rule(), CheckRule::Pattern { .. })),
            other => panic!("expected check, got {:?}", other),
        }
        assert_eq!(call.value, Some(Value::from("x")));
        assert_eq!(call.children[0], Call::new("tag"));
    }

    #[test]
    fn test_null_value_is_absent() {
        let call = Call::from_json_str(r#"{"name": "a", "value": null}"#).unwrap();
        assert_eq!(call.value, None);
    }

    #[test]
    fn test_rejects_bad_pattern_and_unknown_fields() {
        assert!(Call::from_json_str(r#"{"name": "a", "attributes": {"c": {"$pattern": "("}}}"#).is_err());
        assert!(Call::from_json_str(r#"{"name": "a", "kids": []}"#).is_err());
    }
}
