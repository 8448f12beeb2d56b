//! Dynamic values flowing through schemas and built object graphs
//!
//! Attribute values, property values and hook results are all [`Value`]s.
//! Scalar and container variants mirror JSON; the remaining variants carry
//! live references (built objects, schema nodes, hooks, factories).

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::error::{BuildError, Result};
use crate::factory::Factory;
use crate::hooks::{Accessor, Callable, Check};
use crate::schema::SchemaId;
use crate::target::ObjectRef;

/// Ordered attribute map of a call or schema node
pub type Attributes = IndexMap<String, Value>;

/// Key used in JSON input to denote a regular-expression check
pub const PATTERN_KEY: &str = "$pattern";

/// A dynamically typed value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A domain object produced by a factory
    Object(ObjectRef),
    /// A schema node living in a [`SchemaStore`](crate::schema::SchemaStore)
    Schema(SchemaId),
    Callable(Callable),
    Factory(Rc<dyn Factory>),
    Check(Check),
    Accessor(Accessor),
}

/// Variant tag of a [`Value`], used for type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Object,
    Schema,
    Callable,
    Factory,
    Check,
    Accessor,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Object => "object",
            ValueKind::Schema => "schema",
            ValueKind::Callable => "callable",
            ValueKind::Factory => "factory",
            ValueKind::Check => "check",
            ValueKind::Accessor => "accessor",
        };
        f.write_str(s)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Object(_) => ValueKind::Object,
            Value::Schema(_) => ValueKind::Schema,
            Value::Callable(_) => ValueKind::Callable,
            Value::Factory(_) => ValueKind::Factory,
            Value::Check(_) => ValueKind::Check,
            Value::Accessor(_) => ValueKind::Accessor,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `req` and predicate results: only null and false fail
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_schema(&self) -> Option<SchemaId> {
        match self {
            Value::Schema(id) => Some(*id),
            _ => None,
        }
    }

    /// Ordinal used by `min`/`max`: string length, container size or the number itself
    pub fn ordinal(&self) -> Option<f64> {
        match self {
            Value::Str(s) => Some(s.chars().count() as f64),
            Value::List(items) => Some(items.len() as f64),
            Value::Map(m) => Some(m.len() as f64),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form used as a map key
    pub fn to_key(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Render as JSON. Hooks render as descriptive strings and object cycles are cut.
    pub fn to_json(&self) -> JsonValue {
        let mut seen = HashSet::new();
        self.to_json_guarded(&mut seen)
    }

    fn to_json_guarded(&self, seen: &mut HashSet<usize>) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(items) => {
                JsonValue::Array(items.iter().map(|v| v.to_json_guarded(seen)).collect())
            }
            Value::Map(m) => {
                let mut out = JsonMap::new();
                for (k, v) in m {
                    out.insert(k.clone(), v.to_json_guarded(seen));
                }
                JsonValue::Object(out)
            }
            Value::Object(obj) => {
                let addr = Rc::as_ptr(obj) as *const () as usize;
                let Ok(target) = obj.try_borrow() else {
                    return JsonValue::String("<borrowed object>".to_string());
                };
                if !seen.insert(addr) {
                    return JsonValue::String(format!("<cycle: {}>", target.type_name()));
                }
                let mut out = JsonMap::new();
                for (k, v) in target.properties() {
                    out.insert(k, v.to_json_guarded(seen));
                }
                seen.remove(&addr);
                JsonValue::Object(out)
            }
            Value::Schema(id) => JsonValue::String(format!("<schema #{}>", id.index())),
            Value::Callable(c) => JsonValue::String(format!("<callable/{}>", c.arity())),
            Value::Factory(f) => JsonValue::String(format!("<factory {:?}>", f)),
            Value::Check(c) => JsonValue::String(format!("<check {}>", c)),
            Value::Accessor(_) => JsonValue::String("<accessor>".to_string()),
        }
    }

    /// Convert JSON input. `{"$pattern": "..."}` becomes a regex check.
    pub fn from_json(json: &JsonValue) -> Result<Value> {
        Ok(match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(JsonValue::String(pattern)) = obj.get(PATTERN_KEY) {
                        let check = Check::pattern(pattern).map_err(|e| {
                            BuildError::invalid_call(format!("bad pattern '{}': {}", pattern, e))
                        })?;
                        return Ok(Value::Check(check));
                    }
                }
                let mut out = IndexMap::with_capacity(obj.len());
                for (k, v) in obj {
                    out.insert(k.clone(), Value::from_json(v)?);
                }
                Value::Map(out)
            }
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(m) => f.debug_map().entries(m).finish(),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(t) => write!(f, "Object({})", t.type_name()),
                Err(_) => f.write_str("Object(<borrowed>)"),
            },
            Value::Schema(id) => write!(f, "Schema(#{})", id.index()),
            Value::Callable(c) => write!(f, "Callable/{}", c.arity()),
            Value::Factory(x) => write!(f, "Factory({:?})", x),
            Value::Check(c) => write!(f, "Check({})", c),
            Value::Accessor(_) => f.write_str("Accessor"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Schema(a), Value::Schema(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            (Value::Factory(a), Value::Factory(b)) => {
                std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
            }
            (Value::Check(a), Value::Check(b)) => a.ptr_eq(b),
            (Value::Accessor(a), Value::Accessor(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl From<SchemaId> for Value {
    fn from(id: SchemaId) -> Self {
        Value::Schema(id)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

impl From<Check> for Value {
    fn from(c: Check) -> Self {
        Value::Check(c)
    }
}

impl From<Accessor> for Value {
    fn from(a: Accessor) -> Self {
        Value::Accessor(a)
    }
}

impl From<Rc<dyn Factory>> for Value {
    fn from(f: Rc<dyn Factory>) -> Self {
        Value::Factory(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(Value::from("héllo").ordinal(), Some(5.0));
        assert_eq!(Value::List(vec![Value::Null, Value::Null]).ordinal(), Some(2.0));
        assert_eq!(Value::Float(1.5).ordinal(), Some(1.5));
        assert_eq!(Value::Bool(true).ordinal(), None);
    }

    #[test]
    fn test_from_json_pattern_becomes_check() {
        let v = Value::from_json(&json!({"$pattern": "[a-z]+"})).unwrap();
        match v {
            Value::Check(check) => {
                assert!(check.evaluate(&Value::from("abc")).unwrap());
                assert!(!check.evaluate(&Value::from("abc1")).unwrap());
            }
            other => panic!("expected check, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_bad_pattern() {
        let err = Value::from_json(&json!({"$pattern": "("})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidCall);
    }

    #[test]
    fn test_from_json_keeps_map_order() {
        let v = Value::from_json(&json!({"b": 1, "a": [true, null, 2.5]})).unwrap();
        let m = v.as_map().unwrap();
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(v.to_json(), json!({"b": 1, "a": [true, null, 2.5]}));
    }

    #[test]
    fn test_object_json_keeps_property_order() {
        use crate::target::{object, BuildTarget, GenericNode};

        let node = object(GenericNode::new("invoice"));
        {
            let mut target = node.borrow_mut();
            target.set_property("number", Value::from("INV-7")).unwrap();
            target.set_property("amount", Value::Int(3)).unwrap();
        }
        let rendered = serde_json::to_string(&Value::Object(node).to_json()).unwrap();
        assert_eq!(rendered, r#"{"number":"INV-7","amount":3}"#);
    }

    #[test]
    fn test_int_float_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }
}
