//! Domain objects produced by factories
//!
//! The builder never knows the concrete type of what it constructs. It talks
//! to built objects through [`BuildTarget`], which covers property writes,
//! collection access and named-method invocation.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{anyhow, bail};
use indexmap::IndexMap;

use crate::error::{BuildError, Result};
use crate::value::Value;

/// Shared, mutable handle to a built object
pub type ObjectRef = Rc<RefCell<dyn BuildTarget>>;

/// Wrap a target into an [`ObjectRef`]
pub fn object<T: BuildTarget + 'static>(target: T) -> ObjectRef {
    Rc::new(RefCell::new(target))
}

/// Shape hint passed when asking an object for one of its collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Map,
}

/// Mutable view of a collection owned by a domain object
pub enum CollectionMut<'a> {
    List(&'a mut Vec<Value>),
    Map(&'a mut IndexMap<String, Value>),
}

/// Capabilities the builder needs from a constructed object
pub trait BuildTarget: fmt::Debug {
    /// Name used in messages and JSON cycle markers
    fn type_name(&self) -> &str;

    fn set_property(&mut self, name: &str, value: Value) -> anyhow::Result<()>;

    fn property(&self, name: &str) -> Option<Value>;

    /// Collection held under `name`, if the object has one of that kind
    fn collection(&mut self, _name: &str, _kind: CollectionKind) -> Option<CollectionMut<'_>> {
        None
    }

    /// Invoke a named method, used by string-valued `add` hooks
    fn invoke(&mut self, method: &str, _args: Vec<Value>) -> anyhow::Result<Value> {
        bail!("{} has no method '{}'", self.type_name(), method)
    }

    /// Snapshot of all properties, in insertion order
    fn properties(&self) -> Vec<(String, Value)>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// GenericNode
// ============================================================================

/// Default build target: a named bag of properties
///
/// Collections are created lazily the first time the builder asks for them,
/// shaped by the requested [`CollectionKind`].
#[derive(Debug, Clone, Default)]
pub struct GenericNode {
    pub name: String,
    pub properties: IndexMap<String, Value>,
}

impl GenericNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

impl BuildTarget for GenericNode {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn set_property(&mut self, name: &str, value: Value) -> anyhow::Result<()> {
        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    fn collection(&mut self, name: &str, kind: CollectionKind) -> Option<CollectionMut<'_>> {
        let slot = self.properties.entry(name.to_string()).or_insert_with(|| match kind {
            CollectionKind::List => Value::List(Vec::new()),
            CollectionKind::Map => Value::Map(IndexMap::new()),
        });
        match slot {
            Value::List(items) => Some(CollectionMut::List(items)),
            Value::Map(map) => Some(CollectionMut::Map(map)),
            _ => None,
        }
    }

    fn invoke(&mut self, method: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let (collection, argc) = match method.strip_prefix("add") {
            Some(rest) if !rest.is_empty() => (lower_first(rest), args.len()),
            _ => bail!("{} has no method '{}'", self.name, method),
        };
        let name = self.name.clone();
        let shape = if argc == 2 {
            CollectionKind::Map
        } else {
            CollectionKind::List
        };
        let mut args = args.into_iter();
        match self.collection(&collection, shape) {
            Some(CollectionMut::List(items)) if argc == 1 => {
                items.extend(args);
                Ok(Value::Null)
            }
            Some(CollectionMut::Map(map)) if argc == 2 => {
                let key = args
                    .next()
                    .and_then(|k| k.to_key())
                    .ok_or_else(|| anyhow!("{}.{}: key must be a string", name, method))?;
                map.insert(key, args.next().unwrap_or(Value::Null));
                Ok(Value::Null)
            }
            _ => bail!("{}.{}: unsupported arguments", name, method),
        }
    }

    fn properties(&self) -> Vec<(String, Value)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

type Constructor = Rc<dyn Fn() -> ObjectRef>;

/// Maps type names (the string form of `factory`) to constructors
#[derive(Clone, Default)]
pub struct TypeRegistry {
    constructors: HashMap<String, Constructor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type constructible through `Default`
    pub fn register<T: BuildTarget + Default + 'static>(&mut self, name: impl Into<String>) {
        self.register_with(name, || object(T::default()));
    }

    pub fn register_with(&mut self, name: impl Into<String>, ctor: impl Fn() -> ObjectRef + 'static) {
        self.constructors.insert(name.into(), Rc::new(ctor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn create(&self, name: &str) -> Result<ObjectRef> {
        self.constructors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| BuildError::ClassNameNotFound {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_node_lazy_collections() {
        let mut node = GenericNode::new("customer");
        match node.collection("tags", CollectionKind::List) {
            Some(CollectionMut::List(items)) => items.push("vip".into()),
            _ => panic!("expected list"),
        }
        match node.collection("attrs", CollectionKind::Map) {
            Some(CollectionMut::Map(map)) => {
                map.insert("k".into(), Value::Int(1));
            }
            _ => panic!("expected map"),
        }
        assert_eq!(node.get("tags"), Some(&Value::List(vec!["vip".into()])));
        assert_eq!(node.properties().len(), 2);
    }

    #[test]
    fn test_generic_node_scalar_is_not_a_collection() {
        let mut node = GenericNode::new("n");
        node.set_property("x", Value::Int(1)).unwrap();
        assert!(node.collection("x", CollectionKind::List).is_none());
    }

    #[test]
    fn test_generic_node_add_methods() {
        let mut node = GenericNode::new("n");
        node.invoke("addItems", vec![Value::Int(1)]).unwrap();
        node.invoke("addLookup", vec!["a".into(), Value::Int(2)]).unwrap();
        assert_eq!(node.get("items"), Some(&Value::List(vec![Value::Int(1)])));
        assert!(node.invoke("explode", vec![]).is_err());
    }

    #[test]
    fn test_type_registry() {
        let mut types = TypeRegistry::new();
        types.register::<GenericNode>("Generic");
        assert!(types.contains("Generic"));
        assert!(types.create("Generic").is_ok());
        let err = types.create("Missing").unwrap_err();
        assert_eq!(err.to_string(), "Class name not found: Missing");
    }
}
