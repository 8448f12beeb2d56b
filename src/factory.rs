//! Node factories and factory resolution
//!
//! A factory turns a construction call into a node value. Schemas choose
//! their factory through the `factory` attribute; see [`resolve_factory`]
//! for the precedence rules.

use std::fmt;
use std::rc::Rc;

use anyhow::bail;
use tracing::trace;

use crate::error::{BuildError, Result};
use crate::hooks::Callable;
use crate::registry::SchemaRegistry;
use crate::resolver::Resolver;
use crate::schema::{SchemaId, SchemaKind, SchemaNode, SchemaStore};
use crate::target::{object, GenericNode, TypeRegistry};
use crate::value::{Attributes, Value};

/// Attribute naming a schema's factory
pub const FACTORY_ATTR: &str = "factory";

/// Everything a factory may look at while creating a node
pub struct FactoryContext<'a> {
    /// Name of the construction call
    pub name: &'a str,
    pub value: Option<&'a Value>,
    pub attributes: &'a Attributes,
    /// Schema resolved for the call
    pub schema: SchemaId,
    /// Node of the enclosing frame, possibly a collection placeholder
    pub current: Option<&'a Value>,
    /// Nearest enclosing node that is not a collection placeholder
    pub parent: Option<&'a Value>,
    pub schemas: &'a mut SchemaStore,
    pub types: &'a TypeRegistry,
}

/// Strategy creating the node for a construction call
pub trait Factory: fmt::Debug {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value>;
}

// ============================================================================
// Schema-definition factories
// ============================================================================

fn define_schema(ctx: &mut FactoryContext<'_>, kind: SchemaKind) -> anyhow::Result<Value> {
    if let Some(value) = ctx.value {
        bail!("schema '{}' cannot take a value ({:?})", ctx.name, value);
    }
    let mut node = SchemaNode::new(ctx.name, kind);
    node.parent = ctx.current.and_then(Value::as_schema);
    Ok(Value::Schema(ctx.schemas.insert(node)))
}

/// Creates a schema node under the current schema node
#[derive(Debug, Default)]
pub struct DefineNodeFactory;

impl Factory for DefineNodeFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        define_schema(ctx, SchemaKind::Node)
    }
}

/// Creates a collection schema node under the current schema node
#[derive(Debug, Default)]
pub struct CollectionNodeFactory;

impl Factory for CollectionNodeFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        define_schema(ctx, SchemaKind::Collection)
    }
}

// ============================================================================
// Build factories
// ============================================================================

/// Default build factory producing a [`GenericNode`]
///
/// A call value, if any, is stored under the `value` property.
#[derive(Debug, Default)]
pub struct NodeFactory;

impl Factory for NodeFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        if let Some(Value::Object(existing)) = ctx.value {
            return Ok(Value::Object(Rc::clone(existing)));
        }
        let mut node = GenericNode::new(ctx.name);
        if let Some(value) = ctx.value {
            node.properties.insert("value".to_string(), value.clone());
        }
        Ok(Value::Object(object(node)))
    }
}

/// Stand-in node for a collection container
///
/// The placeholder is the collection schema itself; children built inside it
/// are attached to the enclosing object by the collection strategy.
#[derive(Debug, Default)]
pub struct CollectionPlaceholderFactory;

impl Factory for CollectionPlaceholderFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        if ctx.value.is_some() {
            return Err(BuildError::collection(
                ctx.name,
                "collections may not be specified with a value, use a property instead",
            )
            .into());
        }
        Ok(Value::Schema(ctx.schema))
    }
}

/// Always yields the same value
#[derive(Debug)]
pub struct InstanceFactory(pub Value);

impl Factory for InstanceFactory {
    fn new_instance(&self, _ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

/// Instantiates a registered type by name
#[derive(Debug)]
pub struct TypeFactory {
    pub type_name: String,
}

impl Factory for TypeFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        Ok(Value::Object(ctx.types.create(&self.type_name)?))
    }
}

/// Adapts a callable to the factory protocol by arity
///
/// | arity | arguments                      |
/// |-------|--------------------------------|
/// | 0     | none                           |
/// | 1     | name                           |
/// | 2     | name, value                    |
/// | 3     | name, value, attributes as map |
#[derive(Debug, Clone)]
pub struct CallableFactory(pub Callable);

impl Factory for CallableFactory {
    fn new_instance(&self, ctx: &mut FactoryContext<'_>) -> anyhow::Result<Value> {
        let name = Value::from(ctx.name);
        let value = ctx.value.cloned().unwrap_or(Value::Null);
        let args = match self.0.arity() {
            0 => vec![],
            1 => vec![name],
            2 => vec![name, value],
            _ => vec![name, value, Value::Map(ctx.attributes.clone())],
        };
        self.0.call(args)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Factories the engine falls back on
#[derive(Debug, Clone)]
pub struct DefaultFactories {
    /// Used when a schema names no factory
    pub fallback: Rc<dyn Factory>,
    /// Used for collection schemas, which act as their own factory
    pub collection: Rc<dyn Factory>,
}

/// Resolve the factory for a call matched to `schema`
///
/// Precedence: a collection schema is its own factory, then a `factory`
/// attribute (searched along the inheritance chain) holding a factory, a
/// callable (wrapped and cached back onto `schema`) or a registered type
/// name, and finally the mode's fallback.
pub fn resolve_factory(
    store: &mut SchemaStore,
    registry: &SchemaRegistry,
    wildcard: &str,
    types: &TypeRegistry,
    schema: SchemaId,
    name: &str,
    defaults: &DefaultFactories,
) -> Result<Rc<dyn Factory>> {
    if store.get(schema).kind == SchemaKind::Collection {
        trace!(name, "Collection schema acts as factory");
        return Ok(Rc::clone(&defaults.collection));
    }

    let attribute = Resolver::new(store, registry, wildcard).find_attribute(schema, FACTORY_ATTR)?;
    match attribute {
        None => {
            trace!(name, "Using fallback factory");
            Ok(Rc::clone(&defaults.fallback))
        }
        Some(Value::Factory(factory)) => Ok(factory),
        Some(Value::Callable(callable)) => {
            let adapter: Rc<dyn Factory> = Rc::new(CallableFactory(callable));
            store.set_attribute(schema, FACTORY_ATTR, Value::Factory(Rc::clone(&adapter)));
            trace!(name, "Wrapped callable factory");
            Ok(adapter)
        }
        Some(Value::Str(type_name)) => {
            if !types.contains(&type_name) {
                return Err(BuildError::ClassNameNotFound { name: type_name });
            }
            Ok(Rc::new(TypeFactory { type_name }))
        }
        Some(other) => Err(BuildError::factory(
            name,
            format!("unsupported factory attribute of kind {}", other.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn defaults() -> DefaultFactories {
        DefaultFactories {
            fallback: Rc::new(NodeFactory),
            collection: Rc::new(CollectionPlaceholderFactory),
        }
    }

    fn context<'a>(
        store: &'a mut SchemaStore,
        types: &'a TypeRegistry,
        attributes: &'a Attributes,
        schema: SchemaId,
        value: Option<&'a Value>,
    ) -> FactoryContext<'a> {
        FactoryContext {
            name: "foo",
            value,
            attributes,
            schema,
            current: None,
            parent: None,
            schemas: store,
            types,
        }
    }

    #[test]
    fn test_callable_factory_by_arity() {
        let mut store = SchemaStore::new();
        let schema = store.insert(SchemaNode::new("foo", SchemaKind::Node));
        let types = TypeRegistry::new();
        let attrs = Attributes::new();
        let five = Value::Int(5);

        let doubler = CallableFactory(Callable::new2(|_name, value| {
            Ok(Value::Int(value.as_i64().unwrap_or(0) * 2))
        }));
        let mut ctx = context(&mut store, &types, &attrs, schema, Some(&five));
        assert_eq!(doubler.new_instance(&mut ctx).unwrap(), Value::Int(10));

        let namer = CallableFactory(Callable::new1(Ok));
        assert_eq!(namer.new_instance(&mut ctx).unwrap(), Value::from("foo"));
    }

    #[test]
    fn test_resolution_caches_wrapped_callable() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let types = TypeRegistry::new();
        let schema = store.insert(SchemaNode::new("foo", SchemaKind::Node));
        store.set_attribute(schema, FACTORY_ATTR, Value::Callable(Callable::new0(|| Ok(Value::Null))));

        let first = resolve_factory(&mut store, &registry, "%", &types, schema, "foo", &defaults()).unwrap();
        assert!(matches!(store.attribute(schema, FACTORY_ATTR), Some(Value::Factory(_))));
        let second = resolve_factory(&mut store, &registry, "%", &types, schema, "foo", &defaults()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolution_type_name() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let mut types = TypeRegistry::new();
        types.register::<GenericNode>("Generic");
        let schema = store.insert(SchemaNode::new("foo", SchemaKind::Node));

        store.set_attribute(schema, FACTORY_ATTR, "Generic".into());
        assert!(resolve_factory(&mut store, &registry, "%", &types, schema, "foo", &defaults()).is_ok());

        store.set_attribute(schema, FACTORY_ATTR, "Missing".into());
        let err = resolve_factory(&mut store, &registry, "%", &types, schema, "foo", &defaults())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassNameNotFound);

        store.set_attribute(schema, FACTORY_ATTR, Value::Int(3));
        let err = resolve_factory(&mut store, &registry, "%", &types, schema, "foo", &defaults())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Factory);
    }

    #[test]
    fn test_collection_schema_is_its_own_factory() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let types = TypeRegistry::new();
        let schema = store.insert(SchemaNode::new("items", SchemaKind::Collection));
        let factory = resolve_factory(&mut store, &registry, "%", &types, schema, "items", &defaults())
            .unwrap();
        let attrs = Attributes::new();
        let mut ctx = context(&mut store, &types, &attrs, schema, None);
        assert_eq!(factory.new_instance(&mut ctx).unwrap(), Value::Schema(schema));

        let value = Value::Int(1);
        let mut ctx = context(&mut store, &types, &attrs, schema, Some(&value));
        let err = factory.new_instance(&mut ctx).unwrap_err();
        let err = BuildError::from_hook(err, |m| BuildError::factory("items", m));
        assert_eq!(err.kind(), ErrorKind::Collection);
    }

    #[test]
    fn test_define_factory_links_parent() {
        let mut store = SchemaStore::new();
        let types = TypeRegistry::new();
        let parent = store.insert(SchemaNode::new("invoice", SchemaKind::Node));
        let attrs = Attributes::new();
        let current = Value::Schema(parent);
        let mut ctx = context(&mut store, &types, &attrs, parent, None);
        ctx.current = Some(&current);
        let created = CollectionNodeFactory.new_instance(&mut ctx).unwrap();
        let id = created.as_schema().unwrap();
        assert_eq!(store.get(id).parent, Some(parent));
        assert!(store.get(id).is_collection());
    }
}
