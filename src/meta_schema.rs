//! Built-in schema that validates schema definitions
//!
//! Define mode builds schema nodes the same way build mode builds domain
//! objects, using this schema as the root of every definition:
//!
//! ```text
//! %(factory: define) {
//!     properties { schema(check: null|str|schema)  factory(check: null|str|factory|callable) }
//!     collections {
//!         collections(factory: define) {
//!             %(factory: collection) {
//!                 properties { collection(check: null|str|accessor)  add(..)  key(..) }
//!                 %(schema: <root>)
//!             }
//!         }
//!         properties(factory: define) {
//!             %(schema: <root>) {
//!                 properties { property  req  def  check  min  max }
//!             }
//!         }
//!     }
//! }
//! ```

use std::rc::Rc;

use crate::factory::{CollectionNodeFactory, DefineNodeFactory, Factory, FACTORY_ATTR};
use crate::hooks::Check;
use crate::resolver::SCHEMA_ATTR;
use crate::schema::{SchemaId, SchemaKind, SchemaNode, SchemaStore, COLLECTIONS, PROPERTIES};
use crate::value::{Attributes, Value, ValueKind as K};

fn kinds(kinds: &[K]) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("check".into(), Value::Check(Check::kinds(kinds.to_vec())));
    attrs
}

fn with(name: &str, value: Value) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(name.into(), value);
    attrs
}

fn declare(store: &mut SchemaStore, owner: SchemaId, props: Vec<(&str, Attributes)>) {
    let container = store.add_child(owner, PROPERTIES, SchemaKind::Node, Attributes::new());
    for (name, attrs) in props {
        store.add_child(container, name, SchemaKind::Node, attrs);
    }
}

/// Install the meta-schema into `store`, returning its root
pub fn install(store: &mut SchemaStore, wildcard: &str) -> SchemaId {
    let define: Rc<dyn Factory> = Rc::new(DefineNodeFactory);
    let collection: Rc<dyn Factory> = Rc::new(CollectionNodeFactory);

    let root = store.insert(
        SchemaNode::new(wildcard, SchemaKind::Node)
            .with_attributes(with(FACTORY_ATTR, Value::Factory(Rc::clone(&define)))),
    );
    declare(
        store,
        root,
        vec![
            (SCHEMA_ATTR, kinds(&[K::Null, K::Str, K::Schema])),
            (FACTORY_ATTR, kinds(&[K::Null, K::Str, K::Factory, K::Callable])),
        ],
    );

    let containers = store.add_child(root, COLLECTIONS, SchemaKind::Node, Attributes::new());

    // collections { <name>(collection, add, key) { <element>(...) } }
    let collections = store.add_child(
        containers,
        COLLECTIONS,
        SchemaKind::Node,
        with(FACTORY_ATTR, Value::Factory(Rc::clone(&define))),
    );
    let collection_def = store.add_child(
        collections,
        wildcard,
        SchemaKind::Node,
        with(FACTORY_ATTR, Value::Factory(collection)),
    );
    declare(
        store,
        collection_def,
        vec![
            ("collection", kinds(&[K::Null, K::Str, K::Accessor])),
            ("add", kinds(&[K::Null, K::Str, K::Callable])),
            ("key", kinds(&[K::Null, K::Str, K::Callable])),
        ],
    );
    store.add_child(
        collection_def,
        wildcard,
        SchemaKind::Node,
        with(SCHEMA_ATTR, Value::Schema(root)),
    );

    // properties { <name>(property, req, def, check, min, max) }
    let properties = store.add_child(
        containers,
        PROPERTIES,
        SchemaKind::Node,
        with(FACTORY_ATTR, Value::Factory(define)),
    );
    let property_def = store.add_child(
        properties,
        wildcard,
        SchemaKind::Node,
        with(SCHEMA_ATTR, Value::Schema(root)),
    );
    declare(
        store,
        property_def,
        vec![
            ("property", kinds(&[K::Null, K::Str, K::Callable])),
            ("req", kinds(&[K::Null, K::Bool])),
            ("def", Attributes::new()),
            ("check", Attributes::new()),
            ("min", kinds(&[K::Null, K::Int, K::Float])),
            ("max", kinds(&[K::Null, K::Int, K::Float])),
        ],
    );

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;
    use crate::resolver::{ChildOrigin, Resolver};

    #[test]
    fn test_meta_schema_shape() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let root = install(&mut store, "%");
        let resolver = Resolver::new(&store, &registry, "%");

        let (collections, origin) = resolver.find_child(root, "collections").unwrap().unwrap();
        assert_eq!(origin, ChildOrigin::Collection);
        let (container, origin) = resolver.find_child(collections, "items").unwrap().unwrap();
        assert_eq!(origin, ChildOrigin::Named);
        let (element, _) = resolver.find_child(container, "item").unwrap().unwrap();
        assert!(resolver.find_attribute(element, FACTORY_ATTR).unwrap().is_some());

        let (properties, _) = resolver.find_child(root, "properties").unwrap().unwrap();
        let (property, _) = resolver.find_child(properties, "qty").unwrap().unwrap();
        let merged = resolver.merged_properties(property).unwrap();
        let names: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["schema", "factory", "property", "req", "def", "check", "min", "max"]
        );
    }

    #[test]
    fn test_meta_schema_has_no_wildcard_property() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let root = install(&mut store, "%");
        let resolver = Resolver::new(&store, &registry, "%");
        assert!(resolver.property_decl(root, "bogus").unwrap().is_none());
    }
}
