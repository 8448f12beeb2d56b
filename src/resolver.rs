//! Schema resolution
//!
//! Child lookup, inherited attribute lookup and property merging. Inheritance
//! is expressed by a node's `schema` attribute, either a registered name or a
//! direct [`SchemaId`]; chains are walked iteratively and cycles are reported
//! as [`BuildError::InheritanceCycle`].

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{BuildError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::{
    MergedProperties, PropertyDecl, SchemaId, SchemaKind, SchemaStore, COLLECTIONS, PROPERTIES,
};
use crate::value::Value;

/// Attribute holding a node's inheritance reference
pub const SCHEMA_ATTR: &str = "schema";

/// Where a child schema was found relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOrigin {
    /// Declared in a `properties` container
    Property,
    /// Declared in a `collections` container
    Collection,
    /// A directly named (or wildcard) child node
    Named,
}

/// Read-only view over a schema arena and its registry
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a SchemaStore,
    registry: &'a SchemaRegistry,
    wildcard: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a SchemaStore, registry: &'a SchemaRegistry, wildcard: &'a str) -> Self {
        Self {
            store,
            registry,
            wildcard,
        }
    }

    pub fn store(&self) -> &'a SchemaStore {
        self.store
    }

    pub fn wildcard(&self) -> &'a str {
        self.wildcard
    }

    /// Resolve an inheritance reference value
    pub fn resolve_ref(&self, reference: &Value) -> Result<Option<SchemaId>> {
        match reference {
            Value::Null => Ok(None),
            Value::Schema(id) => Ok(Some(*id)),
            Value::Str(name) => self.registry.require(name).map(Some),
            other => Err(BuildError::property(
                SCHEMA_ATTR,
                format!("cannot reference a schema with a {} value", other.kind()),
            )),
        }
    }

    /// Schema referenced by `id`'s `schema` attribute
    pub fn extends(&self, id: SchemaId) -> Result<Option<SchemaId>> {
        match self.store.attribute(id, SCHEMA_ATTR) {
            Some(reference) => self.resolve_ref(reference),
            None => Ok(None),
        }
    }

    /// `id` followed by every schema it inherits from, nearest first
    pub fn chain(&self, id: SchemaId) -> Result<Vec<SchemaId>> {
        let mut chain = vec![id];
        let mut seen = HashSet::from([id]);
        let mut cursor = id;
        while let Some(next) = self.extends(cursor)? {
            if !seen.insert(next) {
                chain.push(next);
                let names: Vec<String> = chain.iter().map(|s| self.store.path(*s)).collect();
                return Err(BuildError::InheritanceCycle {
                    chain: names.join(" -> "),
                });
            }
            chain.push(next);
            cursor = next;
        }
        Ok(chain)
    }

    /// First non-null `name` attribute along the inheritance chain
    pub fn find_attribute(&self, id: SchemaId, name: &str) -> Result<Option<Value>> {
        for schema in self.chain(id)? {
            if let Some(value) = self.store.attribute(schema, name).filter(|v| !v.is_null()) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    /// Find `name` (or the wildcard) inside `container` of `parent` or its ancestors
    pub fn find_schema(
        &self,
        parent: SchemaId,
        container: &str,
        name: &str,
    ) -> Result<Option<SchemaId>> {
        for schema in self.chain(parent)? {
            let Some(holder) = self.store.child_named(schema, container) else {
                continue;
            };
            let found = self
                .store
                .child_named(holder, name)
                .or_else(|| self.store.child_named(holder, self.wildcard));
            if let Some(found) = found {
                trace!(
                    parent = %self.store.path(parent),
                    container,
                    name,
                    found = %self.store.path(found),
                    "Resolved child schema"
                );
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Resolve the schema for a child call named `name` under `parent`
    ///
    /// Properties win over collections, which win over directly named
    /// children; a wildcard only matches after the exact name failed.
    pub fn find_child(&self, parent: SchemaId, name: &str) -> Result<Option<(SchemaId, ChildOrigin)>> {
        if let Some(found) = self.find_schema(parent, PROPERTIES, name)? {
            return Ok(Some((found, ChildOrigin::Property)));
        }
        if let Some(found) = self.find_schema(parent, COLLECTIONS, name)? {
            return Ok(Some((found, ChildOrigin::Collection)));
        }
        let named = self
            .store
            .child_named(parent, name)
            .or_else(|| self.store.child_named(parent, self.wildcard));
        Ok(named.map(|found| (found, ChildOrigin::Named)))
    }

    /// Child names a call under `parent` could use, for suggestions
    pub fn child_names(&self, parent: SchemaId) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for schema in self.chain(parent)? {
            for container in [PROPERTIES, COLLECTIONS] {
                if let Some(holder) = self.store.child_named(schema, container) {
                    names.extend(
                        self.store
                            .children(holder)
                            .iter()
                            .map(|c| self.store.name(*c).to_string()),
                    );
                }
            }
        }
        names.extend(
            self.store
                .children(parent)
                .iter()
                .map(|c| self.store.name(*c).to_string())
                .filter(|n| n != PROPERTIES && n != COLLECTIONS),
        );
        names.retain(|n| n != self.wildcard);
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn is_collection(&self, id: SchemaId) -> bool {
        self.store.get(id).kind == SchemaKind::Collection
    }

    /// Effective property declarations of `id`, cached until the arena changes
    pub fn merged_properties(&self, id: SchemaId) -> Result<Rc<MergedProperties>> {
        if let Some(cached) = self.store.cached_properties(id) {
            trace!(schema = %self.store.path(id), "Merged properties cache hit");
            return Ok(cached);
        }

        let chain = self.chain(id)?;
        let mut merged = MergedProperties::new();
        for schema in chain.iter().rev() {
            let Some(container) = self.store.child_named(*schema, PROPERTIES) else {
                continue;
            };
            // Redeclaring a name within one container replaces it outright
            let mut local: IndexMap<&str, SchemaId> = IndexMap::new();
            for child in self.store.children(container) {
                local.insert(self.store.name(*child), *child);
            }
            for (name, decl_id) in local {
                let attributes = &self.store.get(decl_id).attributes;
                match merged.get_mut(name) {
                    Some(existing) => {
                        existing.declared_by = decl_id;
                        for (k, v) in attributes {
                            existing.attributes.insert(k.clone(), v.clone());
                        }
                    }
                    None => {
                        merged.insert(
                            name.to_string(),
                            PropertyDecl {
                                name: name.to_string(),
                                declared_by: decl_id,
                                attributes: attributes.clone(),
                            },
                        );
                    }
                }
            }
        }

        let merged = Rc::new(merged);
        self.store.cache_properties(id, Rc::clone(&merged));
        Ok(merged)
    }

    /// Declaration governing property `name`, falling back to the wildcard
    pub fn property_decl(&self, id: SchemaId, name: &str) -> Result<Option<PropertyDecl>> {
        let merged = self.merged_properties(id)?;
        Ok(merged
            .get(name)
            .or_else(|| merged.get(self.wildcard))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::Attributes;
    use crate::schema::SchemaNode;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn declare(store: &mut SchemaStore, root: SchemaId, props: &[(&str, Attributes)]) {
        let container = store.add_child(root, PROPERTIES, SchemaKind::Node, Attributes::new());
        for (name, a) in props {
            store.add_child(container, *name, SchemaKind::Node, a.clone());
        }
    }

    #[test]
    fn test_merge_by_attribute_key() {
        let mut store = SchemaStore::new();
        let mut registry = SchemaRegistry::new();

        let base = store.insert(SchemaNode::new("base", SchemaKind::Node));
        declare(
            &mut store,
            base,
            &[(
                "code",
                attrs(&[("req", Value::Bool(true)), ("def", "X".into())]),
            )],
        );
        registry.add_schema("base", base);

        let derived = store.insert(
            SchemaNode::new("derived", SchemaKind::Node)
                .with_attributes(attrs(&[(SCHEMA_ATTR, "base".into())])),
        );
        declare(
            &mut store,
            derived,
            &[("code", attrs(&[("check", Value::List(vec!["X".into()]))]))],
        );

        let resolver = Resolver::new(&store, &registry, "%");
        let merged = resolver.merged_properties(derived).unwrap();
        let code = &merged["code"];
        assert!(code.is_required());
        assert_eq!(code.attribute("def"), Some(&Value::from("X")));
        assert!(code.attribute("check").is_some());
    }

    #[test]
    fn test_last_declaration_wins_within_container() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let root = store.insert(SchemaNode::new("p", SchemaKind::Node));
        declare(
            &mut store,
            root,
            &[
                ("qty", attrs(&[("req", Value::Bool(true))])),
                ("qty", attrs(&[("def", Value::Int(1))])),
            ],
        );
        let resolver = Resolver::new(&store, &registry, "%");
        let decl = resolver.property_decl(root, "qty").unwrap().unwrap();
        assert!(!decl.is_required());
        assert_eq!(decl.attribute("def"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_find_schema_prefers_local_then_inherited() {
        let mut store = SchemaStore::new();
        let mut registry = SchemaRegistry::new();
        let base = store.insert(SchemaNode::new("base", SchemaKind::Node));
        declare(&mut store, base, &[("a", Attributes::new()), ("b", Attributes::new())]);
        registry.add_schema("base", base);
        let derived = store.insert(
            SchemaNode::new("derived", SchemaKind::Node)
                .with_attributes(attrs(&[(SCHEMA_ATTR, "base".into())])),
        );
        declare(&mut store, derived, &[("a", Attributes::new())]);

        let resolver = Resolver::new(&store, &registry, "%");
        let a = resolver.find_schema(derived, PROPERTIES, "a").unwrap().unwrap();
        let b = resolver.find_schema(derived, PROPERTIES, "b").unwrap().unwrap();
        assert_eq!(store.path(a), "derived.properties.a");
        assert_eq!(store.path(b), "base.properties.b");
        assert!(resolver.find_schema(derived, PROPERTIES, "c").unwrap().is_none());
    }

    #[test]
    fn test_wildcard_is_fallback() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let root = store.insert(SchemaNode::new("p", SchemaKind::Node));
        declare(&mut store, root, &[("%", Attributes::new()), ("x", Attributes::new())]);
        let resolver = Resolver::new(&store, &registry, "%");
        let (x, origin) = resolver.find_child(root, "x").unwrap().unwrap();
        assert_eq!(store.name(x), "x");
        assert_eq!(origin, ChildOrigin::Property);
        let (any, _) = resolver.find_child(root, "anything").unwrap().unwrap();
        assert_eq!(store.name(any), "%");
    }

    #[test]
    fn test_find_attribute_walks_chain() {
        let mut store = SchemaStore::new();
        let mut registry = SchemaRegistry::new();
        let base = store.insert(
            SchemaNode::new("base", SchemaKind::Node)
                .with_attributes(attrs(&[("factory", "Thing".into())])),
        );
        registry.add_schema("base", base);
        let derived = store.insert(
            SchemaNode::new("derived", SchemaKind::Node)
                .with_attributes(attrs(&[(SCHEMA_ATTR, Value::Schema(base))])),
        );
        let resolver = Resolver::new(&store, &registry, "%");
        assert_eq!(
            resolver.find_attribute(derived, "factory").unwrap(),
            Some(Value::from("Thing"))
        );
        assert_eq!(resolver.find_attribute(derived, "missing").unwrap(), None);
    }

    #[test]
    fn test_cycle_detected() {
        let mut store = SchemaStore::new();
        let mut registry = SchemaRegistry::new();
        let a = store.insert(
            SchemaNode::new("a", SchemaKind::Node).with_attributes(attrs(&[(SCHEMA_ATTR, "b".into())])),
        );
        let b = store.insert(
            SchemaNode::new("b", SchemaKind::Node).with_attributes(attrs(&[(SCHEMA_ATTR, "a".into())])),
        );
        registry.add_schema("a", a);
        registry.add_schema("b", b);
        let resolver = Resolver::new(&store, &registry, "%");
        let err = resolver.merged_properties(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InheritanceCycle);
        assert_eq!(err.to_string(), "Cyclic schema inheritance: a -> b -> a");
    }

    #[test]
    fn test_unknown_reference() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let a = store.insert(
            SchemaNode::new("a", SchemaKind::Node)
                .with_attributes(attrs(&[(SCHEMA_ATTR, "nowhere".into())])),
        );
        let resolver = Resolver::new(&store, &registry, "%");
        let err = resolver.chain(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }
}
