//! Schema nodes and the arena that owns them

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::value::{Attributes, Value};

/// Container holding a schema's declared properties
pub const PROPERTIES: &str = "properties";

/// Container holding a schema's declared collections
pub const COLLECTIONS: &str = "collections";

/// Handle to a node in a [`SchemaStore`]
///
/// Handles are non-owning: a schema may point at an ancestor or at any other
/// schema without creating an ownership cycle. Each handle remembers the
/// store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId {
    store: usize,
    index: usize,
}

impl SchemaId {
    pub fn index(&self) -> usize {
        self.index
    }
}

static NEXT_STORE: AtomicUsize = AtomicUsize::new(0);

/// Kind of schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// Ordinary schema node describing one node type
    Node,
    /// Container marking its children as members of a collection
    Collection,
}

/// A single schema node
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Name matched against construction calls (`%` matches anything)
    pub name: String,
    pub kind: SchemaKind,
    /// Declaration metadata (`factory`, `schema`, `req`, `def`, ...)
    pub attributes: Attributes,
    /// Child nodes in declaration order
    pub children: Vec<SchemaId>,
    /// Enclosing node, for bookkeeping only
    pub parent: Option<SchemaId>,
}

impl SchemaNode {
    pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: Attributes::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn is_collection(&self) -> bool {
        self.kind == SchemaKind::Collection
    }
}

/// One effective property declaration after inheritance merging
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    /// Most derived node declaring this property
    pub declared_by: SchemaId,
    /// Attributes merged by key, nearest declaration wins
    pub attributes: Attributes,
}

impl PropertyDecl {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    pub fn is_required(&self) -> bool {
        self.attribute("req").map_or(false, Value::is_truthy)
    }
}

/// Effective properties of a schema, ancestors first, in declaration order
pub type MergedProperties = IndexMap<String, PropertyDecl>;

/// Arena owning every schema node of one builder
#[derive(Debug)]
pub struct SchemaStore {
    tag: usize,
    nodes: Vec<SchemaNode>,
    merged: RefCell<HashMap<SchemaId, Rc<MergedProperties>>>,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self {
            tag: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            merged: RefCell::new(HashMap::new()),
        }
    }
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; when it has a parent it is appended to the parent's children
    pub fn insert(&mut self, node: SchemaNode) -> SchemaId {
        let id = SchemaId {
            store: self.tag,
            index: self.nodes.len(),
        };
        let parent = node.parent;
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent.index].children.push(id);
        }
        self.invalidate();
        id
    }

    /// Create a child node under `parent`
    pub fn add_child(
        &mut self,
        parent: SchemaId,
        name: impl Into<String>,
        kind: SchemaKind,
        attributes: Attributes,
    ) -> SchemaId {
        let mut node = SchemaNode::new(name, kind).with_attributes(attributes);
        node.parent = Some(parent);
        self.insert(node)
    }

    pub fn get(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.index]
    }

    pub fn contains(&self, id: SchemaId) -> bool {
        id.store == self.tag && id.index < self.nodes.len()
    }

    pub fn name(&self, id: SchemaId) -> &str {
        &self.nodes[id.index].name
    }

    pub fn attribute(&self, id: SchemaId, name: &str) -> Option<&Value> {
        self.nodes[id.index].attributes.get(name)
    }

    pub fn set_attribute(&mut self, id: SchemaId, name: impl Into<String>, value: Value) {
        self.nodes[id.index].attributes.insert(name.into(), value);
        self.invalidate();
    }

    pub fn children(&self, id: SchemaId) -> &[SchemaId] {
        &self.nodes[id.index].children
    }

    /// Direct child named `name`; the last declaration wins
    pub fn child_named(&self, id: SchemaId, name: &str) -> Option<SchemaId> {
        self.nodes[id.index]
            .children
            .iter()
            .rev()
            .copied()
            .find(|c| self.nodes[c.index].name == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dotted path from the outermost ancestor, for messages
    pub fn path(&self, id: SchemaId) -> String {
        let mut parts = vec![self.name(id).to_string()];
        let mut cursor = self.get(id).parent;
        while let Some(p) = cursor {
            parts.push(self.name(p).to_string());
            cursor = self.get(p).parent;
        }
        parts.reverse();
        parts.join(".")
    }

    pub(crate) fn cached_properties(&self, id: SchemaId) -> Option<Rc<MergedProperties>> {
        self.merged.borrow().get(&id).cloned()
    }

    pub(crate) fn cache_properties(&self, id: SchemaId, props: Rc<MergedProperties>) {
        self.merged.borrow_mut().insert(id, props);
    }

    pub(crate) fn invalidate(&self) {
        self.merged.borrow_mut().clear();
    }

    /// Render a schema subtree as JSON
    pub fn describe(&self, id: SchemaId) -> JsonValue {
        let node = self.get(id);
        let mut out = JsonMap::new();
        out.insert("name".into(), JsonValue::String(node.name.clone()));
        if node.is_collection() {
            out.insert("kind".into(), JsonValue::String("collection".into()));
        }
        if !node.attributes.is_empty() {
            let mut attrs = JsonMap::new();
            for (k, v) in &node.attributes {
                let rendered = match v {
                    Value::Schema(target) => JsonValue::String(self.path(*target)),
                    other => other.to_json(),
                };
                attrs.insert(k.clone(), rendered);
            }
            out.insert("attributes".into(), JsonValue::Object(attrs));
        }
        if !node.children.is_empty() {
            let children = node.children.iter().map(|c| self.describe(*c)).collect();
            out.insert("children".into(), JsonValue::Array(children));
        }
        JsonValue::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_links_parent() {
        let mut store = SchemaStore::new();
        let root = store.insert(SchemaNode::new("invoice", SchemaKind::Node));
        let props = store.add_child(root, PROPERTIES, SchemaKind::Node, Attributes::new());
        assert_eq!(store.children(root), &[props]);
        assert_eq!(store.get(props).parent, Some(root));
        assert_eq!(store.path(props), "invoice.properties");
    }

    #[test]
    fn test_child_named_last_wins() {
        let mut store = SchemaStore::new();
        let root = store.insert(SchemaNode::new("p", SchemaKind::Node));
        let _first = store.add_child(root, "qty", SchemaKind::Node, Attributes::new());
        let second = store.add_child(root, "qty", SchemaKind::Node, Attributes::new());
        assert_eq!(store.child_named(root, "qty"), Some(second));
        assert_eq!(store.child_named(root, "missing"), None);
    }

    #[test]
    fn test_mutation_clears_property_cache() {
        let mut store = SchemaStore::new();
        let root = store.insert(SchemaNode::new("p", SchemaKind::Node));
        store.cache_properties(root, Rc::new(MergedProperties::new()));
        assert!(store.cached_properties(root).is_some());
        store.set_attribute(root, "factory", Value::from("Thing"));
        assert!(store.cached_properties(root).is_none());
    }

    #[test]
    fn test_contains_rejects_foreign_handles() {
        let mut store = SchemaStore::new();
        let mut other = SchemaStore::new();
        let own = store.insert(SchemaNode::new("a", SchemaKind::Node));
        let foreign = other.insert(SchemaNode::new("b", SchemaKind::Node));
        assert_eq!(own.index(), foreign.index());
        assert!(store.contains(own));
        assert!(!store.contains(foreign));
    }

    #[test]
    fn test_property_decl_required() {
        let mut attrs = Attributes::new();
        attrs.insert("req".into(), Value::Bool(true));
        let decl = PropertyDecl {
            name: "qty".into(),
            declared_by: SchemaStore::new().insert(SchemaNode::new("line", SchemaKind::Node)),
            attributes: attrs,
        };
        assert!(decl.is_required());
        assert!(decl.attribute("def").is_none());
    }
}
