//! Graph construction engine
//!
//! [`GraphBuilder`] consumes construction calls one at a time. Each started
//! node pushes a frame holding its schema, its node value and the declared
//! properties still waiting for a value; completing the node applies
//! defaults, enforces `req`, pops the frame and attaches the node to its
//! parent. Nesting is tracked with this explicit stack only, so schemas may
//! reference themselves or their ancestors.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::attach::add_to_collection;
use crate::call::Call;
use crate::config::BuilderSettings;
use crate::error::{BuildError, Result, REQUIRED_MISSING};
use crate::factory::{
    resolve_factory, CollectionPlaceholderFactory, DefaultFactories, DefineNodeFactory,
    FactoryContext, NodeFactory,
};
use crate::registry::{suggest, SchemaRegistry};
use crate::resolver::{ChildOrigin, Resolver};
use crate::schema::{PropertyDecl, SchemaId, SchemaKind, SchemaStore};
use crate::target::TypeRegistry;
use crate::validator::{self, Assignment};
use crate::value::{Attributes, Value};

/// What the builder is producing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Schema nodes, validated by the meta-schema
    Define,
    /// Domain objects, validated by registered schemas
    Build,
}

/// Outcome of [`GraphBuilder::start_node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// A frame was pushed; a matching `end_node` must follow
    Node,
    /// The call was applied as a property of the current node
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Root,
    Child(ChildOrigin),
}

#[derive(Debug)]
struct Frame {
    name: String,
    schema: SchemaId,
    node: Value,
    /// Declared properties not yet supplied
    pending: IndexMap<String, PropertyDecl>,
    origin: Origin,
    /// Collection container standing in for its owner
    placeholder: bool,
    /// Node reused through a reference attribute
    reference: bool,
}

/// Stack-driven builder for one `define` or `build` pass
pub struct GraphBuilder<'a> {
    mode: Mode,
    store: &'a mut SchemaStore,
    registry: &'a mut SchemaRegistry,
    types: &'a TypeRegistry,
    settings: &'a BuilderSettings,
    meta_root: SchemaId,
    default_schema: Option<SchemaId>,
    defaults: DefaultFactories,
    frames: Vec<Frame>,
    ids: HashMap<String, Value>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        mode: Mode,
        store: &'a mut SchemaStore,
        registry: &'a mut SchemaRegistry,
        types: &'a TypeRegistry,
        settings: &'a BuilderSettings,
        meta_root: SchemaId,
    ) -> Self {
        let defaults = DefaultFactories {
            fallback: match mode {
                Mode::Define => Rc::new(DefineNodeFactory),
                Mode::Build => Rc::new(NodeFactory),
            },
            collection: Rc::new(CollectionPlaceholderFactory),
        };
        Self {
            mode,
            store,
            registry,
            types,
            settings,
            meta_root,
            default_schema: None,
            defaults,
            frames: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// Schema used for build roots whose name is not registered
    pub fn with_default_schema(mut self, schema: Option<SchemaId>) -> Self {
        self.default_schema = schema;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of nodes currently in progress
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Nodes recorded under the identifier attribute so far
    pub fn identified(&self, id: &str) -> Option<&Value> {
        self.ids.get(id)
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&*self.store, &*self.registry, &self.settings.wildcard)
    }

    /// Begin a construction call
    ///
    /// A call carrying only a non-null value, with no attributes and no
    /// children, that names a declared property of the current node is
    /// applied directly and reported as [`Started::Property`].
    pub fn start_node(
        &mut self,
        name: &str,
        mut attributes: Attributes,
        value: Option<Value>,
        has_children: bool,
    ) -> Result<Started> {
        if self.frames.len() >= self.settings.max_depth {
            return Err(BuildError::invalid_call(format!(
                "'{}' exceeds the maximum depth of {}",
                name, self.settings.max_depth
            )));
        }
        let identifier = attributes.shift_remove(&self.settings.identifier_attribute);
        let reference = attributes.shift_remove(&self.settings.reference_attribute);

        let current = self.frames.last().map(|f| (f.schema, f.placeholder));
        let (schema, origin) = match current {
            None => (self.root_schema(name)?, Origin::Root),
            Some((parent, placeholder)) => {
                let bare = matches!(value, Some(ref v) if !v.is_null())
                    && attributes.is_empty()
                    && !has_children
                    && identifier.is_none()
                    && reference.is_none()
                    && !placeholder;
                if bare && self.resolver().property_decl(parent, name)?.is_some() {
                    let index = self.frames.len() - 1;
                    self.apply_property(index, name, value.unwrap_or(Value::Null))?;
                    trace!(property = name, "Applied bare value");
                    return Ok(Started::Property);
                }
                let (found, origin) = self.resolve_child(parent, name)?;
                (found, Origin::Child(origin))
            }
        };

        if let Some(reference) = reference {
            return self.start_reference(name, schema, origin, reference, attributes, value);
        }

        let placeholder =
            self.mode == Mode::Build && self.store.get(schema).kind == SchemaKind::Collection;
        let factory = resolve_factory(
            &mut *self.store,
            &*self.registry,
            &self.settings.wildcard,
            self.types,
            schema,
            name,
            &self.defaults,
        )?;

        let current_node = self.frames.last().map(|f| f.node.clone());
        let owner = self.owner_node();
        let node = {
            let mut ctx = FactoryContext {
                name,
                value: value.as_ref(),
                attributes: &attributes,
                schema,
                current: current_node.as_ref(),
                parent: owner.as_ref(),
                schemas: &mut *self.store,
                types: self.types,
            };
            factory
                .new_instance(&mut ctx)
                .map_err(|e| BuildError::from_hook(e, |msg| BuildError::factory(name, msg)))?
        };

        if let Some(id) = identifier {
            let key = id.to_key().ok_or_else(|| {
                BuildError::property(
                    &self.settings.identifier_attribute,
                    format!("cannot use a {} as an identifier", id.kind()),
                )
            })?;
            self.ids.insert(key, node.clone());
        }

        let pending = if placeholder {
            IndexMap::new()
        } else {
            let wildcard = self.settings.wildcard.as_str();
            self.resolver()
                .merged_properties(schema)?
                .iter()
                .filter(|(k, _)| k.as_str() != wildcard)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        debug!(
            node = name,
            schema = %self.store.path(schema),
            depth = self.frames.len(),
            "Started node"
        );
        self.frames.push(Frame {
            name: name.to_string(),
            schema,
            node: node.clone(),
            pending,
            origin,
            placeholder,
            reference: false,
        });

        if placeholder {
            if !attributes.is_empty() {
                trace!(collection = name, "Ignoring attributes on collection container");
            }
        } else {
            let index = self.frames.len() - 1;
            for (attr, attr_value) in attributes {
                self.apply_property(index, &attr, attr_value)?;
            }
        }

        if origin == Origin::Root && self.mode == Mode::Define {
            if let Value::Schema(id) = node {
                self.registry.add_schema(name, id);
            }
        }

        Ok(Started::Node)
    }

    fn start_reference(
        &mut self,
        name: &str,
        schema: SchemaId,
        origin: Origin,
        reference: Value,
        attributes: Attributes,
        value: Option<Value>,
    ) -> Result<Started> {
        let ref_attr = &self.settings.reference_attribute;
        if !attributes.is_empty() || value.is_some() {
            return Err(BuildError::invalid_call(format!(
                "'{}' uses {} and cannot also carry attributes or a value",
                name, ref_attr
            )));
        }
        let node = reference
            .to_key()
            .and_then(|key| self.ids.get(&key).cloned())
            .ok_or_else(|| BuildError::property(ref_attr, "unknown reference"))?;

        debug!(node = name, "Reusing identified node");
        self.frames.push(Frame {
            name: name.to_string(),
            schema,
            node,
            pending: IndexMap::new(),
            origin,
            placeholder: false,
            reference: true,
        });
        Ok(Started::Node)
    }

    /// Complete the innermost node and return it
    pub fn end_node(&mut self) -> Result<Value> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| BuildError::invalid_call("no node in progress"))?;

        if !frame.reference && !frame.placeholder {
            self.complete_pending(&frame)?;
        }
        if let Some(parent) = self.frames.last_mut() {
            parent.pending.shift_remove(&frame.name);
        }
        if self.mode == Mode::Build && !frame.placeholder {
            self.attach(&frame)?;
        }

        debug!(node = %frame.name, depth = self.frames.len(), "Completed node");
        Ok(frame.node)
    }

    /// Drive a whole call tree through `start_node`/`end_node`
    pub fn run(&mut self, call: &Call) -> Result<Value> {
        enum Step<'c> {
            Enter(&'c Call),
            Exit,
        }

        let base = self.frames.len();
        let mut stack = vec![Step::Enter(call)];
        let mut last = Value::Null;
        while let Some(step) = stack.pop() {
            let outcome = match step {
                Step::Enter(c) => self
                    .start_node(
                        &c.name,
                        c.attributes.clone(),
                        c.value.clone(),
                        !c.children.is_empty(),
                    )
                    .map(|started| {
                        if started == Started::Node {
                            stack.push(Step::Exit);
                            stack.extend(c.children.iter().rev().map(Step::Enter));
                        }
                    }),
                Step::Exit => self.end_node().map(|node| last = node),
            };
            if let Err(err) = outcome {
                self.frames.truncate(base);
                return Err(err);
            }
        }
        Ok(last)
    }

    fn root_schema(&self, name: &str) -> Result<SchemaId> {
        match self.mode {
            Mode::Define => Ok(self.meta_root),
            Mode::Build => self
                .registry
                .get_schema(name)
                .or(self.default_schema)
                .ok_or_else(|| {
                    let hint = self
                        .settings
                        .suggestions
                        .then(|| self.registry.suggest(name))
                        .flatten();
                    BuildError::schema_not_found(name).with_suggestion(hint)
                }),
        }
    }

    fn resolve_child(&self, parent: SchemaId, name: &str) -> Result<(SchemaId, ChildOrigin)> {
        let resolver = self.resolver();
        if let Some(found) = resolver.find_child(parent, name)? {
            return Ok(found);
        }
        let hint = if self.settings.suggestions {
            let names = resolver.child_names(parent)?;
            suggest(name, names.iter().map(String::as_str))
        } else {
            None
        };
        Err(BuildError::schema_not_found(name).with_suggestion(hint))
    }

    /// Node of the nearest frame that is not a collection placeholder
    fn owner_node(&self) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find(|f| !f.placeholder)
            .map(|f| f.node.clone())
    }

    fn apply_property(&mut self, index: usize, name: &str, value: Value) -> Result<()> {
        let (schema, node) = {
            let frame = &self.frames[index];
            (frame.schema, frame.node.clone())
        };
        self.frames[index].pending.shift_remove(name);
        self.apply_to(schema, &node, name, value)
    }

    fn apply_to(&mut self, schema: SchemaId, node: &Value, name: &str, value: Value) -> Result<()> {
        let how = validator::prepare(
            &self.resolver(),
            schema,
            name,
            &value,
            self.settings.suggestions,
        )?;
        validator::assign(self.store, node, name, how, value)
    }

    fn complete_pending(&mut self, frame: &Frame) -> Result<()> {
        for (name, decl) in &frame.pending {
            if let Some(default) = decl.attribute("def") {
                let value = match default {
                    Value::Callable(producer) if producer.arity() == 0 => producer
                        .call(Vec::new())
                        .map_err(|e| BuildError::from_hook(e, |msg| BuildError::property(name, msg)))?,
                    other => other.clone(),
                };
                trace!(property = %name, "Applying default");
                self.apply_to(frame.schema, &frame.node, name, value)?;
            } else if decl.is_required() {
                return Err(BuildError::property(name, REQUIRED_MISSING));
            }
        }
        Ok(())
    }

    fn attach(&mut self, frame: &Frame) -> Result<()> {
        let Some(parent) = self.frames.last() else {
            return Ok(());
        };

        if parent.placeholder {
            let container = parent.schema;
            let owner = self.owner_node().ok_or_else(|| {
                BuildError::collection(self.store.name(container), "no enclosing object")
            })?;
            return add_to_collection(&*self.store, container, &owner, &frame.node);
        }

        let (schema, node) = (parent.schema, parent.node.clone());
        match frame.origin {
            Origin::Child(ChildOrigin::Property) => {
                self.apply_to(schema, &node, &frame.name, frame.node.clone())
            }
            _ => validator::assign(
                self.store,
                &node,
                &frame.name,
                Assignment::Named(frame.name.clone()),
                frame.node.clone(),
            ),
        }
    }
}
