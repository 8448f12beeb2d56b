//! Builder facade
//!
//! [`MetaBuilder`] owns the schema arena, the registry of named schemas and
//! the type registry used by `factory` type names. `define` registers
//! schemas; `build` constructs validated object graphs against them.

use tracing::{debug, info};

use crate::call::Call;
use crate::config::BuilderConfig;
use crate::engine::{GraphBuilder, Mode};
use crate::error::{BuildError, Result};
use crate::graph::{Diagnostics, SchemaGraph};
use crate::meta_schema;
use crate::registry::SchemaRegistry;
use crate::schema::{SchemaId, SchemaStore};
use crate::target::TypeRegistry;
use crate::value::Value;

/// Schema-driven object-graph builder
#[derive(Debug)]
pub struct MetaBuilder {
    config: BuilderConfig,
    store: SchemaStore,
    registry: SchemaRegistry,
    types: TypeRegistry,
    meta_root: SchemaId,
    default_schema: Option<SchemaId>,
}

impl Default for MetaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaBuilder {
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    pub fn with_config(config: BuilderConfig) -> Self {
        let mut store = SchemaStore::new();
        let meta_root = meta_schema::install(&mut store, &config.builder.wildcard);
        Self {
            config,
            store,
            registry: SchemaRegistry::new(),
            types: TypeRegistry::new(),
            meta_root,
            default_schema: None,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn graph_builder(&mut self, mode: Mode) -> GraphBuilder<'_> {
        GraphBuilder::new(
            mode,
            &mut self.store,
            &mut self.registry,
            &self.types,
            &self.config.builder,
            self.meta_root,
        )
        .with_default_schema(self.default_schema)
    }

    /// Define a schema, registering it under the root call's name
    pub fn define(&mut self, call: &Call) -> Result<SchemaId> {
        let defined = self.graph_builder(Mode::Define).run(call)?;
        let id = defined.as_schema().ok_or_else(|| {
            BuildError::invalid_call(format!("'{}' did not define a schema", call.name))
        })?;
        debug!(schema = %call.name, nodes = call.call_count(), "Defined schema");
        Ok(id)
    }

    pub fn define_all(&mut self, calls: &[Call]) -> Result<Vec<SchemaId>> {
        calls.iter().map(|call| self.define(call)).collect()
    }

    /// Build an object graph, returning its root node
    pub fn build(&mut self, call: &Call) -> Result<Value> {
        let root = self.graph_builder(Mode::Build).run(call)?;
        debug!(root = %call.name, nodes = call.call_count(), "Built graph");
        Ok(root)
    }

    pub fn build_all(&mut self, calls: &[Call]) -> Result<Vec<Value>> {
        calls.iter().map(|call| self.build(call)).collect()
    }

    /// A fresh streaming builder in the given mode
    pub fn streaming(&mut self, mode: Mode) -> GraphBuilder<'_> {
        self.graph_builder(mode)
    }

    pub fn get_schema(&self, name: &str) -> Option<SchemaId> {
        self.registry.get_schema(name)
    }

    /// Register `schema` under `name`, replacing any earlier entry
    ///
    /// The handle must come from this builder's store.
    pub fn add_schema(
        &mut self,
        name: impl Into<String>,
        schema: SchemaId,
    ) -> Result<Option<SchemaId>> {
        let name = name.into();
        if !self.store.contains(schema) {
            return Err(BuildError::invalid_call(format!(
                "schema handle for '{}' belongs to another builder",
                name
            )));
        }
        self.store.invalidate();
        Ok(self.registry.add_schema(name, schema))
    }

    pub fn schema_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Root schema for build calls whose name is not registered
    pub fn set_default_schema(&mut self, schema: Option<SchemaId>) {
        self.default_schema = schema;
    }

    /// Root of the built-in schema validating definitions
    pub fn meta_schema(&self) -> SchemaId {
        self.meta_root
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// JSON description of a registered schema
    pub fn describe(&self, name: &str) -> Result<serde_json::Value> {
        let id = self.registry.require(name)?;
        Ok(self.store.describe(id))
    }

    /// Analyze inheritance between registered schemas
    pub fn analyze(&self) -> (SchemaGraph, Diagnostics) {
        let graph = SchemaGraph::from_registry(&self.store, &self.registry);
        let diagnostics = graph.diagnose();
        info!(
            schemas = graph.schema_count(),
            problems = diagnostics.len(),
            "Analyzed schema graph"
        );
        (graph, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_define_registers_by_root_name() {
        let mut builder = MetaBuilder::new();
        let id = builder.define(&Call::new("order")).unwrap();
        assert_eq!(builder.get_schema("order"), Some(id));
        assert_eq!(builder.schema_names(), vec!["order"]);
        assert_eq!(builder.store().name(id), "order");
    }

    #[test]
    fn test_redefinition_overwrites() {
        let mut builder = MetaBuilder::new();
        let first = builder.define(&Call::new("order")).unwrap();
        let second = builder
            .define(&Call::new("order").child(Call::new("properties").child(Call::new("id"))))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(builder.get_schema("order"), Some(second));
        builder
            .build(&Call::new("order").attr("id", 1))
            .unwrap();
    }

    #[test]
    fn test_unknown_definition_attribute() {
        let mut builder = MetaBuilder::new();
        let err = builder
            .define(&Call::new("order").attr("colour", "red"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Property);
        assert_eq!(err.subject(), Some("colour"));
    }

    #[test]
    fn test_add_schema_by_hand() {
        let mut builder = MetaBuilder::new();
        let id = builder.define(&Call::new("a")).unwrap();
        assert_eq!(builder.add_schema("alias", id).unwrap(), None);
        let built = builder.build(&Call::new("alias")).unwrap();
        assert!(built.as_object().is_some());

        assert!(builder.describe("alias").is_ok());
        assert_eq!(
            builder.describe("nothing").unwrap_err().kind(),
            ErrorKind::SchemaNotFound
        );
    }

    #[test]
    fn test_add_schema_rejects_foreign_handle() {
        let mut other = MetaBuilder::new();
        let foreign = other.define(&Call::new("elsewhere")).unwrap();

        let mut builder = MetaBuilder::new();
        let err = builder.add_schema("elsewhere", foreign).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCall);
        assert!(builder.get_schema("elsewhere").is_none());
    }
}
