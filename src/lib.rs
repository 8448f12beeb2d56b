//! Familiar MetaBuilder
//!
//! Schema-driven construction of validated object graphs. Schemas are
//! themselves built from nested construction calls, validated by a built-in
//! meta-schema, and registered by name; object graphs are then built from
//! nested calls validated against them.
//!
//! ## Features
//!
//! - **Declarative Schemas**: properties with `req`, `def`, `check`, `min`, `max`
//!   and renames; collections backed by lists, maps or `add` hooks
//! - **Inheritance**: schemas extend registered schemas through `schema`,
//!   with property declarations merged attribute by attribute
//! - **Pluggable Factories**: factory objects, callables or registered type names
//! - **Shared Nodes**: `metaId`/`refId` turn trees into graphs
//! - **Analysis**: petgraph-based detection of unresolved references and
//!   inheritance cycles
//!
//! ## Architecture
//!
//! ```text
//! Call tree ──▶ GraphBuilder (frame stack)
//!                 ├── Resolver      child schemas, inheritance, merged properties
//!                 ├── validator     lookup, bounds, checks, assignment
//!                 ├── factory       node creation
//!                 └── attach        collection strategies
//!               SchemaStore (arena) + SchemaRegistry (names)
//! ```
//!
//! ## Example
//!
//! ```
//! use familiar_metabuilder::{Call, MetaBuilder, Value};
//!
//! let mut builder = MetaBuilder::new();
//! builder
//!     .define(&Call::new("item").child(
//!         Call::new("properties")
//!             .child(Call::new("name").attr("req", true))
//!             .child(Call::new("qty").attr("def", 1).attr("min", 1)),
//!     ))
//!     .unwrap();
//!
//! let item = builder.build(&Call::new("item").attr("name", "pen")).unwrap();
//! let item = item.as_object().unwrap().borrow();
//! assert_eq!(item.property("qty"), Some(Value::Int(1)));
//! ```

pub mod attach;
pub mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod graph;
pub mod hooks;
pub mod meta_builder;
pub mod meta_schema;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod target;
pub mod validator;
pub mod value;

pub use call::Call;
pub use config::{BuilderConfig, BuilderSettings, OutputFormat};
pub use engine::{GraphBuilder, Mode, Started};
pub use error::{BuildError, ErrorKind, Result};
pub use factory::{Factory, FactoryContext};
pub use graph::{DiagnosticCode, Diagnostics, SchemaGraph, Severity};
pub use hooks::{Accessor, Callable, Check, CheckRule};
pub use meta_builder::MetaBuilder;
pub use registry::SchemaRegistry;
pub use schema::{SchemaId, SchemaKind, SchemaNode, SchemaStore};
pub use target::{
    object, BuildTarget, CollectionKind, CollectionMut, GenericNode, ObjectRef, TypeRegistry,
};
pub use value::{Attributes, Value, ValueKind};
