//! Schema Registry
//!
//! Maps top-level schema names to nodes in the builder's schema arena.
//! Populated by `define` and consulted by `build`; redefinition overwrites.

use std::collections::HashMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::schema::SchemaId;

/// Registry of named root schemas for one builder instance
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaId>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a schema by name
    pub fn get_schema(&self, name: &str) -> Option<SchemaId> {
        self.schemas.get(name).copied()
    }

    /// Get a schema by name or fail with a suggestion
    pub fn require(&self, name: &str) -> Result<SchemaId> {
        self.get_schema(name).ok_or_else(|| {
            BuildError::schema_not_found(name).with_suggestion(self.suggest(name))
        })
    }

    /// Register a schema, returning the entry it replaced
    pub fn add_schema(&mut self, name: impl Into<String>, schema: SchemaId) -> Option<SchemaId> {
        let name = name.into();
        debug!(schema = %name, id = schema.index(), "Registered schema");
        self.schemas.insert(name, schema)
    }

    pub fn remove(&mut self, name: &str) -> Option<SchemaId> {
        self.schemas.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterate `(name, id)` pairs, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, SchemaId)> {
        let mut entries: Vec<(&str, SchemaId)> =
            self.schemas.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Closest registered name to `query`, if any is close enough
    pub fn suggest(&self, query: &str) -> Option<String> {
        suggest(query, self.schemas.keys().map(String::as_str))
    }
}

/// Pick the best fuzzy match for `query` among `candidates`
///
/// Matching is tried in both directions so that both a truncated and an
/// over-long spelling find their target. Ties resolve alphabetically.
pub fn suggest<'a>(query: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let matcher = SkimMatcherV2::default();
    let mut best: Option<(i64, &str)> = None;

    for candidate in candidates {
        if candidate == query {
            continue;
        }
        let score = matcher
            .fuzzy_match(candidate, query)
            .max(matcher.fuzzy_match(query, candidate));
        let Some(score) = score else { continue };
        best = match best {
            Some((s, name)) if s > score || (s == score && name <= candidate) => Some((s, name)),
            _ => Some((score, candidate)),
        };
    }

    best.map(|(_, name)| name.to_string())
}
