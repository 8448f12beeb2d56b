//! Diagnostics
//!
//! Collects warnings and errors found while analyzing registered schemas.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// `schema` reference names no registered schema
    UnresolvedRef,
    /// Schemas inherit from each other in a loop
    InheritanceCycle,
    /// Several names are registered for one schema
    SharedRoot,
    /// Schema nests itself, directly or through others
    RecursiveSchema,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedRef => "E001",
            Self::InheritanceCycle => "E002",
            Self::SharedRoot => "W001",
            Self::RecursiveSchema => "I001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedRef | Self::InheritanceCycle => Severity::Error,
            Self::SharedRoot => Severity::Warning,
            Self::RecursiveSchema => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Registered schema the diagnostic is about
    pub schema: String,
    pub code: DiagnosticCode,
    pub message: String,
    /// Additional context (related schemas, node paths)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(schema: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.schema
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from an analysis pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Add diagnostic for a reference to an unregistered schema
    pub fn unresolved_ref(&mut self, schema: &str, target: &str, at: &str) {
        self.push(
            DiagnosticItem::new(
                schema,
                DiagnosticCode::UnresolvedRef,
                format!("schema reference '{}' is not registered", target),
            )
            .with_context(format!("At: {}", at)),
        );
    }

    /// Add diagnostic for an inheritance loop
    pub fn inheritance_cycle(&mut self, members: &[String]) {
        let Some(first) = members.first() else {
            return;
        };
        self.push(
            DiagnosticItem::new(
                first.as_str(),
                DiagnosticCode::InheritanceCycle,
                "cyclic schema inheritance",
            )
            .with_context(format!("Members: {}", members.join(", "))),
        );
    }

    pub fn shared_root(&mut self, names: &[&str]) {
        let Some(first) = names.first() else {
            return;
        };
        self.push(
            DiagnosticItem::new(
                *first,
                DiagnosticCode::SharedRoot,
                "schema is registered under several names",
            )
            .with_context(format!("Names: {}", names.join(", "))),
        );
    }

    pub fn recursive_schema(&mut self, members: &[String]) {
        let Some(first) = members.first() else {
            return;
        };
        let item = DiagnosticItem::new(
            first.as_str(),
            DiagnosticCode::RecursiveSchema,
            "schema nests itself",
        );
        let item = if members.len() > 1 {
            item.with_context(format!("Through: {}", members.join(", ")))
        } else {
            item
        };
        self.push(item);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if self.warning_count() > 0 {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
