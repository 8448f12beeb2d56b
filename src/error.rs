//! Error types for schema definition and graph construction

use thiserror::Error;

/// Result type for builder operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Reason reported when a required property was never supplied
pub const REQUIRED_MISSING: &str = "required property missing";

/// Reason reported when a `check` rejects a value
pub const VALUE_INVALID: &str = "value invalid";

/// Reason reported for an undeclared property
pub const PROPERTY_UNKNOWN: &str = "property unknown";

/// Reason reported when min/max cannot derive an ordinal
pub const NOT_COMPARABLE: &str = "value is not comparable";

/// Coarse classification of a [`BuildError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaNotFound,
    InheritanceCycle,
    Property,
    Collection,
    Factory,
    ClassNameNotFound,
    InvalidCall,
    Config,
}

/// Construction errors
///
/// Every failure while defining schemas or building an object graph is one of
/// these variants, so callers can match broadly on `BuildError` or narrowly on
/// a single variant. The first error aborts the whole `define`/`build` call.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Schema not found: {name}{}", did_you_mean(.suggestion))]
    SchemaNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Cyclic schema inheritance: {chain}")]
    InheritanceCycle { chain: String },

    #[error("Property '{name}': {reason}")]
    Property { name: String, reason: String },

    #[error("Collection '{name}': {reason}")]
    Collection { name: String, reason: String },

    #[error("'{name}' factory: {reason}")]
    Factory { name: String, reason: String },

    #[error("Class name not found: {name}")]
    ClassNameNotFound { name: String },

    #[error("Invalid call: {reason}")]
    InvalidCall { reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl BuildError {
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::SchemaNotFound {
            name: name.into(),
            suggestion: None,
        }
    }

    pub fn property(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Property {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn collection(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Collection {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn factory(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Factory {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_call(reason: impl Into<String>) -> Self {
        Self::InvalidCall {
            reason: reason.into(),
        }
    }

    /// Convert an error raised by a user hook.
    ///
    /// A `BuildError` travelling inside the hook error is surfaced unchanged;
    /// anything else is wrapped by `wrap` with the rendered error chain.
    pub fn from_hook(err: anyhow::Error, wrap: impl FnOnce(String) -> BuildError) -> Self {
        match err.downcast::<BuildError>() {
            Ok(inner) => inner,
            Err(other) => wrap(format!("{:#}", other)),
        }
    }

    /// Coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaNotFound { .. } => ErrorKind::SchemaNotFound,
            Self::InheritanceCycle { .. } => ErrorKind::InheritanceCycle,
            Self::Property { .. } => ErrorKind::Property,
            Self::Collection { .. } => ErrorKind::Collection,
            Self::Factory { .. } => ErrorKind::Factory,
            Self::ClassNameNotFound { .. } => ErrorKind::ClassNameNotFound,
            Self::InvalidCall { .. } => ErrorKind::InvalidCall,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Name of the offending schema, property, collection or factory, if any
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::SchemaNotFound { name, .. }
            | Self::Property { name, .. }
            | Self::Collection { name, .. }
            | Self::Factory { name, .. }
            | Self::ClassNameNotFound { name } => Some(name),
            Self::InheritanceCycle { chain } => Some(chain),
            Self::InvalidCall { .. } | Self::Config(_) => None,
        }
    }

    /// Reason text for property, collection and factory errors
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Property { reason, .. }
            | Self::Collection { reason, .. }
            | Self::Factory { reason, .. }
            | Self::InvalidCall { reason } => Some(reason),
            _ => None,
        }
    }

    pub(crate) fn with_suggestion(self, candidate: Option<String>) -> Self {
        match self {
            Self::SchemaNotFound { name, .. } => Self::SchemaNotFound {
                name,
                suggestion: candidate,
            },
            other => other,
        }
    }
}
