//! Configuration for the builder and the `metabuild` tool
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (metabuilder.toml)
//! - Environment variables (METABUILDER__*)
//!
//! ## Example config file (metabuilder.toml):
//! ```toml
//! [builder]
//! identifier_attribute = "metaId"
//! reference_attribute = "refId"
//! wildcard = "%"
//! max_depth = 64
//! suggestions = true
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Construction settings
    #[serde(default)]
    pub builder: BuilderSettings,

    /// Rendering settings for built graphs
    #[serde(default)]
    pub output: OutputConfig,
}

/// Construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    /// Attribute recording a node under an identifier
    #[serde(default = "default_identifier_attribute")]
    pub identifier_attribute: String,

    /// Attribute reusing a previously identified node
    #[serde(default = "default_reference_attribute")]
    pub reference_attribute: String,

    /// Schema name matching any call name
    #[serde(default = "default_wildcard")]
    pub wildcard: String,

    /// Deepest allowed nesting of construction calls
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Attach "did you mean" hints to not-found errors
    #[serde(default = "default_true")]
    pub suggestions: bool,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_identifier_attribute() -> String {
    "metaId".to_string()
}

fn default_reference_attribute() -> String {
    "refId".to_string()
}

fn default_wildcard() -> String {
    "%".to_string()
}

fn default_max_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            identifier_attribute: default_identifier_attribute(),
            reference_attribute: default_reference_attribute(),
            wildcard: default_wildcard(),
            max_depth: default_max_depth(),
            suggestions: true,
        }
    }
}

impl OutputFormat {
    /// Render JSON in this format
    pub fn render(&self, json: &serde_json::Value) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(json),
            OutputFormat::Compact => serde_json::to_string(json),
        }
    }
}

impl BuilderConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "metabuilder.toml",
            ".metabuilder.toml",
            "config/metabuilder.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "metabuilder") {
            let xdg_config = config_dir.config_dir().join("metabuilder.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // METABUILDER__BUILDER__MAX_DEPTH=8
        builder = builder.add_source(
            Environment::with_prefix("METABUILDER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
