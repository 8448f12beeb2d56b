//! MetaBuilder CLI
//!
//! Defines schemas from JSON call trees and builds or checks against them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use familiar_metabuilder::{BuilderConfig, Call, MetaBuilder};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metabuild")]
#[command(about = "Define schemas and build validated object graphs from JSON")]
struct Cli {
    /// Configuration file (defaults to metabuilder.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Define schemas, then build object graphs against them
    DefineAndBuild {
        /// JSON file with one schema call or a list of them
        #[arg(short, long)]
        schema: PathBuf,
        /// JSON file with one build call or a list of them
        #[arg(short, long)]
        build: PathBuf,
    },

    /// Define schemas and report analysis diagnostics
    Check {
        /// JSON file with one schema call or a list of them
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Define schemas and print the structure of one of them
    Describe {
        /// JSON file with one schema call or a list of them
        #[arg(short, long)]
        schema: PathBuf,
        /// Registered schema to print (defaults to all)
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// A JSON file holds either a single call or a list of calls
#[derive(Deserialize)]
#[serde(untagged)]
enum CallFile {
    One(Call),
    Many(Vec<Call>),
}

fn read_calls(path: &Path) -> anyhow::Result<Vec<Call>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: CallFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse calls in {}", path.display()))?;
    Ok(match parsed {
        CallFile::One(call) => vec![call],
        CallFile::Many(calls) => calls,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BuilderConfig::load_from(cli.config.as_deref())?;
    let format = config.output.format;
    let mut builder = MetaBuilder::with_config(config);

    match cli.command {
        Commands::DefineAndBuild { schema, build } => {
            builder.define_all(&read_calls(&schema)?)?;
            let built = builder.build_all(&read_calls(&build)?)?;
            let mut rendered: Vec<serde_json::Value> = built.iter().map(|v| v.to_json()).collect();
            let output = if rendered.len() == 1 {
                rendered.remove(0)
            } else {
                serde_json::Value::Array(rendered)
            };
            println!("{}", format.render(&output)?);
            Ok(())
        }

        Commands::Check { schema } => {
            let calls = read_calls(&schema)?;
            builder.define_all(&calls)?;
            let (graph, diagnostics) = builder.analyze();
            println!(
                "Defined {} schema(s), {} reference(s)",
                graph.schema_count(),
                graph.edge_count()
            );
            if let Some(order) = graph.inheritance_order() {
                println!("Inheritance order: {}", order.join(", "));
            }
            if diagnostics.is_empty() {
                println!("✅ No problems found");
                return Ok(());
            }
            print!("{}", diagnostics);
            if diagnostics.has_errors() {
                anyhow::bail!("{} schema error(s) found", diagnostics.error_count());
            }
            Ok(())
        }

        Commands::Describe { schema, name } => {
            builder.define_all(&read_calls(&schema)?)?;
            let output = match name {
                Some(name) => builder.describe(&name)?,
                None => {
                    let mut all = serde_json::Map::new();
                    for name in builder.schema_names() {
                        all.insert(name.to_string(), builder.describe(name)?);
                    }
                    serde_json::Value::Object(all)
                }
            };
            println!("{}", format.render(&output)?);
            Ok(())
        }
    }
}
