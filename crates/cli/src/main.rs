//! attrmap command-line tool.
//!
//! Loads an attribute mapping configuration and runs the translation
//! operations against JSON records, so operators can check a mapping before
//! deploying it to a proxy.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use attrmap_core::{AttributeMapConfig, AttributeMapper, ExternalAttributes, InternalAttributes};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// attrmap command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "attrmap",
    version,
    about = "Translate attribute records between internal and external profiles"
)]
struct Cli {
    /// Path to the TOML or JSON attribute configuration.
    #[arg(short, long, global = true, default_value = "./attributes.toml")]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print a summary.
    Validate,

    /// List the profiles that have plain attribute mappings.
    Profiles,

    /// Translate external attribute names to internal names.
    Filter {
        /// Attribute profile of the names (e.g. saml, openid).
        #[arg(short, long)]
        profile: String,

        /// External attribute names.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Translate an external JSON record to the internal representation.
    ToInternal {
        /// Attribute profile of the input record.
        #[arg(short, long)]
        profile: String,

        /// JSON input file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Translate an internal JSON record to an external profile.
    FromInternal {
        /// Attribute profile to produce.
        #[arg(short, long)]
        profile: String,

        /// JSON input file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate => cmd_validate(&cli.config),
        command => {
            let mapper = load_mapper(&cli.config)?;

            match command {
                Commands::Profiles => cmd_profiles(&mapper),
                Commands::Filter { profile, names } => cmd_filter(&mapper, &profile, &names),
                Commands::ToInternal { profile, input } => {
                    cmd_to_internal(&mapper, &profile, &input)
                }
                Commands::FromInternal { profile, input } => {
                    cmd_from_internal(&mapper, &profile, &input)
                }
                Commands::Validate => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_mapper(path: &Path) -> Result<AttributeMapper> {
    AttributeMapper::from_file(path)
        .with_context(|| format!("failed to load attribute configuration {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        AttributeMapConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] Structure is valid");

    let mapper = match AttributeMapper::new(config) {
        Ok(mapper) => {
            println!("  [OK] All mappings and templates are valid");
            mapper
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    };

    let config = mapper.config();
    let options = mapper.options();
    println!();
    println!("Configuration summary:");
    println!("  Internal attributes : {}", config.attributes.len());
    println!(
        "  Template attributes : {}",
        config.template_attributes.as_ref().map_or(0, |t| t.len())
    );
    println!("  Profiles            : {}", config.profiles().join(", "));
    println!("  Nested separator    : {}", options.separator);
    println!("  Multivalue separator: {}", options.multivalue_separator);
    println!("  Template marker     : {}", options.template_marker);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_profiles(mapper: &AttributeMapper) -> Result<()> {
    let profiles = mapper.profiles();
    if profiles.is_empty() {
        println!("No profiles configured.");
        return Ok(());
    }
    for profile in profiles {
        println!("{}", profile);
    }
    Ok(())
}

fn cmd_filter(mapper: &AttributeMapper, profile: &str, names: &[String]) -> Result<()> {
    for name in mapper.to_internal_filter(profile, names) {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_to_internal(mapper: &AttributeMapper, profile: &str, input: &str) -> Result<()> {
    let record: ExternalAttributes = match read_json(input)? {
        Value::Object(map) => map,
        other => anyhow::bail!("expected a JSON object, got {}", json_kind(&other)),
    };
    let internal = mapper.to_internal(profile, &record);
    print_json(&internal)
}

fn cmd_from_internal(mapper: &AttributeMapper, profile: &str, input: &str) -> Result<()> {
    let record: InternalAttributes = serde_json::from_value(read_json(input)?)
        .context("internal record must map attribute names to lists of strings")?;
    let external = mapper.from_internal(profile, &record);
    print_json(&external)
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn read_json(input: &str) -> Result<Value> {
    let contents = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input))?
    };
    debug!(bytes = contents.len(), "read input record");
    serde_json::from_str(&contents).context("input is not valid JSON")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
