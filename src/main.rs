//! CLI Entry Point for bits-md
//!
//! Inspects and edits a stored dictionary file from the shell:
//! - Show the contents or list the keys
//! - Read, write or delete a single entry
//!
//! Values given to `set` are parsed as YAML, so `3` is a number, `[1, 2]` a list
//! and `"3"` a string. Keys are parsed the same way but must be scalars; quote a
//! key (`'"7"'`) to force a string. Every mutating command flushes before
//! exiting, keeping the file's existing title unless `--title` is given.
//!
//! # Usage
//!
//! ```bash
//! bits-md .re_md_dict.yml show
//! bits-md .re_md_dict.yml set sample '{name: Si, temperature: 295}'
//! bits-md .re_md_dict.yml get sample
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_bits::logging::{self, OutputFormat, TracingConfig};
use rust_bits::stored_dict::{format, validate, StoredDict};
use serde_yaml::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bits-md")]
#[command(about = "Inspect and edit a stored dictionary file", long_about = None)]
struct Cli {
    /// Stored dictionary file
    file: PathBuf,

    /// Comment written at the top of the file (default: keep the existing one)
    #[arg(long)]
    title: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the contents as YAML
    Show,

    /// List the keys in insertion order
    Keys,

    /// Print one value as YAML
    Get {
        /// Key to look up
        key: String,
    },

    /// Store one value
    Set {
        /// Key to store
        key: String,

        /// Value, parsed as YAML
        value: String,
    },

    /// Remove one entry
    Delete {
        /// Key to remove
        key: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = logging::parse_log_level(&cli.log_level)?;
    logging::init(TracingConfig::new(level).with_format(OutputFormat::Compact))?;

    let title = match cli.title {
        Some(title) => Some(title),
        None => format::read_title(&cli.file)?,
    };
    let mut builder = StoredDict::builder(&cli.file);
    if let Some(title) = title {
        builder = builder.title(title);
    }
    let store = builder
        .open()
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;

    match cli.command {
        Commands::Show => print!("{}", serde_yaml::to_string(&store.snapshot())?),
        Commands::Keys => {
            for key in store.keys() {
                println!("{}", validate::describe(&key));
            }
        }
        Commands::Get { key } => {
            let value = store.try_get(parse_key(&key))?;
            print!("{}", serde_yaml::to_string(&value)?);
        }
        Commands::Set { key, value } => {
            let value: Value = serde_yaml::from_str(&value)
                .with_context(|| format!("Value for '{key}' is not valid YAML"))?;
            let md = store.scoped();
            md.set(parse_key(&key), value)?;
            md.finish()?;
        }
        Commands::Delete { key } => {
            let md = store.scoped();
            md.delete(parse_key(&key))?;
            md.finish()?;
        }
    }

    Ok(())
}

/// Reads a command-line key as a YAML scalar, falling back to the literal text.
fn parse_key(text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(key @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => key,
        _ => Value::String(text.to_string()),
    }
}
