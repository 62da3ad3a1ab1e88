//! Command-line interface for datasnap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datasnap")]
#[command(about = "A content-addressed, versioned store for structured datasets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override workspace location
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize datasnap workspace
    Init {
        /// Rewrite config.json even if a workspace exists
        #[arg(long)]
        force: bool,

        /// Peername recorded in exported file names
        #[arg(long)]
        peername: Option<String>,
    },

    /// Save a new version of a dataset
    Save {
        /// Dataset name
        name: String,

        /// Body file (csv, json or ndjson)
        #[arg(long)]
        body: Option<PathBuf>,

        /// Directory of component files (meta.json, structure.json, body.csv, ...)
        #[arg(long, conflicts_with = "body")]
        dir: Option<PathBuf>,

        /// Meta component as JSON
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Structure component as JSON
        #[arg(long)]
        structure: Option<PathBuf>,

        /// Readme text (markdown)
        #[arg(long)]
        readme: Option<PathBuf>,

        /// Commit title, generated when omitted
        #[arg(long)]
        title: Option<String>,

        /// Commit message, generated when omitted
        #[arg(long)]
        message: Option<String>,

        /// Save even when nothing changed
        #[arg(long)]
        force: bool,

        /// Pin the new version in the store
        #[arg(long)]
        pin: bool,

        /// Entries per pipeline batch (must be > 0)
        #[arg(long, value_parser = validate_batch_size)]
        batch_size: Option<usize>,

        /// Don't draw a progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Show the version history of a dataset
    Log {
        /// Dataset name
        name: String,

        /// Show at most this many versions
        #[arg(long)]
        limit: Option<usize>,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Show one version of a dataset
    Show {
        /// Dataset reference: name, name@/path or /path
        reference: String,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Export a dataset version as a .tar.zst archive
    Export {
        /// Dataset reference: name, name@/path or /path
        reference: String,

        /// Output directory
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// List datasets and workspace statistics
    List {
        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },
}

/// Parse output format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

/// Validate that batch size is greater than 0
fn validate_batch_size(s: &str) -> Result<usize, String> {
    let batch_size: usize = s
        .parse()
        .map_err(|_| format!("Invalid batch size: '{}'. Must be a positive integer.", s))?;

    if batch_size == 0 {
        return Err("Batch size must be greater than 0".to_string());
    }

    Ok(batch_size)
}
