pub mod report;

use crate::types::{ReconcileConfig, DEFAULT_MAX_HEADER_BYTES};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for dicomitem
#[derive(Parser, Debug)]
#[command(name = "dicomitem")]
#[command(about = "Reconcile common DICOM metadata across the files of an item")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild and store the common metadata of an item directory
    Parse {
        #[arg(value_name = "ITEM_DIR")]
        item: PathBuf,
    },

    /// List the DICOM files of an item with their tags
    List {
        #[arg(value_name = "ITEM_DIR")]
        item: PathBuf,

        /// Comma-separated tags to keep, e.g. "Rows,(0028,0011)"
        #[arg(long)]
        filters: Option<String>,

        /// Re-read every file instead of using cached tags
        #[arg(long)]
        force: bool,
    },

    /// Print the stored aggregate of an item
    Show {
        #[arg(value_name = "ITEM_DIR")]
        item: PathBuf,
    },
}

/// Reconciliation settings shared by the binaries
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Maximum bytes read from one file while parsing its header
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_HEADER_BYTES)]
    pub max_header_bytes: u64,

    /// Do not store extracted tags on file documents
    #[arg(long, global = true)]
    pub no_cache: bool,
}

impl From<&ConfigArgs> for ReconcileConfig {
    fn from(args: &ConfigArgs) -> Self {
        ReconcileConfig::default()
            .max_header_bytes(args.max_header_bytes)
            .cache_file_metadata(!args.no_cache)
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}
