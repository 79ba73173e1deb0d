//! Command-line interface built on clap.
//!
//! [`Cli`] holds the subcommands ([`Command`]) and the global flags that feed
//! the command-line configuration layer.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{MAX_RETRIES, TARGET_QUEUE_SIZE, parse_key_value};

/// Keeps an encoding platform's queue filled with a batch of encodings.
#[derive(Debug, Parser)]
#[command(name = "batchenc", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration override, e.g. `--set BITMOVIN_API_KEY=...`. Repeatable.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Number of encodings to keep queued on the platform.
    #[arg(long, global = true)]
    pub target_queue_size: Option<usize>,

    /// Retries per job before giving up.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the batch until every encoding has finished or been given up.
    Run {
        /// JSON or TOML file with a `jobs` array. Without it the batch is
        /// generated from HTTP_INPUT_FILE_PATH.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Write the final report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the batch and its output paths without calling the platform.
    Plan {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// The command-line configuration layer: `--set` pairs plus the dedicated flags.
    ///
    /// Dedicated flags win over a `--set` of the same key.
    pub fn config_overrides(&self) -> HashMap<String, String> {
        let mut overrides: HashMap<String, String> = self.overrides.iter().cloned().collect();
        if let Some(size) = self.target_queue_size {
            overrides.insert(TARGET_QUEUE_SIZE.to_string(), size.to_string());
        }
        if let Some(retries) = self.max_retries {
            overrides.insert(MAX_RETRIES.to_string(), retries.to_string());
        }
        overrides
    }
}
