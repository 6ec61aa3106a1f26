//! CLI argument parser for the `svs-inspect` binary.
//!
//! Builds a dataset from `--data path,name,type` declarations and prints the
//! field shapes of the first records.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{DatasetConfig, Mode};
use crate::dataset::ModalitySpec;
use crate::error::{DatasetError, Result};

/// Number of records printed when `--limit` is not given.
pub const DEFAULT_LIMIT: usize = 5;

/// svs-inspect: load singing-voice records and print their field shapes
#[derive(Parser, Debug)]
#[command(name = "svs-inspect")]
#[command(about = "Inspect multi-modal singing voice datasets")]
#[command(version)]
pub struct Cli {
    /// Modality declaration as path,name,loader_type (repeatable)
    #[arg(short, long = "data", value_parser = parse_modality)]
    pub data: Vec<ModalitySpec>,

    /// JSON configuration file; missing fields take defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of records to print
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Seed for augmentation and random loaders
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Dataset mode (augmentation only runs in "train")
    #[arg(short, long)]
    pub mode: Option<String>,

    /// List the registered loader types and exit
    #[arg(long)]
    pub list_types: bool,
}

fn parse_modality(s: &str) -> std::result::Result<ModalitySpec, String> {
    ModalitySpec::parse(s).map_err(|e| e.message)
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns the effective record limit.
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Loads the configuration: file (or defaults), then environment
    /// overrides, then command-line flags.
    pub fn dataset_config(&self) -> Result<DatasetConfig> {
        let config = match &self.config {
            Some(path) => DatasetConfig::from_json_file(path)?,
            None => DatasetConfig::default(),
        };
        let mut config = config.with_env();
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(mode) = &self.mode {
            config.mode = Mode::parse(mode);
        }
        if let Some(reason) = config.validate() {
            return Err(DatasetError::invalid_config(reason));
        }
        Ok(config)
    }
}
