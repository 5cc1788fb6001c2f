//! CLI functionality for the sqlty tool
//!
//! This module contains all CLI-related functionality including:
//! - Configuration loading and flag merging
//! - The `check` and `analyze` commands
//! - Output formatting

pub mod analyze;
pub mod check;
pub mod output;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::Config;

/// Paths and flags given on the command line
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub config: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub schema: Vec<PathBuf>,
    pub strict: bool,
}

impl Inputs {
    /// Effective configuration: `--config`, else `sqlty.json` in `cwd`,
    /// with command-line values taking precedence
    pub fn resolve(&self, cwd: &Path) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
            None => Config::discover(cwd)
                .context("Failed to load configuration")?
                .unwrap_or_default(),
        };
        if !self.files.is_empty() {
            config.queries = self.files.clone();
        }
        if !self.schema.is_empty() {
            config.schema = self.schema.clone();
        }
        config.strict |= self.strict;

        if config.queries.is_empty() {
            anyhow::bail!("No query files specified (pass FILES or set \"queries\" in {})", crate::CONFIG_FILE);
        }
        Ok(config)
    }
}
