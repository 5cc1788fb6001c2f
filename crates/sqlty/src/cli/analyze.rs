//! Analyze command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::output::{self, OutputFormat};
use crate::{Config, FileReport, Project};

/// Configuration for analyze command
pub struct AnalyzeConfig {
    pub config: Config,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Typed model of every query file named by the configuration
pub fn reports(config: &Config) -> Result<Vec<FileReport>> {
    let project = Project::from_config(config).context("Failed to load schema")?;
    let files = config.query_files().context("Failed to collect query files")?;
    files
        .iter()
        .map(|file| {
            project
                .analyze_file(file)
                .with_context(|| format!("Failed to analyze {}", file.display()))
        })
        .collect()
}

/// Print the typed model; returns whether it is free of errors
pub fn analyze(config: AnalyzeConfig) -> Result<bool> {
    let reports = reports(&config.config)?;
    let content = output::format_reports(&reports, config.format)?;
    output::write_output(&content, config.output_file.as_deref())?;

    let errors = reports
        .iter()
        .flat_map(|r| r.all_diagnostics())
        .filter(|d| d.is_error())
        .count();
    if errors > 0 {
        eprintln!("{}", output::format_counts(errors, 0));
    }
    Ok(errors == 0)
}
