//! Check command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use log::debug;

use super::output;
use crate::{Config, Diagnostic, Project};

/// Outcome of a check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub files: usize,
    pub errors: usize,
    pub warnings: usize,
    pub strict: bool,
}

impl CheckSummary {
    /// Errors fail the check; in strict mode so do warnings
    pub fn passed(&self) -> bool {
        self.errors == 0 && !(self.strict && self.warnings > 0)
    }

    fn count(&mut self, diagnostics: &[Diagnostic]) {
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        self.errors += errors;
        self.warnings += diagnostics.len() - errors;
    }
}

/// Analyze every query file and collect the diagnostics in print order
pub fn run(config: &Config) -> Result<(CheckSummary, Vec<Diagnostic>)> {
    let project = Project::from_config(config).context("Failed to load schema")?;
    let files = config.query_files().context("Failed to collect query files")?;
    if files.is_empty() {
        anyhow::bail!("No .sql query files found");
    }

    let mut summary = CheckSummary {
        files: files.len(),
        strict: config.strict,
        ..CheckSummary::default()
    };
    let mut diagnostics = project.schema_diagnostics().to_vec();
    summary.count(&diagnostics);

    for file in &files {
        debug!("checking {}", file.display());
        let report = project
            .analyze_file(file)
            .with_context(|| format!("Failed to analyze {}", file.display()))?;
        let found = report.all_diagnostics();
        summary.count(&found);
        diagnostics.extend(found);
    }
    Ok((summary, diagnostics))
}

/// Print diagnostics and a summary; returns whether the check passed
pub fn check(config: &Config) -> Result<bool> {
    let (summary, diagnostics) = run(config)?;
    for diag in &diagnostics {
        println!("{}", output::format_diagnostic(diag));
    }

    if summary.errors == 0 && summary.warnings == 0 {
        println!(
            "{}",
            output::format_success(&format!("All {} file(s) checked", summary.files))
        );
        return Ok(true);
    }

    println!();
    let label = if summary.passed() { "Checked:".yellow().bold() } else { "Check failed:".red().bold() };
    eprintln!("{label} found {}", output::format_counts(summary.errors, summary.warnings));
    if summary.strict && summary.errors == 0 && summary.warnings > 0 {
        eprintln!("{}", "Strict mode: treating warnings as errors".yellow());
    }
    Ok(summary.passed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, false, true)]
    #[case(0, 2, false, true)]
    #[case(0, 2, true, false)]
    #[case(1, 0, false, false)]
    fn test_summary_passed(
        #[case] errors: usize,
        #[case] warnings: usize,
        #[case] strict: bool,
        #[case] passed: bool,
    ) {
        let summary = CheckSummary {
            files: 1,
            errors,
            warnings,
            strict,
        };
        assert_eq!(summary.passed(), passed);
    }
}
