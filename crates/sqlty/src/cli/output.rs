//! Output formatting utilities

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::{Diagnostic, FileReport, QueryReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    JsonPretty,
    Table,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "table" => Self::Table,
            _ => Self::JsonPretty,
        }
    }
}

/// Set up color output based on user preference
pub fn setup_colors(mode: &str) {
    match mode.to_lowercase().as_str() {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => colored::control::set_override(io::stdout().is_terminal()),
    }
}

/// Format an error for display
pub fn format_error(error: &anyhow::Error) -> String {
    format!("{} {:#}", "Error:".red().bold(), error)
}

/// Format a success message for display
pub fn format_success(message: &str) -> String {
    format!("{} {}", "Success:".green().bold(), message)
}

/// One diagnostic line (plus help) in `path:line:col: severity[code]: message` form
pub fn format_diagnostic(diag: &Diagnostic) -> String {
    diag.render_colored()
}

/// `N error(s), M warning(s)`, colored by kind
pub fn format_counts(errors: usize, warnings: usize) -> String {
    let mut parts = Vec::new();
    if errors > 0 {
        parts.push(format!("{errors} error(s)").red().to_string());
    }
    if warnings > 0 {
        parts.push(format!("{warnings} warning(s)").yellow().to_string());
    }
    parts.join(", ")
}

/// Write output to a file or stdout
pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    if let Some(path) = output_file {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write to output file: {}", path.display()))?;
        eprintln!(
            "{}",
            format_success(&format!("Output written to {}", path.display()))
        );
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Render analysis reports in the requested format
pub fn format_reports(reports: &[FileReport], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(reports).context("Failed to serialize JSON"),
        OutputFormat::JsonPretty => {
            serde_json::to_string_pretty(reports).context("Failed to serialize JSON")
        }
        OutputFormat::Table => Ok(format_tables(reports)),
    }
}

#[derive(Tabled)]
struct ColumnRow {
    #[tabled(rename = "Column")]
    name: String,
    #[tabled(rename = "Type")]
    ty: String,
    #[tabled(rename = "Relation")]
    relation: String,
}

#[derive(Tabled)]
struct ParamRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Type")]
    ty: String,
    #[tabled(rename = "Style")]
    style: String,
}

fn format_tables(reports: &[FileReport]) -> String {
    let mut sections = Vec::new();
    for report in reports {
        for query in &report.queries {
            sections.push(format_query_table(&report.path, query));
        }
    }
    if sections.is_empty() {
        return "(no queries)".to_string();
    }
    sections.join("\n\n")
}

fn format_query_table(path: &str, query: &QueryReport) -> String {
    let mut out = format!(
        "{} {} {}",
        query.name.bold(),
        query.command,
        format!("({path})").dimmed()
    );

    if !query.result.columns.is_empty() {
        let rows = query.result.columns.iter().map(|c| ColumnRow {
            name: c.name.clone(),
            ty: c.ty.to_string(),
            relation: c.relation.clone(),
        });
        out.push('\n');
        out.push_str(&Table::new(rows).with(Style::modern()).to_string());
    }

    if !query.result.params.is_empty() {
        let rows = query.result.params.iter().enumerate().map(|(i, p)| ParamRow {
            index: p.number.unwrap_or(i + 1),
            name: p.name.clone(),
            ty: if p.variadic { format!("{} (variadic)", p.ty) } else { p.ty.to_string() },
            style: format!("{:?}", p.style).to_lowercase(),
        });
        out.push('\n');
        out.push_str(&Table::new(rows).with(Style::modern()).to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Project;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::parse("pretty"), OutputFormat::JsonPretty);
    }

    #[test]
    fn test_table_output_lists_columns_and_params() {
        colored::control::set_override(false);
        let project = Project::with_schema([(
            "schema.sql",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
        )]);
        let report = project.analyze_source(
            "q.sql",
            "-- name: GetUser :one\nSELECT id, name FROM users WHERE id = ?;\n",
        );
        let table = format_reports(&[report], OutputFormat::Table).unwrap();
        assert!(table.starts_with("GetUser :one (q.sql)"));
        assert!(table.contains("string?"));
        assert!(table.contains("Parameter"));
    }
}
