//! End-to-end pipeline: schema files in, typed query reports out

use log::{debug, info};
use serde::Serialize;
use sqlty_ast::{Catalog, QueryCommand};
use sqlty_diagnostics::{Diagnostic, DiagnosticCollector, Result, SqltyError, SQL0401};
use sqlty_parser::{parse_queries, parse_schemas};
use sqlty_semantic::{resolve_views, AnalysisResult, Analyzer, ColumnOverrides};
use sqlty_types::{SqliteTypeResolver, TypeResolver};
use std::fs;
use std::path::Path;

use crate::config::Config;

/// Analysis result of one named query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    pub name: String,
    pub command: QueryCommand,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

/// Every query of one file, plus the problems found while splitting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub queries: Vec<QueryReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    /// File and query diagnostics in source order, without repeats
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut collector = DiagnosticCollector::new(self.path.clone());
        collector.extend(self.diagnostics.iter().cloned());
        for query in &self.queries {
            collector.extend(query.result.diagnostics.iter().cloned());
        }
        let mut diagnostics = collector.into_diagnostics();
        diagnostics.sort_by_key(|d| (d.line, d.column));
        diagnostics
    }

    pub fn query(&self, name: &str) -> Option<&QueryReport> {
        self.queries.iter().find(|q| q.name == name)
    }
}

/// A schema catalog with its settings, ready to analyze query files.
///
/// Views are resolved once when the schema is loaded; every query file is
/// then analyzed against the same read-only catalog.
pub struct Project {
    catalog: Option<Catalog>,
    overrides: ColumnOverrides,
    resolver: Box<dyn TypeResolver>,
    schema_diagnostics: Vec<Diagnostic>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    /// A project without a schema; every type stays unresolved
    pub fn new() -> Self {
        Self {
            catalog: None,
            overrides: ColumnOverrides::new(),
            resolver: Box::new(SqliteTypeResolver),
            schema_diagnostics: Vec::new(),
        }
    }

    /// Build the catalog from `(path, source)` schema files, in order
    pub fn with_schema<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new().load_schema(sources)
    }

    /// Use a different declared-type mapping. Views are resolved with the
    /// resolver in place when the schema is loaded.
    pub fn with_resolver(mut self, resolver: Box<dyn TypeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_overrides(mut self, overrides: ColumnOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn load_schema<'a>(mut self, sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let (catalog, mut diagnostics) = parse_schemas(sources);
        let (catalog, view_diagnostics) = resolve_views(&catalog, &*self.resolver);
        diagnostics.extend(view_diagnostics);
        info!(
            "loaded schema: {} relations, {} diagnostics",
            catalog.tables().count(),
            diagnostics.len()
        );
        self.catalog = Some(catalog);
        self.schema_diagnostics = diagnostics;
        self
    }

    /// Read schema files and overrides named by a configuration.
    ///
    /// A configuration without schema files yields a project without a
    /// catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        let project = Self::new().with_overrides(config.column_overrides()?);
        let files = config.schema_files()?;
        if files.is_empty() {
            return Ok(project);
        }
        let sources = files
            .iter()
            .map(|path| Ok((path.display().to_string(), read_source(path)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(project.load_schema(sources.iter().map(|(p, s)| (p.as_str(), s.as_str()))))
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Problems found in the schema files and views
    pub fn schema_diagnostics(&self) -> &[Diagnostic] {
        &self.schema_diagnostics
    }

    /// Analyze every named query of one query file
    pub fn analyze_source(&self, path: &str, source: &str) -> FileReport {
        let file = parse_queries(path, source);
        let analyzer = Analyzer::new(self.catalog.as_ref(), &*self.resolver)
            .with_overrides(&self.overrides);
        let queries = file
            .blocks
            .iter()
            .map(|block| QueryReport {
                name: block.name.clone(),
                command: block.command,
                result: analyzer.analyze(block),
            })
            .collect::<Vec<_>>();
        debug!("{path}: analyzed {} queries", queries.len());
        FileReport {
            path: file.path,
            queries,
            diagnostics: file.diagnostics,
        }
    }

    pub fn analyze_file(&self, path: &Path) -> Result<FileReport> {
        let source = read_source(path)?;
        Ok(self.analyze_source(&path.display().to_string(), &source))
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| SqltyError::system(SQL0401, format!("cannot read {}: {e}", path.display())))
}
