//! Typed SQL for SQLite
//!
//! sqlty reads a schema (`CREATE TABLE` / `CREATE VIEW`) and files of named
//! queries, and resolves every output column and parameter of every query
//! to a semantic type with nullability. Problems are reported as located
//! diagnostics rather than failures.
//!
//! # Example
//!
//! ```
//! use sqlty::Project;
//!
//! let project = Project::with_schema([(
//!     "schema.sql",
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
//! )]);
//! let report = project.analyze_source(
//!     "queries.sql",
//!     "-- name: GetUser :one\nSELECT id, name FROM users WHERE id = ?;\n",
//! );
//!
//! let query = report.query("GetUser").unwrap();
//! assert_eq!(query.result.columns.len(), 2);
//! assert_eq!(query.result.params[0].name, "id");
//! ```

// Re-export all public APIs from internal crates
pub use sqlty_ast as ast;
pub use sqlty_diagnostics as diagnostics;
pub use sqlty_parser as parser;
pub use sqlty_semantic as semantic;
pub use sqlty_types as types;

mod config;
mod project;

pub use config::{expand_sql_files, ColumnOverride, Config, CONFIG_FILE};
pub use project::{FileReport, Project, QueryReport};

// Convenience re-exports
pub use sqlty_diagnostics::{Diagnostic, Result, Severity, SqltyError};
pub use sqlty_semantic::{AnalysisResult, Analyzer, ResultColumn, ResultParam};
pub use sqlty_types::{SemanticType, TypeInfo};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
