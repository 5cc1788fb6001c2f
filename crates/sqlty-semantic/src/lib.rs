//! Semantic analysis for sqlty
//!
//! Given a schema [`Catalog`](sqlty_ast::Catalog) and a parsed
//! [`QueryBlock`](sqlty_ast::QueryBlock), the analyzer resolves every output
//! column and parameter to a [`TypeInfo`](sqlty_types::TypeInfo) and
//! reports unknown, ambiguous or untypeable references as diagnostics.
//!
//! ```text
//! catalog ─► base scope ─► CTEs ─► segment scopes ─► columns ─► params ─► validation
//! ```

mod analyzer;
mod columns;
mod cte;
mod params;
mod scope;
mod segments;
mod validator;
mod views;

pub use analyzer::{AnalysisResult, Analyzer};
pub use columns::ResultColumn;
pub use params::ResultParam;
pub use scope::{override_key, relation_refs, ColumnOverrides, LookupError, RelationRef, Scope, ScopeColumn, ScopeEntry};
pub use views::resolve_views;
