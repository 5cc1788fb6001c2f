//! sqlty abstract syntax definitions
//!
//! This crate defines the data shared between the parser and the semantic
//! analyzer: the token stream, the coarse per-query AST and the in-memory
//! schema catalog.

mod catalog;
mod query;
mod token;

pub use catalog::*;
pub use query::*;
pub use token::*;

pub use sqlty_diagnostics::{Position, Span};

/// Normalize a relation or column name for case-insensitive lookup
pub fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}
