//! SQL parsing for sqlty
//!
//! This crate turns source files into the data the semantic analyzer works
//! on: a winnow tokenizer with absolute source positions, the named-query
//! file parser and the DDL schema parser that builds a [`Catalog`].

mod lexer;
mod query;
mod schema;
pub mod scan;

pub use lexer::{tokenize, tokenize_at, TokenizeError};
pub use query::{parse_projection, parse_queries, parse_statement, parse_tokens, QueryFile};
pub use schema::parse_schema;

use sqlty_ast::Catalog;
use sqlty_diagnostics::Diagnostic;

/// Parse several schema files in order into one catalog
pub fn parse_schemas<'a>(
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> (Catalog, Vec<Diagnostic>) {
    let mut catalog = Catalog::new();
    let mut diagnostics = Vec::new();
    for (path, source) in files {
        diagnostics.extend(parse_schema(path, source, &mut catalog));
    }
    (catalog, diagnostics)
}
