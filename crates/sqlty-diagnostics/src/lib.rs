//! sqlty diagnostics and error handling
//!
//! This crate provides the error handling infrastructure shared by the sqlty crates,
//! including error codes, source positions, diagnostics and the deduplicating
//! diagnostic collector used during semantic analysis.

mod collector;
mod error;
mod error_code;
mod span;

pub use collector::*;
pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for sqlty operations
pub type Result<T> = std::result::Result<T, SqltyError>;
