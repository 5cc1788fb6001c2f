//! sqlty type system
//!
//! This crate defines the semantic types query results and parameters are
//! mapped to, the [`TypeInfo`] carried by every resolved column and
//! parameter, and the pluggable [`TypeResolver`] that maps declared column
//! types to semantic types.

mod resolver;
mod type_system;

pub use resolver::*;
pub use type_system::*;
