//! sqlty error codes following a structured numbering system
//!
//! Error code ranges:
//! - SQL0001-SQL0099: Parse errors (tokens, query files)
//! - SQL0100-SQL0199: Semantic errors (scope, type inference)
//! - SQL0300-SQL0399: Schema errors (DDL, catalog)
//! - SQL0400-SQL0499: System errors (I/O, configuration)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a parse error (0001-0099)
    pub const fn is_parse_error(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    /// Check if this is a semantic error (0100-0199)
    pub const fn is_semantic_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is a schema error (0300-0399)
    pub const fn is_schema_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SQL{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Parse errors (0001-0099)
    map.insert(1, ErrorInfo::new("Unexpected token"));
    map.insert(2, ErrorInfo::new("Unexpected end of input"));
    map.insert(3, ErrorInfo::new("Unterminated string literal"));
    map.insert(4, ErrorInfo::new("Unterminated quoted identifier"));
    map.insert(5, ErrorInfo::new("Unterminated block comment"));
    map.insert(6, ErrorInfo::new("Invalid character"));
    map.insert(7, ErrorInfo::new("Invalid query header")
        .with_help("Query headers look like `-- name: GetUser :one`"));
    map.insert(8, ErrorInfo::new("Duplicate query name"));
    map.insert(9, ErrorInfo::new("Unbalanced parentheses"));
    map.insert(10, ErrorInfo::new("Invalid annotation")
        .with_help("Annotations look like `-- @param id int64` or `-- @column total float64 null`"));
    map.insert(11, ErrorInfo::new("Empty query"));

    // Semantic errors (0100-0199)
    map.insert(100, ErrorInfo::new("Unknown table or alias")
        .with_help("Check that the table exists in the schema and is listed in FROM/JOIN"));
    map.insert(101, ErrorInfo::new("Unknown column"));
    map.insert(102, ErrorInfo::new("Ambiguous column")
        .with_help("Qualify the column with a table alias"));
    map.insert(103, ErrorInfo::new("Missing aggregate alias"));
    map.insert(104, ErrorInfo::new("Cannot infer type"));
    map.insert(105, ErrorInfo::new("Expression without schema mapping"));
    map.insert(106, ErrorInfo::new("Invalid common table expression"));
    map.insert(107, ErrorInfo::new("CTE column list mismatch"));
    map.insert(108, ErrorInfo::new("Recursive CTE column count mismatch"));
    map.insert(109, ErrorInfo::new("Cannot determine column name")
        .with_help("Add an alias with `AS name`"));
    map.insert(110, ErrorInfo::new("Schema catalog unavailable"));
    map.insert(111, ErrorInfo::new("Cannot expand star"));

    // Schema errors (0300-0399)
    map.insert(300, ErrorInfo::new("Invalid table definition"));
    map.insert(301, ErrorInfo::new("Duplicate table"));
    map.insert(302, ErrorInfo::new("Unknown table in schema statement"));
    map.insert(303, ErrorInfo::new("Duplicate column"));
    map.insert(304, ErrorInfo::new("Unknown column in schema statement"));
    map.insert(305, ErrorInfo::new("Invalid view definition"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("I/O error"));
    map.insert(402, ErrorInfo::new("Configuration error"));
    map.insert(404, ErrorInfo::new("File not found"));
    map.insert(406, ErrorInfo::new("Invalid format"));

    map
});

// Parse errors
pub const SQL0001: ErrorCode = ErrorCode::new(1);
pub const SQL0002: ErrorCode = ErrorCode::new(2);
pub const SQL0003: ErrorCode = ErrorCode::new(3);
pub const SQL0004: ErrorCode = ErrorCode::new(4);
pub const SQL0005: ErrorCode = ErrorCode::new(5);
pub const SQL0006: ErrorCode = ErrorCode::new(6);
pub const SQL0007: ErrorCode = ErrorCode::new(7);
pub const SQL0008: ErrorCode = ErrorCode::new(8);
pub const SQL0009: ErrorCode = ErrorCode::new(9);
pub const SQL0010: ErrorCode = ErrorCode::new(10);
pub const SQL0011: ErrorCode = ErrorCode::new(11);

// Semantic errors
pub const SQL0100: ErrorCode = ErrorCode::new(100);
pub const SQL0101: ErrorCode = ErrorCode::new(101);
pub const SQL0102: ErrorCode = ErrorCode::new(102);
pub const SQL0103: ErrorCode = ErrorCode::new(103);
pub const SQL0104: ErrorCode = ErrorCode::new(104);
pub const SQL0105: ErrorCode = ErrorCode::new(105);
pub const SQL0106: ErrorCode = ErrorCode::new(106);
pub const SQL0107: ErrorCode = ErrorCode::new(107);
pub const SQL0108: ErrorCode = ErrorCode::new(108);
pub const SQL0109: ErrorCode = ErrorCode::new(109);
pub const SQL0110: ErrorCode = ErrorCode::new(110);
pub const SQL0111: ErrorCode = ErrorCode::new(111);

// Schema errors
pub const SQL0300: ErrorCode = ErrorCode::new(300);
pub const SQL0301: ErrorCode = ErrorCode::new(301);
pub const SQL0302: ErrorCode = ErrorCode::new(302);
pub const SQL0303: ErrorCode = ErrorCode::new(303);
pub const SQL0304: ErrorCode = ErrorCode::new(304);
pub const SQL0305: ErrorCode = ErrorCode::new(305);

// System errors
pub const SQL0400: ErrorCode = ErrorCode::new(400);
pub const SQL0401: ErrorCode = ErrorCode::new(401);
pub const SQL0402: ErrorCode = ErrorCode::new(402);
pub const SQL0404: ErrorCode = ErrorCode::new(404);
pub const SQL0406: ErrorCode = ErrorCode::new(406);
