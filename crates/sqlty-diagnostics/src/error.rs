//! sqlty error types

use crate::{ErrorCode, Position, SourceLocation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Error - generation of the affected query must not proceed
    Error,
    /// Warning - generation proceeds with a degraded or default type
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A located, severity-tagged message describing an analysis issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Path of the file the diagnostic points into
    pub path: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Additional context or help
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Create a new warning diagnostic
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            path: String::new(),
            line: 1,
            column: 1,
            help: None,
        }
    }

    /// Set the file path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the line and column
    pub fn with_position(mut self, position: Position) -> Self {
        self.line = position.line;
        self.column = position.column;
        self
    }

    /// Set help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render with terminal colors, `path:line:col: severity[code]: message`
    #[cfg(feature = "colored")]
    pub fn render_colored(&self) -> String {
        use colored::Colorize;

        let severity = match self.severity {
            Severity::Error => format!("{}[{}]", self.severity, self.code).red().bold(),
            Severity::Warning => format!("{}[{}]", self.severity, self.code).yellow().bold(),
        };
        let location = format!("{}:{}:{}", self.path, self.line, self.column).cyan();
        let mut out = format!("{location}: {severity}: {}", self.message);
        if let Some(help) = &self.help {
            out.push_str(&format!("\n  {} {}", "help:".green(), help));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}[{}]: {}",
            self.path, self.line, self.column, self.severity, self.code, self.message
        )
    }
}

/// Main sqlty error type
#[derive(Debug, Clone, Error)]
pub enum SqltyError {
    /// Parse error (tokens, query files)
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        location: Option<SourceLocation>,
    },

    /// Semantic error (scope resolution, type inference)
    #[error("{code}: {message}")]
    Semantic {
        code: ErrorCode,
        message: String,
        location: Option<SourceLocation>,
    },

    /// Schema error (DDL, catalog construction)
    #[error("{code}: {message}")]
    Schema {
        code: ErrorCode,
        message: String,
        location: Option<SourceLocation>,
    },

    /// System error
    #[error("{code}: {message}")]
    System {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },
}

impl SqltyError {
    /// Create a parse error
    pub fn parse(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Create a parse error with location
    pub fn parse_at(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            location: Some(location),
        }
    }

    /// Create a semantic error
    pub fn semantic(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Semantic {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Create a schema error with location
    pub fn schema_at(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Schema {
            code,
            message: message.into(),
            location: Some(location),
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. } => *code,
            Self::Semantic { code, .. } => *code,
            Self::Schema { code, .. } => *code,
            Self::System { code, .. } => *code,
        }
    }

    /// Get the error message without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Parse { message, .. }
            | Self::Semantic { message, .. }
            | Self::Schema { message, .. }
            | Self::System { message, .. } => message.clone(),
        }
    }

    /// Get the location if available
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Parse { location, .. } => location.as_ref(),
            Self::Semantic { location, .. } => location.as_ref(),
            Self::Schema { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    /// Convert to an error diagnostic for `path`
    pub fn to_diagnostic(&self, path: &str) -> Diagnostic {
        match self {
            Self::System { context, .. } => {
                let mut diag = Diagnostic::error(self.code(), self.message()).with_path(path);
                if let Some(ctx) = context {
                    diag = diag.with_help(ctx.clone());
                }
                diag
            }
            _ => {
                let mut diag = Diagnostic::error(self.code(), self.message()).with_path(path);
                if let Some(loc) = self.location() {
                    diag = diag.with_position(loc.position());
                }
                if let Some(help) = self.code().info().help {
                    diag = diag.with_help(help);
                }
                diag
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SQL0003, SQL0101};

    #[test]
    fn test_parse_error_to_diagnostic() {
        let err = SqltyError::parse_at(
            SQL0003,
            "unterminated string literal",
            SourceLocation::new(2, 8, 20, 1),
        );

        assert_eq!(err.code(), SQL0003);
        let diag = err.to_diagnostic("queries.sql");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!((diag.line, diag.column), (2, 8));
        assert_eq!(diag.path, "queries.sql");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning(SQL0101, "unknown column 'nme'")
            .with_path("q.sql")
            .with_position(Position::new(3, 12));

        insta::assert_snapshot!(diag.to_string(), @"q.sql:3:12: warning[SQL0101]: unknown column 'nme'");
    }
}
