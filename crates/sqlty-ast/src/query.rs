//! Query AST nodes
//!
//! The query AST is deliberately coarse: it records what a statement
//! projects and binds, plus enough raw text and positions for the analyzer to
//! re-tokenize and inspect the statement itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Position;

/// The leading verb of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryVerb {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryVerb {
    pub fn from_keyword(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" | "VALUES" => Self::Select,
            "INSERT" | "REPLACE" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Statements that may carry a `RETURNING` clause
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for QueryVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Result cardinality requested by the query header (`:one`, `:many`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCommand {
    One,
    Many,
    Exec,
    ExecRows,
    ExecResult,
}

impl FromStr for QueryCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches(':').to_ascii_lowercase().as_str() {
            "one" => Ok(Self::One),
            "many" => Ok(Self::Many),
            "exec" => Ok(Self::Exec),
            "execrows" => Ok(Self::ExecRows),
            "execresult" => Ok(Self::ExecResult),
            other => Err(format!("unknown query command ':{other}'")),
        }
    }
}

impl fmt::Display for QueryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, ":one"),
            Self::Many => write!(f, ":many"),
            Self::Exec => write!(f, ":exec"),
            Self::ExecRows => write!(f, ":execrows"),
            Self::ExecResult => write!(f, ":execresult"),
        }
    }
}

/// How a parameter is spelled in the SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamStyle {
    /// `?`
    Positional,
    /// `:name`, `@name`, `$name`, `sqlc.arg(name)`
    Named,
    /// `$1`, `?1`
    Numbered,
}

/// A bound parameter reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    /// Declared name, if the style carries one
    pub name: Option<String>,
    pub style: ParamStyle,
    /// Number for `$N` / `?N` parameters
    pub number: Option<usize>,
    /// Position of the parameter token (the `sqlc` token for macros)
    pub position: Position,
    /// `sqlc.slice(..)`: binds a list of values
    pub variadic: bool,
    /// `sqlc.narg(..)`: always nullable
    pub force_nullable: bool,
}

impl ParamRef {
    pub fn positional(position: Position) -> Self {
        Self {
            name: None,
            style: ParamStyle::Positional,
            number: None,
            position,
            variadic: false,
            force_nullable: false,
        }
    }

    pub fn named(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: Some(name.into()),
            style: ParamStyle::Named,
            number: None,
            position,
            variadic: false,
            force_nullable: false,
        }
    }

    pub fn numbered(number: usize, position: Position) -> Self {
        Self {
            name: None,
            style: ParamStyle::Numbered,
            number: Some(number),
            position,
            variadic: false,
            force_nullable: false,
        }
    }

    pub fn with_variadic(mut self, variadic: bool) -> Self {
        self.variadic = variadic;
        self
    }

    pub fn with_force_nullable(mut self, nullable: bool) -> Self {
        self.force_nullable = nullable;
        self
    }
}

/// One projected item of a SELECT list or RETURNING clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    /// Raw expression text without the alias
    pub expr: String,
    /// Table qualifier for `t.col` and `t.*`
    pub table: Option<String>,
    /// Column name when the expression is a plain column reference
    pub name: Option<String>,
    /// Explicit or implicit alias
    pub alias: Option<String>,
    /// `*` or `t.*`
    pub star: bool,
    /// Position of the first expression token
    pub position: Position,
}

impl ColumnExpr {
    pub fn expression(expr: impl Into<String>, position: Position) -> Self {
        Self {
            expr: expr.into(),
            table: None,
            name: None,
            alias: None,
            star: false,
            position,
        }
    }

    pub fn column(table: Option<&str>, name: &str, position: Position) -> Self {
        let expr = match table {
            Some(t) => format!("{t}.{name}"),
            None => name.to_string(),
        };
        Self {
            expr,
            table: table.map(str::to_string),
            name: Some(name.to_string()),
            alias: None,
            star: false,
            position,
        }
    }

    pub fn star(table: Option<&str>, position: Position) -> Self {
        let expr = match table {
            Some(t) => format!("{t}.*"),
            None => "*".to_string(),
        };
        Self {
            expr,
            table: table.map(str::to_string),
            name: None,
            alias: None,
            star: true,
            position,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// True for `col` / `t.col`
    pub fn is_column_ref(&self) -> bool {
        !self.star && self.name.is_some()
    }
}

/// A common table expression from a `WITH` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteDef {
    pub name: String,
    /// Explicit `name(a, b)` column list
    pub columns: Option<Vec<String>>,
    /// Raw body text between the parentheses
    pub body: String,
    /// Position of the first character of `body`
    pub body_position: Position,
    /// Position of the CTE name
    pub position: Position,
}

/// A parsed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub verb: QueryVerb,
    /// Projection of a SELECT; empty for other verbs
    pub columns: Vec<ColumnExpr>,
    /// Parameters in source order
    pub params: Vec<ParamRef>,
    pub ctes: Vec<CteDef>,
    /// `WITH RECURSIVE`
    pub recursive: bool,
}

impl Query {
    pub fn new(verb: QueryVerb) -> Self {
        Self {
            verb,
            columns: Vec::new(),
            params: Vec::new(),
            ctes: Vec::new(),
            recursive: false,
        }
    }
}

/// Explicit type for a parameter or output column from an annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeOverride {
    /// Parameter or column name
    pub name: String,
    /// Type name as written (`int64`, `TEXT`, ...)
    pub type_name: String,
    pub nullable: bool,
    pub position: Position,
}

/// A named query from a query file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBlock {
    pub name: String,
    pub command: QueryCommand,
    pub path: String,
    /// Position of the first character of `sql`
    pub position: Position,
    /// Raw statement text
    pub sql: String,
    /// Leading comment lines after the header
    pub doc: Option<String>,
    pub query: Query,
    pub param_overrides: Vec<TypeOverride>,
    pub column_overrides: Vec<TypeOverride>,
}

impl QueryBlock {
    pub fn verb(&self) -> QueryVerb {
        self.query.verb
    }

    pub fn param_override(&self, name: &str) -> Option<&TypeOverride> {
        self.param_overrides
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn column_override(&self, name: &str) -> Option<&TypeOverride> {
        self.column_overrides
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip() {
        for cmd in ["one", ":many", "exec", ":execrows", "execresult"] {
            let parsed: QueryCommand = cmd.parse().unwrap();
            assert_eq!(parsed.to_string().trim_start_matches(':'), cmd.trim_start_matches(':'));
        }
        assert!("first".parse::<QueryCommand>().is_err());
    }

    #[test]
    fn test_verb_from_keyword() {
        assert_eq!(QueryVerb::from_keyword("select"), QueryVerb::Select);
        assert_eq!(QueryVerb::from_keyword("REPLACE"), QueryVerb::Insert);
        assert_eq!(QueryVerb::from_keyword("pragma"), QueryVerb::Other);
        assert!(QueryVerb::Delete.is_mutation());
        assert!(!QueryVerb::Select.is_mutation());
    }

    #[test]
    fn test_column_expr_constructors() {
        let col = ColumnExpr::column(Some("u"), "id", Position::START).with_alias("user_id");
        assert_eq!(col.expr, "u.id");
        assert!(col.is_column_ref());

        let star = ColumnExpr::star(Some("u"), Position::START);
        assert_eq!(star.expr, "u.*");
        assert!(!star.is_column_ref());
    }
}
