//! Column resolution
//!
//! Projected expressions are typed by pattern: `*` expansion, plain column
//! references, aggregates, literals and `CAST`. Anything else degrades to
//! [`TypeInfo::Unresolved`] instead of failing the analysis.

use serde::Serialize;
use sqlty_ast::{ColumnExpr, Token, TokenKind};
use sqlty_diagnostics::{
    DiagnosticCollector, ErrorCode, Position, SQL0100, SQL0101, SQL0102, SQL0103, SQL0104,
    SQL0105, SQL0109, SQL0111,
};
use sqlty_parser::scan::{depths, matching_paren, split_top_level_commas};
use sqlty_parser::tokenize_at;
use sqlty_types::{SemanticType, TypeInfo, TypeResolver};

use crate::scope::{LookupError, Scope};

/// A typed output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    /// Owning relation; empty for computed expressions
    #[serde(skip_serializing_if = "String::is_empty")]
    pub relation: String,
    #[serde(flatten)]
    pub ty: TypeInfo,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, relation: impl Into<String>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            relation: relation.into(),
            ty,
        }
    }

    pub fn nullable(&self) -> bool {
        self.ty.is_nullable()
    }
}

/// How lookup failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Main statement: bad references are errors
    Query,
    /// CTE anchor: bad references are warnings, unmapped names are silent
    Cte,
}

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE"];

/// Type and provenance of one expression
#[derive(Debug, Clone)]
pub struct Inferred {
    pub ty: TypeInfo,
    pub relation: String,
    /// Name of a referenced column (`t.col` → `col`)
    pub column: Option<String>,
    /// Default output name of an aggregate
    pub aggregate: Option<String>,
}

impl Inferred {
    fn unresolved() -> Self {
        Self {
            ty: TypeInfo::Unresolved,
            relation: String::new(),
            column: None,
            aggregate: None,
        }
    }

    fn typed(ty: TypeInfo) -> Self {
        Self {
            ty,
            ..Self::unresolved()
        }
    }
}

/// Everything column inference needs besides the tokens
pub struct Resolution<'a, 'd> {
    pub scope: &'a Scope,
    pub resolver: &'a dyn TypeResolver,
    pub mode: Mode,
    pub diags: &'d mut DiagnosticCollector,
}

impl Resolution<'_, '_> {
    pub fn report_lookup(&mut self, err: &LookupError, position: Position) {
        let (code, is_error): (ErrorCode, bool) = match err {
            LookupError::UnknownRelation { .. } => (SQL0100, true),
            LookupError::UnknownColumn { .. } | LookupError::NoSuchColumn { .. } => (SQL0101, true),
            LookupError::Ambiguous { .. } => (SQL0102, true),
            LookupError::Unmapped { .. } => (SQL0105, false),
        };
        match (self.mode, is_error) {
            (Mode::Query, true) => self.diags.error(code, position, err.to_string()),
            (Mode::Query, false) => self.diags.warning(code, position, err.to_string()),
            (Mode::Cte, true) => self.diags.warning(code, position, err.to_string()),
            (Mode::Cte, false) => {}
        }
    }

    /// Type an expression
    pub fn infer(&mut self, tokens: &[Token]) -> Inferred {
        let Some(first) = tokens.first() else {
            return Inferred::unresolved();
        };

        if let Some((qualifier, column)) = column_ref(tokens) {
            return self.lookup(qualifier.as_deref(), &column, first.position);
        }
        if let Some(ty) = literal(tokens) {
            return Inferred::typed(ty);
        }
        if let Some(inferred) = self.cast(tokens) {
            return inferred;
        }
        if let Some(inferred) = self.aggregate(tokens) {
            return inferred;
        }
        if first.kind == TokenKind::LParen
            && matching_paren(tokens, 0) == Some(tokens.len() - 1)
            && !tokens.get(1).is_some_and(|t| t.is_any_word(&["SELECT", "WITH", "VALUES"]))
        {
            return self.infer(&tokens[1..tokens.len() - 1]);
        }
        Inferred::unresolved()
    }

    fn lookup(&mut self, qualifier: Option<&str>, column: &str, position: Position) -> Inferred {
        match self.scope.lookup(qualifier, column) {
            Ok(col) => Inferred {
                ty: col.ty.clone(),
                relation: col.relation.clone(),
                column: Some(col.name.clone()),
                aggregate: None,
            },
            Err(err) => {
                self.report_lookup(&err, position);
                Inferred {
                    column: Some(column.to_string()),
                    ..Inferred::unresolved()
                }
            }
        }
    }

    fn cast(&mut self, tokens: &[Token]) -> Option<Inferred> {
        let [cast, open, .., _] = tokens else {
            return None;
        };
        if !cast.is_word("CAST")
            || open.kind != TokenKind::LParen
            || matching_paren(tokens, 1) != Some(tokens.len() - 1)
        {
            return None;
        }
        let inner = &tokens[2..tokens.len() - 1];
        let depth = depths(inner);
        let as_idx = (0..inner.len())
            .rev()
            .find(|&i| depth[i] == 0 && inner[i].is_word("AS"))?;

        let operand = self.infer(&inner[..as_idx]);
        let type_name = inner[as_idx + 1..]
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let ty = match self.resolver.named_type(&type_name) {
            Some(ty) => TypeInfo::new(ty, operand.ty.is_nullable()),
            None => TypeInfo::Unresolved,
        };
        Some(Inferred {
            ty,
            relation: operand.relation,
            column: operand.column,
            aggregate: None,
        })
    }

    fn aggregate(&mut self, tokens: &[Token]) -> Option<Inferred> {
        let func = tokens.first()?;
        let name = func.text.to_ascii_uppercase();
        if !AGGREGATES.contains(&name.as_str())
            || tokens.get(1).is_none_or(|t| t.kind != TokenKind::LParen)
        {
            return None;
        }
        let close = matching_paren(tokens, 1)?;
        let trailing_ok = close == tokens.len() - 1
            || tokens[close + 1].is_any_word(&["FILTER", "OVER"]);
        if !trailing_ok {
            return None;
        }

        let mut inner = &tokens[2..close];
        while inner.first().is_some_and(|t| t.is_any_word(&["DISTINCT", "ALL"])) {
            inner = &inner[1..];
        }
        let lower = name.to_ascii_lowercase();

        if name == "COUNT" {
            return Some(Inferred {
                aggregate: Some(lower),
                ..Inferred::typed(TypeInfo::not_null(SemanticType::Int64))
            });
        }

        let operands: Vec<Inferred> = split_top_level_commas(inner)
            .into_iter()
            .map(|r| self.infer(&inner[r]))
            .collect();
        let Some(first) = operands.first() else {
            return Some(Inferred::unresolved());
        };
        let default_name = match &first.column {
            Some(col) => format!("{lower}_{col}"),
            None => lower,
        };

        let ty = match name.as_str() {
            "SUM" | "AVG" => match first.ty.semantic() {
                Some(ty) if ty.is_numeric() => {
                    let ty = if name == "SUM" { ty.clone() } else { SemanticType::Float64 };
                    TypeInfo::nullable(ty)
                }
                Some(ty) => {
                    let operand = first.column.as_deref().unwrap_or("expression");
                    self.diags.warning(
                        SQL0104,
                        func.position,
                        format!("{name} over non-numeric column '{operand}' of type {ty}"),
                    );
                    TypeInfo::Unresolved
                }
                None => TypeInfo::Unresolved,
            },
            "COALESCE" => combine(&operands, operands.iter().all(|o| o.ty.is_nullable())),
            _ => combine(&operands, operands.iter().any(|o| o.ty.is_nullable())),
        };

        let relation = if operands.len() == 1 {
            first.relation.clone()
        } else {
            String::new()
        };
        Some(Inferred {
            ty,
            relation,
            column: None,
            aggregate: Some(default_name),
        })
    }

    /// Expand `*` or `qualifier.*`
    pub fn expand_star(&mut self, qualifier: Option<&str>, position: Position) -> Vec<ResultColumn> {
        let entries: Vec<_> = match qualifier {
            Some(q) => match self.scope.entry(q) {
                Some(entry) => vec![entry],
                None if self.scope.is_opaque(q) => {
                    self.diags.warning(
                        SQL0111,
                        position,
                        format!("cannot expand '{q}.*': relation has no known columns"),
                    );
                    return Vec::new();
                }
                None => {
                    let err = LookupError::UnknownRelation { name: q.to_string() };
                    self.report_lookup(&err, position);
                    return Vec::new();
                }
            },
            None => {
                if self.scope.is_empty() || self.scope.has_opaque() {
                    self.diags.warning(
                        SQL0111,
                        position,
                        "cannot fully expand '*': some relations have no known columns",
                    );
                }
                self.scope.entries().iter().collect()
            }
        };
        entries
            .into_iter()
            .flat_map(|e| e.columns())
            .map(|c| ResultColumn::new(c.name.clone(), c.relation.clone(), c.ty.clone()))
            .collect()
    }

    /// Resolve a projection list in order.
    ///
    /// In `Mode::Cte` a column whose name cannot be determined gets an empty
    /// name; the caller decides whether that is an error.
    pub fn resolve_projection(&mut self, exprs: &[ColumnExpr]) -> Vec<ResultColumn> {
        let mut out = Vec::new();
        for expr in exprs {
            if expr.star {
                out.extend(self.expand_star(expr.table.as_deref(), expr.position));
                continue;
            }

            if let (true, Some(name)) = (expr.is_column_ref(), &expr.name) {
                let inferred = self.lookup(expr.table.as_deref(), name, expr.position);
                let name = expr.alias.clone().or(inferred.column).unwrap_or_else(|| name.clone());
                out.push(ResultColumn::new(name, inferred.relation, inferred.ty));
                continue;
            }

            let tokens = tokenize_at(&expr.expr, expr.position).unwrap_or_default();
            let inferred = self.infer(&tokens);
            let index = out.len() + 1;
            let name = self.column_name(expr, &tokens, &inferred, index);
            out.push(ResultColumn::new(name, inferred.relation, inferred.ty));
        }
        out
    }

    fn column_name(&mut self, expr: &ColumnExpr, tokens: &[Token], inferred: &Inferred, index: usize) -> String {
        if let Some(alias) = &expr.alias {
            return alias.clone();
        }
        if self.mode == Mode::Query {
            if let Some(default) = &inferred.aggregate {
                self.diags.warning(
                    SQL0103,
                    expr.position,
                    format!("aggregate {} has no alias; using '{default}'", expr.expr),
                );
                return default.clone();
            }
        }
        if let Some(last) = tokens.last().filter(|t| t.is_identifier()) {
            return last.value();
        }
        match self.mode {
            Mode::Query => {
                let name = format!("column_{index}");
                self.diags.warning(
                    SQL0109,
                    expr.position,
                    format!("cannot determine a name for '{}'; using '{name}'", expr.expr),
                );
                name
            }
            Mode::Cte => String::new(),
        }
    }
}

/// `col`, `t.col` or `schema.t.col`
fn column_ref(tokens: &[Token]) -> Option<(Option<String>, String)> {
    let is_dot = |t: &Token| t.kind == TokenKind::Dot;
    match tokens {
        [name] if name.is_name() => Some((None, name.value())),
        [table, dot, name] if table.is_name() && is_dot(dot) && name.is_name() => {
            Some((Some(table.value()), name.value()))
        }
        [schema, d1, table, d2, name]
            if schema.is_name() && is_dot(d1) && table.is_name() && is_dot(d2) && name.is_name() =>
        {
            Some((Some(table.value()), name.value()))
        }
        _ => None,
    }
}

/// Literal constants
fn literal(tokens: &[Token]) -> Option<TypeInfo> {
    let number = |tok: &Token| match tok.kind {
        TokenKind::Integer => Some(TypeInfo::not_null(SemanticType::Int64)),
        TokenKind::Float => Some(TypeInfo::not_null(SemanticType::Float64)),
        _ => None,
    };
    match tokens {
        [tok] => match tok.kind {
            TokenKind::String => Some(TypeInfo::not_null(SemanticType::String)),
            TokenKind::Blob => Some(TypeInfo::not_null(SemanticType::Bytes)),
            TokenKind::Integer | TokenKind::Float => number(tok),
            _ if tok.is_any_word(&["TRUE", "FALSE"]) => Some(TypeInfo::not_null(SemanticType::Bool)),
            _ if tok.is_word("NULL") => Some(TypeInfo::Unresolved),
            _ if tok.is_any_word(&["CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP"]) => {
                Some(TypeInfo::not_null(SemanticType::String))
            }
            _ => None,
        },
        [sign, tok] if sign.is_operator("-") || sign.is_operator("+") => number(tok),
        _ => None,
    }
}

/// First resolved operand type with the given nullability
fn combine(operands: &[Inferred], nullable: bool) -> TypeInfo {
    operands
        .iter()
        .find_map(|o| o.ty.semantic())
        .map_or(TypeInfo::Unresolved, |ty| TypeInfo::new(ty.clone(), nullable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ColumnOverrides;
    use pretty_assertions::assert_eq;
    use sqlty_ast::{Catalog, Column, Table};
    use sqlty_parser::tokenize;
    use sqlty_types::SqliteTypeResolver;

    fn scope() -> Scope {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("items")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("label", "TEXT"))
                .with_column(Column::new("price", "REAL").not_null()),
        );
        let base = Scope::from_catalog(&catalog, &SqliteTypeResolver, &ColumnOverrides::new());
        base.narrow_to_referenced(&tokenize("FROM items i").unwrap())
    }

    fn infer(expr: &str) -> (TypeInfo, usize) {
        let scope = scope();
        let mut diags = DiagnosticCollector::new("q.sql");
        let mut res = Resolution {
            scope: &scope,
            resolver: &SqliteTypeResolver,
            mode: Mode::Query,
            diags: &mut diags,
        };
        let ty = res.infer(&tokenize(expr).unwrap()).ty;
        (ty, diags.len())
    }

    #[test]
    fn test_literals() {
        assert_eq!(infer("'a'").0, TypeInfo::not_null(SemanticType::String));
        assert_eq!(infer("-4").0, TypeInfo::not_null(SemanticType::Int64));
        assert_eq!(infer("2.5").0, TypeInfo::not_null(SemanticType::Float64));
        assert_eq!(infer("x'00'").0, TypeInfo::not_null(SemanticType::Bytes));
        assert_eq!(infer("NULL").0, TypeInfo::Unresolved);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(infer("count(DISTINCT label)").0, TypeInfo::not_null(SemanticType::Int64));
        assert_eq!(infer("SUM(price)").0, TypeInfo::nullable(SemanticType::Float64));
        assert_eq!(infer("avg(i.id)").0, TypeInfo::nullable(SemanticType::Float64));
        assert_eq!(infer("max(label)").0, TypeInfo::nullable(SemanticType::String));
        assert_eq!(infer("MIN(price)").0, TypeInfo::not_null(SemanticType::Float64));
        assert_eq!(infer("coalesce(label, 'none')").0, TypeInfo::not_null(SemanticType::String));
        assert_eq!(infer("COUNT(*) OVER (PARTITION BY label)").0, TypeInfo::not_null(SemanticType::Int64));
    }

    #[test]
    fn test_sum_of_text_warns() {
        let (ty, diags) = infer("SUM(label)");
        assert_eq!(ty, TypeInfo::Unresolved);
        assert_eq!(diags, 1);
    }

    #[test]
    fn test_cast_keeps_operand_nullability() {
        assert_eq!(infer("CAST(label AS INTEGER)").0, TypeInfo::nullable(SemanticType::Int64));
        assert_eq!(infer("CAST(id AS TEXT)").0, TypeInfo::not_null(SemanticType::String));
        assert_eq!(infer("CAST(id AS jsonb)").0, TypeInfo::Unresolved);
    }

    #[test]
    fn test_unknown_expressions_degrade_silently() {
        assert_eq!(infer("price * 2"), (TypeInfo::Unresolved, 0));
        assert_eq!(infer("(SELECT 1)"), (TypeInfo::Unresolved, 0));
        assert_eq!(infer("(price)").0, TypeInfo::not_null(SemanticType::Float64));
    }
}
