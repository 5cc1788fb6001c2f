//! Common table expressions
//!
//! Each CTE is resolved from its anchor (the part before a top-level
//! `UNION`) and registered in the base scope under its name, so later CTEs
//! and the main statement can reference it like a table.

use log::debug;
use sqlty_ast::{ColumnExpr, CteDef, Query, Token, TokenKind};
use sqlty_diagnostics::{DiagnosticCollector, SQL0100, SQL0106, SQL0107, SQL0108, SQL0109};
use sqlty_parser::scan::{find_top_level, matching_paren, statement_start};
use sqlty_parser::{parse_projection, parse_tokens, tokenize_at};
use sqlty_types::TypeResolver;

use crate::columns::{Mode, Resolution, ResultColumn};
use crate::scope::{Scope, ScopeEntry};

/// Resolve every CTE of `query` in order, registering each in `base`
pub fn resolve_ctes(
    query: &Query,
    base: &mut Scope,
    resolver: &dyn TypeResolver,
    diags: &mut DiagnosticCollector,
) {
    for cte in &query.ctes {
        let tokens = tokenize_at(&cte.body, cte.body_position).unwrap_or_default();
        let (anchor, recursive_term) = split_union(&tokens);

        let Some(columns) = resolve_anchor(cte, anchor, base, resolver, diags) else {
            continue;
        };
        let expected = columns.len();

        let mut entry = ScopeEntry::new(cte.name.clone());
        for column in columns {
            entry.push(column.name, column.ty);
        }
        debug!("registered CTE '{}' with {} columns", cte.name, expected);
        base.add_entry(entry);

        if let (true, Some(term)) = (query.recursive, recursive_term) {
            check_recursive_term(cte, term, expected, base, diags);
        }
    }
}

/// Anchor and optional second half of a top-level `UNION [ALL]`
fn split_union(tokens: &[Token]) -> (&[Token], Option<&[Token]>) {
    match find_top_level(tokens, |t| t.is_word("UNION")) {
        Some(u) => {
            let mut rest = u + 1;
            if tokens.get(rest).is_some_and(|t| t.is_word("ALL")) {
                rest += 1;
            }
            (&tokens[..u], Some(&tokens[rest..]))
        }
        None => (tokens, None),
    }
}

fn resolve_anchor(
    cte: &CteDef,
    anchor: &[Token],
    base: &Scope,
    resolver: &dyn TypeResolver,
    diags: &mut DiagnosticCollector,
) -> Option<Vec<ResultColumn>> {
    let start = statement_start(anchor);
    let exprs = match anchor.get(start) {
        Some(t) if t.is_word("SELECT") => parse_tokens(&cte.body, anchor).columns,
        Some(t) if t.is_word("VALUES") => first_values_row(&cte.body, &anchor[start + 1..]),
        _ => Vec::new(),
    };
    if exprs.is_empty() {
        diags.error(
            SQL0106,
            cte.position,
            format!("CTE '{}' must be a SELECT or VALUES that projects at least one column", cte.name),
        );
        return None;
    }

    let scope = base.narrow_to_referenced(&anchor[start..]);
    for missing in scope.missing() {
        diags.warning(SQL0100, missing.position, format!("unknown table '{}'", missing.name));
    }
    let mut res = Resolution {
        scope: &scope,
        resolver,
        mode: Mode::Cte,
        diags: &mut *diags,
    };
    let mut columns = res.resolve_projection(&exprs);

    match &cte.columns {
        Some(names) if names.len() == columns.len() => {
            for (column, name) in columns.iter_mut().zip(names) {
                column.name = name.clone();
            }
            return Some(columns);
        }
        Some(names) => diags.error(
            SQL0107,
            cte.position,
            format!(
                "CTE '{}' declares {} columns but its query produces {}",
                cte.name,
                names.len(),
                columns.len()
            ),
        ),
        None => {}
    }

    for (i, column) in columns.iter_mut().enumerate() {
        if column.name.is_empty() {
            diags.error(
                SQL0109,
                cte.position,
                format!(
                    "cannot determine the name of column {} of CTE '{}'; add an alias or a column list",
                    i + 1,
                    cte.name
                ),
            );
            column.name = format!("column_{}", i + 1);
        }
    }
    Some(columns)
}

/// Items of the first `VALUES` row as projection expressions
fn first_values_row(sql: &str, tokens: &[Token]) -> Vec<ColumnExpr> {
    match tokens.first() {
        Some(t) if t.kind == TokenKind::LParen => match matching_paren(tokens, 0) {
            Some(close) => parse_projection(sql, &tokens[1..close]),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// The recursive term must project as many columns as the anchor
fn check_recursive_term(
    cte: &CteDef,
    term: &[Token],
    expected: usize,
    base: &Scope,
    diags: &mut DiagnosticCollector,
) {
    let start = statement_start(term);
    if !term.get(start).is_some_and(|t| t.is_word("SELECT")) {
        return;
    }
    let query = parse_tokens(&cte.body, term);
    let scope = base.narrow_to_referenced(&term[start..]);

    let mut projected = 0;
    for column in &query.columns {
        if !column.star {
            projected += 1;
            continue;
        }
        let expanded = match column.table.as_deref() {
            Some(table) => scope.entry(table).map(|e| e.columns().len()),
            None if !scope.has_opaque() => {
                Some(scope.entries().iter().map(|e| e.columns().len()).sum())
            }
            None => None,
        };
        // A star over unknown columns cannot be counted
        let Some(expanded) = expanded else {
            return;
        };
        projected += expanded;
    }

    if projected != expected {
        diags.error(
            SQL0108,
            cte.position,
            format!(
                "recursive term of CTE '{}' projects {projected} columns; expected {expected}",
                cte.name
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ColumnOverrides;
    use pretty_assertions::assert_eq;
    use sqlty_ast::{Catalog, Column, Position, Table};
    use sqlty_parser::parse_statement;
    use sqlty_types::{SemanticType, SqliteTypeResolver, TypeInfo};

    fn resolve(sql: &str) -> (Scope, DiagnosticCollector) {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("employees")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("manager_id", "INTEGER"))
                .with_column(Column::new("name", "TEXT").not_null()),
        );
        let mut base = Scope::from_catalog(&catalog, &SqliteTypeResolver, &ColumnOverrides::new());
        let query = parse_statement(sql, Position::START).unwrap();
        let mut diags = DiagnosticCollector::new("q.sql");
        resolve_ctes(&query, &mut base, &SqliteTypeResolver, &mut diags);
        (base, diags)
    }

    #[test]
    fn test_cte_columns_come_from_anchor() {
        let (scope, diags) = resolve(
            "WITH named AS (SELECT id, name AS label FROM employees) SELECT label FROM named",
        );
        assert!(diags.is_empty());
        let entry = scope.entry("named").unwrap();
        let cols: Vec<_> = entry.columns().iter().map(|c| (c.name.as_str(), c.ty.clone())).collect();
        assert_eq!(
            cols,
            [
                ("id", TypeInfo::not_null(SemanticType::Int64)),
                ("label", TypeInfo::not_null(SemanticType::String)),
            ]
        );
        assert_eq!(entry.columns()[0].relation, "named");
    }

    #[test]
    fn test_explicit_column_list_renames() {
        let (scope, diags) = resolve("WITH t(a, b) AS (VALUES (1, 'x')) SELECT a FROM t");
        assert!(diags.is_empty());
        assert_eq!(
            scope.lookup(Some("t"), "b").unwrap().ty,
            TypeInfo::not_null(SemanticType::String)
        );
    }

    #[test]
    fn test_column_list_mismatch() {
        let (scope, diags) = resolve("WITH t(a) AS (SELECT id, name FROM employees) SELECT * FROM t");
        assert!(diags.has_errors());
        assert!(scope.lookup(Some("t"), "name").is_ok());
    }

    #[test]
    fn test_recursive_cte() {
        let sql = "WITH RECURSIVE chain(id, depth) AS (\
                   SELECT id, 0 FROM employees WHERE manager_id IS NULL \
                   UNION ALL SELECT e.id, c.depth + 1 FROM employees e JOIN chain c ON e.manager_id = c.id) \
                   SELECT * FROM chain";
        let (scope, diags) = resolve(sql);
        assert!(diags.is_empty());
        assert_eq!(scope.entry("chain").unwrap().columns().len(), 2);
    }

    #[test]
    fn test_recursive_term_arity_mismatch() {
        let sql = "WITH RECURSIVE chain(id) AS (\
                   SELECT id FROM employees UNION SELECT e.id, e.name FROM employees e) \
                   SELECT * FROM chain";
        let (_, diags) = resolve(sql);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            ["recursive term of CTE 'chain' projects 2 columns; expected 1"]
        );
    }

    #[test]
    fn test_unnamed_cte_column_is_an_error() {
        let (_, diags) = resolve("WITH t AS (SELECT COUNT(*) FROM employees) SELECT * FROM t");
        assert!(diags.has_errors());
    }
}
