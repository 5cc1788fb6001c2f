//! Parameter type inference
//!
//! A parameter takes the type of the column it is compared with, inserted
//! into or matched against in an `IN` list. The neighbourhood of the
//! parameter token decides which column that is.

use indexmap::IndexMap;
use serde::Serialize;
use sqlty_ast::{normalize, Catalog, ParamRef, ParamStyle, QueryBlock, Token, TokenKind};
use sqlty_diagnostics::{DiagnosticCollector, SQL0104};
use sqlty_parser::scan::{depths, matching_paren, split_top_level_commas, statement_start};
use sqlty_types::{SemanticType, TypeInfo, TypeResolver};

use crate::scope::{LookupError, Scope};
use crate::segments::Segment;

/// A typed query parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultParam {
    pub name: String,
    pub style: ParamStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
    #[serde(flatten)]
    pub ty: TypeInfo,
    /// Binds a list (`sqlc.slice`)
    pub variadic: bool,
    /// Items of the `IN (...)` list the parameter stands in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<usize>,
}

impl ResultParam {
    pub fn nullable(&self) -> bool {
        self.ty.is_nullable()
    }
}

const COMPARISONS: &[&str] = &["=", "==", "!=", "<>", "<", "<=", ">", ">="];

/// What the surroundings of a parameter say about it
#[derive(Debug, Clone)]
struct Hint {
    ty: TypeInfo,
    name: Option<String>,
}

pub struct ParamResolver<'a> {
    pub tokens: &'a [Token],
    pub segments: &'a [Segment],
    pub base: &'a Scope,
    pub catalog: &'a Catalog,
    pub resolver: &'a dyn TypeResolver,
}

impl ParamResolver<'_> {
    pub fn resolve(&self, block: &QueryBlock, diags: &mut DiagnosticCollector) -> Vec<ResultParam> {
        let inserts = self.insert_targets();
        let hints = block.query.params.iter().map(|param| {
            param_index(self.tokens, param).and_then(|i| self.infer(i, param, &inserts))
        });
        finish_params(block, self.tokens, hints, self.resolver, diags)
    }

    /// Scope of the statement segment holding token `i`
    fn scope_at(&self, i: usize) -> &Scope {
        self.segments
            .iter()
            .find(|s| s.contains(i))
            .or_else(|| self.segments.first())
            .map_or(self.base, |s| &s.scope)
    }

    fn infer(&self, i: usize, param: &ParamRef, inserts: &IndexMap<usize, (String, String)>) -> Option<Hint> {
        let tokens = self.tokens;
        let working = self.scope_at(i);
        let width = if tokens[i].is_word("sqlc") { 6 } else { 1 };

        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        if let Some(prev) = prev.filter(|t| t.is_any_word(&["LIMIT", "OFFSET"])) {
            return Some(Hint {
                ty: TypeInfo::not_null(SemanticType::Int64),
                name: Some(prev.text.to_ascii_lowercase()),
            });
        }

        if let Some((qualifier, column)) = self.in_list_column(i) {
            let ty = self.column_type(working, qualifier.as_deref(), &column)?;
            let ty = if param.variadic { ty.into_list() } else { ty };
            return Some(Hint { ty, name: Some(column) });
        }

        if let Some((qualifier, column)) = comparison_left(tokens, i) {
            if let Some(ty) = self.column_type(working, qualifier.as_deref(), &column) {
                return Some(Hint { ty, name: Some(column) });
            }
        }

        let mut after = i + width;
        let mut cast = None;
        if tokens.get(after).is_some_and(|t| t.is_operator("::")) {
            cast = tokens
                .get(after + 1)
                .and_then(|t| self.resolver.named_type(&t.text))
                .map(TypeInfo::not_null);
            after += 2;
        }
        if let Some((qualifier, column)) = comparison_right(tokens, after) {
            if let Some(ty) = self.column_type(working, qualifier.as_deref(), &column) {
                return Some(Hint { ty, name: Some(column) });
            }
            if let Some(ty) = cast {
                return Some(Hint { ty, name: Some(column) });
            }
        }

        if let Some((table, column)) = inserts.get(&i) {
            let ty = self.column_type(working, Some(table), column)?;
            return Some(Hint { ty, name: Some(column.clone()) });
        }

        cast.map(|ty| Hint { ty, name: None })
    }

    /// Column on the left of `col [NOT] IN (.., param, ..)`
    fn in_list_column(&self, i: usize) -> Option<(Option<String>, String)> {
        let tokens = self.tokens;
        let open = enclosing_in_list(tokens, i)?;
        let mut end = open.checked_sub(2)?;
        if tokens[end].is_word("NOT") {
            end = end.checked_sub(1)?;
        }
        column_ref_ending(tokens, end)
    }

    /// Resolve a column referenced around a parameter.
    ///
    /// The segment's scope comes first; subqueries reference relations
    /// outside it, so the base scope and finally the raw catalog are tried
    /// next.
    fn column_type(&self, working: &Scope, qualifier: Option<&str>, column: &str) -> Option<TypeInfo> {
        let err = match working.lookup(qualifier, column) {
            Ok(col) => return Some(col.ty.clone()),
            Err(err) => err,
        };
        if let Some(Ok(col)) = qualifier.map(|q| self.base.lookup(Some(q), column)) {
            return Some(col.ty.clone());
        }
        let unqualified = !matches!(err, LookupError::UnknownColumn { .. });
        if let Some(Ok(col)) = unqualified.then(|| self.base.lookup(None, column)) {
            return Some(col.ty.clone());
        }
        qualifier
            .and_then(|q| self.catalog.column(q, column))
            .map(|c| self.resolver.column_type(&c.decl_type, c.not_null))
    }

    /// `INSERT INTO t [(cols)] VALUES (..), (..)`: parameter token index to
    /// the `(table, column)` it is inserted into
    fn insert_targets(&self) -> IndexMap<usize, (String, String)> {
        let tokens = self.tokens;
        let mut out = IndexMap::new();
        let start = statement_start(tokens);
        if !tokens.get(start).is_some_and(|t| t.is_any_word(&["INSERT", "REPLACE"])) {
            return out;
        }
        let depth = depths(tokens);
        let Some(into) = (start..tokens.len()).find(|&k| depth[k] == 0 && tokens[k].is_word("INTO")) else {
            return out;
        };

        let mut k = into + 1;
        let Some(mut table) = tokens.get(k).filter(|t| t.is_name()).map(Token::value) else {
            return out;
        };
        k += 1;
        while tokens.get(k).is_some_and(|t| t.kind == TokenKind::Dot) {
            if let Some(name) = tokens.get(k + 1).filter(|t| t.is_name()) {
                table = name.value();
            }
            k += 2;
        }
        if tokens.get(k).is_some_and(|t| t.is_word("AS")) {
            k += 2;
        }

        let columns: Vec<String> = match tokens.get(k) {
            Some(t) if t.kind == TokenKind::LParen => {
                let Some(close) = matching_paren(tokens, k) else {
                    return out;
                };
                let inner = &tokens[k + 1..close];
                k = close + 1;
                split_top_level_commas(inner)
                    .into_iter()
                    .map(|r| inner[r.start].value())
                    .collect()
            }
            _ => match self.catalog.table(&table) {
                Some(t) => t.columns.iter().map(|c| c.name.clone()).collect(),
                None => return out,
            },
        };

        if !tokens.get(k).is_some_and(|t| t.is_word("VALUES")) {
            return out;
        }
        k += 1;
        while tokens.get(k).is_some_and(|t| t.kind == TokenKind::LParen) {
            let Some(close) = matching_paren(tokens, k) else {
                break;
            };
            let row = &tokens[k + 1..close];
            for (item, range) in split_top_level_commas(row).into_iter().enumerate() {
                let first = &row[range.start];
                let is_param = match range.len() {
                    1 => first.kind == TokenKind::Parameter,
                    6 => first.is_word("sqlc"),
                    _ => false,
                };
                if let (true, Some(column)) = (is_param, columns.get(item)) {
                    out.insert(k + 1 + range.start, (table.clone(), column.clone()));
                }
            }
            k = close + 1;
            if tokens.get(k).is_some_and(|t| t.kind == TokenKind::Comma) {
                k += 1;
            }
        }
        out
    }
}

/// Parameters typed from annotations alone, for queries without a catalog
pub fn annotated_params(
    block: &QueryBlock,
    tokens: &[Token],
    resolver: &dyn TypeResolver,
    diags: &mut DiagnosticCollector,
) -> Vec<ResultParam> {
    let hints = block.query.params.iter().map(|_| None);
    finish_params(block, tokens, hints, resolver, diags)
}

/// Name each parameter, then apply `@param` overrides, slices and
/// `sqlc.narg`
fn finish_params(
    block: &QueryBlock,
    tokens: &[Token],
    hints: impl IntoIterator<Item = Option<Hint>>,
    resolver: &dyn TypeResolver,
    diags: &mut DiagnosticCollector,
) -> Vec<ResultParam> {
    let mut used: IndexMap<String, usize> = IndexMap::new();
    let mut out = Vec::with_capacity(block.query.params.len());

    for (n, (param, hint)) in block.query.params.iter().zip(hints).enumerate() {
        let name = param
            .name
            .clone()
            .or_else(|| hint.as_ref().and_then(|h| h.name.clone()))
            .unwrap_or_else(|| format!("arg{}", param.number.unwrap_or(n + 1)));
        let name = unique_name(&mut used, name);

        let mut ty = hint.map_or(TypeInfo::Unresolved, |h| h.ty);
        if let Some(o) = block.param_override(&name) {
            match resolver.named_type(&o.type_name) {
                Some(over) => ty = TypeInfo::new(over, o.nullable),
                None => diags.warning(
                    SQL0104,
                    o.position,
                    format!("unknown type '{}' for parameter '{}'", o.type_name, o.name),
                ),
            }
        }
        if param.variadic && !ty.semantic().is_some_and(SemanticType::is_list) {
            ty = ty.into_list();
        }
        if param.force_nullable {
            ty = ty.with_nullable(true);
        }

        out.push(ResultParam {
            name,
            style: param.style,
            number: param.number,
            ty,
            variadic: param.variadic,
            elements: param_index(tokens, param).and_then(|i| in_list_len(tokens, i)),
        });
    }
    out
}

fn param_index(tokens: &[Token], param: &ParamRef) -> Option<usize> {
    tokens.iter().position(|t| t.position == param.position)
}

/// Opening parenthesis of the `IN (...)` list directly holding token `i`
fn enclosing_in_list(tokens: &[Token], i: usize) -> Option<usize> {
    let prev = tokens.get(i.checked_sub(1)?)?;
    if !matches!(prev.kind, TokenKind::LParen | TokenKind::Comma) {
        return None;
    }

    let mut depth = 0usize;
    let mut open = None;
    for k in (0..i).rev() {
        match tokens[k].kind {
            TokenKind::RParen => depth += 1,
            TokenKind::LParen if depth == 0 => {
                open = Some(k);
                break;
            }
            TokenKind::LParen => depth -= 1,
            _ => {}
        }
    }
    let open = open?;
    tokens[open.checked_sub(1)?].is_word("IN").then_some(open)
}

/// Item count of the `IN` list holding the parameter at `i`
fn in_list_len(tokens: &[Token], i: usize) -> Option<usize> {
    let open = enclosing_in_list(tokens, i)?;
    let close = matching_paren(tokens, open)?;
    Some(split_top_level_commas(&tokens[open + 1..close]).len())
}

fn is_comparison(tok: &Token) -> bool {
    (tok.kind == TokenKind::Operator && COMPARISONS.contains(&tok.text.as_str()))
        || tok.is_any_word(&["LIKE", "GLOB", "IS"])
}

/// `col op param`, `col NOT LIKE param`, `col IS NOT param`
fn comparison_left(tokens: &[Token], i: usize) -> Option<(Option<String>, String)> {
    let mut k = i.checked_sub(1)?;
    if tokens[k].is_word("NOT") && k > 0 && tokens[k - 1].is_word("IS") {
        k -= 1;
    }
    if !is_comparison(&tokens[k]) {
        return None;
    }
    let mut end = k.checked_sub(1)?;
    if tokens[end].is_word("NOT") {
        end = end.checked_sub(1)?;
    }
    column_ref_ending(tokens, end)
}

/// `param op col`, with `at` the index of the operator
fn comparison_right(tokens: &[Token], at: usize) -> Option<(Option<String>, String)> {
    let mut k = at;
    if tokens.get(k)?.is_word("NOT") {
        k += 1;
    }
    if !is_comparison(tokens.get(k)?) {
        return None;
    }
    k += 1;
    if tokens.get(k)?.is_word("NOT") {
        k += 1;
    }
    column_ref_starting(tokens, k)
}

/// Column reference whose last token is at `end`
fn column_ref_ending(tokens: &[Token], end: usize) -> Option<(Option<String>, String)> {
    let name = tokens.get(end)?;
    if !name.is_name() {
        return None;
    }
    let qualified = end >= 2 && tokens[end - 1].kind == TokenKind::Dot && tokens[end - 2].is_name();
    let qualifier = qualified.then(|| tokens[end - 2].value());
    Some((qualifier, name.value()))
}

/// Column reference starting at `start`; function calls do not count
fn column_ref_starting(tokens: &[Token], start: usize) -> Option<(Option<String>, String)> {
    let mut parts = vec![tokens.get(start).filter(|t| t.is_name())?.value()];
    let mut k = start + 1;
    while tokens.get(k).is_some_and(|t| t.kind == TokenKind::Dot) {
        parts.push(tokens.get(k + 1).filter(|t| t.is_name())?.value());
        k += 2;
    }
    if tokens.get(k).is_some_and(|t| t.kind == TokenKind::LParen) {
        return None;
    }
    let column = parts.pop()?;
    Some((parts.pop(), column))
}

/// `name`, then `name_2`, `name_3` for repeats
fn unique_name(used: &mut IndexMap<String, usize>, name: String) -> String {
    let count = used.entry(normalize(&name)).or_insert(0);
    *count += 1;
    if *count == 1 {
        name
    } else {
        format!("{name}_{count}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlty_parser::tokenize;

    #[test]
    fn test_comparison_patterns() {
        let tokens = tokenize("WHERE u.email NOT LIKE ? AND ? >= total").unwrap();
        assert_eq!(
            comparison_left(&tokens, 6),
            Some((Some("u".to_string()), "email".to_string()))
        );
        assert_eq!(comparison_right(&tokens, 9), Some((None, "total".to_string())));
    }

    #[test]
    fn test_function_call_is_not_a_column() {
        let tokens = tokenize("? = lower(name)").unwrap();
        assert_eq!(comparison_right(&tokens, 1), None);
    }

    #[test]
    fn test_in_list_len() {
        let tokens = tokenize("WHERE id IN (?, ?, lower(?)) AND name IN (sqlc.slice('names'))").unwrap();
        let lens: Vec<_> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Parameter || t.is_word("sqlc"))
            .map(|(i, _)| in_list_len(&tokens, i))
            .collect();
        assert_eq!(lens, [Some(3), Some(3), None, Some(1)]);
    }

    #[test]
    fn test_unique_names() {
        let mut used = IndexMap::new();
        let names: Vec<_> = ["id", "ID", "name", "id"]
            .into_iter()
            .map(|n| unique_name(&mut used, n.to_string()))
            .collect();
        assert_eq!(names, ["id", "ID_2", "name", "id_3"]);
    }
}
