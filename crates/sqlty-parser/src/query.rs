//! Query file parser
//!
//! A query file holds any number of named statements, each introduced by a
//! header comment:
//!
//! ```sql
//! -- name: GetUser :one
//! -- Fetch one user by id.
//! -- @param id int64
//! SELECT id, email FROM users WHERE id = ?;
//! ```
//!
//! Parsing never stops at the first problem: every issue becomes a
//! [`Diagnostic`] on the returned [`QueryFile`] and the remaining blocks are
//! still parsed.

use std::collections::HashSet;
use std::sync::LazyLock;

use log::{debug, trace};
use regex::Regex;
use sqlty_ast::{
    normalize, ColumnExpr, CteDef, ParamRef, ParamStyle, Position, Query, QueryBlock,
    QueryCommand, QueryVerb, Token, TokenKind, TypeOverride,
};
use sqlty_diagnostics::{Diagnostic, SQL0007, SQL0008, SQL0010, SQL0011};

use crate::lexer::{tokenize_at, TokenizeError};
use crate::scan::{
    find_top_level, matching_paren, source_text, split_top_level_commas, statement_start,
    PROJECTION_TERMINATORS,
};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*--\s*name:\s*(\S+)\s*(\S+)?\s*$").unwrap()
});

static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*--\s*@(param|column)\s+(\S+)\s+(\S+)(\s+null)?\s*$").unwrap()
});

static ANNOTATION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*--\s*@(param|column)\b").unwrap()
});

/// All query blocks of one file plus the problems found while splitting it
#[derive(Debug, Clone, Default)]
pub struct QueryFile {
    pub path: String,
    pub blocks: Vec<QueryBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

impl QueryFile {
    pub fn block(&self, name: &str) -> Option<&QueryBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

struct Line<'s> {
    text: &'s str,
    /// Byte offset of the line start in the file
    offset: usize,
    /// 1-based line number
    number: usize,
}

fn lines(source: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut offset = 0;
    for (i, raw) in source.split_inclusive('\n').enumerate() {
        out.push(Line {
            text: raw.trim_end_matches(['\n', '\r']),
            offset,
            number: i + 1,
        });
        offset += raw.len();
    }
    out
}

fn is_comment_or_blank(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with("--")
}

/// Split a query file into named blocks and parse each one
pub fn parse_queries(path: &str, source: &str) -> QueryFile {
    let mut file = QueryFile {
        path: path.to_string(),
        ..QueryFile::default()
    };
    let lines = lines(source);
    let headers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| HEADER.is_match(l.text))
        .map(|(i, _)| i)
        .collect();

    let preamble_end = headers.first().copied().unwrap_or(lines.len());
    if let Some(stray) = lines[..preamble_end]
        .iter()
        .find(|l| !is_comment_or_blank(l.text))
    {
        file.diagnostics.push(
            Diagnostic::error(SQL0007, "SQL text outside of a named query")
                .with_path(path)
                .with_position(Position::new(stray.number, 1))
                .with_help("start each query with '-- name: <Name> :<command>'"),
        );
    }

    let mut names = HashSet::new();
    for (n, &header) in headers.iter().enumerate() {
        let end = headers.get(n + 1).copied().unwrap_or(lines.len());
        if let Some(block) = parse_block(path, source, &lines, header, end, &mut file.diagnostics) {
            if !names.insert(block.name.clone()) {
                file.diagnostics.push(
                    Diagnostic::error(
                        SQL0008,
                        format!("duplicate query name '{}'", block.name),
                    )
                    .with_path(path)
                    .with_position(Position::new(lines[header].number, 1)),
                );
                continue;
            }
            file.blocks.push(block);
        }
    }

    debug!(
        "parsed {} queries from {path} ({} diagnostics)",
        file.blocks.len(),
        file.diagnostics.len()
    );
    file
}

fn parse_block(
    path: &str,
    source: &str,
    lines: &[Line<'_>],
    header: usize,
    end: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<QueryBlock> {
    let header_line = &lines[header];
    let header_pos = Position::new(header_line.number, 1);
    let caps = HEADER.captures(header_line.text)?;
    let name = caps.get(1).map(|m| m.as_str().to_string())?;

    let command = match caps.get(2) {
        Some(cmd) => match cmd.as_str().parse::<QueryCommand>() {
            Ok(cmd) => cmd,
            Err(message) => {
                diagnostics.push(
                    Diagnostic::error(SQL0007, format!("query '{name}': {message}"))
                        .with_path(path)
                        .with_position(header_pos),
                );
                return None;
            }
        },
        None => {
            diagnostics.push(
                Diagnostic::error(SQL0007, format!("query '{name}' has no command"))
                    .with_path(path)
                    .with_position(header_pos)
                    .with_help("expected one of :one, :many, :exec, :execrows, :execresult"),
            );
            return None;
        }
    };

    let mut doc = Vec::new();
    let mut param_overrides = Vec::new();
    let mut column_overrides = Vec::new();
    let mut sql_line = None;

    for (i, line) in lines.iter().enumerate().take(end).skip(header + 1) {
        if !is_comment_or_blank(line.text) {
            sql_line = Some(i);
            break;
        }
        let position = Position::new(line.number, 1);
        if let Some(caps) = ANNOTATION.captures(line.text) {
            let over = TypeOverride {
                name: caps[2].to_string(),
                type_name: caps[3].to_string(),
                nullable: caps.get(4).is_some(),
                position,
            };
            if caps[1].eq_ignore_ascii_case("param") {
                param_overrides.push(over);
            } else {
                column_overrides.push(over);
            }
        } else if ANNOTATION_PREFIX.is_match(line.text) {
            diagnostics.push(
                Diagnostic::error(SQL0010, "invalid annotation")
                    .with_path(path)
                    .with_position(position)
                    .with_help("expected '-- @param <name> <type> [null]' or '-- @column <name> <type> [null]'"),
            );
        } else if let Some(text) = line.text.trim_start().strip_prefix("--") {
            let text = text.strip_prefix(' ').unwrap_or(text).trim_end();
            if !text.is_empty() {
                doc.push(text.to_string());
            }
        }
    }

    let Some(sql_line) = sql_line else {
        diagnostics.push(
            Diagnostic::error(SQL0011, format!("query '{name}' is empty"))
                .with_path(path)
                .with_position(header_pos),
        );
        return None;
    };

    let start = lines[sql_line].offset;
    let stop = lines.get(end).map_or(source.len(), |l| l.offset);
    let sql = source[start..stop].trim_end().to_string();
    let position = Position::new(lines[sql_line].number, 1);

    let query = match parse_statement(&sql, position) {
        Ok(query) => query,
        Err(err) => {
            diagnostics.push(err.to_diagnostic(path));
            Query::new(QueryVerb::Other)
        }
    };
    trace!("query {name}: {} columns, {} params", query.columns.len(), query.params.len());

    Some(QueryBlock {
        name,
        command,
        path: path.to_string(),
        position,
        sql,
        doc: (!doc.is_empty()).then(|| doc.join("\n")),
        query,
        param_overrides,
        column_overrides,
    })
}

/// Parse a single statement whose text starts at `start` in its file
pub fn parse_statement(sql: &str, start: Position) -> Result<Query, TokenizeError> {
    let tokens = tokenize_at(sql, start)?;
    Ok(parse_tokens(sql, &tokens))
}

/// Build the coarse query AST from the tokens of `sql`
pub fn parse_tokens(sql: &str, tokens: &[Token]) -> Query {
    let (ctes, recursive) = parse_with_clause(sql, tokens);
    let start = statement_start(tokens);
    let verb = tokens
        .get(start)
        .map_or(QueryVerb::Other, |t| QueryVerb::from_keyword(&t.text));

    let mut query = Query::new(verb);
    query.ctes = ctes;
    query.recursive = recursive;
    query.params = parse_params(tokens);

    if tokens.get(start).is_some_and(|t| t.is_word("SELECT")) {
        let mut begin = start + 1;
        while tokens.get(begin).is_some_and(|t| t.is_any_word(&["DISTINCT", "ALL"])) {
            begin += 1;
        }
        let rest = &tokens[begin.min(tokens.len())..];
        let end = find_top_level(rest, |t| {
            t.kind == TokenKind::Semicolon || t.is_any_word(PROJECTION_TERMINATORS)
        })
        .unwrap_or(rest.len());
        query.columns = parse_projection(sql, &rest[..end]);
    }
    query
}

fn parse_with_clause(sql: &str, tokens: &[Token]) -> (Vec<CteDef>, bool) {
    let mut ctes = Vec::new();
    if !tokens.first().is_some_and(|t| t.is_word("WITH")) {
        return (ctes, false);
    }
    let mut i = 1;
    let recursive = tokens.get(i).is_some_and(|t| t.is_word("RECURSIVE"));
    if recursive {
        i += 1;
    }

    while let Some(name_tok) = tokens.get(i) {
        if !name_tok.is_name() {
            break;
        }
        i += 1;

        let mut columns = None;
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            let Some(close) = matching_paren(tokens, i) else {
                break;
            };
            let inner = &tokens[i + 1..close];
            columns = Some(
                split_top_level_commas(inner)
                    .into_iter()
                    .map(|r| inner[r.start].value())
                    .collect(),
            );
            i = close + 1;
        }

        if tokens.get(i).is_some_and(|t| t.is_word("AS")) {
            i += 1;
        }
        while tokens.get(i).is_some_and(|t| t.is_any_word(&["NOT", "MATERIALIZED"])) {
            i += 1;
        }

        let Some(close) = tokens
            .get(i)
            .filter(|t| t.kind == TokenKind::LParen)
            .and_then(|_| matching_paren(tokens, i))
        else {
            break;
        };
        let body = &tokens[i + 1..close];
        let body_position = body.first().map_or_else(
            || tokens[i].position.advance("(", 1),
            |t| t.position,
        );
        ctes.push(CteDef {
            name: name_tok.value(),
            columns,
            body: source_text(sql, body).to_string(),
            body_position,
            position: name_tok.position,
        });
        i = close + 1;

        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Comma) {
            i += 1;
        } else {
            break;
        }
    }
    (ctes, recursive)
}

/// Parse a projection list (`SELECT` items or a `RETURNING` clause)
pub fn parse_projection(sql: &str, tokens: &[Token]) -> Vec<ColumnExpr> {
    split_top_level_commas(tokens)
        .into_iter()
        .map(|r| parse_projection_item(sql, &tokens[r]))
        .collect()
}

fn can_precede_alias(tok: &Token) -> bool {
    match tok.kind {
        TokenKind::Identifier
        | TokenKind::QuotedIdentifier
        | TokenKind::RParen
        | TokenKind::String
        | TokenKind::Blob
        | TokenKind::Integer
        | TokenKind::Float
        | TokenKind::Parameter => true,
        TokenKind::Keyword => tok.is_any_word(&[
            "NULL",
            "TRUE",
            "FALSE",
            "END",
            "CURRENT_DATE",
            "CURRENT_TIME",
            "CURRENT_TIMESTAMP",
        ]),
        _ => false,
    }
}

fn parse_projection_item(sql: &str, tokens: &[Token]) -> ColumnExpr {
    let mut expr = tokens;
    let mut alias = None;
    let n = tokens.len();

    if n >= 3 && tokens[n - 2].is_word("AS") {
        alias = Some(tokens[n - 1].value());
        expr = &tokens[..n - 2];
    } else if n >= 2 && tokens[n - 1].is_identifier() && can_precede_alias(&tokens[n - 2]) {
        alias = Some(tokens[n - 1].value());
        expr = &tokens[..n - 1];
    }

    let position = expr.first().map_or(Position::START, |t| t.position);
    let column = match expr {
        [star] if star.kind == TokenKind::Star => ColumnExpr::star(None, position),
        [table, dot, star]
            if table.is_name() && dot.kind == TokenKind::Dot && star.kind == TokenKind::Star =>
        {
            ColumnExpr::star(Some(&table.value()), position)
        }
        [name] if name.is_name() => ColumnExpr::column(None, &name.value(), position),
        [table, dot, name] if table.is_name() && dot.kind == TokenKind::Dot && name.is_name() => {
            ColumnExpr::column(Some(&table.value()), &name.value(), position)
        }
        [_, d1, table, d2, name]
            if d1.kind == TokenKind::Dot
                && d2.kind == TokenKind::Dot
                && table.is_name()
                && name.is_name() =>
        {
            ColumnExpr::column(Some(&table.value()), &name.value(), position)
        }
        _ => ColumnExpr::expression(source_text(sql, expr), position),
    };

    match alias {
        Some(alias) => column.with_alias(alias),
        None => column,
    }
}

fn parse_params(tokens: &[Token]) -> Vec<ParamRef> {
    let mut params: Vec<ParamRef> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (param, next) = match sqlc_macro(tokens, i) {
            Some(found) => found,
            None if tokens[i].kind == TokenKind::Parameter => (param_token(&tokens[i]), i + 1),
            None => {
                i += 1;
                continue;
            }
        };
        i = next;

        let duplicate = params.iter().any(|p| match param.style {
            ParamStyle::Positional => false,
            ParamStyle::Numbered => p.style == ParamStyle::Numbered && p.number == param.number,
            ParamStyle::Named => {
                p.style == ParamStyle::Named
                    && p.name.as_deref().map(normalize) == param.name.as_deref().map(normalize)
            }
        });
        if !duplicate {
            params.push(param);
        }
    }
    params
}

fn param_token(tok: &Token) -> ParamRef {
    let (sigil, rest) = tok.text.split_at(1);
    match (sigil, rest.parse::<usize>()) {
        ("?", _) if rest.is_empty() => ParamRef::positional(tok.position),
        ("?" | "$", Ok(n)) => ParamRef::numbered(n, tok.position),
        _ => ParamRef::named(rest, tok.position),
    }
}

/// `sqlc.arg(x)`, `sqlc.narg(x)`, `sqlc.slice(x)` starting at `i`
fn sqlc_macro(tokens: &[Token], i: usize) -> Option<(ParamRef, usize)> {
    let [sqlc, dot, func, open, arg, close, ..] = tokens.get(i..)? else {
        return None;
    };
    let shaped = sqlc.is_word("sqlc")
        && dot.kind == TokenKind::Dot
        && open.kind == TokenKind::LParen
        && close.kind == TokenKind::RParen
        && (arg.is_name() || arg.kind == TokenKind::String);
    if !shaped {
        return None;
    }
    let param = ParamRef::named(arg.value(), sqlc.position);
    let param = match func.text.to_ascii_lowercase().as_str() {
        "arg" => param,
        "narg" => param.with_force_nullable(true),
        "slice" => param.with_variadic(true),
        _ => return None,
    };
    Some((param, i + 6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn statement(sql: &str) -> Query {
        parse_statement(sql, Position::START).unwrap()
    }

    #[test]
    fn test_projection_aliases() {
        let q = statement("SELECT u.id, email AS mail, COUNT(*) total, 'x' FROM users u");
        let names: Vec<_> = q
            .columns
            .iter()
            .map(|c| (c.expr.as_str(), c.alias.as_deref()))
            .collect();
        assert_eq!(
            names,
            [
                ("u.id", None),
                ("email", Some("mail")),
                ("COUNT(*)", Some("total")),
                ("'x'", None),
            ]
        );
        assert_eq!(q.columns[0].table.as_deref(), Some("u"));
    }

    #[test]
    fn test_star_forms() {
        let q = statement("SELECT DISTINCT *, o.* FROM users, orders o");
        assert!(q.columns[0].star && q.columns[0].table.is_none());
        assert!(q.columns[1].star);
        assert_eq!(q.columns[1].table.as_deref(), Some("o"));
    }

    #[test]
    fn test_with_clause() {
        let q = statement(
            "WITH RECURSIVE cnt(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM cnt)\nSELECT x FROM cnt",
        );
        assert!(q.recursive);
        assert_eq!(q.verb, QueryVerb::Select);
        assert_eq!(q.ctes.len(), 1);
        let cte = &q.ctes[0];
        assert_eq!(cte.name, "cnt");
        assert_eq!(cte.columns, Some(vec!["x".to_string()]));
        assert_eq!(cte.body, "SELECT 1 UNION ALL SELECT x + 1 FROM cnt");
        assert_eq!(cte.body_position, Position::new(1, 27));
        assert_eq!(q.columns.len(), 1);
    }

    #[test]
    fn test_params_dedup_by_name() {
        let q = statement("SELECT * FROM t WHERE a = :a OR b = :a OR c = ? OR d = ? OR e = $1 OR f = $1");
        let styles: Vec<_> = q.params.iter().map(|p| p.style).collect();
        assert_eq!(
            styles,
            [
                ParamStyle::Named,
                ParamStyle::Positional,
                ParamStyle::Positional,
                ParamStyle::Numbered
            ]
        );
    }

    #[test]
    fn test_sqlc_macros() {
        let q = statement(
            "SELECT id FROM users WHERE id IN (sqlc.slice('ids')) AND name = sqlc.narg(name)",
        );
        assert_eq!(q.params.len(), 2);
        assert_eq!(q.params[0].name.as_deref(), Some("ids"));
        assert!(q.params[0].variadic);
        assert_eq!(q.params[0].position, Position::new(1, 35));
        assert!(q.params[1].force_nullable);
    }

    #[test]
    fn test_mutation_verbs() {
        assert_eq!(statement("INSERT INTO t VALUES (?)").verb, QueryVerb::Insert);
        assert_eq!(statement("update t set a = 1").verb, QueryVerb::Update);
        assert_eq!(statement("PRAGMA foreign_keys").verb, QueryVerb::Other);
        assert!(statement("DELETE FROM t RETURNING *").columns.is_empty());
    }

    #[test]
    fn test_parse_queries_blocks() {
        let source = "\
-- name: GetUser :one
-- Fetch a user.
-- @param id int64
-- @column email text null
SELECT id, email
FROM users WHERE id = ?;

-- name: ListUsers :many
SELECT * FROM users;
";
        let file = parse_queries("users.sql", source);
        assert!(file.diagnostics.is_empty(), "{:?}", file.diagnostics);
        assert_eq!(file.blocks.len(), 2);

        let get = file.block("GetUser").unwrap();
        assert_eq!(get.command, QueryCommand::One);
        assert_eq!(get.position, Position::new(5, 1));
        assert_eq!(get.doc.as_deref(), Some("Fetch a user."));
        assert_eq!(get.param_overrides[0].type_name, "int64");
        assert!(get.column_overrides[0].nullable);
        assert_eq!(get.query.params[0].position, Position::new(6, 23));
        assert_eq!(file.block("ListUsers").unwrap().sql, "SELECT * FROM users;");
    }

    #[test]
    fn test_parse_queries_errors() {
        let source = "\
SELECT 1;
-- name: A
SELECT 1;
-- name: B :one
SELECT 1;
-- name: B :one
SELECT 2;
-- name: C :many
-- only a comment
";
        let file = parse_queries("bad.sql", source);
        let codes: Vec<_> = file.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, [SQL0007, SQL0007, SQL0008, SQL0011]);
        assert_eq!(file.blocks.len(), 1);
    }

    #[test]
    fn test_tokenize_failure_keeps_block() {
        let file = parse_queries("q.sql", "-- name: Broken :one\nSELECT 'oops\n");
        assert_eq!(file.blocks.len(), 1);
        assert_eq!(file.blocks[0].verb(), QueryVerb::Other);
        assert_eq!(file.diagnostics[0].line, 2);
        assert_eq!(file.diagnostics[0].column, 8);
    }
}
