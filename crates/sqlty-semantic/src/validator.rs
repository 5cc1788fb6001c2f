//! Identifier validation
//!
//! Every identifier of a statement segment that can only be a column
//! reference is looked up in the segment's scope. Names that are something
//! else (functions, aliases, type names, CTE names, relation names) are
//! skipped, as are subqueries, whose identifiers resolve against relations
//! the scope does not hold.

use indexmap::IndexSet;
use sqlty_ast::{normalize, ColumnExpr, Query, Token, TokenKind};
use sqlty_diagnostics::{DiagnosticCollector, SQL0100, SQL0101, SQL0102};
use sqlty_parser::scan::{depths, matching_paren, statement_start};

use crate::scope::{relation_refs, LookupError, Scope};

/// Words after which a name is never a column
const NAME_INTRODUCERS: &[&str] = &["AS", "COLLATE", "NULLS", "OVER", "WINDOW"];

/// Implicit row identifiers of SQLite tables
const ROWID_ALIASES: &[&str] = &["rowid", "oid", "_rowid_"];

/// Context words the tokenizer does not classify as keywords
const CONTEXT_WORDS: &[&str] = &[
    "ABORT", "CURRENT", "EXCLUDE", "FAIL", "FOLLOWING", "GROUPS", "INDEXED", "NO",
    "OTHERS", "PRECEDING", "RANGE", "REPLACE", "ROLLBACK", "ROW", "ROWS", "TIES", "UNBOUNDED",
];

pub struct Validator<'a> {
    pub scope: &'a Scope,
    /// Output aliases of the statement, usable in `ORDER BY` and friends
    pub aliases: IndexSet<String>,
    pub ctes: IndexSet<String>,
}

impl<'a> Validator<'a> {
    pub fn new(scope: &'a Scope, query: &Query, returning: &[ColumnExpr]) -> Self {
        let aliases = query
            .columns
            .iter()
            .chain(returning)
            .filter_map(|c| c.alias.as_deref())
            .map(normalize)
            .collect();
        let ctes = query.ctes.iter().map(|c| normalize(&c.name)).collect();
        Self { scope, aliases, ctes }
    }

    /// Result column names, which the `ORDER BY` of a compound select uses
    pub fn with_outputs<'n>(mut self, names: impl IntoIterator<Item = &'n str>) -> Self {
        self.aliases.extend(names.into_iter().map(normalize));
        self
    }

    pub fn validate(&self, tokens: &[Token], diags: &mut DiagnosticCollector) {
        let start = statement_start(tokens);
        let tokens = &tokens[start..];
        let skip = self.skipped(tokens);

        let mut k = 0;
        while k < tokens.len() {
            let tok = &tokens[k];
            let after_dot = k > 0 && tokens[k - 1].kind == TokenKind::Dot;
            if skip[k] || after_dot || !tok.is_identifier() {
                k += 1;
                continue;
            }
            if tok.kind == TokenKind::Identifier && tok.is_any_word(CONTEXT_WORDS) {
                k += 1;
                continue;
            }
            let next = tokens.get(k + 1);
            if next.is_some_and(|t| t.kind == TokenKind::LParen) {
                k += 1;
                continue;
            }

            if next.is_some_and(|t| t.kind == TokenKind::Dot) {
                let parts = qualified_parts(&tokens[k..]);
                let width = parts.len() * 2 - 1;
                if let [.., qualifier, column] = parts.as_slice() {
                    let is_star = column.kind == TokenKind::Star;
                    if !is_star && !qualifier.is_word("excluded") {
                        self.check(Some(&qualifier.value()), &column.value(), tok, diags);
                    }
                }
                k += width;
                continue;
            }

            let name = tok.normalized();
            let local = self.aliases.contains(&name)
                || self.ctes.contains(&name)
                || ROWID_ALIASES.contains(&name.as_str());
            if !local {
                self.check(None, &tok.value(), tok, diags);
            }
            k += 1;
        }
    }

    fn check(&self, qualifier: Option<&str>, column: &str, at: &Token, diags: &mut DiagnosticCollector) {
        if qualifier.is_none() && ROWID_ALIASES.contains(&normalize(column).as_str()) {
            return;
        }
        let Err(err) = self.scope.lookup(qualifier, column) else {
            return;
        };
        let code = match err {
            LookupError::UnknownRelation { .. } => SQL0100,
            LookupError::UnknownColumn { .. } | LookupError::NoSuchColumn { .. } => SQL0101,
            LookupError::Ambiguous { .. } => SQL0102,
            LookupError::Unmapped { .. } => return,
        };
        diags.error(code, at.position, err.to_string());
    }

    /// Tokens that are never column references
    fn skipped(&self, tokens: &[Token]) -> Vec<bool> {
        let mut skip = vec![false; tokens.len()];
        let depth = depths(tokens);

        for rel in relation_refs(tokens) {
            for idx in rel.tokens {
                skip[idx] = true;
            }
        }

        let mark = |skip: &mut Vec<bool>, from: usize, to: usize| {
            for s in &mut skip[from..=to.min(tokens.len() - 1)] {
                *s = true;
            }
        };

        for k in 0..tokens.len() {
            let tok = &tokens[k];
            let prev = k.checked_sub(1).map(|p| &tokens[p]);

            if prev.is_some_and(|p| p.is_any_word(NAME_INTRODUCERS) || p.is_operator("::")) {
                skip[k] = true;
            }
            if prev.is_some_and(|p| p.is_word("BY")) && k >= 2 && tokens[k - 2].is_word("INDEXED") {
                skip[k] = true;
            }

            // sqlc.arg(name) and friends
            if tok.is_word("sqlc") && tokens.get(k + 1).is_some_and(|t| t.kind == TokenKind::Dot) {
                mark(&mut skip, k, k + 5);
            }

            if tok.kind != TokenKind::LParen {
                continue;
            }
            let Some(close) = matching_paren(tokens, k) else {
                continue;
            };
            let opens_subquery = tokens
                .get(k + 1)
                .is_some_and(|t| t.is_any_word(&["SELECT", "WITH", "VALUES"]));
            if opens_subquery || prev.is_some_and(|p| p.is_word("USING")) {
                mark(&mut skip, k, close);
            }
            if prev.is_some_and(|p| p.is_word("CAST")) {
                let as_idx = (k + 1..close).rev().find(|&i| depth[i] == depth[k] + 1 && tokens[i].is_word("AS"));
                if let Some(as_idx) = as_idx {
                    mark(&mut skip, as_idx, close);
                }
            }
        }
        skip
    }
}

/// `a.b` or `a.b.c` starting at the first name; star allowed last
fn qualified_parts(tokens: &[Token]) -> Vec<&Token> {
    let mut parts = vec![&tokens[0]];
    let mut k = 1;
    while tokens.get(k).is_some_and(|t| t.kind == TokenKind::Dot) {
        match tokens.get(k + 1) {
            Some(t) if t.is_name() || t.kind == TokenKind::Star => parts.push(t),
            _ => break,
        }
        k += 2;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ColumnOverrides;
    use sqlty_ast::{Catalog, Column, Table};
    use sqlty_diagnostics::Position;
    use sqlty_parser::{parse_statement, tokenize};
    use sqlty_types::SqliteTypeResolver;

    fn validate(sql: &str) -> Vec<String> {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("users")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("name", "TEXT")),
        );
        catalog.add_table(
            Table::new("posts")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("user_id", "INTEGER")),
        );
        let base = Scope::from_catalog(&catalog, &SqliteTypeResolver, &ColumnOverrides::new());
        let tokens = tokenize(sql).unwrap();
        let working = base.narrow_to_referenced(&tokens[statement_start(&tokens)..]);
        let query = parse_statement(sql, Position::START).unwrap();

        let mut diags = DiagnosticCollector::new("q.sql");
        Validator::new(&working, &query, &[]).validate(&tokens, &mut diags);
        diags.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_valid_statement_is_silent() {
        let sql = "SELECT u.name AS author, COUNT(p.id) posts_count \
                   FROM users u JOIN posts p USING (id) \
                   WHERE CAST(u.id AS UNSIGNED BIG INT) > 0 AND p.id IN (SELECT id FROM posts) \
                   GROUP BY u.name ORDER BY posts_count DESC, author COLLATE NOCASE";
        assert!(validate(sql).is_empty());
    }

    #[test]
    fn test_reports_bad_references() {
        assert_eq!(
            validate("SELECT u.nope, x.id, bogus FROM users u"),
            [
                "unknown column 'nope' in 'u'",
                "unknown table or alias 'x'",
                "unknown column 'bogus'",
            ]
        );
    }

    #[test]
    fn test_ambiguous_column() {
        assert_eq!(
            validate("SELECT id FROM users JOIN posts ON posts.user_id = users.id"),
            ["column 'id' is ambiguous; qualify with a table alias"]
        );
    }

    #[test]
    fn test_upsert_and_rowid() {
        let sql = "INSERT INTO users (id, name) VALUES (?, ?) \
                   ON CONFLICT (id) DO UPDATE SET name = excluded.name RETURNING rowid";
        assert!(validate(sql).is_empty());
    }
}
